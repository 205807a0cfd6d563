use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::demographics::{DemographicField, Profile, ProfileUpdate};
use super::domain::{
    BallotRecord, NewPoll, Poll, PollDraft, PollFilter, PollId, PollOption, PollOptionId,
    PollStatus, PollUpdate, Vote, VoteId,
};
use super::repository::{PollStore, RepositoryError};
use super::results::{OptionTally, PollResults};
use super::session::{Identity, Session};
use super::validation::{validate_new_poll, validate_selection, validate_update, ValidationError};

/// Poll with its options in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollDetail {
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

/// Aggregated results together with the per-option breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsView {
    pub poll_id: PollId,
    pub title: String,
    pub status: PollStatus,
    pub total_votes: u64,
    pub options: Vec<OptionTally>,
}

/// What stands between the caller and a vote on a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VotingEligibility {
    pub poll_id: PollId,
    pub status: PollStatus,
    pub already_voted: bool,
    pub missing_demographics: Vec<DemographicField>,
    pub can_vote: bool,
}

/// Service composing poll administration, vote submission, the demographics gate, and
/// result aggregation over a single store.
pub struct PollService<S> {
    store: Arc<S>,
}

impl<S> Clone for PollService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> PollService<S>
where
    S: PollStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Polls newest first. Drafts are only listed for admins.
    pub async fn list_polls(
        &self,
        identity: &Identity,
        filter: PollFilter,
    ) -> Result<Vec<Poll>, PollServiceError> {
        let admin = identity.is_admin();
        if !admin && filter.status == Some(PollStatus::Draft) {
            return Ok(Vec::new());
        }

        let polls = self.store.list_polls(filter).await?;
        Ok(polls
            .into_iter()
            .filter(|poll| admin || poll.status != PollStatus::Draft)
            .collect())
    }

    pub async fn get_poll(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<PollDetail, PollServiceError> {
        let poll = self.visible_poll(identity, poll_id).await?;
        let options = self.store.poll_options(poll_id).await?;
        Ok(PollDetail { poll, options })
    }

    /// Validate and store a poll with its options in one write.
    pub async fn create_poll(
        &self,
        identity: &Identity,
        input: NewPoll,
    ) -> Result<PollDetail, PollServiceError> {
        let session = require_admin(identity)?;
        let option_texts = validate_new_poll(&input)?;

        let now = Utc::now();
        let poll = Poll {
            id: PollId::new(),
            title: input.title.trim().to_string(),
            description: input
                .description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            poll_type: input.poll_type,
            category: input.category,
            status: input.status,
            max_selections: input.max_selections,
            required_demographics: input.required_demographics,
            created_by: session.user_id,
            created_at: now,
            updated_at: now,
            closes_at: input.closes_at,
        };
        let options = option_texts
            .into_iter()
            .map(|option_text| PollOption {
                id: PollOptionId::new(),
                poll_id: poll.id,
                option_text,
                created_at: now,
            })
            .collect();

        let stored = self.store.insert_poll(PollDraft { poll, options }).await?;
        info!(
            poll_id = %stored.poll.id,
            poll_type = %stored.poll.poll_type,
            options = stored.options.len(),
            "poll created"
        );

        Ok(PollDetail {
            poll: stored.poll,
            options: stored.options,
        })
    }

    pub async fn update_poll(
        &self,
        identity: &Identity,
        poll_id: PollId,
        update: PollUpdate,
    ) -> Result<Poll, PollServiceError> {
        require_admin(identity)?;
        let mut poll = self.existing_poll(poll_id).await?;
        validate_update(&poll, &update)?;

        let previous_status = poll.status;
        if let Some(title) = update.title {
            poll.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            poll.description = description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
        }
        if let Some(category) = update.category {
            poll.category = category;
        }
        if let Some(status) = update.status {
            poll.status = status;
        }
        if let Some(max_selections) = update.max_selections {
            poll.max_selections = max_selections;
        }
        if let Some(required) = update.required_demographics {
            poll.required_demographics = required;
        }
        if let Some(closes_at) = update.closes_at {
            poll.closes_at = closes_at;
        }
        poll.updated_at = Utc::now();

        let stored = match self.store.update_poll(poll, previous_status).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                warn!(poll_id = %poll_id, read_as = %previous_status, "stale poll update rejected");
                return Err(PollServiceError::StaleUpdate);
            }
            Err(err) => return Err(err.into()),
        };
        if stored.status != previous_status {
            info!(
                poll_id = %poll_id,
                from = %previous_status,
                to = %stored.status,
                "poll status changed"
            );
        }
        Ok(stored)
    }

    /// Delete a poll; options, votes, and answers go with it.
    pub async fn delete_poll(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<(), PollServiceError> {
        require_admin(identity)?;
        self.store
            .delete_poll(poll_id)
            .await
            .map_err(|err| not_found_as(err, "poll"))?;
        info!(poll_id = %poll_id, "poll deleted");
        Ok(())
    }

    /// Record the caller's vote. Selection and demographics are checked before the single
    /// atomic write; a second vote by the same caller fails with `AlreadyVoted`.
    pub async fn submit_vote(
        &self,
        identity: &Identity,
        poll_id: PollId,
        option_ids: Vec<PollOptionId>,
    ) -> Result<Vote, PollServiceError> {
        let session = require_session(identity)?;
        let poll = self.visible_poll(identity, poll_id).await?;
        let options = self.store.poll_options(poll_id).await?;
        validate_selection(&poll, &options, &option_ids)?;

        let missing = self.missing_demographics(&poll, session).await?;
        if !missing.is_empty() {
            debug!(
                poll_id = %poll_id,
                user_id = %session.user_id,
                ?missing,
                "vote blocked by demographics"
            );
            return Err(ValidationError::MissingDemographics(missing).into());
        }

        let vote = Vote {
            id: VoteId::new(),
            poll_id,
            user_id: session.user_id,
            created_at: Utc::now(),
        };

        match self.store.record_vote(vote, &option_ids).await {
            Ok(vote) => {
                info!(
                    poll_id = %poll_id,
                    vote_id = %vote.id,
                    answers = option_ids.len(),
                    "vote recorded"
                );
                Ok(vote)
            }
            Err(RepositoryError::Conflict) => {
                warn!(poll_id = %poll_id, user_id = %session.user_id, "duplicate vote rejected");
                Err(PollServiceError::AlreadyVoted)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The caller's stored vote on `poll_id`, if any.
    pub async fn user_vote(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<Option<BallotRecord>, PollServiceError> {
        let session = require_session(identity)?;
        Ok(self.store.find_vote(poll_id, session.user_id).await?)
    }

    /// Demographics gate plus the has-voted check for the caller.
    pub async fn eligibility(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<VotingEligibility, PollServiceError> {
        let session = require_session(identity)?;
        let poll = self.visible_poll(identity, poll_id).await?;
        let already_voted = self
            .store
            .find_vote(poll_id, session.user_id)
            .await?
            .is_some();
        let missing_demographics = self.missing_demographics(&poll, session).await?;
        let can_vote =
            poll.status == PollStatus::Active && !already_voted && missing_demographics.is_empty();

        Ok(VotingEligibility {
            poll_id,
            status: poll.status,
            already_voted,
            missing_demographics,
            can_vote,
        })
    }

    /// Recount votes and answers for a poll from the store.
    pub async fn results(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<PollResults, PollServiceError> {
        self.visible_poll(identity, poll_id).await?;
        self.tally(poll_id).await
    }

    pub async fn results_view(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<ResultsView, PollServiceError> {
        let (poll, options, results) = self.load_results(identity, poll_id).await?;
        Ok(ResultsView {
            poll_id,
            title: poll.title,
            status: poll.status,
            total_votes: results.total_votes,
            options: results.tally(&options),
        })
    }

    /// Results tally rendered as CSV.
    pub async fn results_csv(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<Vec<u8>, PollServiceError> {
        let (_, options, results) = self.load_results(identity, poll_id).await?;
        let mut buffer = Vec::new();
        results
            .write_csv(&options, &mut buffer)
            .map_err(|err| PollServiceError::Export(err.to_string()))?;
        Ok(buffer)
    }

    pub async fn profile(&self, identity: &Identity) -> Result<Option<Profile>, PollServiceError> {
        let session = require_session(identity)?;
        Ok(self.store.fetch_profile(session.user_id).await?)
    }

    /// Patch the caller's own profile, creating it on first use.
    pub async fn update_profile(
        &self,
        identity: &Identity,
        update: ProfileUpdate,
    ) -> Result<Profile, PollServiceError> {
        let session = require_session(identity)?;
        let profile = self.store.upsert_profile(session.user_id, update).await?;
        debug!(user_id = %session.user_id, "profile updated");
        Ok(profile)
    }

    async fn tally(&self, poll_id: PollId) -> Result<PollResults, PollServiceError> {
        let total_votes = self.store.count_votes(poll_id).await?;
        let option_counts = self.store.answer_counts(poll_id).await?;
        Ok(PollResults {
            poll_id,
            total_votes,
            option_counts,
        })
    }

    async fn load_results(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<(Poll, Vec<PollOption>, PollResults), PollServiceError> {
        let poll = self.visible_poll(identity, poll_id).await?;
        let options = self.store.poll_options(poll_id).await?;
        let results = self.tally(poll_id).await?;
        Ok((poll, options, results))
    }

    async fn missing_demographics(
        &self,
        poll: &Poll,
        session: &Session,
    ) -> Result<Vec<DemographicField>, PollServiceError> {
        if poll.required_demographics.is_empty() {
            return Ok(Vec::new());
        }
        let profile = self.store.fetch_profile(session.user_id).await?;
        Ok(poll.required_demographics.missing_from(profile.as_ref()))
    }

    async fn existing_poll(&self, poll_id: PollId) -> Result<Poll, PollServiceError> {
        self.store
            .fetch_poll(poll_id)
            .await?
            .ok_or(PollServiceError::NotFound("poll"))
    }

    /// Drafts are hidden from everyone but admins.
    async fn visible_poll(
        &self,
        identity: &Identity,
        poll_id: PollId,
    ) -> Result<Poll, PollServiceError> {
        let poll = self.existing_poll(poll_id).await?;
        if poll.status == PollStatus::Draft && !identity.is_admin() {
            return Err(PollServiceError::NotFound("poll"));
        }
        Ok(poll)
    }
}

fn require_session(identity: &Identity) -> Result<&Session, PollServiceError> {
    identity.session().ok_or(PollServiceError::Unauthenticated)
}

fn require_admin(identity: &Identity) -> Result<&Session, PollServiceError> {
    let session = require_session(identity)?;
    if session.is_admin() {
        Ok(session)
    } else {
        Err(PollServiceError::Forbidden)
    }
}

fn not_found_as(err: RepositoryError, entity: &'static str) -> PollServiceError {
    match err {
        RepositoryError::NotFound => PollServiceError::NotFound(entity),
        RepositoryError::PollNotActive(status) => ValidationError::PollNotActive(status).into(),
        other => PollServiceError::Storage(other),
    }
}

/// Error raised by the poll service.
#[derive(Debug, thiserror::Error)]
pub enum PollServiceError {
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("admin role required")]
    Forbidden,
    #[error("you have already voted on this poll")]
    AlreadyVoted,
    #[error("poll status changed while it was being edited, reload and try again")]
    StaleUpdate,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(RepositoryError),
    #[error("results export failed: {0}")]
    Export(String),
}

impl From<RepositoryError> for PollServiceError {
    fn from(value: RepositoryError) -> Self {
        not_found_as(value, "record")
    }
}
