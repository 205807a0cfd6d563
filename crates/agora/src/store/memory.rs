use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::polls::demographics::{Profile, ProfileUpdate};
use crate::polls::domain::{
    BallotRecord, Poll, PollDraft, PollFilter, PollId, PollOption, PollOptionId, PollStatus,
    UserId, Vote, VoteAnswer, VoteAnswerId,
};
use crate::polls::repository::{
    PollRepository, ProfileRepository, RepositoryError, VoteRepository,
};

#[derive(Debug, Default)]
struct MemoryState {
    polls: Vec<Poll>,
    options: Vec<PollOption>,
    votes: Vec<Vote>,
    answers: Vec<VoteAnswer>,
    profiles: HashMap<UserId, Profile>,
}

/// Process-local store. Every write runs under one lock, so multi-row writes are atomic and
/// the one-vote-per-user rule behaves like a unique constraint.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Number of stored vote answers across all polls.
    pub fn answer_rows(&self) -> usize {
        self.state().map(|state| state.answers.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PollRepository for MemoryStore {
    async fn list_polls(&self, filter: PollFilter) -> Result<Vec<Poll>, RepositoryError> {
        let state = self.state()?;
        let mut polls: Vec<Poll> = state
            .polls
            .iter()
            .rev()
            .filter(|poll| filter.matches(poll))
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        let state = self.state()?;
        Ok(state.polls.iter().find(|poll| poll.id == id).cloned())
    }

    async fn poll_options(&self, id: PollId) -> Result<Vec<PollOption>, RepositoryError> {
        let state = self.state()?;
        let mut options: Vec<PollOption> = state
            .options
            .iter()
            .filter(|option| option.poll_id == id)
            .cloned()
            .collect();
        options.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(options)
    }

    async fn insert_poll(&self, draft: PollDraft) -> Result<PollDraft, RepositoryError> {
        let mut state = self.state()?;
        if state.polls.iter().any(|poll| poll.id == draft.poll.id) {
            return Err(RepositoryError::Conflict);
        }
        if draft.options.iter().any(|option| option.poll_id != draft.poll.id) {
            return Err(RepositoryError::NotFound);
        }

        state.polls.push(draft.poll.clone());
        state.options.extend(draft.options.iter().cloned());
        Ok(draft)
    }

    async fn update_poll(
        &self,
        poll: Poll,
        expected: PollStatus,
    ) -> Result<Poll, RepositoryError> {
        let mut state = self.state()?;
        let slot = state
            .polls
            .iter_mut()
            .find(|stored| stored.id == poll.id)
            .ok_or(RepositoryError::NotFound)?;
        if slot.status != expected {
            return Err(RepositoryError::Conflict);
        }
        *slot = poll.clone();
        Ok(poll)
    }

    async fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let before = state.polls.len();
        state.polls.retain(|poll| poll.id != id);
        if state.polls.len() == before {
            return Err(RepositoryError::NotFound);
        }

        let removed_votes: Vec<_> = state
            .votes
            .iter()
            .filter(|vote| vote.poll_id == id)
            .map(|vote| vote.id)
            .collect();
        state.votes.retain(|vote| vote.poll_id != id);
        state
            .answers
            .retain(|answer| !removed_votes.contains(&answer.vote_id));
        state.options.retain(|option| option.poll_id != id);
        Ok(())
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn record_vote(
        &self,
        vote: Vote,
        option_ids: &[PollOptionId],
    ) -> Result<Vote, RepositoryError> {
        let mut state = self.state()?;
        let status = state
            .polls
            .iter()
            .find(|poll| poll.id == vote.poll_id)
            .map(|poll| poll.status)
            .ok_or(RepositoryError::NotFound)?;
        if status != PollStatus::Active {
            return Err(RepositoryError::PollNotActive(status));
        }
        if state
            .votes
            .iter()
            .any(|stored| stored.poll_id == vote.poll_id && stored.user_id == vote.user_id)
        {
            return Err(RepositoryError::Conflict);
        }
        let unknown_option = option_ids
            .iter()
            .any(|id| !state.options.iter().any(|option| option.id == *id));
        if unknown_option {
            return Err(RepositoryError::NotFound);
        }

        let answers: Vec<VoteAnswer> = option_ids
            .iter()
            .map(|option_id| VoteAnswer {
                id: VoteAnswerId::new(),
                vote_id: vote.id,
                option_id: *option_id,
                created_at: vote.created_at,
            })
            .collect();
        state.votes.push(vote.clone());
        state.answers.extend(answers);
        Ok(vote)
    }

    async fn find_vote(
        &self,
        poll_id: PollId,
        user_id: UserId,
    ) -> Result<Option<BallotRecord>, RepositoryError> {
        let state = self.state()?;
        let Some(vote) = state
            .votes
            .iter()
            .find(|vote| vote.poll_id == poll_id && vote.user_id == user_id)
        else {
            return Ok(None);
        };

        let option_ids = state
            .answers
            .iter()
            .filter(|answer| answer.vote_id == vote.id)
            .map(|answer| answer.option_id)
            .collect();
        Ok(Some(BallotRecord {
            vote: vote.clone(),
            option_ids,
        }))
    }

    async fn count_votes(&self, poll_id: PollId) -> Result<u64, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .votes
            .iter()
            .filter(|vote| vote.poll_id == poll_id)
            .count() as u64)
    }

    async fn answer_counts(
        &self,
        poll_id: PollId,
    ) -> Result<BTreeMap<PollOptionId, u64>, RepositoryError> {
        let state = self.state()?;
        let mut counts = BTreeMap::new();
        for answer in &state.answers {
            let belongs = state
                .votes
                .iter()
                .any(|vote| vote.id == answer.vote_id && vote.poll_id == poll_id);
            if belongs {
                *counts.entry(answer.option_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let state = self.state()?;
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, RepositoryError> {
        let now = Utc::now();
        let mut state = self.state()?;
        let profile = state
            .profiles
            .entry(user_id)
            .or_insert_with(|| Profile::empty(user_id, now));
        update.apply(profile, now);
        Ok(profile.clone())
    }
}
