use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::polls::demographics::{DemographicRequirement, Profile, ProfileUpdate};
use crate::polls::domain::{
    BallotRecord, NewPoll, Poll, PollCategory, PollDraft, PollFilter, PollId, PollOption,
    PollOptionId, PollStatus, PollType, UserId, Vote,
};
use crate::polls::repository::{
    PollRepository, ProfileRepository, RepositoryError, VoteRepository,
};
use crate::polls::service::{PollDetail, PollService};
use crate::polls::session::{Identity, Session};
use crate::store::MemoryStore;

pub(super) fn admin() -> Identity {
    Identity::Authenticated(Session::admin(UserId::new()))
}

pub(super) fn voter() -> Identity {
    Identity::Authenticated(Session::user(UserId::new()))
}

pub(super) fn new_poll(poll_type: PollType, options: &[&str]) -> NewPoll {
    NewPoll {
        title: "Preferred commute".to_string(),
        description: Some("How do you usually get to work?".to_string()),
        poll_type,
        category: PollCategory::Social,
        status: PollStatus::Active,
        max_selections: None,
        required_demographics: DemographicRequirement::none(),
        closes_at: None,
        options: options.iter().map(|text| text.to_string()).collect(),
    }
}

pub(super) fn build_service() -> (PollService<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (PollService::new(store.clone()), store)
}

pub(super) async fn create(service: &PollService<MemoryStore>, input: NewPoll) -> PollDetail {
    service
        .create_poll(&admin(), input)
        .await
        .expect("poll is created")
}

/// Option ids of `detail` in display order.
pub(super) fn option_ids(detail: &PollDetail) -> Vec<PollOptionId> {
    detail.options.iter().map(|option| option.id).collect()
}

pub(super) struct UnavailableStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

#[async_trait]
impl PollRepository for UnavailableStore {
    async fn list_polls(&self, _filter: PollFilter) -> Result<Vec<Poll>, RepositoryError> {
        Err(offline())
    }

    async fn fetch_poll(&self, _id: PollId) -> Result<Option<Poll>, RepositoryError> {
        Err(offline())
    }

    async fn poll_options(&self, _id: PollId) -> Result<Vec<PollOption>, RepositoryError> {
        Err(offline())
    }

    async fn insert_poll(&self, _draft: PollDraft) -> Result<PollDraft, RepositoryError> {
        Err(offline())
    }

    async fn update_poll(
        &self,
        _poll: Poll,
        _expected: PollStatus,
    ) -> Result<Poll, RepositoryError> {
        Err(offline())
    }

    async fn delete_poll(&self, _id: PollId) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

#[async_trait]
impl VoteRepository for UnavailableStore {
    async fn record_vote(
        &self,
        _vote: Vote,
        _option_ids: &[PollOptionId],
    ) -> Result<Vote, RepositoryError> {
        Err(offline())
    }

    async fn find_vote(
        &self,
        _poll_id: PollId,
        _user_id: UserId,
    ) -> Result<Option<BallotRecord>, RepositoryError> {
        Err(offline())
    }

    async fn count_votes(&self, _poll_id: PollId) -> Result<u64, RepositoryError> {
        Err(offline())
    }

    async fn answer_counts(
        &self,
        _poll_id: PollId,
    ) -> Result<BTreeMap<PollOptionId, u64>, RepositoryError> {
        Err(offline())
    }
}

#[async_trait]
impl ProfileRepository for UnavailableStore {
    async fn fetch_profile(&self, _user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        Err(offline())
    }

    async fn upsert_profile(
        &self,
        _user_id: UserId,
        _update: ProfileUpdate,
    ) -> Result<Profile, RepositoryError> {
        Err(offline())
    }
}

/// Read after which [`ClosingStore`] closes the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CloseAfter {
    FetchPoll,
    PollOptions,
}

/// Memory store that closes a poll right after one chosen read, the way another admin
/// would between the service's read and its write. Fires once.
pub(super) struct ClosingStore {
    inner: MemoryStore,
    after: CloseAfter,
    armed: AtomicBool,
}

impl ClosingStore {
    pub(super) fn new(inner: MemoryStore, after: CloseAfter) -> Self {
        Self {
            inner,
            after,
            armed: AtomicBool::new(true),
        }
    }

    async fn close_if(&self, read: CloseAfter, id: PollId) -> Result<(), RepositoryError> {
        if read != self.after || !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut poll) = self.inner.fetch_poll(id).await? {
            let previous = poll.status;
            poll.status = PollStatus::Closed;
            self.inner.update_poll(poll, previous).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PollRepository for ClosingStore {
    async fn list_polls(&self, filter: PollFilter) -> Result<Vec<Poll>, RepositoryError> {
        self.inner.list_polls(filter).await
    }

    async fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError> {
        let poll = self.inner.fetch_poll(id).await?;
        self.close_if(CloseAfter::FetchPoll, id).await?;
        Ok(poll)
    }

    async fn poll_options(&self, id: PollId) -> Result<Vec<PollOption>, RepositoryError> {
        let options = self.inner.poll_options(id).await?;
        self.close_if(CloseAfter::PollOptions, id).await?;
        Ok(options)
    }

    async fn insert_poll(&self, draft: PollDraft) -> Result<PollDraft, RepositoryError> {
        self.inner.insert_poll(draft).await
    }

    async fn update_poll(
        &self,
        poll: Poll,
        expected: PollStatus,
    ) -> Result<Poll, RepositoryError> {
        self.inner.update_poll(poll, expected).await
    }

    async fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError> {
        self.inner.delete_poll(id).await
    }
}

#[async_trait]
impl VoteRepository for ClosingStore {
    async fn record_vote(
        &self,
        vote: Vote,
        option_ids: &[PollOptionId],
    ) -> Result<Vote, RepositoryError> {
        self.inner.record_vote(vote, option_ids).await
    }

    async fn find_vote(
        &self,
        poll_id: PollId,
        user_id: UserId,
    ) -> Result<Option<BallotRecord>, RepositoryError> {
        self.inner.find_vote(poll_id, user_id).await
    }

    async fn count_votes(&self, poll_id: PollId) -> Result<u64, RepositoryError> {
        self.inner.count_votes(poll_id).await
    }

    async fn answer_counts(
        &self,
        poll_id: PollId,
    ) -> Result<BTreeMap<PollOptionId, u64>, RepositoryError> {
        self.inner.answer_counts(poll_id).await
    }
}

#[async_trait]
impl ProfileRepository for ClosingStore {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError> {
        self.inner.fetch_profile(user_id).await
    }

    async fn upsert_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, RepositoryError> {
        self.inner.upsert_profile(user_id, update).await
    }
}

pub(super) fn option(poll_id: PollId, text: &str) -> PollOption {
    PollOption {
        id: PollOptionId::new(),
        poll_id,
        option_text: text.to_string(),
        created_at: Utc::now(),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
