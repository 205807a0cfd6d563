use std::collections::BTreeMap;

use async_trait::async_trait;

use super::demographics::{Profile, ProfileUpdate};
use super::domain::{
    BallotRecord, Poll, PollDraft, PollFilter, PollId, PollOption, PollOptionId, PollStatus,
    UserId, Vote,
};

/// Poll and option records.
#[async_trait]
pub trait PollRepository: Send + Sync {
    /// Polls matching `filter`, newest first.
    async fn list_polls(&self, filter: PollFilter) -> Result<Vec<Poll>, RepositoryError>;
    async fn fetch_poll(&self, id: PollId) -> Result<Option<Poll>, RepositoryError>;
    /// Options of a poll, oldest first.
    async fn poll_options(&self, id: PollId) -> Result<Vec<PollOption>, RepositoryError>;
    /// Store the poll and all of its options as one unit; either both land or neither.
    async fn insert_poll(&self, draft: PollDraft) -> Result<PollDraft, RepositoryError>;
    /// Overwrite the stored poll, but only while its status is still `expected`; otherwise
    /// fail with [`RepositoryError::Conflict`] and leave the row untouched.
    async fn update_poll(
        &self,
        poll: Poll,
        expected: PollStatus,
    ) -> Result<Poll, RepositoryError>;
    /// Remove a poll together with its options, votes, and answers.
    async fn delete_poll(&self, id: PollId) -> Result<(), RepositoryError>;
}

/// Vote and answer records plus the aggregate queries over them.
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Store one vote and one answer per option as a single unit. A second vote by the same
    /// user on the same poll fails with [`RepositoryError::Conflict`] and writes nothing. The
    /// poll's status is re-read inside the same unit; a poll that is no longer active fails
    /// with [`RepositoryError::PollNotActive`].
    async fn record_vote(
        &self,
        vote: Vote,
        option_ids: &[PollOptionId],
    ) -> Result<Vote, RepositoryError>;
    async fn find_vote(
        &self,
        poll_id: PollId,
        user_id: UserId,
    ) -> Result<Option<BallotRecord>, RepositoryError>;
    async fn count_votes(&self, poll_id: PollId) -> Result<u64, RepositoryError>;
    /// Answers per option, counting only answers whose vote belongs to `poll_id`.
    async fn answer_counts(
        &self,
        poll_id: PollId,
    ) -> Result<BTreeMap<PollOptionId, u64>, RepositoryError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<Profile>, RepositoryError>;
    /// Apply `update` to the user's profile, creating an empty one first if needed.
    async fn upsert_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<Profile, RepositoryError>;
}

/// Everything the poll service needs from a backing store.
pub trait PollStore: PollRepository + VoteRepository + ProfileRepository + 'static {}

impl<T> PollStore for T where T: PollRepository + VoteRepository + ProfileRepository + 'static {}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("poll is {0}")]
    PollNotActive(PollStatus),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
