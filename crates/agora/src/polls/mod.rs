//! Polls, votes, demographics, and results.
//!
//! [`PollService`] is the single entry point used by the HTTP router and the CLI. It takes
//! the caller's [`Identity`] explicitly on every call and delegates persistence to a
//! [`PollStore`]; one-vote-per-user is enforced by the store, not by a pre-check.

pub mod demographics;
pub mod domain;
pub mod repository;
pub mod results;
pub mod router;
pub mod service;
pub mod session;
pub mod validation;

#[cfg(test)]
mod tests;

pub use demographics::{
    AgeRange, DemographicField, DemographicRequirement, EmploymentStatus, Profile, ProfileUpdate,
    DEFAULT_REQUIRED_FIELDS,
};
pub use domain::{
    BallotRecord, NewPoll, Poll, PollCategory, PollFilter, PollId, PollOption, PollOptionId,
    PollStatus, PollType, PollUpdate, UserId, Vote, VoteId,
};
pub use repository::{
    PollRepository, PollStore, ProfileRepository, RepositoryError, VoteRepository,
};
pub use results::{percentage, OptionTally, PollResults};
pub use router::poll_router;
pub use service::{PollDetail, PollService, PollServiceError, ResultsView, VotingEligibility};
pub use session::{Identity, Role, Session};
pub use validation::ValidationError;
