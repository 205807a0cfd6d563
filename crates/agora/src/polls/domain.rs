use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::demographics::DemographicRequirement;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

uuid_id!(
    /// Identifier wrapper for polls.
    PollId
);
uuid_id!(PollOptionId);
uuid_id!(VoteId);
uuid_id!(VoteAnswerId);
uuid_id!(
    /// Identity issued by the external auth provider.
    UserId
);

/// Raised when a stored or submitted label does not belong to a closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok($name::$variant),)+
                    other => Err(UnknownLabel {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

pub(crate) use labelled_enum;

labelled_enum!(
    /// How many options a single vote may select.
    PollType, "poll type" {
        SingleChoice => "single_choice",
        MultipleChoice => "multiple_choice",
        YesNo => "yes_no",
    }
);

labelled_enum!(
    PollCategory, "poll category" {
        Educational => "educational",
        Political => "political",
        MarketResearch => "market_research",
        Social => "social",
        Economical => "economical",
        Corporate => "corporate",
    }
);

labelled_enum!(
    /// Lifecycle status. Only `active` polls accept votes.
    PollStatus, "poll status" {
        Draft => "draft",
        Active => "active",
        Closed => "closed",
    }
);

impl PollType {
    /// Single choice and yes/no polls take exactly one option per vote.
    pub const fn is_single_selection(self) -> bool {
        matches!(self, PollType::SingleChoice | PollType::YesNo)
    }
}

impl PollStatus {
    /// Whether an admin may move a poll from `self` to `next`. Re-applying the current
    /// status is accepted as a no-op.
    pub fn can_transition_to(self, next: PollStatus) -> bool {
        matches!(
            (self, next),
            (PollStatus::Draft, PollStatus::Active) | (PollStatus::Active, PollStatus::Closed)
        ) || self == next
    }
}

/// Option labels generated for every yes/no poll, in display order.
pub const YES_NO_OPTIONS: [&str; 2] = ["Yes", "No"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub description: Option<String>,
    pub poll_type: PollType,
    pub category: PollCategory,
    pub status: PollStatus,
    pub max_selections: Option<u32>,
    pub required_demographics: DemographicRequirement,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closes_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: PollOptionId,
    pub poll_id: PollId,
    pub option_text: String,
    pub created_at: DateTime<Utc>,
}

/// One user's single act of voting on one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub poll_id: PollId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// One selected option within a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAnswer {
    pub id: VoteAnswerId,
    pub vote_id: VoteId,
    pub option_id: PollOptionId,
    pub created_at: DateTime<Utc>,
}

/// A stored vote together with the options it selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub vote: Vote,
    pub option_ids: Vec<PollOptionId>,
}

/// Admin request to create a poll. For yes/no polls `options` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPoll {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub poll_type: PollType,
    pub category: PollCategory,
    #[serde(default = "default_status")]
    pub status: PollStatus,
    #[serde(default)]
    pub max_selections: Option<u32>,
    #[serde(default)]
    pub required_demographics: DemographicRequirement,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_status() -> PollStatus {
    PollStatus::Draft
}

/// Fully validated poll row plus option texts, ready for a single atomic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDraft {
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

/// Patch applied by admins. Absent fields are left unchanged; `Some(None)` clears a
/// nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub category: Option<PollCategory>,
    #[serde(default)]
    pub status: Option<PollStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub max_selections: Option<Option<u32>>,
    #[serde(default)]
    pub required_demographics: Option<DemographicRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub closes_at: Option<Option<DateTime<Utc>>>,
}

/// Equality filters for poll listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollFilter {
    #[serde(default)]
    pub status: Option<PollStatus>,
    #[serde(default)]
    pub category: Option<PollCategory>,
}

impl PollFilter {
    pub fn matches(&self, poll: &Poll) -> bool {
        self.status.map_or(true, |status| poll.status == status)
            && self.category.map_or(true, |category| poll.category == category)
    }
}

/// Distinguishes `"field": null` from a missing field in JSON patches.
pub(crate) mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
