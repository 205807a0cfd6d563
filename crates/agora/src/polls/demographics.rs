//! Profile demographics and the pre-vote completeness gate.
//!
//! A poll declares which profile attributes a voter must have filled in. Before a vote is
//! accepted the voter's stored profile is compared against that declaration and any missing
//! attributes are reported back so the caller can collect exactly those fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{double_option, labelled_enum, UnknownLabel, UserId};

labelled_enum!(
    /// Profile attributes a poll may require before voting.
    DemographicField, "demographic field" {
        AgeRange => "age_range",
        Location => "location",
        JobTitle => "job_title",
        OccupationCategory => "occupation_category",
        EmploymentStatus => "employment_status",
    }
);

labelled_enum!(
    AgeRange, "age range" {
        From18To26 => "18-26",
        From27To35 => "27-35",
        From36To45 => "36-45",
        From46To55 => "46-55",
        From56To65 => "56-65",
        Over65 => "65+",
    }
);

labelled_enum!(
    EmploymentStatus, "employment status" {
        Employed => "employed",
        SelfEmployed => "self_employed",
        Unemployed => "unemployed",
        Student => "student",
        Retired => "retired",
        Other => "other",
    }
);

/// Fields implied when a poll only carries an all-or-nothing `true` flag.
pub const DEFAULT_REQUIRED_FIELDS: [DemographicField; 3] = [
    DemographicField::AgeRange,
    DemographicField::Location,
    DemographicField::EmploymentStatus,
];

/// Ordered, duplicate-free set of fields a poll requires.
///
/// Always serialized as a list. On input a boolean is also accepted: `true` expands to
/// [`DEFAULT_REQUIRED_FIELDS`], `false` to no requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RequirementInput", into = "Vec<DemographicField>")]
pub struct DemographicRequirement(Vec<DemographicField>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RequirementInput {
    Flag(bool),
    Fields(Vec<DemographicField>),
}

impl From<RequirementInput> for DemographicRequirement {
    fn from(value: RequirementInput) -> Self {
        match value {
            RequirementInput::Flag(true) => Self::defaults(),
            RequirementInput::Flag(false) => Self::none(),
            RequirementInput::Fields(fields) => Self::from_fields(fields),
        }
    }
}

impl From<DemographicRequirement> for Vec<DemographicField> {
    fn from(value: DemographicRequirement) -> Self {
        value.0
    }
}

impl DemographicRequirement {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn defaults() -> Self {
        Self(DEFAULT_REQUIRED_FIELDS.to_vec())
    }

    pub fn from_fields(fields: impl IntoIterator<Item = DemographicField>) -> Self {
        let mut ordered = Vec::new();
        for field in fields {
            if !ordered.contains(&field) {
                ordered.push(field);
            }
        }
        Self(ordered)
    }

    pub fn fields(&self) -> &[DemographicField] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required fields the profile does not satisfy, in declaration order. A missing profile
    /// satisfies nothing.
    pub fn missing_from(&self, profile: Option<&Profile>) -> Vec<DemographicField> {
        self.0
            .iter()
            .copied()
            .filter(|field| !profile.is_some_and(|profile| profile.has(*field)))
            .collect()
    }
}

/// Demographic profile, one per user, created on first update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub full_name: Option<String>,
    pub age_range: Option<AgeRange>,
    pub location: Option<String>,
    pub job_title: Option<String>,
    pub occupation_category: Option<String>,
    pub employment_status: Option<EmploymentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn empty(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            full_name: None,
            age_range: None,
            location: None,
            job_title: None,
            occupation_category: None,
            employment_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the attribute behind `field` holds a non-blank value.
    pub fn has(&self, field: DemographicField) -> bool {
        match field {
            DemographicField::AgeRange => self.age_range.is_some(),
            DemographicField::EmploymentStatus => self.employment_status.is_some(),
            DemographicField::Location => filled(&self.location),
            DemographicField::JobTitle => filled(&self.job_title),
            DemographicField::OccupationCategory => filled(&self.occupation_category),
        }
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|text| !text.trim().is_empty())
}

/// Owner-supplied profile patch. Present fields overwrite; blank text or `null` clears the
/// attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub age_range: Option<Option<AgeRange>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub occupation_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub employment_status: Option<Option<EmploymentStatus>>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut Profile, now: DateTime<Utc>) {
        if let Some(value) = self.full_name {
            profile.full_name = normalize(value);
        }
        if let Some(value) = self.age_range {
            profile.age_range = value;
        }
        if let Some(value) = self.location {
            profile.location = normalize(value);
        }
        if let Some(value) = self.job_title {
            profile.job_title = normalize(value);
        }
        if let Some(value) = self.occupation_category {
            profile.occupation_category = normalize(value);
        }
        if let Some(value) = self.employment_status {
            profile.employment_status = value;
        }
        profile.updated_at = now;
    }
}

fn normalize(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
