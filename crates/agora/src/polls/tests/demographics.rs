use chrono::Utc;
use serde_json::json;

use crate::polls::demographics::{
    AgeRange, DemographicField, DemographicRequirement, EmploymentStatus, Profile, ProfileUpdate,
    DEFAULT_REQUIRED_FIELDS,
};
use crate::polls::domain::UserId;

#[test]
fn boolean_requirement_expands_to_default_fields() {
    let required: DemographicRequirement = serde_json::from_value(json!(true)).expect("flag");
    assert_eq!(required.fields(), DEFAULT_REQUIRED_FIELDS.as_slice());

    let none: DemographicRequirement = serde_json::from_value(json!(false)).expect("flag");
    assert!(none.is_empty());
}

#[test]
fn requirement_list_is_deduplicated_and_serialized_as_list() {
    let required: DemographicRequirement =
        serde_json::from_value(json!(["location", "age_range", "location"])).expect("list");
    assert_eq!(
        required.fields(),
        [DemographicField::Location, DemographicField::AgeRange]
    );
    assert_eq!(
        serde_json::to_value(&required).expect("serialize"),
        json!(["location", "age_range"])
    );
}

#[test]
fn unknown_requirement_label_is_rejected() {
    let parsed = serde_json::from_value::<DemographicRequirement>(json!(["shoe_size"]));
    assert!(parsed.is_err());
}

#[test]
fn missing_profile_satisfies_nothing() {
    let required = DemographicRequirement::defaults();
    assert_eq!(required.missing_from(None), DEFAULT_REQUIRED_FIELDS.to_vec());
}

#[test]
fn blank_text_counts_as_missing() {
    let mut profile = Profile::empty(UserId::new(), Utc::now());
    profile.location = Some("   ".to_string());
    profile.employment_status = Some(EmploymentStatus::Student);

    let required = DemographicRequirement::from_fields([
        DemographicField::Location,
        DemographicField::EmploymentStatus,
        DemographicField::JobTitle,
    ]);
    assert_eq!(
        required.missing_from(Some(&profile)),
        vec![DemographicField::Location, DemographicField::JobTitle]
    );
}

#[test]
fn profile_update_overwrites_present_fields_only() {
    let created = Utc::now();
    let mut profile = Profile::empty(UserId::new(), created);
    profile.job_title = Some("Analyst".to_string());

    ProfileUpdate {
        age_range: Some(Some(AgeRange::Over65)),
        location: Some("  Porto ".to_string()),
        occupation_category: Some("".to_string()),
        ..ProfileUpdate::default()
    }
    .apply(&mut profile, Utc::now());

    assert_eq!(profile.age_range, Some(AgeRange::Over65));
    assert_eq!(profile.location.as_deref(), Some("Porto"));
    assert_eq!(profile.job_title.as_deref(), Some("Analyst"));
    assert_eq!(profile.occupation_category, None);
    assert_eq!(profile.created_at, created);
    assert!(profile.updated_at >= created);
}

#[test]
fn null_clears_enum_attributes_while_absent_keeps_them() {
    let mut profile = Profile::empty(UserId::new(), Utc::now());
    profile.age_range = Some(AgeRange::From36To45);
    profile.employment_status = Some(EmploymentStatus::Student);

    let untouched: ProfileUpdate =
        serde_json::from_value(json!({ "location": "Braga" })).expect("patch parses");
    assert_eq!(untouched.age_range, None);
    untouched.apply(&mut profile, Utc::now());
    assert_eq!(profile.age_range, Some(AgeRange::From36To45));
    assert_eq!(profile.employment_status, Some(EmploymentStatus::Student));

    let clearing: ProfileUpdate =
        serde_json::from_value(json!({ "age_range": null, "employment_status": null }))
            .expect("patch parses");
    assert_eq!(clearing.age_range, Some(None));
    clearing.apply(&mut profile, Utc::now());
    assert_eq!(profile.age_range, None);
    assert_eq!(profile.employment_status, None);
    assert_eq!(profile.location.as_deref(), Some("Braga"));
}

#[test]
fn age_range_labels_match_wire_format() {
    assert_eq!(
        serde_json::to_value(AgeRange::From18To26).expect("serialize"),
        json!("18-26")
    );
    assert_eq!("65+".parse::<AgeRange>(), Ok(AgeRange::Over65));
    assert!("17-20".parse::<AgeRange>().is_err());
}
