use super::common::*;
use chrono::Utc;

use crate::polls::demographics::DemographicRequirement;
use crate::polls::domain::{
    Poll, PollCategory, PollId, PollStatus, PollType, PollUpdate, UserId,
};
use crate::polls::validation::{
    validate_new_poll, validate_selection, validate_update, ValidationError,
};

fn stored_poll(poll_type: PollType, status: PollStatus) -> Poll {
    let now = Utc::now();
    Poll {
        id: PollId::new(),
        title: "Team offsite venue".to_string(),
        description: None,
        poll_type,
        category: PollCategory::Corporate,
        status,
        max_selections: None,
        required_demographics: DemographicRequirement::none(),
        created_by: UserId::new(),
        created_at: now,
        updated_at: now,
        closes_at: None,
    }
}

#[test]
fn title_length_is_bounded() {
    let mut input = new_poll(PollType::YesNo, &[]);
    input.title = "  ab  ".to_string();
    assert_eq!(validate_new_poll(&input), Err(ValidationError::InvalidTitle));

    input.title = "x".repeat(201);
    assert_eq!(validate_new_poll(&input), Err(ValidationError::InvalidTitle));

    input.title = "x".repeat(200);
    assert!(validate_new_poll(&input).is_ok());
}

#[test]
fn description_over_limit_is_rejected() {
    let mut input = new_poll(PollType::YesNo, &[]);
    input.description = Some("d".repeat(1001));
    assert_eq!(
        validate_new_poll(&input),
        Err(ValidationError::DescriptionTooLong)
    );
}

#[test]
fn max_selections_only_applies_to_multiple_choice() {
    let mut single = new_poll(PollType::SingleChoice, &["A", "B"]);
    single.max_selections = Some(1);
    assert_eq!(
        validate_new_poll(&single),
        Err(ValidationError::InvalidMaxSelections)
    );

    let mut multiple = new_poll(PollType::MultipleChoice, &["A", "B"]);
    multiple.max_selections = Some(0);
    assert_eq!(
        validate_new_poll(&multiple),
        Err(ValidationError::InvalidMaxSelections)
    );
}

#[test]
fn polls_cannot_be_created_closed() {
    let mut input = new_poll(PollType::YesNo, &[]);
    input.status = PollStatus::Closed;
    assert!(matches!(
        validate_new_poll(&input),
        Err(ValidationError::InvalidTransition {
            to: PollStatus::Closed,
            ..
        })
    ));
}

#[test]
fn update_checks_status_transition() {
    let poll = stored_poll(PollType::YesNo, PollStatus::Active);
    let reopen_draft = PollUpdate {
        status: Some(PollStatus::Draft),
        ..PollUpdate::default()
    };
    assert_eq!(
        validate_update(&poll, &reopen_draft),
        Err(ValidationError::InvalidTransition {
            from: PollStatus::Active,
            to: PollStatus::Draft,
        })
    );

    let same = PollUpdate {
        status: Some(PollStatus::Active),
        ..PollUpdate::default()
    };
    assert!(validate_update(&poll, &same).is_ok());
}

#[test]
fn selection_rejects_duplicates_before_counting() {
    let mut poll = stored_poll(PollType::MultipleChoice, PollStatus::Active);
    poll.max_selections = Some(1);
    let options = vec![option(poll.id, "A"), option(poll.id, "B")];

    assert_eq!(
        validate_selection(&poll, &options, &[options[0].id, options[0].id]),
        Err(ValidationError::DuplicateOption(options[0].id))
    );
    assert_eq!(
        validate_selection(&poll, &options, &[options[0].id, options[1].id]),
        Err(ValidationError::TooManySelections {
            max: 1,
            selected: 2,
        })
    );
    assert!(validate_selection(&poll, &options, &[options[1].id]).is_ok());
}

#[test]
fn selection_requires_active_poll() {
    let poll = stored_poll(PollType::YesNo, PollStatus::Draft);
    let options = vec![option(poll.id, "Yes"), option(poll.id, "No")];

    assert_eq!(
        validate_selection(&poll, &options, &[options[0].id]),
        Err(ValidationError::PollNotActive(PollStatus::Draft))
    );
}

#[test]
fn missing_demographics_message_lists_labels() {
    use crate::polls::demographics::DemographicField;

    let err = ValidationError::MissingDemographics(vec![
        DemographicField::AgeRange,
        DemographicField::EmploymentStatus,
    ]);
    assert_eq!(
        err.to_string(),
        "profile is missing required fields: age_range, employment_status"
    );
}
