use super::demographics::DemographicField;
use super::domain::{
    NewPoll, Poll, PollOption, PollOptionId, PollStatus, PollType, PollUpdate, YES_NO_OPTIONS,
};

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const MIN_OPTIONS: usize = 2;

/// Checks performed before any write; a failure never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("select at least one option")]
    EmptySelection,
    #[error("{poll_type} polls take exactly one option, {selected} selected")]
    SingleSelectionRequired { poll_type: PollType, selected: usize },
    #[error("select at most {max} options, {selected} selected")]
    TooManySelections { max: u32, selected: usize },
    #[error("option {0} was selected more than once")]
    DuplicateOption(PollOptionId),
    #[error("option {0} does not belong to this poll")]
    UnknownOption(PollOptionId),
    #[error("poll is {0}, only active polls accept votes")]
    PollNotActive(PollStatus),
    #[error("profile is missing required fields: {}", field_list(.0))]
    MissingDemographics(Vec<DemographicField>),
    #[error("at least 2 non-blank options are required, {provided} provided")]
    TooFewOptions { provided: usize },
    #[error("title must be between 3 and 200 characters")]
    InvalidTitle,
    #[error("description must be at most 1000 characters")]
    DescriptionTooLong,
    #[error("max_selections must be at least 1 and only applies to multiple_choice polls")]
    InvalidMaxSelections,
    #[error("cannot move a poll from {from} to {to}")]
    InvalidTransition { from: PollStatus, to: PollStatus },
}

fn field_list(fields: &[DemographicField]) -> String {
    fields
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a creation request and return the option texts to store, in order.
///
/// Yes/no polls always get the two generated options; caller-supplied texts are ignored.
pub fn validate_new_poll(input: &NewPoll) -> Result<Vec<String>, ValidationError> {
    validate_title(&input.title)?;
    validate_description(input.description.as_deref())?;
    validate_max_selections(input.poll_type, input.max_selections)?;

    if !matches!(input.status, PollStatus::Draft | PollStatus::Active) {
        return Err(ValidationError::InvalidTransition {
            from: PollStatus::Draft,
            to: input.status,
        });
    }

    if input.poll_type == PollType::YesNo {
        return Ok(YES_NO_OPTIONS.iter().map(|text| text.to_string()).collect());
    }

    let options: Vec<String> = input
        .options
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();

    if options.len() < MIN_OPTIONS {
        return Err(ValidationError::TooFewOptions {
            provided: options.len(),
        });
    }

    Ok(options)
}

/// Validate an admin patch against the poll it will be applied to.
pub fn validate_update(poll: &Poll, update: &PollUpdate) -> Result<(), ValidationError> {
    if let Some(title) = &update.title {
        validate_title(title)?;
    }
    if let Some(description) = &update.description {
        validate_description(description.as_deref())?;
    }
    if let Some(max_selections) = update.max_selections {
        validate_max_selections(poll.poll_type, max_selections)?;
    }
    if let Some(next) = update.status {
        if !poll.status.can_transition_to(next) {
            return Err(ValidationError::InvalidTransition {
                from: poll.status,
                to: next,
            });
        }
    }
    Ok(())
}

/// Validate a ballot for `poll` whose stored options are `options`.
pub fn validate_selection(
    poll: &Poll,
    options: &[PollOption],
    option_ids: &[PollOptionId],
) -> Result<(), ValidationError> {
    if poll.status != PollStatus::Active {
        return Err(ValidationError::PollNotActive(poll.status));
    }
    if option_ids.is_empty() {
        return Err(ValidationError::EmptySelection);
    }

    for (index, id) in option_ids.iter().enumerate() {
        if option_ids[..index].contains(id) {
            return Err(ValidationError::DuplicateOption(*id));
        }
        if !options.iter().any(|option| option.id == *id) {
            return Err(ValidationError::UnknownOption(*id));
        }
    }

    if poll.poll_type.is_single_selection() && option_ids.len() != 1 {
        return Err(ValidationError::SingleSelectionRequired {
            poll_type: poll.poll_type,
            selected: option_ids.len(),
        });
    }

    if let Some(max) = poll.max_selections {
        if poll.poll_type == PollType::MultipleChoice && option_ids.len() > max as usize {
            return Err(ValidationError::TooManySelections {
                max,
                selected: option_ids.len(),
            });
        }
    }

    Ok(())
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let chars = title.trim().chars().count();
    if (TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTitle)
    }
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(text) if text.chars().count() > DESCRIPTION_MAX_CHARS => {
            Err(ValidationError::DescriptionTooLong)
        }
        _ => Ok(()),
    }
}

fn validate_max_selections(
    poll_type: PollType,
    max_selections: Option<u32>,
) -> Result<(), ValidationError> {
    match max_selections {
        Some(0) => Err(ValidationError::InvalidMaxSelections),
        Some(_) if poll_type != PollType::MultipleChoice => {
            Err(ValidationError::InvalidMaxSelections)
        }
        _ => Ok(()),
    }
}
