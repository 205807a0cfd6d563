use agora::error::AppError;
use agora::polls::{
    AgeRange, DemographicField, DemographicRequirement, EmploymentStatus, Identity, NewPoll,
    PollCategory, PollDetail, PollService, PollServiceError, PollStatus, PollType, ProfileUpdate,
    ResultsView, Session, UserId,
};
use agora::store::MemoryStore;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the final results payload as JSON.
    #[arg(long)]
    pub(crate) json: bool,
    /// Also print the results CSV export.
    #[arg(long)]
    pub(crate) csv: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = PollService::new(Arc::new(MemoryStore::new()));
    let admin = Identity::from(Session::admin(UserId::new()));
    let voter = Identity::from(Session::user(UserId::new()));

    println!("Agora polling demo (in-memory store)");

    let detail = match service.create_poll(&admin, demo_poll()).await {
        Ok(detail) => detail,
        Err(err) => {
            println!("  Poll rejected: {}", err);
            return Ok(());
        }
    };
    render_poll(&detail);

    match service.eligibility(&voter, detail.poll.id).await {
        Ok(eligibility) if !eligibility.missing_demographics.is_empty() => {
            println!(
                "- Voter must complete: {}",
                field_labels(&eligibility.missing_demographics)
            );
        }
        Ok(_) => println!("- Voter is already eligible"),
        Err(err) => {
            println!("  Eligibility check unavailable: {}", err);
            return Ok(());
        }
    }

    let profile = ProfileUpdate {
        age_range: Some(Some(AgeRange::From27To35)),
        location: Some("Lisbon".to_string()),
        employment_status: Some(Some(EmploymentStatus::Employed)),
        ..ProfileUpdate::default()
    };
    if let Err(err) = service.update_profile(&voter, profile).await {
        println!("  Profile update failed: {}", err);
        return Ok(());
    }
    println!("- Voter profile completed");

    let selection: Vec<_> = detail.options.iter().take(2).map(|option| option.id).collect();
    match service
        .submit_vote(&voter, detail.poll.id, selection.clone())
        .await
    {
        Ok(vote) => println!("- Recorded vote {} with {} selections", vote.id, selection.len()),
        Err(err) => {
            println!("  Vote rejected: {}", err);
            return Ok(());
        }
    }

    match service
        .submit_vote(&voter, detail.poll.id, selection[..1].to_vec())
        .await
    {
        Err(PollServiceError::AlreadyVoted) => {
            println!("- Second vote from the same voter rejected: already voted")
        }
        Err(err) => println!("  Second vote failed unexpectedly: {}", err),
        Ok(_) => println!("  Second vote was accepted; one-vote rule not enforced"),
    }

    let view = match service.results_view(&voter, detail.poll.id).await {
        Ok(view) => view,
        Err(err) => {
            println!("  Results unavailable: {}", err);
            return Ok(());
        }
    };
    render_results(&view);

    if args.json {
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("  Results payload:\n{}", json),
            Err(err) => println!("  Results payload unavailable: {}", err),
        }
    }

    if args.csv {
        match service.results_csv(&voter, detail.poll.id).await {
            Ok(bytes) => println!("  Results CSV:\n{}", String::from_utf8_lossy(&bytes)),
            Err(err) => println!("  Results CSV unavailable: {}", err),
        }
    }

    Ok(())
}

fn demo_poll() -> NewPoll {
    NewPoll {
        title: "Which team rituals should we keep?".to_string(),
        description: Some("Pick up to two rituals for next quarter.".to_string()),
        poll_type: PollType::MultipleChoice,
        category: PollCategory::Corporate,
        status: PollStatus::Active,
        max_selections: Some(2),
        required_demographics: DemographicRequirement::from_fields([
            DemographicField::AgeRange,
            DemographicField::Location,
        ]),
        closes_at: None,
        options: vec![
            "Friday demos".to_string(),
            "Monday planning".to_string(),
            "Monthly retro".to_string(),
        ],
    }
}

fn render_poll(detail: &PollDetail) {
    println!(
        "- Created poll '{}' [{} | {} | {}]",
        detail.poll.title, detail.poll.poll_type, detail.poll.category, detail.poll.status
    );
    if let Some(max) = detail.poll.max_selections {
        println!("  Up to {} selections per vote", max);
    }
    if !detail.poll.required_demographics.is_empty() {
        println!(
            "  Requires: {}",
            field_labels(detail.poll.required_demographics.fields())
        );
    }
    for (index, option) in detail.options.iter().enumerate() {
        println!("  {}. {}", index + 1, option.option_text);
    }
}

fn render_results(view: &ResultsView) {
    println!(
        "\nResults for '{}' ({}) - {} total votes",
        view.title, view.status, view.total_votes
    );
    for line in &view.options {
        println!(
            "  - {}: {} votes ({}%)",
            line.option_text, line.votes, line.percentage
        );
    }
}

fn field_labels(fields: &[DemographicField]) -> String {
    fields
        .iter()
        .map(|field| field.label())
        .collect::<Vec<_>>()
        .join(", ")
}
