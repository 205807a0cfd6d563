use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};

use super::domain::{PollId, PollOption, PollOptionId};

/// On-demand tally for a poll. A multiple choice vote contributes to several options, so the
/// option counts are not a partition of `total_votes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResults {
    pub poll_id: PollId,
    pub total_votes: u64,
    pub option_counts: BTreeMap<PollOptionId, u64>,
}

/// Per-option line of a results view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option_id: PollOptionId,
    pub option_text: String,
    pub votes: u64,
    pub percentage: u32,
}

impl PollResults {
    pub fn empty(poll_id: PollId) -> Self {
        Self {
            poll_id,
            total_votes: 0,
            option_counts: BTreeMap::new(),
        }
    }

    pub fn count_for(&self, option_id: &PollOptionId) -> u64 {
        self.option_counts.get(option_id).copied().unwrap_or(0)
    }

    /// Share of all votes that selected `option_id`, rounded half up.
    pub fn percentage_for(&self, option_id: &PollOptionId) -> u32 {
        percentage(self.count_for(option_id), self.total_votes)
    }

    /// One line per option in option order, options without votes included.
    pub fn tally(&self, options: &[PollOption]) -> Vec<OptionTally> {
        options
            .iter()
            .map(|option| OptionTally {
                option_id: option.id,
                option_text: option.option_text.clone(),
                votes: self.count_for(&option.id),
                percentage: self.percentage_for(&option.id),
            })
            .collect()
    }

    /// Write the tally as CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, options: &[PollOption], writer: W) -> csv::Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["option_id", "option_text", "votes", "percentage"])?;
        for line in self.tally(options) {
            csv.write_record([
                line.option_id.to_string(),
                line.option_text,
                line.votes.to_string(),
                line.percentage.to_string(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// `round(100 * count / total)` in integer arithmetic; zero when nobody voted.
pub fn percentage(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = (200 * u128::from(count) + u128::from(total)) / (2 * u128::from(total));
    u32::try_from(scaled).unwrap_or(u32::MAX)
}
