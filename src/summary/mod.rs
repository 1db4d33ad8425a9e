mod aggregate;
mod attempt;
mod job_tracker;
mod segmenter;

use chrono::{DateTime, Utc};
use log::info;

use crate::config::CqConfig;
use crate::insights::PatchSummary;
use crate::records::RecordStream;

pub use aggregate::summarize_patch;
pub use attempt::summarize_attempt;
pub use job_tracker::JobTracker;
pub use segmenter::split_attempts;

/// Reconstructs every attempt in `stream` and summarizes the patchset.
///
/// Attempts are reported most recent first. `now` closes attempts that are
/// still in flight.
pub fn summarize_records(stream: &RecordStream, config: &CqConfig, now: DateTime<Utc>) -> PatchSummary {
    let raw_attempts = split_attempts(stream.records(), config);
    info!(
        "Found {} attempts in {} records",
        raw_attempts.len(),
        stream.len()
    );

    let attempts = raw_attempts
        .into_iter()
        .rev()
        .filter_map(|records| summarize_attempt(records, config, now))
        .collect();

    summarize_patch(attempts, config)
}
