mod assemble;
mod events;

use log::info;

use crate::config::CqConfig;
use crate::records::RecordStream;

pub use assemble::{attempts_to_events, records_to_events, split_timeline_attempts};
pub use events::{
    attempt_name, record_to_events, BuilderKey, CandidateEvent, Phase, TimelineEvent,
    ABANDONED_COLOR, PATCH_COMMITTING, PATCH_PROGRESS,
};

/// Builds the Trace-Viewer event list for one patchset.
pub fn build_timeline(stream: &RecordStream, config: &CqConfig) -> Vec<TimelineEvent> {
    let events = records_to_events(stream.records(), config);
    info!("Built {} timeline events from {} records", events.len(), stream.len());
    events
}
