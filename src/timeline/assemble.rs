use std::collections::{HashMap, HashSet};

use log::debug;

use super::events::{
    record_to_events, BuilderKey, CandidateEvent, Phase, TimelineEvent, ABANDONED_COLOR,
    PATCH_PROGRESS,
};
use crate::config::CqConfig;
use crate::records::{PatchAction, Record};

/// Groups records into attempts on `patch_start` / `patch_stop` actions.
///
/// Only the first start of a run opens an attempt; records outside attempts
/// are not part of the timeline.
pub fn split_timeline_attempts(records: &[Record]) -> Vec<&[Record]> {
    let mut attempts = Vec::new();
    let mut open_at: Option<usize> = None;

    for (index, record) in records.iter().enumerate() {
        match record.patch_action() {
            Some(PatchAction::Start) if open_at.is_none() => open_at = Some(index),
            Some(PatchAction::Stop { .. }) => {
                if let Some(start) = open_at.take() {
                    attempts.push(&records[start..=index]);
                }
            }
            _ => {}
        }
    }

    if let Some(start) = open_at {
        attempts.push(&records[start..]);
    }

    attempts
}

/// Flattens attempts into a chronological Trace-Viewer event list.
///
/// Begin/End pairs are matched per attempt on their builder key. Build URLs
/// already reported as finished anywhere in the patchset are not reported
/// again.
pub fn attempts_to_events(attempts: &[&[Record]], config: &CqConfig) -> Vec<TimelineEvent> {
    let mut events: Vec<TimelineEvent> = Vec::new();
    let mut completed_build_urls: HashSet<String> = HashSet::new();

    for (index, attempt) in attempts.iter().enumerate() {
        let attempt_number = index + 1;
        // Builder key -> index of its open Begin in `events`
        let mut open_builds: HashMap<BuilderKey, usize> = HashMap::new();

        for record in *attempt {
            for candidate in record_to_events(record, attempt_number, config) {
                match candidate {
                    CandidateEvent::Meta { key, build_url } => {
                        if let Some(&open) = open_builds.get(&key) {
                            events[open]
                                .args
                                .insert("build_url".to_string(), build_url.into());
                        }
                    }
                    CandidateEvent::Timeline(event) if event.phase == Phase::Begin => {
                        let key = event.key();
                        if event.category == PATCH_PROGRESS && open_builds.contains_key(&key) {
                            debug!("Suppressing duplicate Begin for {}", event.name);
                            continue;
                        }
                        open_builds.insert(key, events.len());
                        events.push(event);
                    }
                    CandidateEvent::Timeline(event) => {
                        close_event(event, false, &mut open_builds, &mut completed_build_urls, &mut events);
                    }
                    CandidateEvent::AttemptEnd(event) => {
                        close_event(event, true, &mut open_builds, &mut completed_build_urls, &mut events);
                    }
                }
            }
        }
    }

    events
}

fn close_event(
    event: TimelineEvent,
    ends_attempt: bool,
    open_builds: &mut HashMap<BuilderKey, usize>,
    completed_build_urls: &mut HashSet<String>,
    events: &mut Vec<TimelineEvent>,
) {
    let event = if open_builds.remove(&event.key()).is_some() {
        event
    } else {
        event.with_phase(Phase::Instant)
    };

    let Some(build_url) = event.build_url().map(str::to_string) else {
        if ends_attempt {
            abandon_open_builds(&event, open_builds, events);
        }
        events.push(event);
        return;
    };

    if completed_build_urls.insert(build_url) {
        events.push(event);
    } else {
        debug!("Dropping repeated completion of {}", event.name);
    }
}

/// Closes every build still open when the attempt stops.
fn abandon_open_builds(
    stop: &TimelineEvent,
    open_builds: &mut HashMap<BuilderKey, usize>,
    events: &mut Vec<TimelineEvent>,
) {
    let mut open: Vec<usize> = open_builds.drain().map(|(_, index)| index).collect();
    open.sort_unstable();

    for index in open {
        let begin = &events[index];
        let abandoned = TimelineEvent {
            phase: Phase::End,
            timestamp_micros: stop.timestamp_micros,
            ..begin.clone()
        }
        .with_color(ABANDONED_COLOR)
        .with_arg("job_state", "abandoned");
        events.push(abandoned);
    }
}

/// Builds the timeline for an ordered record list.
pub fn records_to_events(records: &[Record], config: &CqConfig) -> Vec<TimelineEvent> {
    let attempts = split_timeline_attempts(records);
    debug!("Timeline covers {} attempts", attempts.len());
    attempts_to_events(&attempts, config)
}
