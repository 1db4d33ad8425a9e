use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{CqConfig, RUNNING};
use crate::records::{Action, PatchAction, Record, VerifierAction};
use crate::timestamps::trace_micros;

pub const PATCH_PROGRESS: &str = "Patch Progress";
pub const PATCH_COMMITTING: &str = "Patch Committing";
pub const ABANDONED_COLOR: &str = "cq_build_abandoned";

/// Trace-Viewer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
    #[serde(rename = "I")]
    Instant,
}

/// Identity used to pair Begin and End events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuilderKey {
    pub category: String,
    pub name: String,
}

/// One entry of the Trace-Viewer event array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub name: String,
    #[serde(rename = "cat")]
    pub category: String,
    #[serde(rename = "ph")]
    pub phase: Phase,
    #[serde(rename = "ts")]
    pub timestamp_micros: i64,
    #[serde(rename = "pid")]
    pub process_id: String,
    #[serde(rename = "tid")]
    pub thread_id: String,
    #[serde(rename = "cname")]
    pub color_name: String,
    pub args: Map<String, Value>,
}

impl TimelineEvent {
    fn new(
        attempt_number: usize,
        category: &str,
        name: &str,
        phase: Phase,
        timestamp: DateTime<Utc>,
        color_name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            phase,
            timestamp_micros: trace_micros(timestamp),
            process_id: attempt_name(attempt_number),
            thread_id: category.to_string(),
            color_name: color_name.to_string(),
            args: Map::new(),
        }
    }

    #[must_use]
    pub fn with_phase(self, phase: Phase) -> Self {
        Self { phase, ..self }
    }

    #[must_use]
    pub fn with_color(self, color_name: &str) -> Self {
        Self {
            color_name: color_name.to_string(),
            ..self
        }
    }

    #[must_use]
    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn key(&self) -> BuilderKey {
        BuilderKey {
            category: self.category.clone(),
            name: self.name.clone(),
        }
    }

    pub fn build_url(&self) -> Option<&str> {
        self.args.get("build_url").and_then(Value::as_str)
    }
}

/// What a single record contributes to the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateEvent {
    Timeline(TimelineEvent),
    /// The End that closes the attempt itself
    AttemptEnd(TimelineEvent),
    /// Late build URL for an already open builder
    Meta { key: BuilderKey, build_url: String },
}

pub fn attempt_name(attempt_number: usize) -> String {
    format!("Attempt {attempt_number}")
}

fn state_color(state: &str) -> String {
    format!("cq_build_{state}")
}

/// Translates one record into candidate timeline events.
pub fn record_to_events(
    record: &Record,
    attempt_number: usize,
    config: &CqConfig,
) -> Vec<CandidateEvent> {
    match &record.action {
        Action::Verifier(VerifierAction::Trigger { trybots }) => trybots
            .iter()
            .flat_map(|(master, builders)| {
                builders.iter().map(move |builder| {
                    CandidateEvent::Timeline(TimelineEvent::new(
                        attempt_number,
                        master,
                        builder,
                        Phase::Begin,
                        record.timestamp,
                        &state_color(RUNNING),
                    ))
                })
            })
            .collect(),
        Action::Verifier(VerifierAction::JobsUpdate { jobs }) => {
            let mut events = Vec::new();
            for (cq_state, infos) in jobs {
                let Some(state) = config.canonical_state(cq_state) else {
                    warn!("Unknown CQ job state '{cq_state}' in timeline");
                    continue;
                };
                for info in infos {
                    let (Some(master), Some(builder)) = (&info.master, &info.builder) else {
                        warn!("Job info without master/builder: {info:?}");
                        continue;
                    };
                    let key = BuilderKey {
                        category: master.clone(),
                        name: builder.clone(),
                    };
                    if state == RUNNING {
                        if let Some(url) = &info.url {
                            events.push(CandidateEvent::Meta {
                                key,
                                build_url: url.clone(),
                            });
                        }
                        continue;
                    }
                    let Some(timestamp) = info
                        .timestamp
                        .as_deref()
                        .and_then(|raw| config.parse_job_timestamp(raw))
                    else {
                        warn!("Unparsable timestamp {:?} for {master}:{builder}", info.timestamp);
                        continue;
                    };
                    let mut event = TimelineEvent::new(
                        attempt_number,
                        master,
                        builder,
                        Phase::End,
                        timestamp,
                        &state_color(state),
                    )
                    .with_arg("job_state", state);
                    if let Some(url) = &info.url {
                        event = event.with_arg("build_url", url.as_str());
                    }
                    events.push(CandidateEvent::Timeline(event));
                }
            }
            events
        }
        Action::Patch(PatchAction::Start) => vec![CandidateEvent::Timeline(TimelineEvent::new(
            attempt_number,
            PATCH_PROGRESS,
            &attempt_name(attempt_number),
            Phase::Begin,
            record.timestamp,
            "cq_build_attempt_running",
        ))],
        Action::Patch(PatchAction::ReadyToCommit) => {
            vec![CandidateEvent::Timeline(TimelineEvent::new(
                attempt_number,
                PATCH_PROGRESS,
                PATCH_COMMITTING,
                Phase::Begin,
                record.timestamp,
                &state_color(RUNNING),
            ))]
        }
        Action::Patch(PatchAction::Committed) => {
            vec![CandidateEvent::Timeline(TimelineEvent::new(
                attempt_number,
                PATCH_PROGRESS,
                PATCH_COMMITTING,
                Phase::End,
                record.timestamp,
                "cq_build_passed",
            ))]
        }
        Action::Patch(PatchAction::Stop { message }) => {
            let committed = message
                .as_deref()
                .is_some_and(|m| m.contains("successfully committed"));
            let color = if committed {
                "cq_build_attempt_passed"
            } else {
                "cq_build_attempt_failed"
            };
            let mut event = TimelineEvent::new(
                attempt_number,
                PATCH_PROGRESS,
                &attempt_name(attempt_number),
                Phase::End,
                record.timestamp,
                color,
            );
            if let Some(message) = message {
                event = event.with_arg("message", message.as_str());
            }
            vec![CandidateEvent::AttemptEnd(event)]
        }
        _ => Vec::new(),
    }
}
