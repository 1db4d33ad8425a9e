//! Record builders shared by unit tests.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::records::{Action, JobInfo, PatchAction, Record, VerifierAction};

pub const TRY_JOB: &str = "try job";

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

/// Formats an instant the way job infos carry it.
pub fn rietveld(seconds: i64) -> String {
    at(seconds).format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub fn record(timestamp: DateTime<Utc>, verifier: Option<&str>, action: Option<Action>) -> Record {
    Record {
        timestamp,
        tags: Default::default(),
        verifier: verifier.map(str::to_string),
        action: action.unwrap_or(Action::Missing),
    }
}

pub fn patch(seconds: i64, action: PatchAction) -> Record {
    let mut r = record(at(seconds), None, Some(Action::Patch(action.clone())));
    match action {
        PatchAction::Start => {
            r.tags.insert("action=patch_start".to_string());
        }
        PatchAction::Stop { .. } => {
            r.tags.insert("action=patch_stop".to_string());
        }
        _ => {}
    }
    r
}

pub fn verifier(seconds: i64, action: VerifierAction) -> Record {
    record(at(seconds), Some(TRY_JOB), Some(Action::Verifier(action)))
}

pub fn job_info(
    master: &str,
    builder: &str,
    build_number: i64,
    seconds: i64,
    url: Option<&str>,
) -> JobInfo {
    JobInfo {
        master: Some(master.to_string()),
        builder: Some(builder.to_string()),
        build_number: Some(build_number),
        slave: Some(format!("{builder}-slave")),
        url: url.map(str::to_string),
        timestamp: Some(rietveld(seconds)),
    }
}

pub fn jobs_update(seconds: i64, entries: Vec<(&str, Vec<JobInfo>)>) -> Record {
    let jobs: IndexMap<String, Vec<JobInfo>> = entries
        .into_iter()
        .map(|(state, infos)| (state.to_string(), infos))
        .collect();
    verifier(seconds, VerifierAction::JobsUpdate { jobs })
}

pub fn trigger(seconds: i64, trybots: &[(&str, &[&str])]) -> Record {
    let trybots = trybots
        .iter()
        .map(|(master, builders)| {
            (
                (*master).to_string(),
                builders.iter().map(|b| (*b).to_string()).collect(),
            )
        })
        .collect();
    verifier(seconds, VerifierAction::Trigger { trybots })
}
