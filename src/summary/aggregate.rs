use std::collections::HashSet;

use indexmap::IndexMap;

use crate::config::{CqConfig, FAILED, PASSED};
use crate::insights::{Attempt, Durations, Job, PatchSummary};

/// Combines attempt summaries, given most recent first, into the patchset
/// summary.
pub fn summarize_patch(attempts: Vec<Attempt>, config: &CqConfig) -> PatchSummary {
    let job_counts: IndexMap<String, usize> = config
        .canonical_states()
        .into_iter()
        .map(|state| {
            let count = attempts.iter().map(|a| a.jobs_in(state).len()).sum();
            (state.to_string(), count)
        })
        .collect();

    PatchSummary {
        success: attempts.iter().any(|a| a.success == Some(true)),
        begin: attempts.iter().map(|a| a.begin).min(),
        end: attempts.iter().filter_map(|a| a.end).max(),
        durations: Durations::sum(attempts.iter().map(|a| &a.durations)),
        job_counts,
        flaky_jobs: find_flaky_jobs(&attempts),
        attempt_count: attempts.len(),
        attempt_fail_count: attempts.iter().filter(|a| a.success == Some(false)).count(),
        attempts,
    }
}

/// Failed jobs whose builder passed in some attempt of the same patchset.
///
/// One entry per failing occurrence; repeats across attempts are kept.
fn find_flaky_jobs(attempts: &[Attempt]) -> Vec<Job> {
    let passed: HashSet<(&str, &str)> = attempts
        .iter()
        .flat_map(|a| a.jobs_in(PASSED))
        .map(Job::builder_id)
        .collect();

    attempts
        .iter()
        .flat_map(|a| a.jobs_in(FAILED))
        .filter(|job| passed.contains(&job.builder_id()))
        .cloned()
        .collect()
}
