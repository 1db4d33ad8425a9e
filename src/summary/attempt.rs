use chrono::{DateTime, Utc};
use log::debug;

use super::job_tracker::JobTracker;
use crate::config::CqConfig;
use crate::insights::{Attempt, DurationBucket, Durations};
use crate::records::{PatchAction, Record, VerifierAction};

/// Patch lifecycle states that matter for duration accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchState {
    Throttled,
    TreeClosed,
    Committing,
    Committed,
    Other,
}

impl From<&PatchAction> for PatchState {
    fn from(action: &PatchAction) -> Self {
        match action {
            PatchAction::Throttled => Self::Throttled,
            PatchAction::TreeClosed => Self::TreeClosed,
            PatchAction::Committing => Self::Committing,
            PatchAction::Committed => Self::Committed,
            _ => Self::Other,
        }
    }
}

/// Bucket still accruing time while the patch sits in `state`.
fn open_window_bucket(state: PatchState) -> Option<DurationBucket> {
    match state {
        PatchState::Throttled => Some(DurationBucket::BlockedOnThrottledTree),
        PatchState::TreeClosed => Some(DurationBucket::BlockedOnClosedTree),
        PatchState::Committing => Some(DurationBucket::Committing),
        PatchState::Committed | PatchState::Other => None,
    }
}

/// Bucket credited when the patch moves from `previous` to `next`.
///
/// Commit time only counts once the commit actually lands.
fn transition_bucket(previous: PatchState, next: PatchState) -> Option<DurationBucket> {
    match (previous, next) {
        (PatchState::Committing, PatchState::Committed) => Some(DurationBucket::Committing),
        (PatchState::Committing, _) => None,
        (previous, _) => open_window_bucket(previous),
    }
}

/// Builds the summary of one raw attempt.
///
/// `now` stands in for the end of attempts that never stopped.
pub fn summarize_attempt(records: &[Record], config: &CqConfig, now: DateTime<Utc>) -> Option<Attempt> {
    let begin = records.first()?.timestamp;

    let mut tracker = JobTracker::new(config, begin);
    let mut durations = Durations::default();
    let mut success = None;
    let mut fail_reason = None;
    let mut end = None;
    let mut last_patch: Option<(PatchState, DateTime<Utc>)> = None;
    let mut verifier_start: Option<DateTime<Utc>> = None;

    for record in records {
        if let Some(action) = record.verifier_action(&config.tryjob_verifier) {
            match action {
                VerifierAction::Start => verifier_start = Some(record.timestamp),
                VerifierAction::JobsUpdate { .. } => tracker.update_from_record(record),
                VerifierAction::Pass | VerifierAction::Fail => {
                    if let Some(start) = verifier_start.take() {
                        durations.running_all_jobs = record.timestamp - start;
                    }
                }
                VerifierAction::Trigger { .. } | VerifierAction::Other(_) => {}
            }
            continue;
        }

        let Some(action) = record.patch_action() else {
            continue;
        };
        if matches!(action, PatchAction::ReadyToCommit) {
            continue;
        }

        let state = PatchState::from(action);
        if let Some((previous, since)) = last_patch {
            if let Some(bucket) = transition_bucket(previous, state) {
                durations.add(bucket, record.timestamp - since);
            }
        }

        match action {
            PatchAction::Committed => success = Some(true),
            PatchAction::Failed { reason } => {
                success = Some(false);
                fail_reason.clone_from(reason);
            }
            PatchAction::Stop { .. } => end = Some(record.timestamp),
            _ => {}
        }

        last_patch = Some((state, record.timestamp));
    }

    if let Some(end) = end {
        durations.total = end - begin;
    }

    let last_timestamp = end.unwrap_or(now);

    if let Some((previous, since)) = last_patch {
        if let Some(bucket) = open_window_bucket(previous) {
            durations.add(bucket, last_timestamp - since);
        }
    }

    if let Some(start) = verifier_start {
        durations.running_all_jobs = last_timestamp - start;
    }

    let jobs = tracker.finalize_jobs(success.is_some(), last_timestamp);

    debug!(
        "Attempt at {begin}: success={success:?}, {} records, {} jobs",
        records.len(),
        jobs.values().map(Vec::len).sum::<usize>()
    );

    Some(Attempt {
        success,
        fail_reason,
        begin,
        end,
        durations,
        jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Action;
    use crate::test_support::{at, job_info, jobs_update, patch, record, verifier};
    use chrono::TimeDelta;

    fn summarize(records: &[Record], now: i64) -> Attempt {
        summarize_attempt(records, &CqConfig::default(), at(now)).expect("non-empty attempt")
    }

    fn stop(seconds: i64) -> Record {
        patch(seconds, PatchAction::Stop { message: None })
    }

    mod transition_table {
        use super::*;

        #[test]
        fn blocked_windows_credit_on_any_transition() {
            assert_eq!(
                transition_bucket(PatchState::Throttled, PatchState::Other),
                Some(DurationBucket::BlockedOnThrottledTree)
            );
            assert_eq!(
                transition_bucket(PatchState::TreeClosed, PatchState::Committing),
                Some(DurationBucket::BlockedOnClosedTree)
            );
        }

        #[test]
        fn committing_credits_only_on_commit() {
            assert_eq!(
                transition_bucket(PatchState::Committing, PatchState::Committed),
                Some(DurationBucket::Committing)
            );
            assert_eq!(transition_bucket(PatchState::Committing, PatchState::Other), None);
            assert_eq!(
                open_window_bucket(PatchState::Committing),
                Some(DurationBucket::Committing),
                "A dangling commit window is flushed at the end"
            );
        }

        #[test]
        fn other_states_credit_nothing() {
            assert_eq!(transition_bucket(PatchState::Other, PatchState::Committed), None);
            assert_eq!(open_window_bucket(PatchState::Committed), None);
        }
    }

    #[test]
    fn empty_records_have_no_attempt() {
        assert!(summarize_attempt(&[], &CqConfig::default(), at(0)).is_none());
    }

    #[test]
    fn committed_attempt_end_to_end() {
        let records = vec![
            patch(0, PatchAction::Start),
            verifier(1, VerifierAction::Start),
            jobs_update(2, vec![("SCHEDULED", vec![job_info("m", "b", 5, 2, None)])]),
            jobs_update(3, vec![("SUCCESS", vec![job_info("m", "b", 5, 3, Some("u"))])]),
            verifier(4, VerifierAction::Pass),
            patch(5, PatchAction::Committed),
            stop(6),
        ];

        let attempt = summarize(&records, 1_000);

        assert_eq!(attempt.success, Some(true));
        assert_eq!(attempt.begin, at(0));
        assert_eq!(attempt.end, Some(at(6)));
        assert_eq!(attempt.durations.running_all_jobs, TimeDelta::seconds(3));
        assert_eq!(attempt.durations.total, TimeDelta::seconds(6));

        let passed = attempt.jobs_in("passed");
        assert_eq!(passed.len(), 1);
        let job = &passed[0];
        assert_eq!(job.build_number, 5);
        assert_eq!(job.begin, at(2));
        assert_eq!(job.end, Some(at(3)));
        assert_eq!(job.duration, TimeDelta::seconds(1));
        assert_eq!(job.url.as_deref(), Some("u"));
        assert!(!job.retry);
    }

    #[test]
    fn failed_attempt_records_reason() {
        let records = vec![
            patch(0, PatchAction::Start),
            patch(
                4,
                PatchAction::Failed {
                    reason: Some("Try jobs failed".to_string()),
                },
            ),
            stop(5),
        ];

        let attempt = summarize(&records, 1_000);
        assert_eq!(attempt.success, Some(false));
        assert_eq!(attempt.fail_reason.as_deref(), Some("Try jobs failed"));
    }

    #[test]
    fn blocked_time_survives_interleaved_verifier_records() {
        let records = vec![
            patch(0, PatchAction::Start),
            patch(10, PatchAction::TreeClosed),
            verifier(12, VerifierAction::Start),
            jobs_update(15, vec![]),
            patch(30, PatchAction::Throttled),
            patch(35, PatchAction::Committing),
            patch(50, PatchAction::Committed),
            stop(51),
        ];

        let attempt = summarize(&records, 1_000);
        assert_eq!(attempt.durations.blocked_on_closed_tree, TimeDelta::seconds(20));
        assert_eq!(attempt.durations.blocked_on_throttled_tree, TimeDelta::seconds(5));
        assert_eq!(attempt.durations.committing, TimeDelta::seconds(15));
        assert_eq!(
            attempt.durations.running_all_jobs,
            TimeDelta::seconds(39),
            "Unclosed verifier window runs to the attempt end"
        );
    }

    #[test]
    fn ready_to_commit_does_not_reset_the_timer() {
        let records = vec![
            patch(0, PatchAction::Start),
            patch(10, PatchAction::Throttled),
            patch(15, PatchAction::ReadyToCommit),
            patch(20, PatchAction::Other("patch_rebased".to_string())),
            stop(25),
        ];

        let attempt = summarize(&records, 1_000);
        assert_eq!(attempt.durations.blocked_on_throttled_tree, TimeDelta::seconds(10));
    }

    #[test]
    fn open_attempt_flushes_windows_up_to_now() {
        let records = vec![
            patch(0, PatchAction::Start),
            verifier(5, VerifierAction::Start),
            jobs_update(6, vec![("JOB_RUNNING", vec![job_info("m", "b", 1, 6, None)])]),
            patch(10, PatchAction::TreeClosed),
        ];

        let attempt = summarize(&records, 100);

        assert_eq!(attempt.success, None);
        assert_eq!(attempt.end, None);
        assert_eq!(attempt.durations.total, TimeDelta::zero());
        assert_eq!(attempt.durations.blocked_on_closed_tree, TimeDelta::seconds(90));
        assert_eq!(attempt.durations.running_all_jobs, TimeDelta::seconds(95));

        let running = attempt.jobs_in("running");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].end, None, "Open attempt leaves running jobs open");
        assert_eq!(running[0].duration, TimeDelta::seconds(94));
    }

    #[test]
    fn resolved_attempt_without_stop_closes_jobs_at_now() {
        let records = vec![
            patch(0, PatchAction::Start),
            jobs_update(6, vec![("JOB_RUNNING", vec![job_info("m", "b", 1, 6, None)])]),
            patch(10, PatchAction::Committed),
        ];

        let attempt = summarize(&records, 100);
        let running = attempt.jobs_in("running");
        assert_eq!(running[0].end, Some(at(100)));
    }

    #[test]
    fn jobs_before_attempt_begin_are_ignored() {
        let records = vec![
            patch(100, PatchAction::Start),
            jobs_update(
                110,
                vec![(
                    "JOB_FAILED",
                    vec![job_info("m", "old", 1, 50, None), job_info("m", "new", 2, 105, None)],
                )],
            ),
            stop(120),
        ];

        let attempt = summarize(&records, 1_000);
        let failed = attempt.jobs_in("failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].builder, "new");
    }

    #[test]
    fn verifier_events_from_other_verifiers_are_ignored() {
        let mut foreign_start = verifier(1, VerifierAction::Start);
        foreign_start.verifier = Some("tree status".to_string());
        let records = vec![
            patch(0, PatchAction::Start),
            foreign_start,
            record(at(2), None, Some(Action::Unsupported("heartbeat".to_string()))),
            stop(3),
        ];

        let attempt = summarize(&records, 1_000);
        assert_eq!(attempt.durations.running_all_jobs, TimeDelta::zero());
    }
}
