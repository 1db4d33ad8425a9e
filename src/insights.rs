use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::timestamps::{serialize_delta, serialize_instant, serialize_optional_instant};

/// A try job tracked within one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Canonical state at last sighting
    pub state: String,
    /// Whether an earlier build of the same builder exists in the attempt
    pub retry: bool,
    #[serde(serialize_with = "serialize_instant")]
    pub begin: DateTime<Utc>,
    #[serde(serialize_with = "serialize_optional_instant")]
    pub end: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_delta")]
    pub duration: TimeDelta,
    pub master: String,
    pub builder: String,
    pub slave: Option<String>,
    pub build_number: i64,
    pub url: Option<String>,
}

impl Job {
    /// `(master, builder)` pair used for retry and flakiness matching.
    pub fn builder_id(&self) -> (&str, &str) {
        (&self.master, &self.builder)
    }
}

/// Time spent in each phase of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Durations {
    #[serde(serialize_with = "serialize_delta")]
    pub running_all_jobs: TimeDelta,
    #[serde(serialize_with = "serialize_delta")]
    pub blocked_on_closed_tree: TimeDelta,
    #[serde(serialize_with = "serialize_delta")]
    pub blocked_on_throttled_tree: TimeDelta,
    #[serde(serialize_with = "serialize_delta")]
    pub committing: TimeDelta,
    #[serde(serialize_with = "serialize_delta")]
    pub total: TimeDelta,
}

/// Bucket a patch-state window is credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationBucket {
    RunningAllJobs,
    BlockedOnClosedTree,
    BlockedOnThrottledTree,
    Committing,
}

impl Default for Durations {
    fn default() -> Self {
        Self {
            running_all_jobs: TimeDelta::zero(),
            blocked_on_closed_tree: TimeDelta::zero(),
            blocked_on_throttled_tree: TimeDelta::zero(),
            committing: TimeDelta::zero(),
            total: TimeDelta::zero(),
        }
    }
}

impl Durations {
    pub fn add(&mut self, bucket: DurationBucket, delta: TimeDelta) {
        *self.bucket_mut(bucket) += delta;
    }

    fn bucket_mut(&mut self, bucket: DurationBucket) -> &mut TimeDelta {
        match bucket {
            DurationBucket::RunningAllJobs => &mut self.running_all_jobs,
            DurationBucket::BlockedOnClosedTree => &mut self.blocked_on_closed_tree,
            DurationBucket::BlockedOnThrottledTree => &mut self.blocked_on_throttled_tree,
            DurationBucket::Committing => &mut self.committing,
        }
    }

    /// Field-wise sum.
    #[must_use]
    pub fn sum<'a>(all: impl IntoIterator<Item = &'a Durations>) -> Self {
        all.into_iter().fold(Self::default(), |mut acc, d| {
            acc.running_all_jobs += d.running_all_jobs;
            acc.blocked_on_closed_tree += d.blocked_on_closed_tree;
            acc.blocked_on_throttled_tree += d.blocked_on_throttled_tree;
            acc.committing += d.committing;
            acc.total += d.total;
            acc
        })
    }
}

/// One CQ run for a patchset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// `None` while the attempt has neither committed nor failed
    pub success: Option<bool>,
    pub fail_reason: Option<String>,
    #[serde(serialize_with = "serialize_instant")]
    pub begin: DateTime<Utc>,
    #[serde(serialize_with = "serialize_optional_instant")]
    pub end: Option<DateTime<Utc>>,
    pub durations: Durations,
    /// Jobs grouped by canonical state, every state present
    pub jobs: IndexMap<String, Vec<Job>>,
}

impl Attempt {
    pub fn jobs_in(&self, state: &str) -> &[Job] {
        self.jobs.get(state).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Everything known about one patchset's trips through the CQ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchSummary {
    pub success: bool,
    #[serde(serialize_with = "serialize_optional_instant")]
    pub begin: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_optional_instant")]
    pub end: Option<DateTime<Utc>>,
    pub durations: Durations,
    pub job_counts: IndexMap<String, usize>,
    pub flaky_jobs: Vec<Job>,
    pub attempt_count: usize,
    pub attempt_fail_count: usize,
    /// Most recent first
    pub attempts: Vec<Attempt>,
}
