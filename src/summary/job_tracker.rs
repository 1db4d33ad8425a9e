use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use log::{debug, warn};

use crate::config::{CqConfig, RUNNING};
use crate::insights::Job;
use crate::records::{JobInfo, Record, VerifierAction};

type JobKey = (String, String, i64);

/// Follows try jobs through the repeated snapshots of one attempt.
///
/// The CQ resends every active and recently finished job on each
/// `verifier_jobs_update`, so updates are idempotent per
/// `(master, builder, build_number)` and anything stamped before the attempt
/// began is ignored.
pub struct JobTracker<'a> {
    config: &'a CqConfig,
    cutoff: DateTime<Utc>,
    jobs: IndexMap<JobKey, Job>,
}

impl<'a> JobTracker<'a> {
    pub fn new(config: &'a CqConfig, cutoff: DateTime<Utc>) -> Self {
        Self {
            config,
            cutoff,
            jobs: IndexMap::new(),
        }
    }

    pub fn update_from_record(&mut self, record: &Record) {
        let config = self.config;
        let Some(VerifierAction::JobsUpdate { jobs }) =
            record.verifier_action(&config.tryjob_verifier)
        else {
            return;
        };

        for (cq_state, infos) in jobs {
            let Some(state) = config.canonical_state(cq_state) else {
                warn!("Unknown CQ job state '{cq_state}', skipping {} jobs", infos.len());
                continue;
            };
            for info in infos {
                self.apply(state, info);
            }
        }
    }

    fn apply(&mut self, state: &str, info: &JobInfo) {
        let (Some(master), Some(builder)) = (&info.master, &info.builder) else {
            warn!("Job info without master/builder: {info:?}");
            return;
        };
        let Some(build_number) = info.build_number else {
            warn!("Job info for {master}:{builder} has no build number");
            return;
        };
        let Some(timestamp) = info
            .timestamp
            .as_deref()
            .and_then(|raw| self.config.parse_job_timestamp(raw))
        else {
            warn!(
                "Unparsable timestamp {:?} for {master}:{builder}#{build_number}",
                info.timestamp
            );
            return;
        };

        if timestamp < self.cutoff {
            debug!("Ignoring {master}:{builder}#{build_number} from a previous attempt");
            return;
        }

        let key = (master.clone(), builder.clone(), build_number);
        let job = self.jobs.entry(key).or_insert_with(|| Job {
            state: state.to_string(),
            retry: false,
            begin: timestamp,
            end: None,
            duration: TimeDelta::zero(),
            master: master.clone(),
            builder: builder.clone(),
            slave: info.slave.clone(),
            build_number,
            url: None,
        });

        if state != RUNNING {
            job.end = Some(timestamp);
            job.duration = timestamp - job.begin;
        }
        job.state = state.to_string();
        if job.url.is_none() {
            job.url.clone_from(&info.url);
        }

        let begin = job.begin;
        let retry = self.jobs.values().any(|other| {
            other.master == *master
                && other.builder == *builder
                && other.build_number != build_number
                && other.begin < begin
        });
        if let Some(job) = self.jobs.get_mut(&(master.clone(), builder.clone(), build_number)) {
            job.retry = retry;
        }
    }

    /// Closes out open jobs and groups everything by canonical state.
    ///
    /// Jobs without an end get a live duration up to `last_timestamp`; their
    /// end is only filled in when the attempt itself has ended. Each bucket is
    /// sorted most recently started first.
    pub fn finalize_jobs(
        self,
        attempt_ended: bool,
        last_timestamp: DateTime<Utc>,
    ) -> IndexMap<String, Vec<Job>> {
        let mut grouped: IndexMap<String, Vec<Job>> = self
            .config
            .canonical_states()
            .into_iter()
            .map(|state| (state.to_string(), Vec::new()))
            .collect();

        for mut job in self.jobs.into_values() {
            if job.end.is_none() {
                if attempt_ended {
                    job.end = Some(last_timestamp);
                }
                job.duration = last_timestamp - job.begin;
            }
            grouped.entry(job.state.clone()).or_default().push(job);
        }

        for jobs in grouped.values_mut() {
            jobs.sort_by(|a, b| b.begin.cmp(&a.begin));
        }

        grouped
    }
}
