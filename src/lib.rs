//! Commit Queue insights.
//!
//! Rebuilds CQ attempts from the ordered record stream of a patchset and
//! derives per-attempt summaries, a patchset summary and a Trace-Viewer
//! timeline from them.

pub mod cli;
pub mod config;
pub mod error;
pub mod insights;
pub mod output;
pub mod records;
pub mod summary;
pub mod timeline;
pub mod timestamps;

#[cfg(test)]
mod test_support;

pub use config::{Config, CqConfig};
pub use error::{CqLensError, Result};
pub use insights::{Attempt, Durations, Job, PatchSummary};
pub use records::{Record, RecordStream};
pub use timeline::TimelineEvent;
