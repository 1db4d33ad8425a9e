//! CQ status records and the ordered stream they arrive in.
//!
//! Records are parsed once at ingestion into a typed [`Action`], so the
//! reconstruction passes never look at raw field maps. Anything the parser
//! does not recognise ends up in an ignorable variant.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::config::CqConfig;
use crate::error::{CqLensError, Result};
use crate::timestamps::from_epoch_seconds;

/// A single CQ status record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    /// Verifier that produced the record, if any
    pub verifier: Option<String>,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Patch(PatchAction),
    Verifier(VerifierAction),
    Unsupported(String),
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchAction {
    Start,
    Stop { message: Option<String> },
    ReadyToCommit,
    Committing,
    Committed,
    Failed { reason: Option<String> },
    Throttled,
    TreeClosed,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifierAction {
    Start,
    /// Builders about to be triggered, keyed by master
    Trigger { trybots: IndexMap<String, Vec<String>> },
    /// Full snapshot of known jobs, keyed by raw CQ job state
    JobsUpdate { jobs: IndexMap<String, Vec<JobInfo>> },
    Pass,
    Fail,
    Other(String),
}

/// One job entry inside a `verifier_jobs_update` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobInfo {
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub builder: Option<String>,
    #[serde(default, deserialize_with = "lenient_build_number")]
    pub build_number: Option<i64>,
    #[serde(default)]
    pub slave: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Rietveld-formatted timestamp string
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn lenient_build_number<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Wire form of a record.
#[derive(Debug, Deserialize)]
struct RawRecord {
    timestamp: f64,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Record {
    /// Parses a raw JSON record. Returns `None` when the record has no usable
    /// timestamp or is not shaped like a record at all.
    pub fn from_value(value: Value) -> Option<Self> {
        let raw: RawRecord = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Skipping malformed record: {err}");
                return None;
            }
        };

        let Some(timestamp) = from_epoch_seconds(raw.timestamp) else {
            warn!("Skipping record with invalid timestamp {}", raw.timestamp);
            return None;
        };

        Some(Self {
            timestamp,
            tags: raw.tags.into_iter().collect(),
            verifier: string_field(&raw.fields, "verifier"),
            action: Action::parse(&raw.fields),
        })
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn patch_action(&self) -> Option<&PatchAction> {
        match &self.action {
            Action::Patch(action) => Some(action),
            _ => None,
        }
    }

    /// Verifier action, only when reported by the given verifier.
    pub fn verifier_action(&self, verifier: &str) -> Option<&VerifierAction> {
        match &self.action {
            Action::Verifier(action) if self.verifier.as_deref() == Some(verifier) => Some(action),
            _ => None,
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

impl Action {
    fn parse(fields: &Map<String, Value>) -> Self {
        let Some(name) = fields.get("action").and_then(Value::as_str) else {
            return Self::Missing;
        };

        if name.starts_with("patch_") {
            Self::Patch(PatchAction::parse(name, fields))
        } else if name.starts_with("verifier_") {
            Self::Verifier(VerifierAction::parse(name, fields))
        } else {
            Self::Unsupported(name.to_string())
        }
    }
}

impl PatchAction {
    fn parse(name: &str, fields: &Map<String, Value>) -> Self {
        match name {
            "patch_start" => Self::Start,
            "patch_stop" => Self::Stop {
                message: string_field(fields, "message"),
            },
            "patch_ready_to_commit" => Self::ReadyToCommit,
            "patch_committing" => Self::Committing,
            "patch_committed" => Self::Committed,
            "patch_failed" => Self::Failed {
                reason: string_field(fields, "reason"),
            },
            "patch_throttled" => Self::Throttled,
            "patch_tree_closed" => Self::TreeClosed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl VerifierAction {
    fn parse(name: &str, fields: &Map<String, Value>) -> Self {
        match name {
            "verifier_start" => Self::Start,
            "verifier_trigger" => Self::Trigger {
                trybots: parse_trybots(fields.get("trybots")),
            },
            "verifier_jobs_update" => Self::JobsUpdate {
                jobs: parse_jobs(fields.get("jobs")),
            },
            "verifier_pass" => Self::Pass,
            "verifier_fail" => Self::Fail,
            other => Self::Other(other.to_string()),
        }
    }
}

fn parse_trybots(value: Option<&Value>) -> IndexMap<String, Vec<String>> {
    let Some(Value::Object(masters)) = value else {
        if value.is_some() {
            warn!("Ignoring trybots field that is not an object");
        }
        return IndexMap::new();
    };

    masters
        .iter()
        .map(|(master, builders)| {
            let builders = match builders {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                Value::Object(map) => map.keys().cloned().collect(),
                _ => {
                    warn!("Ignoring builders for master {master}: not a list");
                    Vec::new()
                }
            };
            (master.clone(), builders)
        })
        .collect()
}

fn parse_jobs(value: Option<&Value>) -> IndexMap<String, Vec<JobInfo>> {
    let Some(Value::Object(states)) = value else {
        if value.is_some() {
            warn!("Ignoring jobs field that is not an object");
        }
        return IndexMap::new();
    };

    states
        .iter()
        .map(|(state, infos)| {
            let infos = match infos {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| match serde_json::from_value(item.clone()) {
                        Ok(info) => Some(info),
                        Err(err) => {
                            warn!("Ignoring malformed job info under {state}: {err}");
                            None
                        }
                    })
                    .collect(),
                _ => {
                    warn!("Ignoring job list for state {state}: not a list");
                    Vec::new()
                }
            };
            (state.clone(), infos)
        })
        .collect()
}

/// Records for one (issue, patchset), in non-decreasing timestamp order.
#[derive(Debug, Clone, Default)]
pub struct RecordStream {
    records: Vec<Record>,
}

impl RecordStream {
    /// Wraps already-typed records.
    ///
    /// # Errors
    ///
    /// Returns [`CqLensError::OutOfOrder`] if a record is older than its
    /// predecessor; the reconstruction passes do not re-sort.
    pub fn new(records: Vec<Record>) -> Result<Self> {
        for (index, pair) in records.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(CqLensError::OutOfOrder {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                    previous: pair[0].timestamp,
                });
            }
        }
        Ok(Self { records })
    }

    /// Parses raw JSON records, skipping the ones that are not usable.
    ///
    /// # Errors
    ///
    /// Returns [`CqLensError::OutOfOrder`] if the parsed records are not sorted.
    pub fn from_raw(values: Vec<Value>) -> Result<Self> {
        let total = values.len();
        let records: Vec<Record> = values.into_iter().filter_map(Record::from_value).collect();
        if records.len() < total {
            warn!("Skipped {} of {total} records", total - records.len());
        }
        Self::new(records)
    }

    /// Keeps only the records tagged with the given issue and patchset.
    #[must_use]
    pub fn for_patchset(self, issue: u64, patchset: u64, config: &CqConfig) -> Self {
        let issue_tag = config.issue_tag(issue);
        let patchset_tag = config.patchset_tag(patchset);
        let records: Vec<Record> = self
            .records
            .into_iter()
            .filter(|record| record.has_tag(&issue_tag) && record.has_tag(&patchset_tag))
            .collect();
        debug!("{} records tagged {issue_tag} {patchset_tag}", records.len());
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads raw records from a `.json` array or a `.jsonl` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid JSON.
pub async fn load_records(path: &Path) -> Result<Vec<Value>> {
    let contents = tokio::fs::read_to_string(path).await?;

    if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
        return contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CqLensError::from))
            .collect();
    }

    match serde_json::from_str(&contents)? {
        Value::Array(values) => Ok(values),
        // The CQ status endpoint wraps results as {"results": [...]}
        Value::Object(mut object) => match object.remove("results") {
            Some(Value::Array(values)) => Ok(values),
            _ => Ok(vec![Value::Object(object)]),
        },
        other => Ok(vec![other]),
    }
}
