use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CqLensError;

/// Canonical state every job-state table must produce for in-flight jobs.
pub const RUNNING: &str = "running";
pub const PASSED: &str = "passed";
pub const FAILED: &str = "failed";

/// Configuration file structure for cqlens.
///
/// Carries the CQ constants the reconstruction depends on (job-state table,
/// verifier name, timestamp format, tag templates) plus output preferences.
/// Configuration files are loaded from the current directory, the user config
/// directory, or a specified path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Commit Queue record conventions
    #[serde(default)]
    pub cq: CqConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CqConfig {
    /// Raw CQ job-state name to canonical state name, in report order
    #[serde(default = "default_job_states")]
    pub job_states: IndexMap<String, String>,

    /// Verifier name reported by the try-job verifier
    #[serde(default = "default_tryjob_verifier")]
    pub tryjob_verifier: String,

    /// chrono format of job-info timestamps (naive, UTC)
    #[serde(default = "default_rietveld_timestamp_format")]
    pub rietveld_timestamp_format: String,

    /// Tag marking the first record of an attempt
    #[serde(default = "default_tag_start")]
    pub tag_start: String,

    /// Tag marking the last record of an attempt
    #[serde(default = "default_tag_stop")]
    pub tag_stop: String,

    /// Issue tag template, `{}` is replaced by the issue number
    #[serde(default = "default_tag_issue")]
    pub tag_issue: String,

    /// Patchset tag template, `{}` is replaced by the patchset number
    #[serde(default = "default_tag_patchset")]
    pub tag_patchset: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for CqConfig {
    fn default() -> Self {
        Self {
            job_states: default_job_states(),
            tryjob_verifier: default_tryjob_verifier(),
            rietveld_timestamp_format: default_rietveld_timestamp_format(),
            tag_start: default_tag_start(),
            tag_stop: default_tag_stop(),
            tag_issue: default_tag_issue(),
            tag_patchset: default_tag_patchset(),
        }
    }
}

fn default_job_states() -> IndexMap<String, String> {
    [
        ("JOB_NOT_TRIGGERED", "not-started"),
        ("JOB_PENDING", "pending"),
        ("JOB_RUNNING", RUNNING),
        ("JOB_SUCCEEDED", PASSED),
        ("JOB_FAILED", FAILED),
        ("JOB_TIMED_OUT", "timed-out"),
        ("SCHEDULED", RUNNING),
        ("STARTED", RUNNING),
        ("SUCCESS", PASSED),
        ("FAILURE", FAILED),
    ]
    .into_iter()
    .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
    .collect()
}

fn default_tryjob_verifier() -> String {
    "try job".to_string()
}

fn default_rietveld_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S%.f".to_string()
}

fn default_tag_start() -> String {
    "action=patch_start".to_string()
}

fn default_tag_stop() -> String {
    "action=patch_stop".to_string()
}

fn default_tag_issue() -> String {
    "issue={}".to_string()
}

fn default_tag_patchset() -> String {
    "patchset={}".to_string()
}

impl CqConfig {
    /// Maps a raw CQ job state to its canonical name.
    pub fn canonical_state(&self, raw_state: &str) -> Option<&str> {
        self.job_states.get(raw_state).map(String::as_str)
    }

    /// Distinct canonical states in table order.
    pub fn canonical_states(&self) -> Vec<&str> {
        let mut states: Vec<&str> = Vec::new();
        for state in self.job_states.values() {
            if !states.contains(&state.as_str()) {
                states.push(state);
            }
        }
        states
    }

    pub fn issue_tag(&self, issue: u64) -> String {
        self.tag_issue.replace("{}", &issue.to_string())
    }

    pub fn patchset_tag(&self, patchset: u64) -> String {
        self.tag_patchset.replace("{}", &patchset.to_string())
    }

    /// Parses a job-info timestamp. Returns `None` when it does not match the
    /// configured format.
    pub fn parse_job_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, &self.rietveld_timestamp_format)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Checks the contract the reconstruction relies on.
    ///
    /// # Errors
    ///
    /// Returns [`CqLensError::Config`] if a required canonical state is missing
    /// or a tag template has no `{}` placeholder.
    pub fn validate(&self) -> crate::error::Result<()> {
        let states = self.canonical_states();
        for required in [RUNNING, PASSED, FAILED] {
            if !states.contains(&required) {
                return Err(CqLensError::Config(format!(
                    "job-states must map at least one CQ state to '{required}'"
                )));
            }
        }

        for (name, template) in [
            ("tag-issue", &self.tag_issue),
            ("tag-patchset", &self.tag_patchset),
        ] {
            if !template.contains("{}") {
                return Err(CqLensError::Config(format!(
                    "{name} template '{template}' has no '{{}}' placeholder"
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cqlens.toml
    /// 3. ./cqlens.json
    /// 4. ./cqlens.yaml
    /// 5. ./cqlens.yml
    /// 6. `<user config dir>/cqlens/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["cqlens.toml", "cqlens.json", "cqlens.yaml", "cqlens.yml"]
            .into_iter()
            .map(PathBuf::from)
            .chain(user_config_path());

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        config
            .cq
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cqlens").join("config.toml"))
}
