use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::config::{Config, CqConfig, OutputFormat};
use crate::output::{bright, dim, render_summary, PhaseProgress};
use crate::records::{load_records, RecordStream};
use crate::summary::summarize_records;
use crate::timeline::build_timeline;

#[derive(Parser)]
#[command(name = "cqlens")]
#[command(author, version, about = "Commit Queue Insights Tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, global = true, env = "CQLENS_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the CQ attempts recorded for a patchset
    Summary {
        /// Record files (.json array or .jsonl), one patchset each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, requires = "patchset")]
        issue: Option<u64>,

        #[arg(long, requires = "issue")]
        patchset: Option<u64>,

        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Export a patchset as a Trace-Viewer event array
    Timeline {
        input: PathBuf,

        #[arg(long, requires = "patchset")]
        issue: Option<u64>,

        #[arg(long, requires = "issue")]
        patchset: Option<u64>,
    },
}

async fn load_stream(
    path: &Path,
    patchset: Option<(u64, u64)>,
    config: &CqConfig,
) -> Result<RecordStream> {
    let values = load_records(path)
        .await
        .with_context(|| format!("Failed to load records from {}", path.display()))?;
    let stream = RecordStream::from_raw(values)
        .with_context(|| format!("Invalid record stream in {}", path.display()))?;

    Ok(match patchset {
        Some((issue, patchset)) => stream.for_patchset(issue, patchset, config),
        None => stream,
    })
}

impl Cli {
    fn to_json<T: Serialize + ?Sized>(&self, config: &Config, value: &T) -> Result<String> {
        let json = if self.pretty || config.output.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    fn write_output(&self, content: &str) -> Result<()> {
        if let Some(output_path) = &self.output {
            std::fs::write(output_path, content)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Insights written to: {}", output_path.display());
        } else {
            println!("{content}");
        }
        Ok(())
    }

    async fn execute_summary(
        &self,
        config: &Config,
        inputs: &[PathBuf],
        patchset: Option<(u64, u64)>,
        format: OutputFormat,
    ) -> Result<()> {
        info!("Summarizing {} record files", inputs.len());

        let progress = PhaseProgress::start_phase_1(inputs.len());
        let streams = futures::future::try_join_all(
            inputs
                .iter()
                .map(|path| load_stream(path, patchset, &config.cq)),
        )
        .await?;

        let record_count = streams.iter().map(RecordStream::len).sum();
        let progress = progress.finish_phase_1_start_phase_2(record_count);

        let now = Utc::now();
        let summaries: Vec<_> = streams
            .iter()
            .map(|stream| summarize_records(stream, &config.cq, now))
            .collect();

        let attempt_count = summaries.iter().map(|s| s.attempt_count).sum();
        let progress = progress.finish_phase_2_start_phase_3(attempt_count);

        let rendered = match format {
            OutputFormat::Json => match summaries.as_slice() {
                [single] => self.to_json(config, single)?,
                all => self.to_json(config, all)?,
            },
            OutputFormat::Summary => {
                if self.output.is_some() {
                    console::set_colors_enabled(false);
                }
                let mut report = String::new();
                for (path, summary) in inputs.iter().zip(&summaries) {
                    if inputs.len() > 1 {
                        let _ = writeln!(report, "{} {}\n", bright("📄"), dim(path.display()));
                    }
                    report.push_str(&render_summary(summary));
                }
                report
            }
        };
        progress.finish_phase_3();

        self.write_output(&rendered)
    }

    async fn execute_timeline(
        &self,
        config: &Config,
        input: &Path,
        patchset: Option<(u64, u64)>,
    ) -> Result<()> {
        info!("Building timeline for {}", input.display());

        let stream = load_stream(input, patchset, &config.cq).await?;
        let events = build_timeline(&stream, &config.cq);

        self.write_output(&self.to_json(config, &events)?)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Summary {
                inputs,
                issue,
                patchset,
                format,
            } => {
                let format = format.unwrap_or(config.output.format);
                self.execute_summary(&config, inputs, issue.zip(*patchset), format)
                    .await
            }
            Commands::Timeline {
                input,
                issue,
                patchset,
            } => {
                self.execute_timeline(&config, input, issue.zip(*patchset))
                    .await
            }
        }
    }
}
