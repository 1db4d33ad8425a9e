use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::insights::{Attempt, Job, PatchSummary};

use super::styling::{bright, cyan, dim, outcome};
use super::tables::{
    color_coded_blocked_cell, color_coded_duration_cell, color_coded_outcome_cell,
    create_cyan_header, create_table, format_minutes,
};

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn format_instant(instant: Option<DateTime<Utc>>) -> String {
    instant.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn attempt_job_totals(attempt: &Attempt) -> String {
    attempt
        .jobs
        .iter()
        .filter(|(_, jobs)| !jobs.is_empty())
        .map(|(state, jobs)| format!("{state}: {}", jobs.len()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A committed patchset is a success; otherwise the latest attempt decides.
fn overall_outcome(summary: &PatchSummary) -> Option<bool> {
    if summary.success {
        Some(true)
    } else {
        summary.attempts.first().and_then(|a| a.success)
    }
}

fn job_label(job: &Job) -> String {
    format!("{}:{} #{}", job.master, job.builder, job.build_number)
}

/// Renders a human-readable report of a patchset summary.
///
/// Displays color-coded tables showing:
/// - Overview: outcome, attempt counts, time spent per bucket
/// - Attempts: one row per attempt, most recent first
/// - Job States: how many jobs ended in each canonical state
/// - Flaky Jobs: failing runs of builders that passed elsewhere
#[allow(clippy::format_push_string)]
pub fn render_summary(summary: &PatchSummary) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    if summary.attempts.is_empty() {
        let _ = writeln!(output, "  {} {}", dim("Outcome:"), dim("no attempts"));
    } else {
        let _ = writeln!(output, "  {} {}", dim("Outcome:"), outcome(overall_outcome(summary)));
    }
    let _ = writeln!(
        output,
        "  {} {} {}",
        dim("Attempts:"),
        cyan(summary.attempt_count),
        dim(format!("({} failed)", summary.attempt_fail_count))
    );
    let _ = writeln!(
        output,
        "  {} {} → {}",
        dim("Window:"),
        cyan(format_instant(summary.begin)),
        cyan(format_instant(summary.end))
    );
    let _ = writeln!(
        output,
        "  {} {}\n",
        dim("Total time:"),
        cyan(format_minutes(summary.durations.total))
    );

    let mut durations = create_table();
    durations.set_header(create_cyan_header(&[
        "Running Jobs",
        "Tree Closed",
        "Throttled",
        "Committing",
        "Total",
    ]));
    durations.add_row(vec![
        color_coded_duration_cell(summary.durations.running_all_jobs),
        color_coded_blocked_cell(summary.durations.blocked_on_closed_tree),
        color_coded_blocked_cell(summary.durations.blocked_on_throttled_tree),
        color_coded_duration_cell(summary.durations.committing),
        color_coded_duration_cell(summary.durations.total),
    ]);
    output.push_str(&format!("{durations}\n\n"));

    if !summary.attempts.is_empty() {
        add_section_header(&mut output, "🔁", "Attempts");
        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "#", "Outcome", "Begin", "Duration", "Jobs", "Fail Reason",
        ]));
        for (index, attempt) in summary.attempts.iter().enumerate() {
            // Attempts are stored most recent first
            let number = summary.attempts.len() - index;
            table.add_row(vec![
                comfy_table::Cell::new(number),
                color_coded_outcome_cell(attempt.success),
                comfy_table::Cell::new(format_instant(Some(attempt.begin))),
                color_coded_duration_cell(attempt.durations.total),
                comfy_table::Cell::new(attempt_job_totals(attempt)),
                comfy_table::Cell::new(attempt.fail_reason.as_deref().unwrap_or("-")),
            ]);
        }
        output.push_str(&format!("{table}\n\n"));
    }

    add_section_header(&mut output, "🧮", "Job States");
    let mut states = create_table();
    states.set_header(create_cyan_header(&["State", "Jobs"]));
    for (state, count) in &summary.job_counts {
        states.add_row(vec![state.clone(), count.to_string()]);
    }
    output.push_str(&format!("{states}\n\n"));

    add_section_header(&mut output, "🎲", "Flaky Jobs");
    if summary.flaky_jobs.is_empty() {
        let _ = writeln!(output, "  {}", dim("No flaky jobs detected"));
    } else {
        let mut flaky = create_table();
        flaky.set_header(create_cyan_header(&["Job", "Duration", "Retry", "URL"]));
        for job in &summary.flaky_jobs {
            flaky.add_row(vec![
                comfy_table::Cell::new(job_label(job)),
                color_coded_duration_cell(job.duration),
                comfy_table::Cell::new(if job.retry { "yes" } else { "no" }),
                comfy_table::Cell::new(job.url.as_deref().unwrap_or("-")),
            ]);
        }
        output.push_str(&format!("{flaky}\n"));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CqConfig;
    use crate::insights::Durations;
    use crate::summary::summarize_patch;
    use crate::test_support::at;
    use chrono::TimeDelta;
    use indexmap::IndexMap;

    fn create_test_job(builder: &str, state: &str, build_number: i64) -> Job {
        Job {
            state: state.to_string(),
            retry: build_number > 1,
            begin: at(0),
            end: Some(at(600)),
            duration: TimeDelta::seconds(600),
            master: "tryserver.chromium".to_string(),
            builder: builder.to_string(),
            slave: None,
            build_number,
            url: Some(format!("https://build.example/{builder}/{build_number}")),
        }
    }

    fn create_test_attempt(begin: i64, success: Option<bool>, jobs: Vec<Job>) -> Attempt {
        let mut grouped: IndexMap<String, Vec<Job>> = IndexMap::new();
        for job in jobs {
            grouped.entry(job.state.clone()).or_default().push(job);
        }
        Attempt {
            success,
            fail_reason: success
                .is_some_and(|s| !s)
                .then(|| "linux_rel failed".to_string()),
            begin: at(begin),
            end: success.map(|_| at(begin + 3600)),
            durations: Durations {
                running_all_jobs: TimeDelta::seconds(3000),
                total: TimeDelta::seconds(3600),
                ..Durations::default()
            },
            jobs: grouped,
        }
    }

    #[test]
    fn test_render_summary_includes_all_sections() {
        let attempts = vec![
            create_test_attempt(5000, Some(true), vec![create_test_job("linux_rel", "passed", 2)]),
            create_test_attempt(0, Some(false), vec![create_test_job("linux_rel", "failed", 1)]),
        ];
        let summary = summarize_patch(attempts, &CqConfig::default());

        let output = render_summary(&summary);

        assert!(output.contains("Overview"));
        assert!(output.contains("Attempts"));
        assert!(output.contains("Job States"));
        assert!(output.contains("Flaky Jobs"));
        assert!(output.contains("committed"));
        assert!(output.contains("linux_rel failed"));
        assert!(output.contains("tryserver.chromium:linux_rel #1"));
        assert!(output.contains("https://build.example/linux_rel/1"));
    }

    #[test]
    fn test_render_summary_formats_time_in_minutes() {
        let attempts = vec![create_test_attempt(0, Some(true), vec![])];
        let summary = summarize_patch(attempts, &CqConfig::default());

        let output = render_summary(&summary);

        assert!(output.contains("60.0min"));
        assert!(output.contains("50.0min"));
    }

    #[test]
    fn test_render_summary_without_attempts() {
        let summary = summarize_patch(Vec::new(), &CqConfig::default());

        let output = render_summary(&summary);

        assert!(output.contains("No flaky jobs detected"));
        assert!(output.contains("Window:"));
        assert!(!output.contains("Fail Reason"), "Attempts table is skipped");
    }

    #[test]
    fn test_render_summary_numbers_attempts_chronologically() {
        let attempts = vec![
            create_test_attempt(9000, None, vec![]),
            create_test_attempt(5000, Some(false), vec![]),
            create_test_attempt(0, Some(false), vec![]),
        ];
        let summary = summarize_patch(attempts, &CqConfig::default());

        let output = render_summary(&summary);

        let table = &output[output.find("Fail Reason").unwrap()..];
        let latest = table.find("in progress").unwrap();
        let first_failure = table.find("linux_rel failed").unwrap();
        assert!(latest < first_failure, "Most recent attempt is listed first");
        assert!(output.contains("(2 failed)"));
    }
}
