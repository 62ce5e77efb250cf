//! Human-readable tables and the machine-readable run report.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use opsize_common::config::SizingPolicy;
use opsize_common::constants::REPORT_FILE_NAME;
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::{ExecutionStatus, MetricSample, MetricSummary};

use crate::execution::{OperatorExecution, PipelineReport, RunOutcome};

/// Renders rows as a bordered, left-aligned text table.
#[must_use]
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let border = widths
        .iter()
        .fold(String::from("+"), |mut acc, w| {
            acc.push_str(&"-".repeat(w + 2));
            acc.push('+');
            acc
        });
    let mut out = String::new();
    let _ = writeln!(out, "{border}");
    let _ = writeln!(out, "{}", table_line(headers.iter().copied(), &widths));
    let _ = writeln!(out, "{border}");
    for row in rows {
        let _ = writeln!(out, "{}", table_line(row.iter().map(String::as_str), &widths));
    }
    let _ = write!(out, "{border}");
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut out = String::from("|");
    for (cell, &w) in cells.zip(widths) {
        let _ = write!(out, " {cell:<w$} |");
    }
    out
}

fn summary_rows(summary: &MetricSummary) -> [[String; 4]; 2] {
    [
        [
            "CPU".into(),
            format!("{:.3} %", summary.cpu_avg),
            format!("{:.3} %", summary.cpu_max),
            format!("{} core(s)", summary.suggested_cpu_cores),
        ],
        [
            "Memory".into(),
            format!("{:.3} MB", summary.memory_avg),
            format!("{:.3} MB", summary.memory_max),
            format!("{} MB", summary.suggested_memory_mb),
        ],
    ]
}

/// Renders the statistics table of one operator, followed by the sizing rule.
#[must_use]
pub fn render_operator_summary(summary: &MetricSummary, policy: &SizingPolicy) -> String {
    let rows: Vec<Vec<String>> = summary_rows(summary).into_iter().map(Vec::from).collect();
    let mut out = render_table(&["Metric", "Average", "Maximum", "Resource"], &rows);
    let _ = write!(out, "\n{}", policy.describe());
    if !summary.reliable {
        out.push_str("\nno samples were collected; these figures are not reliable");
    }
    out
}

/// Renders the raw sample series.
#[must_use]
pub fn render_samples(samples: &[MetricSample]) -> String {
    let rows: Vec<Vec<String>> = samples
        .iter()
        .map(|s| {
            vec![
                s.timestamp.format("%H:%M:%S%.3f").to_string(),
                format!("{:.3}", s.cpu_percent),
                format!("{:.3}", s.memory_mb),
            ]
        })
        .collect();
    render_table(&["Timestamp", "CPU %", "Memory (MB)"], &rows)
}

/// Renders the cross-operator summary table.
///
/// Operators without statistics are listed with their status; an aborted
/// run is annotated as partial.
#[must_use]
pub fn render_pipeline_summary(report: &PipelineReport) -> String {
    let mut rows = Vec::new();
    for exec in &report.executions {
        rows.extend(execution_rows(exec));
    }
    let mut out = render_table(
        &["Operator", "Metric", "Average", "Maximum", "Resource"],
        &rows,
    );
    let _ = write!(out, "\n{}", report.sizing.describe());
    if report.outcome == RunOutcome::AbortedEarly {
        let _ = write!(
            out,
            "\npartial results: run aborted, {} of {} operator(s) skipped",
            report.skipped(),
            report.executions.len()
        );
    }
    out
}

fn execution_rows(exec: &OperatorExecution) -> Vec<Vec<String>> {
    let mut name = exec.operator.clone();
    match exec.status {
        ExecutionStatus::Succeeded => {}
        ExecutionStatus::Failed => {
            let code = exec.exit_code.map_or_else(String::new, |c| format!(" {c}"));
            let _ = write!(name, " (failed{code})");
        }
        ExecutionStatus::TimedOut => name.push_str(" (timed out)"),
        ExecutionStatus::Skipped => name.push_str(" (skipped)"),
    }

    match &exec.summary {
        Some(summary) => {
            if !summary.reliable {
                name.push_str(" *");
            }
            summary_rows(summary)
                .into_iter()
                .enumerate()
                .map(|(i, row)| {
                    let first = if i == 0 { name.clone() } else { String::new() };
                    std::iter::once(first).chain(row).collect()
                })
                .collect()
        }
        None => vec![vec![
            name,
            "-".into(),
            "-".into(),
            "-".into(),
            "-".into(),
        ]],
    }
}

/// Writes the run report as JSON into `dir`.
///
/// # Errors
///
/// Returns an error if the report cannot be serialized or written.
pub fn write_json(report: &PipelineReport, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(REPORT_FILE_NAME);
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).map_err(|e| OpsizeError::Io {
        path: path.clone(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "run report written");
    Ok(path)
}
