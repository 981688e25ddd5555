//! Output formatting utilities

use crate::runner::{Progress, RunSummary};
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use loadtest_lib::UserTick;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// One operation row of the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct OperationRow {
    #[tabled(rename = "Operation")]
    pub operation: String,
    #[tabled(rename = "Requests")]
    pub requests: u64,
    #[tabled(rename = "Failures")]
    pub failures: u64,
    #[tabled(rename = "Mean latency (ms)", display_with = "format_ms")]
    pub mean_latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct SummaryDocument<'a> {
    users: u32,
    elapsed_secs: f64,
    total_requests: u64,
    total_failures: u64,
    operations: &'a [OperationRow],
}

/// One point of the simulated user-count curve
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ShapeRow {
    #[tabled(rename = "Run time (s)")]
    pub run_time_secs: u64,
    #[tabled(rename = "Simulated clock")]
    pub simulated_clock: String,
    #[tabled(rename = "Users")]
    pub user_count: u32,
    #[tabled(rename = "Spawn rate")]
    pub spawn_rate: f64,
}

impl ShapeRow {
    pub fn new(run_time: Duration, simulated_minutes: f64, tick: &UserTick) -> Self {
        let minute = simulated_minutes.floor().rem_euclid(1440.0) as u32;
        Self {
            run_time_secs: run_time.as_secs(),
            simulated_clock: format!("{:02}:{:02}", minute / 60, minute % 60),
            user_count: tick.user_count,
            spawn_rate: tick.spawn_rate,
        }
    }
}

fn format_ms(value: &f64) -> String {
    format!("{:.1}", value)
}

pub fn summary_rows(summary: &RunSummary) -> Vec<OperationRow> {
    summary
        .stats
        .operations
        .iter()
        .map(|(operation, stats)| OperationRow {
            operation: operation.to_string(),
            requests: stats.requests,
            failures: stats.failures,
            mean_latency_ms: stats.mean_latency().as_secs_f64() * 1000.0,
        })
        .collect()
}

/// Print the end-of-run summary
pub fn print_summary<W: Write>(out: &mut W, summary: &RunSummary, format: OutputFormat) -> Result<()> {
    let rows = summary_rows(summary);

    match format {
        OutputFormat::Json => {
            let document = SummaryDocument {
                users: summary.users,
                elapsed_secs: summary.elapsed.as_secs_f64(),
                total_requests: summary.stats.total_requests(),
                total_failures: summary.stats.total_failures(),
                operations: &rows,
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&document)?)?;
        }
        OutputFormat::Csv => write_csv(out, &rows)?,
        OutputFormat::Table => {
            writeln!(out, "{}", "Run Summary".bold())?;
            writeln!(out, "{}", "=".repeat(50))?;
            writeln!(out, "Users:                  {}", summary.users)?;
            writeln!(
                out,
                "Elapsed:                {:.1}s",
                summary.elapsed.as_secs_f64()
            )?;
            writeln!(out)?;

            if rows.is_empty() {
                writeln!(out, "{}", "No requests completed".yellow())?;
                return Ok(());
            }
            writeln!(out, "{}", Table::new(&rows).with(Style::rounded()))?;

            let failures = summary.stats.total_failures();
            let totals = format!(
                "{} requests, {} failures",
                summary.stats.total_requests(),
                failures
            );
            if failures > 0 {
                writeln!(out, "{} {}", "✗".red().bold(), totals)?;
            } else {
                writeln!(out, "{} {}", "✓".green().bold(), totals)?;
            }
        }
    }
    Ok(())
}

/// Print the simulated user-count curve
pub fn print_shape<W: Write>(out: &mut W, rows: &[ShapeRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(rows)?)?,
        OutputFormat::Csv => write_csv(out, rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                writeln!(out, "{}", "No points in range".yellow())?;
            } else {
                writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
            }
        }
    }
    Ok(())
}

/// Print a live progress line
pub fn print_progress(progress: &Progress) {
    let failures = if progress.failures > 0 {
        progress.failures.to_string().red().to_string()
    } else {
        progress.failures.to_string().green().to_string()
    };
    println!(
        "{} {:>6}s  requests: {}  failures: {}",
        "ℹ".blue().bold(),
        progress.elapsed_secs,
        progress.requests,
        failures
    );
}

fn write_csv<W: Write, T: Serialize>(out: &mut W, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
