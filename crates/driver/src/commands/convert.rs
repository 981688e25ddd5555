//! Rescaling of an exported run onto a simulated day

use anyhow::{Context, Result};
use colored::Colorize;
use loadtest_lib::{convert_to_simulated_day, write_simulated_rows, CsvExporter, SimulatedRow};
use std::fs::File;
use std::path::PathBuf;

pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub pod: String,
}

/// Load the exported samples and keep the matching pods on a 24-hour axis
pub fn convert_rows(options: &ConvertOptions) -> Result<Vec<SimulatedRow>> {
    let samples = CsvExporter::new(&options.input)
        .load()
        .with_context(|| format!("Failed to read samples from {}", options.input.display()))?;
    Ok(convert_to_simulated_day(&samples, &options.pod))
}

pub fn convert(options: &ConvertOptions) -> Result<()> {
    let rows = convert_rows(options)?;
    if rows.is_empty() {
        println!(
            "{} no samples match pod filter `{}`",
            "Warning:".yellow().bold(),
            options.pod
        );
    }

    let file = File::create(&options.output)
        .with_context(|| format!("Failed to create {}", options.output.display()))?;
    write_simulated_rows(file, &rows)?;

    println!(
        "{} {} row(s) to {}",
        "Converted".green().bold(),
        rows.len(),
        options.output.display()
    );
    Ok(())
}
