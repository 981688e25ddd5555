//! Post-processing of exported samples onto a simulated day
//!
//! Keeps the samples of the pods whose name contains a filter string,
//! orders them by capture time and stretches the captured span over 24
//! simulated hours, so a compressed run can be read against the daily
//! curve it was driven with.

use crate::export::{ExportError, CSV_COLUMNS};
use crate::models::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A sample placed on the simulated 24-hour axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRow {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub node_name: String,
    pub pod_name: String,
    pub usage_cpu: f64,
    pub usage_memory: f64,
    /// Seconds since the first kept sample
    pub elapsed_sec: f64,
    /// Position on the simulated day, in hours
    pub simulated_hours: f64,
}

/// Filter samples by pod name and rescale their span onto a simulated day
///
/// The match is a case-insensitive substring match. The last kept sample
/// lands on hour 24; with a single capture instant the scale factor is 1.
pub fn convert_to_simulated_day(samples: &[Sample], pod_filter: &str) -> Vec<SimulatedRow> {
    let needle = pod_filter.to_lowercase();
    let mut kept: Vec<&Sample> = samples
        .iter()
        .filter(|s| s.pod_name.to_lowercase().contains(&needle))
        .collect();
    kept.sort_by_key(|s| s.timestamp);

    let Some(first) = kept.first().map(|s| s.timestamp) else {
        return Vec::new();
    };
    let elapsed = |ts: DateTime<Utc>| (ts - first).num_milliseconds() as f64 / 1000.0;

    let span = kept.last().map(|s| elapsed(s.timestamp)).unwrap_or(0.0);
    let factor = if span > 0.0 { SECONDS_PER_DAY / span } else { 1.0 };

    kept.into_iter()
        .map(|s| {
            let elapsed_sec = elapsed(s.timestamp);
            SimulatedRow {
                timestamp: s.timestamp,
                node_id: s.node_id.clone(),
                node_name: s.node_name.clone(),
                pod_name: s.pod_name.clone(),
                usage_cpu: s.usage_cpu,
                usage_memory: s.usage_memory,
                elapsed_sec,
                simulated_hours: elapsed_sec * factor / 3600.0,
            }
        })
        .collect()
}

/// Write converted rows as CSV with a header row
pub fn write_simulated_rows<W: Write>(writer: W, rows: &[SimulatedRow]) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(
        CSV_COLUMNS
            .iter()
            .chain(&["elapsed_sec", "simulated_hours"]),
    )?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
