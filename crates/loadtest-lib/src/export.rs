//! Export of collected samples
//!
//! Writes samples as CSV with the fixed column order
//! `timestamp, node_id, node_name, pod_name, usage_cpu, usage_memory`
//! and reads them back without loss.

use crate::models::{RunResult, Sample};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Column order of the exported artifact
pub const CSV_COLUMNS: [&str; 6] = [
    "timestamp",
    "node_id",
    "node_name",
    "pod_name",
    "usage_cpu",
    "usage_memory",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("unexpected CSV header {found:?}")]
    Header { found: Vec<String> },
}

/// Consumer of a finished run
pub trait RunExporter: Send + Sync {
    fn export(&self, result: &RunResult) -> Result<(), ExportError>;
}

/// Write samples as CSV with a header row
pub fn write_samples<W: Write>(writer: W, samples: &[Sample]) -> Result<(), ExportError> {
    // Header is written by hand so an empty run still gets one
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CSV_COLUMNS)?;
    for sample in samples {
        wtr.serialize(sample)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Read samples written by `write_samples`
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<Sample>, ExportError> {
    let mut rdr = csv::Reader::from_reader(reader);

    let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if header != CSV_COLUMNS {
        return Err(ExportError::Header { found: header });
    }

    rdr.deserialize()
        .collect::<Result<Vec<Sample>, csv::Error>>()
        .map_err(ExportError::from)
}

/// Exports the samples of a run to a CSV file
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a previously exported file
    pub fn load(&self) -> Result<Vec<Sample>, ExportError> {
        let file = File::open(&self.path).map_err(|source| ExportError::Io {
            path: self.path.clone(),
            source,
        })?;
        read_samples(file)
    }
}

impl RunExporter for CsvExporter {
    fn export(&self, result: &RunResult) -> Result<(), ExportError> {
        let file = File::create(&self.path).map_err(|source| ExportError::Io {
            path: self.path.clone(),
            source,
        })?;
        write_samples(file, &result.samples)?;

        info!(
            path = %self.path.display(),
            rows = result.samples.len(),
            "Usage data exported"
        );
        Ok(())
    }
}
