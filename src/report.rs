//! JSON run report written after a search.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::{SearchStats, Strategy};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Options the run was executed with, after CLI overrides and clamping.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOptions {
    pub strategy: Strategy,
    pub concurrency: usize,
    pub chunk_size: usize,
    pub timeout_secs: u64,
    pub priority_prefix: usize,
    pub verify_output: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub tool_version: String,
    pub config_hash: String,
    pub document_path: String,
    pub document_sha256: String,
    pub wordlist_path: String,
    pub options: ReportOptions,
    pub elapsed_seconds: f64,
    pub stats: SearchStats,
}

/// Write `report` as one pretty-printed JSON document, creating parent dirs.
pub fn write_report(path: &Path, report: &RunReport) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
