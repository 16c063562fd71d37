//! Results CSV: one `file,match,score` row per scanned image.

use crate::types::MatchRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER: [&str; 3] = ["file", "match", "score"];

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("cannot write results {}: {source}", .path.display())]
    Write { path: PathBuf, source: csv::Error },
    #[error("cannot read results {}: {source}", .path.display())]
    Read { path: PathBuf, source: csv::Error },
    #[error("cannot create results directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Write `records` in order, header first. An empty run still gets a header.
pub fn write_results(path: &Path, records: &[MatchRecord]) -> Result<(), ResultsError> {
    let write_err = |source: csv::Error| ResultsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ResultsError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(write_err)?;
    writer.write_record(HEADER).map_err(write_err)?;
    for record in records {
        writer.serialize(record).map_err(write_err)?;
    }
    writer.flush().map_err(|e| write_err(e.into()))?;
    Ok(())
}

/// Read a results file written by [`write_results`].
pub fn read_results(path: &Path) -> Result<Vec<MatchRecord>, ResultsError> {
    let read_err = |source: csv::Error| ResultsError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<MatchRecord>, _>>()
        .map_err(read_err)
}
