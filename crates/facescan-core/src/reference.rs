//! Reference store: reference image name → identity vector, persisted as JSON.
//!
//! Reference photos are assumed to show exactly one subject. When the
//! extractor finds several faces in a reference photo only the first is
//! kept; multi-face references are not supported.

use crate::config::BuildConfig;
use crate::extractor::{IdentityExtractor, Strictness};
use crate::similarity::{ReferenceMatrix, SimilarityError};
use crate::source::{image_name, list_images};
use crate::types::IdentityVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("cannot list reference images in {}: {source}", .path.display())]
    ListDir { path: PathBuf, source: io::Error },
    #[error("cannot read reference store {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("reference store {} is malformed: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write reference store {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("encoding reference store: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("reference {name} has {actual} dimensions, store has {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Reference image name → identity vector. All vectors share one dimension.
///
/// Keys are kept sorted so the file on disk is stable across rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceStore {
    entries: BTreeMap<String, IdentityVector>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a reference. Rejects a vector whose dimension differs
    /// from the vectors already stored.
    pub fn insert(&mut self, name: impl Into<String>, vector: IdentityVector) -> Result<(), ReferenceError> {
        let name = name.into();
        if let Some(expected) = self.dim() {
            if vector.dim() != expected {
                return Err(ReferenceError::DimensionMismatch {
                    name,
                    expected,
                    actual: vector.dim(),
                });
            }
        }
        self.entries.insert(name, vector);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&IdentityVector> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared dimension, or `None` for an empty store.
    pub fn dim(&self) -> Option<usize> {
        self.entries.values().next().map(IdentityVector::dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IdentityVector)> {
        self.entries.iter().map(|(name, vector)| (name.as_str(), vector))
    }

    /// Stack the store into the matrix the similarity engine scans.
    pub fn matrix(&self) -> Result<ReferenceMatrix, SimilarityError> {
        ReferenceMatrix::from_rows(self.iter())
    }

    /// Load a store written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: BTreeMap<String, IdentityVector> =
            serde_json::from_str(&raw).map_err(|source| ReferenceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut store = Self::new();
        for (name, vector) in parsed {
            store.insert(name, vector)?;
        }
        tracing::debug!(path = %path.display(), references = store.len(), "reference store loaded");
        Ok(store)
    }

    /// Write the store as a JSON object, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ReferenceError> {
        let write_err = |source: io::Error| ReferenceError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let data = serde_json::to_string(self).map_err(ReferenceError::Encode)?;
        std::fs::write(path, data).map_err(write_err)
    }
}

/// A reference image left out of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub file: String,
    pub reason: String,
}

/// Result of a reference build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub store: ReferenceStore,
    pub rejected: Vec<Rejection>,
}

impl BuildReport {
    pub fn accepted(&self) -> usize {
        self.store.len()
    }

    /// Reference images looked at, accepted or not.
    pub fn attempted(&self) -> usize {
        self.store.len() + self.rejected.len()
    }
}

/// Extract one identity vector per reference image in `reference_dir`.
///
/// Extraction runs with [`Strictness::Enforce`]. Images that yield no face,
/// fail to decode, or disagree on dimension are logged and skipped; only an
/// unreadable directory is fatal.
pub fn collect_references<E>(extractor: &mut E, reference_dir: &Path) -> Result<BuildReport, ReferenceError>
where
    E: IdentityExtractor + ?Sized,
{
    let images = list_images(reference_dir).map_err(|source| ReferenceError::ListDir {
        path: reference_dir.to_path_buf(),
        source,
    })?;

    let mut report = BuildReport::default();
    for path in &images {
        let name = image_name(path);
        let faces = match extractor.extract(path, Strictness::Enforce) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "reference rejected");
                report.rejected.push(Rejection { file: name, reason: e.to_string() });
                continue;
            }
        };

        let face_count = faces.len();
        let Some(first) = faces.into_iter().next() else {
            tracing::warn!(file = %name, "reference rejected: extractor returned no faces");
            report.rejected.push(Rejection { file: name, reason: "no face detected".into() });
            continue;
        };
        if face_count > 1 {
            tracing::debug!(file = %name, faces = face_count, "reference has several faces; keeping the first");
        }

        match report.store.insert(name.clone(), first.embedding) {
            Ok(()) => tracing::info!(file = %name, "reference accepted"),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "reference rejected");
                report.rejected.push(Rejection { file: name, reason: e.to_string() });
            }
        }
    }

    Ok(report)
}

/// Build the reference store from `config.reference_dir` and persist it to
/// `config.store_path`.
pub fn build_reference_store<E>(extractor: &mut E, config: &BuildConfig) -> Result<BuildReport, ReferenceError>
where
    E: IdentityExtractor + ?Sized,
{
    let report = collect_references(extractor, &config.reference_dir)?;
    report.store.save(&config.store_path)?;
    tracing::info!(
        path = %config.store_path.display(),
        accepted = report.accepted(),
        rejected = report.rejected.len(),
        "reference store saved"
    );
    if report.store.is_empty() {
        tracing::warn!("reference store is empty; scans will refuse to run");
    }
    Ok(report)
}
