use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default match strictness. Calibrated against the `1 - threshold` bound.
pub const DEFAULT_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be a finite number in [0, 2], got {0}")]
    InvalidThreshold(f32),
}

/// Settings for one scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Distance-style strictness. An image matches when some face scores a
    /// cosine similarity strictly greater than `1 - threshold`; smaller is
    /// stricter.
    pub threshold: f32,
    /// Directory of images to scan.
    pub candidates_dir: PathBuf,
    /// Matched images are copied here under their original names.
    pub matches_dir: PathBuf,
    /// CSV results file (`file,match,score`).
    pub results_path: PathBuf,
}

impl ScanConfig {
    /// Lowest cosine similarity that does NOT match; scores must exceed it.
    pub fn match_bound(&self) -> f32 {
        1.0 - self.threshold
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || !(0.0..=2.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            candidates_dir: PathBuf::from("data/test_data"),
            matches_dir: PathBuf::from("data/output/matches"),
            results_path: PathBuf::from("data/output/results.csv"),
        }
    }
}

/// Settings for building the reference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Directory of clean, single-person reference photos.
    pub reference_dir: PathBuf,
    /// JSON file the store is written to.
    pub store_path: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from("data/reference"),
            store_path: PathBuf::from("data/output/reference_embeddings.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bound() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.threshold, 0.45);
        assert!((cfg.match_bound() - 0.55).abs() < 1e-6);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_extreme_thresholds_are_valid() {
        for threshold in [0.0, 1.0, 2.0] {
            let cfg = ScanConfig { threshold, ..ScanConfig::default() };
            assert!(cfg.validate().is_ok(), "threshold {threshold}");
        }
    }

    #[test]
    fn test_invalid_thresholds() {
        for threshold in [f32::NAN, f32::INFINITY, -0.1, 2.5] {
            let cfg = ScanConfig { threshold, ..ScanConfig::default() };
            assert!(cfg.validate().is_err(), "threshold {threshold}");
        }
    }
}
