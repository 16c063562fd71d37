use anyhow::{Context, Result};
use facescan_core::{BuildConfig, ScanConfig, DEFAULT_THRESHOLD};
use facescan_vision::detector::SCRFD_CONFIDENCE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "facescan.toml";

/// Effective settings: file, then `FACESCAN_*` environment, then CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub threshold: f32,
    /// Detector score below which a face is ignored.
    pub min_face_confidence: f32,
    /// Directory holding `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    pub reference_dir: PathBuf,
    pub reference_store: PathBuf,
    pub candidates_dir: PathBuf,
    pub matches_dir: PathBuf,
    pub results: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let build = BuildConfig::default();
        let scan = ScanConfig::default();
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_face_confidence: SCRFD_CONFIDENCE_THRESHOLD,
            model_dir: PathBuf::from("models"),
            reference_dir: build.reference_dir,
            reference_store: build.store_path,
            candidates_dir: scan.candidates_dir,
            matches_dir: scan.matches_dir,
            results: scan.results_path,
        }
    }
}

impl Config {
    /// Overlay `FACESCAN_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay variables from `lookup`. Unparseable numbers are logged and
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.threshold = env_f32(&lookup, "FACESCAN_THRESHOLD", self.threshold);
        self.min_face_confidence =
            env_f32(&lookup, "FACESCAN_MIN_FACE_CONFIDENCE", self.min_face_confidence);

        let paths = [
            ("FACESCAN_MODEL_DIR", &mut self.model_dir),
            ("FACESCAN_REFERENCE_DIR", &mut self.reference_dir),
            ("FACESCAN_REFERENCE_STORE", &mut self.reference_store),
            ("FACESCAN_CANDIDATES_DIR", &mut self.candidates_dir),
            ("FACESCAN_MATCHES_DIR", &mut self.matches_dir),
            ("FACESCAN_RESULTS", &mut self.results),
        ];
        for (key, slot) in paths {
            if let Some(value) = lookup(key) {
                *slot = PathBuf::from(value);
            }
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            threshold: self.threshold,
            candidates_dir: self.candidates_dir.clone(),
            matches_dir: self.matches_dir.clone(),
            results_path: self.results.clone(),
        }
    }

    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            reference_dir: self.reference_dir.clone(),
            store_path: self.reference_store.clone(),
        }
    }
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable number");
            default
        }),
        None => default,
    }
}

/// Load the config file. An explicit path must exist; the default path is
/// optional and falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };
    if !required && !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn render_config(cfg: &Config) -> Result<String> {
    toml::to_string_pretty(cfg).context("rendering config as TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_project_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.threshold, 0.45);
        assert_eq!(cfg.reference_dir, PathBuf::from("data/reference"));
        assert_eq!(
            cfg.reference_store,
            PathBuf::from("data/output/reference_embeddings.json")
        );
        assert_eq!(cfg.candidates_dir, PathBuf::from("data/test_data"));
        assert_eq!(cfg.matches_dir, PathBuf::from("data/output/matches"));
        assert_eq!(cfg.results, PathBuf::from("data/output/results.csv"));
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facescan.toml");
        std::fs::write(&path, "threshold = 0.3\nmatches_dir = \"out/hits\"\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.threshold, 0.3);
        assert_eq!(cfg.matches_dir, PathBuf::from("out/hits"));
        assert_eq!(cfg.candidates_dir, PathBuf::from("data/test_data"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "threshold = \"high\"").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FACESCAN_THRESHOLD", "0.2"),
            ("FACESCAN_MIN_FACE_CONFIDENCE", "lots"),
            ("FACESCAN_MODEL_DIR", "/opt/models"),
            ("FACESCAN_RESULTS", "r.csv"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.threshold, 0.2);
        assert_eq!(cfg.min_face_confidence, SCRFD_CONFIDENCE_THRESHOLD);
        assert_eq!(cfg.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(cfg.results, PathBuf::from("r.csv"));
        assert_eq!(cfg.scan_config().results_path, PathBuf::from("r.csv"));
    }

    #[test]
    fn test_render_parses_back() {
        let mut cfg = Config::default();
        cfg.threshold = 0.6;
        let text = render_config(&cfg).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), cfg);
    }
}
