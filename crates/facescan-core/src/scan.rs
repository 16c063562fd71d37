//! Candidate scan: extract every face, compare against the references,
//! decide per image, copy matches, record outcomes.

use crate::config::{ConfigError, ScanConfig};
use crate::extractor::{ExtractError, IdentityExtractor, Strictness};
use crate::results::{write_results, ResultsError};
use crate::similarity::{ReferenceMatrix, SimilarityError};
use crate::source::{image_name, list_images};
use crate::types::{Face, MatchRecord};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal scan errors. Per-image failures never surface here.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot list candidates in {}: {source}", .path.display())]
    ListCandidates { path: PathBuf, source: io::Error },
    #[error("cannot create matches directory {}: {source}", .path.display())]
    MatchesDir { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Results(#[from] ResultsError),
}

/// Why a single image ended up without a score.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Similarity(#[from] SimilarityError),
    #[error("copying to {}: {source}", .dest.display())]
    Copy { dest: PathBuf, source: io::Error },
}

/// Per-image verdict before anything is written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub matched: bool,
    /// Highest face score seen; `None` when there were no faces.
    pub best_score: Option<f32>,
    /// Faces compared before the decision was reached.
    pub faces_evaluated: usize,
}

/// Counts for one scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub matched: usize,
    pub no_face: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Matched,
    Unmatched,
    NoFace,
    Failed,
}

impl ScanSummary {
    fn tally(&mut self, outcome: Outcome) {
        self.scanned += 1;
        match outcome {
            Outcome::Matched => self.matched += 1,
            Outcome::Unmatched => {}
            Outcome::NoFace => self.no_face += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Everything a scan run produced.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// One record per candidate, in processing order.
    pub records: Vec<MatchRecord>,
    pub summary: ScanSummary,
}

/// Scans candidate images against a fixed reference matrix.
pub struct ScanPipeline {
    config: ScanConfig,
    references: ReferenceMatrix,
}

impl ScanPipeline {
    pub fn new(config: ScanConfig, references: ReferenceMatrix) -> Result<Self, ScanError> {
        config.validate()?;
        tracing::debug!(
            threshold = config.threshold,
            bound = config.match_bound(),
            references = references.len(),
            dim = references.dim(),
            "scan pipeline ready"
        );
        Ok(Self { config, references })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Compare each face in order and stop at the first one scoring above
    /// `1 - threshold`. `best_score` is the maximum over the faces compared.
    pub fn decide(&self, faces: &[Face]) -> Result<Decision, SimilarityError> {
        let bound = self.config.match_bound();
        let mut decision = Decision {
            matched: false,
            best_score: None,
            faces_evaluated: 0,
        };

        for face in faces {
            let best = self.references.best_match(&face.embedding)?;
            decision.faces_evaluated += 1;
            decision.best_score = Some(decision.best_score.map_or(best.score, |s| s.max(best.score)));
            tracing::trace!(
                score = best.score,
                reference = self.references.label(best.index).unwrap_or_default(),
                "face compared"
            );
            if best.score > bound {
                decision.matched = true;
                break;
            }
        }

        Ok(decision)
    }

    /// Extract and decide for one image; nothing is copied or recorded.
    pub fn assess<E>(&self, extractor: &mut E, image: &Path) -> Result<Decision, ImageError>
    where
        E: IdentityExtractor + ?Sized,
    {
        let faces = extractor.extract(image, Strictness::Permissive)?;
        Ok(self.decide(&faces)?)
    }

    /// Scan one image: decide, copy on match, then build its record.
    ///
    /// Never fails; any error becomes an unmatched record without a score.
    pub fn scan_image<E>(&self, extractor: &mut E, image: &Path) -> MatchRecord
    where
        E: IdentityExtractor + ?Sized,
    {
        self.process(extractor, image).0
    }

    fn process<E>(&self, extractor: &mut E, image: &Path) -> (MatchRecord, Outcome)
    where
        E: IdentityExtractor + ?Sized,
    {
        let name = image_name(image);
        self.evaluate(extractor, image, &name).unwrap_or_else(|e| {
            tracing::warn!(file = %name, error = %e, "image failed");
            (MatchRecord::without_score(name), Outcome::Failed)
        })
    }

    fn evaluate<E>(&self, extractor: &mut E, image: &Path, name: &str) -> Result<(MatchRecord, Outcome), ImageError>
    where
        E: IdentityExtractor + ?Sized,
    {
        let decision = self.assess(extractor, image)?;
        let Some(score) = decision.best_score else {
            tracing::info!(file = %name, "no face");
            return Ok((MatchRecord::without_score(name), Outcome::NoFace));
        };

        if decision.matched {
            let dest = self.config.matches_dir.join(name);
            std::fs::copy(image, &dest).map_err(|source| ImageError::Copy { dest, source })?;
            tracing::info!(file = %name, score, faces = decision.faces_evaluated, "match");
            Ok((MatchRecord::scored(name, true, score), Outcome::Matched))
        } else {
            tracing::info!(file = %name, score, faces = decision.faces_evaluated, "no match");
            Ok((MatchRecord::scored(name, false, score), Outcome::Unmatched))
        }
    }

    /// Scan every image in the candidates directory and write the results file.
    pub fn run<E>(&self, extractor: &mut E) -> Result<ScanReport, ScanError>
    where
        E: IdentityExtractor + ?Sized,
    {
        let candidates_dir = &self.config.candidates_dir;
        let images = list_images(candidates_dir).map_err(|source| ScanError::ListCandidates {
            path: candidates_dir.clone(),
            source,
        })?;
        std::fs::create_dir_all(&self.config.matches_dir).map_err(|source| ScanError::MatchesDir {
            path: self.config.matches_dir.clone(),
            source,
        })?;

        tracing::info!(
            candidates = images.len(),
            dir = %candidates_dir.display(),
            threshold = self.config.threshold,
            "scan started"
        );

        let mut report = ScanReport {
            records: Vec::with_capacity(images.len()),
            summary: ScanSummary::default(),
        };
        for image in &images {
            let (record, outcome) = self.process(extractor, image);
            report.summary.tally(outcome);
            report.records.push(record);
        }

        write_results(&self.config.results_path, &report.records)?;
        tracing::info!(
            scanned = report.summary.scanned,
            matched = report.summary.matched,
            no_face = report.summary.no_face,
            failed = report.summary.failed,
            results = %self.config.results_path.display(),
            matches = %self.config.matches_dir.display(),
            "scan finished"
        );
        Ok(report)
    }
}
