//! Cosine similarity of one query vector against every reference vector.

use crate::types::IdentityVector;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimilarityError {
    #[error("reference set is empty; build the reference store first")]
    EmptyReferences,
    #[error("reference {label} has {actual} dimensions, expected {expected}")]
    RaggedReferences {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("query has {actual} dimensions, references have {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("reference matrix shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Best similarity of a query against the reference matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    /// Row of the reference that produced `score`.
    pub index: usize,
}

/// N reference vectors stacked row-wise, with precomputed row norms.
///
/// Never empty, never ragged. Read-only once built.
#[derive(Debug, Clone)]
pub struct ReferenceMatrix {
    vectors: Array2<f32>,
    norms: Array1<f32>,
    labels: Vec<String>,
}

impl ReferenceMatrix {
    /// Stack labelled vectors into a matrix.
    pub fn from_rows<'a, I>(rows: I) -> Result<Self, SimilarityError>
    where
        I: IntoIterator<Item = (&'a str, &'a IdentityVector)>,
    {
        let mut labels = Vec::new();
        let mut flat = Vec::new();
        let mut dim = None;

        for (label, vector) in rows {
            let expected = *dim.get_or_insert(vector.dim());
            if vector.dim() != expected {
                return Err(SimilarityError::RaggedReferences {
                    label: label.to_string(),
                    expected,
                    actual: vector.dim(),
                });
            }
            labels.push(label.to_string());
            flat.extend_from_slice(vector.as_slice());
        }

        let dim = dim.ok_or(SimilarityError::EmptyReferences)?;
        let vectors = Array2::from_shape_vec((labels.len(), dim), flat)?;
        let norms = vectors.map_axis(Axis(1), |row| row.dot(&row).sqrt());

        Ok(Self {
            vectors,
            norms,
            labels,
        })
    }

    /// Number of reference vectors.
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    /// Always false; an empty matrix cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Name of the reference image behind row `index`.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Cosine similarity of `query` against every row; returns the maximum.
    ///
    /// A zero-norm query or row scores 0.0. Results are clamped to [-1, 1]
    /// so rounding noise can never push a self-match above 1.0. Ties keep
    /// the earliest row.
    pub fn best_match(&self, query: &IdentityVector) -> Result<BestMatch, SimilarityError> {
        if query.dim() != self.dim() {
            return Err(SimilarityError::DimensionMismatch {
                expected: self.dim(),
                actual: query.dim(),
            });
        }

        let q = ArrayView1::from(query.as_slice());
        let query_norm = q.dot(&q).sqrt();
        let dots = self.vectors.dot(&q);

        let mut best = BestMatch {
            score: f32::NEG_INFINITY,
            index: 0,
        };
        for (index, (&dot, &norm)) in dots.iter().zip(self.norms.iter()).enumerate() {
            let denom = norm * query_norm;
            let score = if denom > 0.0 {
                (dot / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            if score > best.score {
                best = BestMatch { score, index };
            }
        }

        Ok(best)
    }
}
