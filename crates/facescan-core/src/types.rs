use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error("identity vector is empty")]
    Empty,
    #[error("identity vector component {index} is not finite ({value})")]
    NonFinite { index: usize, value: f32 },
}

/// Face identity vector (512-dimensional for ArcFace).
///
/// Always non-empty with finite components. Serializes as a plain array of
/// floats, so a reference store on disk is an object of name → array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct IdentityVector(Vec<f32>);

impl IdentityVector {
    pub fn new(values: Vec<f32>) -> Result<Self, VectorError> {
        if values.is_empty() {
            return Err(VectorError::Empty);
        }
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(VectorError::NonFinite { index, value });
        }
        Ok(Self(values))
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

impl TryFrom<Vec<f32>> for IdentityVector {
    type Error = VectorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<IdentityVector> for Vec<f32> {
    fn from(vector: IdentityVector) -> Self {
        vector.0
    }
}

/// One face found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub embedding: IdentityVector,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

/// Outcome of scanning one candidate image; one row of the results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub file: String,
    #[serde(rename = "match")]
    pub matched: bool,
    /// Best cosine similarity over the evaluated faces, rounded to 4 places.
    /// `None` when no face was found or the image could not be processed.
    pub score: Option<f64>,
}

impl MatchRecord {
    /// Record for an image that produced no comparable face.
    pub fn without_score(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            matched: false,
            score: None,
        }
    }

    pub fn scored(file: impl Into<String>, matched: bool, score: f32) -> Self {
        Self {
            file: file.into(),
            matched,
            score: Some(round_score(score)),
        }
    }
}

/// Round a similarity to 4 decimal places.
pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_rejects_empty() {
        assert_eq!(IdentityVector::new(vec![]), Err(VectorError::Empty));
    }

    #[test]
    fn test_vector_rejects_nan() {
        let err = IdentityVector::new(vec![0.5, f32::NAN, 1.0]).unwrap_err();
        assert!(matches!(err, VectorError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn test_vector_norm() {
        let v = IdentityVector::new(vec![3.0, 4.0]).unwrap();
        assert!((v.norm() - 5.0).abs() < 1e-6);
        assert_eq!(v.dim(), 2);
    }

    #[test]
    fn test_vector_json_is_plain_array() {
        let v = IdentityVector::new(vec![0.1, -0.25, 3.5]).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[0.1,-0.25,3.5]");
        let back: IdentityVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_vector_json_rejects_empty_array() {
        assert!(serde_json::from_str::<IdentityVector>("[]").is_err());
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123_456), 0.1235);
        assert_eq!(round_score(-0.987_66), -0.9877);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_record_without_score() {
        let r = MatchRecord::without_score("a.jpg");
        assert!(!r.matched);
        assert!(r.score.is_none());
    }
}
