//! Vector similarity metrics.
//!
//! All functions return a similarity where **higher is better**, so search
//! and MMR can rank uniformly regardless of the configured metric.

use serde::{Deserialize, Serialize};

/// Similarity function used by an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimilarityMetric {
    /// Cosine of the angle between the vectors. Range: \[-1, 1\].
    #[default]
    Cosine,
    /// Raw dot product. Equivalent to cosine for unit vectors.
    DotProduct,
    /// `1 / (1 + L2 distance)`. Range: (0, 1\].
    Euclidean,
}

impl SimilarityMetric {
    /// Compute the similarity between two vectors under this metric.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::DotProduct => dot(a, b),
            SimilarityMetric::Euclidean => {
                let dist_sq: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                1.0 / (1.0 + dist_sq.sqrt())
            }
        }
    }

    /// The name used in Atlas-style index definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::DotProduct => "dotProduct",
            SimilarityMetric::Euclidean => "euclidean",
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "dotProduct" | "dot_product" | "dot" => Ok(SimilarityMetric::DotProduct),
            "euclidean" => Ok(SimilarityMetric::Euclidean),
            other => Err(format!("unknown similarity metric '{other}'")),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn euclidean_similarity_is_one_for_identical_vectors() {
        let v = [0.3, -0.4];
        assert!((SimilarityMetric::Euclidean.similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(SimilarityMetric::Euclidean.similarity(&v, &[3.0, 4.0]) < 0.5);
    }

    #[test]
    fn metric_names_round_trip_through_from_str() {
        for metric in
            [SimilarityMetric::Cosine, SimilarityMetric::DotProduct, SimilarityMetric::Euclidean]
        {
            assert_eq!(metric.as_str().parse::<SimilarityMetric>().unwrap(), metric);
        }
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
    }
}
