//! Distance metrics
//!
//! Both metrics are "smaller is closer" and return exactly 0.0 for identical
//! non-zero inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric, fixed when an index is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance
    #[default]
    L2,
    /// 1 - cosine similarity
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
        }
    }

    /// On-disk tag
    pub fn to_byte(self) -> u8 {
        match self {
            Self::L2 => 0,
            Self::Cosine => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::L2),
            1 => Some(Self::Cosine),
            _ => None,
        }
    }

    /// Distance between two vectors of equal length
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::L2 => squared_l2(a, b),
            Self::Cosine => cosine_distance(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" | "cos" => Ok(Self::Cosine),
            other => Err(format!("unknown metric '{}' (expected 'l2' or 'cosine')", other)),
        }
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Zero vectors are treated as identical to each other and orthogonal to
/// everything else.
#[inline]
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 && norm_b == 0.0 {
        return 0.0;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    // sqrt(n * n) == n exactly, so identical inputs land on a similarity of 1.0
    let similarity = (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0);
    (1.0 - similarity).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_is_squared() {
        let d = Metric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert_eq!(d, 25.0);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        let orthogonal = Metric::Cosine.distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((orthogonal - 1.0).abs() < 1e-6);

        let opposite = Metric::Cosine.distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((opposite - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_identical_vectors_are_zero() {
        let v = [0.3, -1.2, 4.5, 0.01];
        assert_eq!(Metric::L2.distance(&v, &v), 0.0);
        assert_eq!(Metric::Cosine.distance(&v, &v), 0.0);
    }

    #[test]
    fn test_cosine_zero_vectors() {
        assert_eq!(Metric::Cosine.distance(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(Metric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_metric_parse_and_byte_tags() {
        assert_eq!("L2".parse::<Metric>().unwrap(), Metric::L2);
        assert_eq!("cosine".parse::<Metric>().unwrap(), Metric::Cosine);
        assert!("manhattan".parse::<Metric>().is_err());

        for metric in [Metric::L2, Metric::Cosine] {
            assert_eq!(Metric::from_byte(metric.to_byte()), Some(metric));
        }
        assert_eq!(Metric::from_byte(7), None);
    }
}
