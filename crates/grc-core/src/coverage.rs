//! Coverage labels used by crosswalk tables and their confidence equivalents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence assumed for a mapping that carries no coverage label at all.
pub const UNLABELED_CONFIDENCE: f64 = 0.85;

/// Qualitative strength of a cross-framework mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CoverageLevel {
    Full,
    Partial,
    Implicit,
    Weak,
}

impl CoverageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Partial => "Partial",
            Self::Implicit => "Implicit",
            Self::Weak => "Weak",
        }
    }
}

impl fmt::Display for CoverageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a free-text coverage label to a confidence value.
///
/// Unknown but non-empty labels get [`UNLABELED_CONFIDENCE`].
pub fn coverage_to_confidence(label: &str) -> f64 {
    match label.trim().to_lowercase().as_str() {
        "full" | "strong" | "direct" => 0.95,
        "partial" => 0.80,
        "implicit" => 0.70,
        "weak" | "minimal" | "limited" => 0.55,
        "none" | "--" | "" => 0.0,
        _ => UNLABELED_CONFIDENCE,
    }
}

/// Lower bounds for each coverage level; anything below `implicit` is Weak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageThresholds {
    pub full: f64,
    pub partial: f64,
    pub implicit: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            full: 0.90,
            partial: 0.75,
            implicit: 0.60,
        }
    }
}

impl CoverageThresholds {
    pub fn level(&self, confidence: f64) -> CoverageLevel {
        if confidence >= self.full {
            CoverageLevel::Full
        } else if confidence >= self.partial {
            CoverageLevel::Partial
        } else if confidence >= self.implicit {
            CoverageLevel::Implicit
        } else {
            CoverageLevel::Weak
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_to_confidence() {
        assert_eq!(coverage_to_confidence("Full"), 0.95);
        assert_eq!(coverage_to_confidence(" direct "), 0.95);
        assert_eq!(coverage_to_confidence("partial"), 0.80);
        assert_eq!(coverage_to_confidence("Implicit"), 0.70);
        assert_eq!(coverage_to_confidence("minimal"), 0.55);
        assert_eq!(coverage_to_confidence("--"), 0.0);
        assert_eq!(coverage_to_confidence(""), 0.0);
        assert_eq!(coverage_to_confidence("mostly"), UNLABELED_CONFIDENCE);
    }

    #[test]
    fn test_confidence_to_level_boundaries() {
        let t = CoverageThresholds::default();
        assert_eq!(t.level(0.95), CoverageLevel::Full);
        assert_eq!(t.level(0.90), CoverageLevel::Full);
        assert_eq!(t.level(0.80), CoverageLevel::Partial);
        assert_eq!(t.level(0.60), CoverageLevel::Implicit);
        assert_eq!(t.level(0.59), CoverageLevel::Weak);
        assert_eq!(t.level(0.0), CoverageLevel::Weak);
    }

    #[test]
    fn test_label_round_trip_is_stable() {
        let t = CoverageThresholds::default();
        for label in ["full", "partial", "implicit", "weak"] {
            let level = t.level(coverage_to_confidence(label));
            assert_eq!(level.as_str().to_lowercase(), label);
        }
    }
}
