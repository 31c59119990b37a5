//! Score bands and the evaluation rule that maps a total to a diagnosis.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// One inclusive score range and the diagnosis it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub min: i64,
    pub max: i64,
    pub diagnosis: String,
}

impl ScoreBand {
    pub fn new(min: i64, max: i64, diagnosis: impl Into<String>) -> Self {
        Self {
            min,
            max,
            diagnosis: diagnosis.into(),
        }
    }

    pub fn contains(&self, total: i64) -> bool {
        (self.min..=self.max).contains(&total)
    }

    fn label(&self) -> String {
        format!("{}..={} ({})", self.min, self.max, self.diagnosis)
    }
}

/// Piecewise mapping from a total score to a diagnosis.
///
/// Bands are kept in declared order and evaluated first-match. Once
/// [`EvaluationRule::validate`] has passed, bands are disjoint, so the order
/// only matters for display and serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationRule {
    bands: Vec<ScoreBand>,
}

impl EvaluationRule {
    pub fn new(bands: Vec<ScoreBand>) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &[ScoreBand] {
        &self.bands
    }

    /// Find the band containing `total`.
    pub fn evaluate(&self, total: i64) -> Option<&ScoreBand> {
        self.bands.iter().find(|band| band.contains(total))
    }

    /// Check that bands are well-formed, disjoint, and cover `domain`.
    ///
    /// Bands may extend past the domain; such scores are unreachable but
    /// harmless.
    pub fn validate(&self, test: &str, domain: RangeInclusive<i64>) -> Result<(), CatalogError> {
        for band in &self.bands {
            if band.min > band.max {
                return Err(CatalogError::InvertedBand {
                    test: test.to_string(),
                    min: band.min,
                    max: band.max,
                });
            }
        }

        let mut sorted: Vec<&ScoreBand> = self.bands.iter().collect();
        sorted.sort_by_key(|band| (band.min, band.max));

        for pair in sorted.windows(2) {
            if pair[1].min <= pair[0].max {
                return Err(CatalogError::OverlappingBands {
                    test: test.to_string(),
                    first: pair[0].label(),
                    second: pair[1].label(),
                });
            }
        }

        let (low, high) = (*domain.start(), *domain.end());
        let uncovered = |score: i64| CatalogError::UncoveredScore {
            test: test.to_string(),
            score,
            min: low,
            max: high,
        };

        // Lowest score not yet known to be covered.
        let mut next = low;
        for band in sorted {
            if band.max < next {
                continue;
            }
            if band.min > next {
                return Err(uncovered(next));
            }
            match band.max.checked_add(1) {
                Some(after) if band.max < high => next = after,
                _ => return Ok(()),
            }
        }

        Err(uncovered(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glasgow() -> EvaluationRule {
        EvaluationRule::new(vec![
            ScoreBand::new(13, 15, "mild"),
            ScoreBand::new(9, 12, "moderate"),
            ScoreBand::new(3, 8, "severe"),
        ])
    }

    #[test]
    fn boundaries_are_inclusive() {
        let rule = glasgow();
        assert_eq!(rule.evaluate(15).unwrap().diagnosis, "mild");
        assert_eq!(rule.evaluate(13).unwrap().diagnosis, "mild");
        assert_eq!(rule.evaluate(12).unwrap().diagnosis, "moderate");
        assert_eq!(rule.evaluate(9).unwrap().diagnosis, "moderate");
        assert_eq!(rule.evaluate(8).unwrap().diagnosis, "severe");
        assert_eq!(rule.evaluate(3).unwrap().diagnosis, "severe");
        assert!(rule.evaluate(2).is_none());
        assert!(rule.evaluate(16).is_none());
    }

    #[test]
    fn glasgow_bands_cover_domain() {
        glasgow().validate("gcs", 3..=15).unwrap();
    }

    #[test]
    fn gap_is_rejected() {
        let rule = EvaluationRule::new(vec![
            ScoreBand::new(13, 15, "mild"),
            ScoreBand::new(3, 8, "severe"),
        ]);
        let err = rule.validate("gcs", 3..=15).unwrap_err();
        assert!(matches!(err, CatalogError::UncoveredScore { score: 9, .. }));
    }

    #[test]
    fn short_top_is_rejected() {
        let rule = EvaluationRule::new(vec![ScoreBand::new(3, 14, "any")]);
        let err = rule.validate("gcs", 3..=15).unwrap_err();
        assert!(matches!(err, CatalogError::UncoveredScore { score: 15, .. }));
    }

    #[test]
    fn short_bottom_is_rejected() {
        let rule = EvaluationRule::new(vec![ScoreBand::new(4, 15, "any")]);
        let err = rule.validate("gcs", 3..=15).unwrap_err();
        assert!(matches!(err, CatalogError::UncoveredScore { score: 3, .. }));
    }

    #[test]
    fn overlap_is_rejected() {
        let rule = EvaluationRule::new(vec![
            ScoreBand::new(3, 9, "severe"),
            ScoreBand::new(9, 15, "mild"),
        ]);
        let err = rule.validate("gcs", 3..=15).unwrap_err();
        assert!(matches!(err, CatalogError::OverlappingBands { .. }));
    }

    #[test]
    fn inverted_band_is_rejected() {
        let rule = EvaluationRule::new(vec![ScoreBand::new(15, 3, "backwards")]);
        assert!(matches!(
            rule.validate("gcs", 3..=15),
            Err(CatalogError::InvertedBand { .. })
        ));
    }

    #[test]
    fn empty_rule_never_covers() {
        let err = EvaluationRule::default().validate("empty", 0..=0).unwrap_err();
        assert!(matches!(err, CatalogError::UncoveredScore { score: 0, .. }));
    }

    #[test]
    fn bands_wider_than_domain_are_fine() {
        let rule = EvaluationRule::new(vec![
            ScoreBand::new(i64::MIN, 0, "low"),
            ScoreBand::new(1, i64::MAX, "high"),
        ]);
        rule.validate("wide", -5..=5).unwrap();
        rule.validate("wide", 0..=0).unwrap();
    }
}
