#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure overlap scorer that compares a ground-truth mask with a rasterized polygon.
//!
//! Both grids are reduced to three counts (mask coverage, polygon coverage and
//! their intersection) which a [`ScoringStrategy`] turns into an accuracy
//! percentage. Every strategy shares the degenerate-mask rule: when the mask
//! has no coverage, an empty polygon is perfect and anything drawn is wrong.

use mask_trace_core::{Accuracy, Bitmap, ScoringStrategy};
use thiserror::Error;

/// Errors raised when two grids cannot be compared.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    /// The grids have different dimensions.
    #[error("mask is {mask_width}x{mask_height} but polygon raster is {poly_width}x{poly_height}")]
    DimensionMismatch {
        /// Width of the mask.
        mask_width: u32,
        /// Height of the mask.
        mask_height: u32,
        /// Width of the polygon raster.
        poly_width: u32,
        /// Height of the polygon raster.
        poly_height: u32,
    },
    /// A weighted strategy was configured with a negative or non-finite weight.
    #[error("scoring weights must be finite and non-negative")]
    InvalidWeights,
}

/// Pixel tallies shared by every scoring strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct OverlapCounts {
    /// Cells set in the mask.
    pub mask_white: u64,
    /// Cells set in the polygon raster.
    pub poly_white: u64,
    /// Cells set in both grids.
    pub overlap: u64,
    /// Cells in either grid.
    pub total: u64,
}

impl OverlapCounts {
    /// Counts coverage over two equal-sized grids.
    pub fn tally(mask: &Bitmap, poly: &Bitmap) -> Result<Self, ScoringError> {
        if mask.dimensions() != poly.dimensions() {
            return Err(ScoringError::DimensionMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                poly_width: poly.width(),
                poly_height: poly.height(),
            });
        }

        let mut counts = Self {
            total: mask.cells().len() as u64,
            ..Self::default()
        };
        for (in_mask, in_poly) in mask.cells().iter().zip(poly.cells()) {
            if *in_mask {
                counts.mask_white += 1;
            }
            if *in_poly {
                counts.poly_white += 1;
            }
            if *in_mask && *in_poly {
                counts.overlap += 1;
            }
        }
        Ok(counts)
    }

    /// Ground-truth cells the polygon missed.
    #[must_use]
    pub const fn false_negatives(&self) -> u64 {
        self.mask_white.saturating_sub(self.overlap)
    }

    /// Polygon cells outside the ground truth.
    #[must_use]
    pub const fn false_positives(&self) -> u64 {
        self.poly_white.saturating_sub(self.overlap)
    }

    /// Cells that are not part of the ground truth.
    #[must_use]
    pub const fn mask_black(&self) -> u64 {
        self.total.saturating_sub(self.mask_white)
    }
}

/// Checks that a strategy can be evaluated.
pub fn validate(strategy: &ScoringStrategy) -> Result<(), ScoringError> {
    match *strategy {
        ScoringStrategy::WeightedOverlap {
            false_negative_weight,
            false_positive_weight,
        } => {
            let valid = |weight: f64| weight.is_finite() && weight >= 0.0;
            if valid(false_negative_weight) && valid(false_positive_weight) {
                Ok(())
            } else {
                Err(ScoringError::InvalidWeights)
            }
        }
        ScoringStrategy::PrecisionPenalized => Ok(()),
    }
}

/// Converts overlap counts into an accuracy using the provided strategy.
#[must_use]
pub fn accuracy(counts: &OverlapCounts, strategy: &ScoringStrategy) -> Accuracy {
    if counts.mask_white == 0 {
        return if counts.poly_white == 0 {
            Accuracy::PERFECT
        } else {
            Accuracy::ZERO
        };
    }

    let overlap = counts.overlap as f64;
    match *strategy {
        ScoringStrategy::WeightedOverlap {
            false_negative_weight,
            false_positive_weight,
        } => {
            let weighted_union = overlap
                + false_negative_weight * counts.false_negatives() as f64
                + false_positive_weight * counts.false_positives() as f64;
            if weighted_union > 0.0 {
                Accuracy::new(overlap / weighted_union * 100.0)
            } else {
                Accuracy::ZERO
            }
        }
        ScoringStrategy::PrecisionPenalized => {
            let recall = overlap / counts.mask_white as f64;
            let mask_black = counts.mask_black();
            let spill = if mask_black == 0 {
                0.0
            } else {
                counts.false_positives() as f64 / mask_black as f64
            };
            Accuracy::new((recall - spill).max(0.0) * 100.0)
        }
    }
}

/// Scores a polygon raster against a mask.
pub fn score(
    mask: &Bitmap,
    poly: &Bitmap,
    strategy: &ScoringStrategy,
) -> Result<Accuracy, ScoringError> {
    validate(strategy)?;
    let counts = OverlapCounts::tally(mask, poly)?;
    Ok(accuracy(&counts, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(mask_white: u64, poly_white: u64, overlap: u64, total: u64) -> OverlapCounts {
        OverlapCounts {
            mask_white,
            poly_white,
            overlap,
            total,
        }
    }

    #[test]
    fn weighted_overlap_charges_misses_more_than_spill() {
        let strategy = ScoringStrategy::default();
        let missed = accuracy(&counts(100, 80, 80, 1_000), &strategy);
        let spilled = accuracy(&counts(100, 120, 100, 1_000), &strategy);

        assert!((missed.get() - 80.0).abs() < 1e-9);
        assert!((spilled.get() - 100.0 / 116.0 * 100.0).abs() < 1e-9);
        assert!(spilled > missed, "20 extra pixels cost less than 20 missed");
    }

    #[test]
    fn precision_penalized_subtracts_background_share() {
        let strategy = ScoringStrategy::PrecisionPenalized;
        let result = accuracy(&counts(100, 150, 90, 1_100), &strategy);
        let expected = (0.9 - 60.0 / 1_000.0) * 100.0;
        assert!((result.get() - expected).abs() < 1e-9);
    }

    #[test]
    fn precision_penalized_floors_at_zero() {
        let strategy = ScoringStrategy::PrecisionPenalized;
        let result = accuracy(&counts(10, 110, 1, 20), &strategy);
        assert_eq!(result, Accuracy::ZERO);
    }

    #[test]
    fn precision_penalized_handles_full_mask() {
        let strategy = ScoringStrategy::PrecisionPenalized;
        let result = accuracy(&counts(16, 8, 8, 16), &strategy);
        assert!((result.get() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_never_divide_by_zero() {
        let strategy = ScoringStrategy::WeightedOverlap {
            false_negative_weight: 0.0,
            false_positive_weight: 0.0,
        };
        assert_eq!(accuracy(&counts(10, 5, 0, 50), &strategy), Accuracy::ZERO);
    }

    #[test]
    fn negative_weights_are_rejected() {
        let strategy = ScoringStrategy::WeightedOverlap {
            false_negative_weight: -1.0,
            false_positive_weight: 0.8,
        };
        assert_eq!(validate(&strategy), Err(ScoringError::InvalidWeights));
    }
}
