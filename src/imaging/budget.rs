//! Size-bounded lossy encoding.
//!
//! Finds the highest quality whose encoded output fits a byte budget with a
//! binary search over the quality window, snapped to multiples of the
//! budget's step:
//!
//! ```text
//! low = quality_min, high = quality_max
//! while low <= high:
//!     q = snap((low + high) / 2)
//!     fits(q)  → remember q, low  = q + step
//!     too big → high = q - step
//! ```
//!
//! With the default window (5..=95, step 5) that is at most five encodes per
//! image. If no probe fits, the image is encoded once more at `quality_min`
//! and returned anyway: the budget is a target, not a ceiling.
//!
//! The search only looks at the encoder's output lengths, so for a
//! deterministic codec the chosen quality is reproducible run to run.

use super::backend::{CanonicalImage, ImageBackend, ImagingError};
use super::params::{EncodeBudget, Quality};
use tracing::debug;

/// Best encode found for a budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingResult {
    pub quality: u32,
    pub bytes: Vec<u8>,
    pub size_bytes: u64,
    /// `false` when nothing fit and this is the `quality_min` fallback.
    pub within_budget: bool,
}

/// Encode `image` at the highest probed quality that fits `budget`.
///
/// Only codec failures are errors; an unreachable budget is reported through
/// [`EncodingResult::within_budget`].
pub fn encode_within_budget(
    backend: &impl ImageBackend,
    image: &CanonicalImage,
    budget: &EncodeBudget,
) -> Result<EncodingResult, ImagingError> {
    let step = i64::from(budget.step.max(1));
    let floor = i64::from(budget.quality_min.value());
    let mut low = floor;
    let mut high = i64::from(budget.quality_max.value());
    let mut best: Option<EncodingResult> = None;

    while low <= high {
        // Snapping can land below a quality_min that is not a multiple of step.
        let probe = ((low + high) / 2 / step * step).max(floor);
        let quality = probe as u32;
        let bytes = backend.encode(image, Quality::new(quality))?;
        let size_bytes = bytes.len() as u64;

        if size_bytes <= budget.target_bytes {
            debug!(quality, size_bytes, "probe fits budget");
            if best.as_ref().is_none_or(|b| quality > b.quality) {
                best = Some(EncodingResult {
                    quality,
                    bytes,
                    size_bytes,
                    within_budget: true,
                });
            }
            low = probe + step;
        } else {
            debug!(quality, size_bytes, "probe over budget");
            high = probe - step;
        }
    }

    if let Some(result) = best {
        return Ok(result);
    }

    let quality = budget.quality_min.value();
    let bytes = backend.encode(image, budget.quality_min)?;
    debug!(
        quality,
        size_bytes = bytes.len(),
        target_bytes = budget.target_bytes,
        "budget unreachable, using minimum quality"
    );
    Ok(EncodingResult {
        quality,
        size_bytes: bytes.len() as u64,
        bytes,
        within_budget: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use image::RgbImage;
    use proptest::prelude::*;

    fn canvas() -> CanonicalImage {
        RgbImage::new(4, 4)
    }

    fn budget(target_bytes: u64) -> EncodeBudget {
        EncodeBudget {
            target_bytes,
            ..EncodeBudget::default()
        }
    }

    // Mock sizes are 1_000 + 100 * quality.

    /// Size table that never shrinks as quality rises: a running sum of
    /// `growth` (one entry per quality 0..=100) on top of a 500 byte floor.
    fn monotone_sizes(growth: &[usize]) -> impl Fn(u32) -> usize + Send + Sync + Clone + 'static {
        let table: Vec<usize> = growth
            .iter()
            .scan(500, |total, g| {
                *total += g;
                Some(*total)
            })
            .collect();
        move |quality| table[quality as usize]
    }

    #[test]
    fn everything_fits_selects_quality_max() {
        let backend = MockBackend::new();
        let result = encode_within_budget(&backend, &canvas(), &budget(1_000_000)).unwrap();

        assert_eq!(result.quality, 95);
        assert!(result.within_budget);
        assert_eq!(backend.encoded_qualities(), vec![50, 75, 85, 90, 95]);
    }

    #[test]
    fn selects_highest_fitting_quality() {
        let backend = MockBackend::new();
        // 1_000 + 100 * 60 = 7_000 fits, 65 would be 7_500
        let result = encode_within_budget(&backend, &canvas(), &budget(7_200)).unwrap();

        assert_eq!(result.quality, 60);
        assert_eq!(result.size_bytes, 7_000);
        assert_eq!(result.bytes.len(), 7_000);
        assert!(result.within_budget);
    }

    #[test]
    fn exact_budget_counts_as_fitting() {
        let backend = MockBackend::new();
        let result = encode_within_budget(&backend, &canvas(), &budget(6_000)).unwrap();
        assert_eq!(result.quality, 50);
        assert_eq!(result.size_bytes, 6_000);
    }

    #[test]
    fn unreachable_budget_falls_back_to_quality_min() {
        let backend = MockBackend::new();
        let result = encode_within_budget(&backend, &canvas(), &budget(10)).unwrap();

        assert_eq!(result.quality, 5);
        assert!(!result.within_budget);
        assert_eq!(result.size_bytes, 1_500);
        // 50, 25, 10, 5 then one fallback encode; never past the bound crossing.
        assert_eq!(backend.encoded_qualities(), vec![50, 25, 10, 5, 5]);
    }

    #[test]
    fn quality_min_off_the_step_grid_is_still_probed() {
        let backend = MockBackend::new();
        let budget = EncodeBudget {
            target_bytes: 1_350,
            quality_min: Quality::new(3),
            quality_max: Quality::new(20),
            step: 5,
        };
        let result = encode_within_budget(&backend, &canvas(), &budget).unwrap();

        assert_eq!(result.quality, 3);
        assert!(result.within_budget);
        assert!(backend.encoded_qualities().iter().all(|q| *q >= 3));
    }

    #[test]
    fn non_monotonic_sizes_still_keep_highest_fit() {
        fn bumpy(quality: u32) -> usize {
            if quality == 75 { 100 } else { 1_000 + quality as usize * 100 }
        }
        let backend = MockBackend::with_sizes(bumpy);
        let result = encode_within_budget(&backend, &canvas(), &budget(6_500)).unwrap();

        // 50 fits, 75 fits (bump), then 85 and 80 do not.
        assert_eq!(result.quality, 75);
        assert_eq!(backend.encoded_qualities(), vec![50, 75, 85, 80]);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let backend = MockBackend::new();
        let first = encode_within_budget(&backend, &canvas(), &budget(4_321)).unwrap();
        let second = encode_within_budget(&backend, &canvas(), &budget(4_321)).unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn larger_budget_never_lowers_quality(
            growth in prop::collection::vec(0usize..400, 101),
            a in 0u64..30_000,
            b in 0u64..30_000,
        ) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let backend = MockBackend::with_sizes(monotone_sizes(&growth));
            let q_small = encode_within_budget(&backend, &canvas(), &budget(small)).unwrap().quality;
            let q_large = encode_within_budget(&backend, &canvas(), &budget(large)).unwrap().quality;
            prop_assert!(q_small <= q_large);
        }

        #[test]
        fn monotone_sizes_yield_highest_fitting_step(
            growth in prop::collection::vec(0usize..400, 101),
            target in 0u64..30_000,
        ) {
            let sizes = monotone_sizes(&growth);
            let best = (5..=95)
                .step_by(5)
                .filter(|&q| sizes(q) as u64 <= target)
                .max();
            let backend = MockBackend::with_sizes(sizes);
            let result = encode_within_budget(&backend, &canvas(), &budget(target)).unwrap();
            match best {
                Some(quality) => {
                    prop_assert!(result.within_budget);
                    prop_assert_eq!(result.quality, quality);
                }
                None => {
                    prop_assert!(!result.within_budget);
                    prop_assert_eq!(result.quality, 5);
                }
            }
        }

        #[test]
        fn result_fits_whenever_reported_within_budget(target in 0u64..12_000) {
            let backend = MockBackend::new();
            let result = encode_within_budget(&backend, &canvas(), &budget(target)).unwrap();
            if result.within_budget {
                prop_assert!(result.size_bytes <= target);
            } else {
                prop_assert_eq!(result.quality, 5);
            }
        }
    }
}
