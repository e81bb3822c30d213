//! Parameter types for image re-encoding.
//!
//! These structs describe *what* the encoder should aim for, not *how* the
//! pixels get compressed. They sit between the conversion pool (which decides
//! which files to convert) and the [`backend`](super::backend) (which owns the
//! codec), so a mock backend can be swapped in without touching search logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (0–100). Clamped on construction.
//! - [`EncodeBudget`]: byte budget plus the quality window and step the
//!   search is allowed to probe.

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u32);

impl Quality {
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Target size and quality search window for one encode.
///
/// The budget is best-effort: when even `quality_min` overshoots
/// `target_bytes`, the encoder still returns the `quality_min` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeBudget {
    /// Maximum encoded size in bytes, if avoidable.
    pub target_bytes: u64,
    pub quality_min: Quality,
    pub quality_max: Quality,
    /// Probes are snapped to multiples of this value.
    pub step: u32,
}

impl EncodeBudget {
    /// Budget expressed in KiB, as the site config does (`target_kb = 120`).
    pub fn from_kilobytes(target_kb: u64, quality_min: u32, quality_max: u32, step: u32) -> Self {
        Self {
            target_bytes: target_kb * 1024,
            quality_min: Quality::new(quality_min),
            quality_max: Quality::new(quality_max),
            step: step.max(1),
        }
    }
}

impl Default for EncodeBudget {
    fn default() -> Self {
        Self::from_kilobytes(120, 5, 95, 5)
    }
}
