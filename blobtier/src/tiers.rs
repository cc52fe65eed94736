//! Tier table: which backend kind holds data of a given size

use std::fmt;

use crate::error::BlobError;
use crate::io::BackendKind;

/// Default damping factor applied to channel sizes before tier lookup
pub const DEFAULT_HYSTERESIS: f64 = 0.8;

/// One tier: backend kind and the largest size it should hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    pub kind: BackendKind,
    pub max_size: u64,
}

impl Tier {
    #[must_use]
    pub fn new(kind: BackendKind, max_size: u64) -> Self {
        Self { kind, max_size }
    }

    /// Catch-all tier without a size ceiling
    #[must_use]
    pub fn unbounded(kind: BackendKind) -> Self {
        Self::new(kind, u64::MAX)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} < {}", self.kind, self.max_size)
    }
}

/// Immutable, ascending list of tiers plus the materialization limit
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<Tier>,
    max_array_length: u64,
    hysteresis: f64,
}

impl TierTable {
    /// Build a table, sorting tiers by ascending ceiling
    ///
    /// Tiers with equal ceilings keep their given order; the first of them
    /// wins in `resolve`.
    ///
    /// # Errors
    ///
    /// Returns `BlobError::Config` if `tiers` is empty.
    pub fn new(tiers: Vec<Tier>, max_array_length: u64) -> Result<Self, BlobError> {
        Self::with_hysteresis(tiers, max_array_length, DEFAULT_HYSTERESIS)
    }

    /// # Errors
    ///
    /// Returns `BlobError::Config` if `tiers` is empty or `hysteresis`
    /// is not in `(0, 1]`.
    pub fn with_hysteresis(
        mut tiers: Vec<Tier>,
        max_array_length: u64,
        hysteresis: f64,
    ) -> Result<Self, BlobError> {
        if tiers.is_empty() {
            return Err(BlobError::Config("tier table needs at least one tier".into()));
        }
        if !(hysteresis > 0.0 && hysteresis <= 1.0) {
            return Err(BlobError::Config(format!(
                "hysteresis must be in (0, 1], got {hysteresis}"
            )));
        }
        tiers.sort_by_key(|tier| tier.max_size);
        Ok(Self {
            tiers,
            max_array_length,
            hysteresis,
        })
    }

    /// First tier (ascending) whose ceiling is at least `size`
    ///
    /// # Errors
    ///
    /// Returns `BlobError::NoTierForSize` if `size` is above every ceiling.
    pub fn resolve(&self, size: u64) -> Result<BackendKind, BlobError> {
        self.tiers
            .iter()
            .find(|tier| tier.max_size >= size)
            .map(|tier| tier.kind)
            .ok_or_else(|| BlobError::NoTierForSize {
                size,
                tiers: self.to_string(),
            })
    }

    /// Size used for tier lookup while a channel grows
    ///
    /// Scaling down by the hysteresis factor delays an upward switch until
    /// the data is well past the ceiling, so writes near a boundary do not
    /// bounce between tiers.
    #[must_use]
    pub fn projected_size(&self, size: u64) -> u64 {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let projected = (size as f64 * self.hysteresis) as u64;
        projected
    }

    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Largest payload `read_all` will materialize
    #[must_use]
    pub fn max_array_length(&self) -> u64 {
        self.max_array_length
    }

    #[must_use]
    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }
}

impl Default for TierTable {
    /// A single unbounded in-memory tier and no materialization limit
    fn default() -> Self {
        Self {
            tiers: vec![Tier::unbounded(BackendKind::Memory)],
            max_array_length: u64::MAX,
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }
}

impl fmt::Display for TierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, tier) in self.tiers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{tier}")?;
        }
        f.write_str("]")
    }
}
