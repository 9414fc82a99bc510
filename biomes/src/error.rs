//! Error types for biome configuration and snapshot persistence.
//!
//! Runtime removal/restore never produces these: those paths fail soft
//! (invalid handle, `false`, `None`). `BiomesError` covers loading assets,
//! encoding snapshots and misconfigured spawn sets.

use thiserror::Error;

/// Result type alias for fallible biome operations
pub type Result<T> = std::result::Result<T, BiomesError>;

#[derive(Error, Debug)]
pub enum BiomesError {
    /// A layer or node referenced a spawn set the preset does not define
    #[error("spawn set '{0}' not found in preset")]
    SetNotFound(String),

    /// Every candidate of the set has zero weight
    #[error("spawn set '{0}' has a total weight of zero")]
    ZeroWeight(String),

    /// Snapshot written by a different format version
    #[error("snapshot version mismatch: found v{found}, expected v{expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
