//! Persistent snapshot of every removed instance.
//!
//! This is the only state that outlives a session. It is saved with bincode
//! like the rest of our binary data, and written atomically (temp file +
//! rename) so a crash mid-save leaves the previous file intact.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::handle::{InstanceRecord, PartitionKey};
use crate::error::{BiomesError, Result};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainInstances {
    pub guid: Uuid,
    pub instances: Vec<InstanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedInstances {
    pub partition: PartitionKey,
    pub instances: Vec<InstanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentInstances {
    /// Format version, always the first field
    pub version: u32,

    // === Group registries (positions are embedded in handles) ===
    pub mains: Vec<Uuid>,
    pub partitions: Vec<PartitionKey>,

    // === Removed instances per group ===
    pub main_instances: Vec<MainInstances>,
    pub partitioned_instances: Vec<PartitionedInstances>,
}

impl Default for PersistentInstances {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            mains: Vec::new(),
            partitions: Vec::new(),
            main_instances: Vec::new(),
            partitioned_instances: Vec::new(),
        }
    }
}

impl PersistentInstances {
    pub fn instance_count(&self) -> usize {
        self.main_instances.iter().map(|group| group.instances.len()).sum::<usize>()
            + self
                .partitioned_instances
                .iter()
                .map(|group| group.instances.len())
                .sum::<usize>()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a snapshot. The version is checked before the body so a
    /// snapshot from another format version is reported as such rather than
    /// as garbage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let version: u32 = bincode::deserialize(bytes)?;
        if version != SNAPSHOT_VERSION {
            return Err(BiomesError::VersionMismatch {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Save a snapshot (atomic write via temp file).
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &PersistentInstances) -> Result<()> {
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    let bytes = snapshot.to_bytes()?;
    std::fs::write(&temp_path, &bytes)?;
    std::fs::rename(&temp_path, path)?;

    info!(
        "Saved {} removed instances to {} ({} bytes)",
        snapshot.instance_count(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

/// Load a snapshot. A file from another format version is copied to
/// `<name>.v<found>.backup` before the error is returned.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<PersistentInstances> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;

    match PersistentInstances::from_bytes(&bytes) {
        Err(BiomesError::VersionMismatch { found, expected }) => {
            let backup_path = backup_path(path, found);
            if let Err(e) = std::fs::copy(path, &backup_path) {
                warn!("Failed to backup snapshot v{}: {}", found, e);
            } else {
                warn!(
                    "Snapshot {} is v{}, expected v{}. Backed up to {}",
                    path.display(),
                    found,
                    expected,
                    backup_path.display()
                );
            }
            Err(BiomesError::VersionMismatch { found, expected })
        }
        other => other,
    }
}

fn backup_path(path: &Path, version: u32) -> PathBuf {
    path.with_extension(format!("v{}.backup", version))
}
