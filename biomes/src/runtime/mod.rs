//! Runtime persistence of generated instances.
//!
//! Generated content is rebuilt from seeds on every load, so the only state
//! worth keeping is which instances the player removed. This module tracks
//! instance identity across renderer compaction and stores removals per
//! spawner or partition cell.

pub mod controller;
pub mod handle;
pub mod plugin;
pub mod scene;
pub mod snapshot;
pub mod tracker;
pub mod world;

pub use controller::{InstanceController, ReconcileSummary};
pub use handle::{GridCoord, GroupKey, InstanceHandle, InstanceRecord, PartitionKey, SavedTransform};
pub use plugin::{BiomesPlugin, InstancesRelocated, PartitionStreamed, StreamingState};
pub use snapshot::{load_snapshot, save_snapshot, PersistentInstances, SNAPSHOT_VERSION};
pub use tracker::InstanceTracker;
pub use world::{
    live_spawn_candidate, live_tag, live_user_data, ActorRole, InstanceRelocation, InstanceWorld,
    InstancedMesh,
};
