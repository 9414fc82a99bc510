//! Bevy integration: the controller as a resource plus messages for
//! renderer compaction and partition streaming.

use bevy::prelude::*;
use std::marker::PhantomData;

use super::controller::InstanceController;
use super::world::{InstanceRelocation, InstanceWorld};

/// The renderer compacted a mesh on its own. Removals done through the
/// controller are tracked already and must not be reported again.
#[derive(Message, Debug, Clone)]
pub struct InstancesRelocated<M: Send + Sync + 'static> {
    pub mesh: M,
    pub relocations: Vec<InstanceRelocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    Loaded,
    /// Sent before the actor's content goes away
    Unloaded,
}

#[derive(Message, Debug, Clone)]
pub struct PartitionStreamed<A: Send + Sync + 'static> {
    pub actor: A,
    pub state: StreamingState,
}

/// Plugin for persistent instance removal over the world resource `W`
pub struct BiomesPlugin<W> {
    _world: PhantomData<fn() -> W>,
}

impl<W> Default for BiomesPlugin<W> {
    fn default() -> Self {
        Self {
            _world: PhantomData,
        }
    }
}

impl<W: InstanceWorld + Resource> Plugin for BiomesPlugin<W> {
    fn build(&self, app: &mut App) {
        app.init_resource::<InstanceController<W>>();
        app.add_message::<InstancesRelocated<W::MeshId>>();
        app.add_message::<PartitionStreamed<W::ActorId>>();
        app.add_systems(
            PostUpdate,
            (forward_relocations::<W>, forward_partition_streaming::<W>).chain(),
        );
    }
}

fn forward_relocations<W: InstanceWorld + Resource>(
    mut messages: MessageReader<InstancesRelocated<W::MeshId>>,
    mut controller: ResMut<InstanceController<W>>,
) {
    for message in messages.read() {
        controller.on_instances_relocated(message.mesh, &message.relocations);
    }
}

fn forward_partition_streaming<W: InstanceWorld + Resource>(
    mut messages: MessageReader<PartitionStreamed<W::ActorId>>,
    mut controller: ResMut<InstanceController<W>>,
    mut world: ResMut<W>,
) {
    for message in messages.read() {
        match message.state {
            StreamingState::Loaded => {
                controller.on_partition_loaded(&mut *world, message.actor);
            }
            StreamingState::Unloaded => controller.on_partition_unloaded(&*world, message.actor),
        }
    }
}
