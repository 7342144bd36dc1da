//! Draw group batching
//!
//! Turns the producer's ordered draw groups into a flat command list: a
//! binding command only where mesh, texture or shader differs from the
//! previous drawn group, then one instanced draw per group at a running
//! base-instance offset. The list is plain data and is replayed into the
//! backend afterwards.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::render::api::frame_data::DrawGroup;
use crate::render::api::render_backend::RenderBackend;
use crate::render::api::resources::{MeshId, ShaderId, TextureId};
use crate::render::{RenderError, RenderResult};

/// What to do with a draw group that has no instances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyGroupPolicy {
    /// Treat the group as absent: no bindings, no draw
    #[default]
    Skip,
    /// Fail the frame with [`RenderError::EmptyDrawGroup`]
    Reject,
}

bitflags! {
    /// GPU state a group has to rebind relative to the previous drawn group
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StateChanges: u8 {
        /// Vertex/index buffers
        const MESH = 1 << 0;
        /// Sampled texture
        const TEXTURE = 1 << 1;
        /// Pipeline state
        const SHADER = 1 << 2;
    }
}

/// One recorded backend command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCommand {
    /// Bind a mesh's vertex and index buffers
    BindMesh(MeshId),
    /// Bind a texture
    BindTexture(TextureId),
    /// Bind a shader's pipeline
    BindShader(ShaderId),
    /// Instanced draw of the bound mesh
    Draw {
        /// Mesh being drawn, for the index count
        mesh: MeshId,
        /// First instance in the slot's instance region
        base_instance: u32,
        /// Number of instances
        instance_count: u32,
    },
}

/// Contiguous range of the instance array drawn by one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// First instance index
    pub start: u32,
    /// Number of instances
    pub count: u32,
}

impl DrawRange {
    /// One past the last instance index
    pub fn end(&self) -> u32 {
        self.start + self.count
    }
}

/// Derive each group's instance range and check the frame's invariants
///
/// The group counts must add up to `instance_count`, which must fit in
/// `capacity`. Ranges are returned in group order.
pub fn plan_ranges(groups: &[DrawGroup], instance_count: usize, capacity: usize) -> RenderResult<Vec<DrawRange>> {
    if instance_count > capacity {
        return Err(RenderError::CapacityExceeded {
            requested: instance_count,
            capacity,
        });
    }

    let mut ranges = Vec::with_capacity(groups.len());
    let mut start: usize = 0;
    for group in groups {
        let count = group.instance_count as usize;
        let end = start.saturating_add(count);
        if end > capacity {
            return Err(RenderError::CapacityExceeded { requested: end, capacity });
        }
        ranges.push(DrawRange {
            start: start as u32,
            count: group.instance_count,
        });
        start = end;
    }

    if start != instance_count {
        return Err(RenderError::GroupCountMismatch {
            grouped: start,
            instances: instance_count,
        });
    }
    Ok(ranges)
}

/// Commands recorded for one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    commands: Vec<DrawCommand>,
}

impl CommandList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands in order
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw commands
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Draw { .. }))
            .count()
    }

    /// Drop all commands, keeping the allocation
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Fail with `MissingResource` if a binding names an id the backend lacks
    pub fn check_resources<B: RenderBackend>(&self, backend: &B) -> RenderResult<()> {
        for command in &self.commands {
            let missing = match *command {
                DrawCommand::BindMesh(mesh) if !backend.has_mesh(mesh) => Some((MeshId::KIND, mesh.0)),
                DrawCommand::BindTexture(texture) if !backend.has_texture(texture) => {
                    Some((TextureId::KIND, texture.0))
                }
                DrawCommand::BindShader(shader) if !backend.has_shader(shader) => Some((ShaderId::KIND, shader.0)),
                _ => None,
            };
            if let Some((kind, id)) = missing {
                return Err(RenderError::MissingResource { kind, id });
            }
        }
        Ok(())
    }

    /// Issue every command to the backend in order
    pub fn replay<B: RenderBackend>(&self, backend: &mut B) -> RenderResult<()> {
        for command in &self.commands {
            match *command {
                DrawCommand::BindMesh(mesh) => backend.bind_mesh(mesh)?,
                DrawCommand::BindTexture(texture) => backend.bind_texture(texture)?,
                DrawCommand::BindShader(shader) => backend.bind_shader(shader)?,
                DrawCommand::Draw {
                    mesh,
                    base_instance,
                    instance_count,
                } => backend.draw_instanced(mesh, base_instance, instance_count)?,
            }
        }
        Ok(())
    }

    fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}

/// Batching statistics for the last emitted frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Groups in the frame, including skipped ones
    pub group_count: usize,
    /// Instanced draw calls issued
    pub draw_calls: usize,
    /// Mesh bindings issued
    pub mesh_binds: usize,
    /// Texture bindings issued
    pub texture_binds: usize,
    /// Shader bindings issued
    pub shader_binds: usize,
    /// Instances covered by draws
    pub instances_drawn: usize,
    /// Zero-instance groups skipped
    pub groups_skipped: usize,
}

impl BatchStats {
    /// Total binding commands issued
    pub fn state_changes(&self) -> usize {
        self.mesh_binds + self.texture_binds + self.shader_binds
    }

    /// Calculate average instances per draw call
    pub fn avg_instances_per_draw(&self) -> f32 {
        if self.draw_calls == 0 {
            0.0
        } else {
            self.instances_drawn as f32 / self.draw_calls as f32
        }
    }
}

/// Records draw groups into a [`CommandList`] with redundant bindings removed
#[derive(Debug)]
pub struct BatchEmitter {
    policy: EmptyGroupPolicy,
    capacity: usize,
    prev_mesh: Option<MeshId>,
    prev_texture: Option<TextureId>,
    prev_shader: Option<ShaderId>,
    stats: BatchStats,
}

impl BatchEmitter {
    /// Create an emitter for slots holding `capacity` instances
    pub fn new(capacity: usize, policy: EmptyGroupPolicy) -> Self {
        Self {
            policy,
            capacity,
            prev_mesh: None,
            prev_texture: None,
            prev_shader: None,
            stats: BatchStats::default(),
        }
    }

    /// Empty-group policy in effect
    pub fn policy(&self) -> EmptyGroupPolicy {
        self.policy
    }

    /// Statistics for the last successful `emit`
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Bindings `group` needs given what was last bound
    pub fn changes_for(&self, group: &DrawGroup) -> StateChanges {
        let mut changes = StateChanges::empty();
        changes.set(StateChanges::MESH, self.prev_mesh != Some(group.mesh));
        changes.set(StateChanges::TEXTURE, self.prev_texture != Some(group.texture));
        changes.set(StateChanges::SHADER, self.prev_shader != Some(group.shader));
        changes
    }

    /// Record one frame's groups into `out`
    ///
    /// `out` is cleared first. Binding state starts from nothing every frame,
    /// so the first drawn group always binds all three. On error `out` is left
    /// empty and nothing should be submitted.
    pub fn emit(&mut self, groups: &[DrawGroup], instance_count: usize, out: &mut CommandList) -> RenderResult<()> {
        out.clear();
        self.reset();

        let ranges = plan_ranges(groups, instance_count, self.capacity)?;
        if self.policy == EmptyGroupPolicy::Reject {
            if let Some(index) = groups.iter().position(|group| group.instance_count == 0) {
                return Err(RenderError::EmptyDrawGroup { index });
            }
        }

        let mut stats = BatchStats {
            group_count: groups.len(),
            ..BatchStats::default()
        };

        for (group, range) in groups.iter().zip(&ranges) {
            if range.count == 0 {
                stats.groups_skipped += 1;
                continue;
            }

            let changes = self.changes_for(group);
            if changes.contains(StateChanges::MESH) {
                out.push(DrawCommand::BindMesh(group.mesh));
                self.prev_mesh = Some(group.mesh);
                stats.mesh_binds += 1;
            }
            if changes.contains(StateChanges::TEXTURE) {
                out.push(DrawCommand::BindTexture(group.texture));
                self.prev_texture = Some(group.texture);
                stats.texture_binds += 1;
            }
            if changes.contains(StateChanges::SHADER) {
                out.push(DrawCommand::BindShader(group.shader));
                self.prev_shader = Some(group.shader);
                stats.shader_binds += 1;
            }

            out.push(DrawCommand::Draw {
                mesh: group.mesh,
                base_instance: range.start,
                instance_count: range.count,
            });
            stats.draw_calls += 1;
            stats.instances_drawn += range.count as usize;
        }

        log::trace!(
            "Batched {} groups into {} draws with {} state changes",
            stats.group_count,
            stats.draw_calls,
            stats.state_changes()
        );
        self.stats = stats;
        Ok(())
    }

    fn reset(&mut self) {
        self.prev_mesh = None;
        self.prev_texture = None;
        self.prev_shader = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: MeshId = MeshId(0);
    const B: MeshId = MeshId(1);

    fn group(mesh: MeshId, texture: u32, shader: u32, count: u32) -> DrawGroup {
        DrawGroup::new(mesh, TextureId(texture), ShaderId(shader), count)
    }

    fn draw(mesh: MeshId, base_instance: u32, instance_count: u32) -> DrawCommand {
        DrawCommand::Draw {
            mesh,
            base_instance,
            instance_count,
        }
    }

    fn emit(groups: &[DrawGroup], instances: usize, policy: EmptyGroupPolicy) -> RenderResult<(CommandList, BatchStats)> {
        let mut emitter = BatchEmitter::new(1024, policy);
        let mut list = CommandList::new();
        emitter.emit(groups, instances, &mut list)?;
        Ok((list, *emitter.stats()))
    }

    #[test]
    fn test_shared_state_binds_once() {
        let groups = [group(A, 1, 0, 5), group(A, 1, 0, 3), group(B, 2, 0, 2)];
        let (list, stats) = emit(&groups, 10, EmptyGroupPolicy::Skip).unwrap();

        assert_eq!(
            list.commands(),
            &[
                DrawCommand::BindMesh(A),
                DrawCommand::BindTexture(TextureId(1)),
                DrawCommand::BindShader(ShaderId(0)),
                draw(A, 0, 5),
                draw(A, 5, 3),
                DrawCommand::BindMesh(B),
                DrawCommand::BindTexture(TextureId(2)),
                draw(B, 8, 2),
            ]
        );
        assert_eq!(stats.instances_drawn, 10);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.state_changes(), 5);
        assert!((stats.avg_instances_per_draw() - 10.0 / 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_only_changed_state_is_rebound() {
        let groups = [group(A, 0, 0, 1), group(A, 0, 1, 1), group(A, 3, 1, 1)];
        let (list, _) = emit(&groups, 3, EmptyGroupPolicy::Skip).unwrap();

        assert_eq!(
            &list.commands()[4..],
            &[
                DrawCommand::BindShader(ShaderId(1)),
                draw(A, 1, 1),
                DrawCommand::BindTexture(TextureId(3)),
                draw(A, 2, 1),
            ]
        );
    }

    #[test]
    fn test_empty_groups_are_skipped_by_default() {
        let groups = [group(A, 0, 0, 0), group(B, 1, 1, 4), group(A, 0, 0, 0), group(B, 1, 1, 2)];
        let (list, stats) = emit(&groups, 6, EmptyGroupPolicy::Skip).unwrap();

        assert_eq!(list.draw_count(), 2);
        assert_eq!(stats.groups_skipped, 2);
        assert_eq!(
            list.commands(),
            &[
                DrawCommand::BindMesh(B),
                DrawCommand::BindTexture(TextureId(1)),
                DrawCommand::BindShader(ShaderId(1)),
                draw(B, 0, 4),
                draw(B, 4, 2),
            ]
        );
    }

    #[test]
    fn test_empty_group_rejected_under_policy() {
        let groups = [group(A, 0, 0, 3), group(B, 0, 0, 0)];
        let mut emitter = BatchEmitter::new(16, EmptyGroupPolicy::Reject);
        let mut list = CommandList::new();

        let result = emitter.emit(&groups, 3, &mut list);
        assert!(matches!(result, Err(RenderError::EmptyDrawGroup { index: 1 })));
        assert!(list.is_empty());
    }

    #[test]
    fn test_group_sum_must_match_instances() {
        let groups = [group(A, 0, 0, 3), group(B, 0, 0, 3)];

        assert!(matches!(
            emit(&groups, 7, EmptyGroupPolicy::Skip),
            Err(RenderError::GroupCountMismatch { grouped: 6, instances: 7 })
        ));
        assert!(matches!(
            emit(&groups, 5, EmptyGroupPolicy::Skip),
            Err(RenderError::GroupCountMismatch { grouped: 6, instances: 5 })
        ));
    }

    #[test]
    fn test_capacity_checked_before_emission() {
        let groups = [group(A, 0, 0, 10), group(B, 0, 0, 10)];
        let mut emitter = BatchEmitter::new(16, EmptyGroupPolicy::Skip);
        let mut list = CommandList::new();

        assert!(matches!(
            emitter.emit(&groups, 20, &mut list),
            Err(RenderError::CapacityExceeded { requested: 20, capacity: 16 })
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let groups = [group(A, 0, 0, 2), group(B, 0, 0, 0), group(A, 1, 0, 5)];
        let ranges = plan_ranges(&groups, 7, 7).unwrap();

        assert_eq!(
            ranges,
            vec![
                DrawRange { start: 0, count: 2 },
                DrawRange { start: 2, count: 0 },
                DrawRange { start: 2, count: 5 },
            ]
        );
        assert_eq!(ranges[2].end(), 7);
        assert!(ranges.windows(2).all(|pair| pair[0].end() == pair[1].start));
    }

    #[test]
    fn test_emission_is_idempotent_across_frames() {
        let groups = [group(A, 1, 0, 5), group(B, 2, 1, 2)];
        let mut emitter = BatchEmitter::new(64, EmptyGroupPolicy::Skip);
        let mut first = CommandList::new();
        let mut second = CommandList::new();

        emitter.emit(&groups, 7, &mut first).unwrap();
        emitter.emit(&groups, 7, &mut second).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.commands()[0], DrawCommand::BindMesh(A));
    }

    #[test]
    fn test_no_groups_no_commands() {
        let (list, stats) = emit(&[], 0, EmptyGroupPolicy::Reject).unwrap();
        assert!(list.is_empty());
        assert_eq!(stats, BatchStats::default());
    }

    #[test]
    fn test_changes_for_first_group_is_all() {
        let emitter = BatchEmitter::new(1, EmptyGroupPolicy::Skip);
        assert_eq!(emitter.changes_for(&group(A, 0, 0, 1)), StateChanges::all());
    }
}
