//! Frame Rendering Data Structures
//!
//! The producer fills one [`FrameSnapshot`] per frame; the pipeline copies the
//! uniforms and instances into the active ring slot and walks the groups.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{to_columns, Mat4, Vec4};
use crate::render::api::resources::{MeshId, ShaderId, TextureId};

/// Per-frame uniforms shared by every draw in the frame
///
/// Layout matches the `GlobalUniforms` block in the vertex shaders (std140).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalUniforms {
    /// World-to-view transform (column-major)
    pub view: [[f32; 4]; 4],
    /// View-to-clip transform (column-major)
    pub projection: [[f32; 4]; 4],
    /// Ambient light colour (RGB) + intensity (A)
    pub ambient: [f32; 4],
}

impl GlobalUniforms {
    /// Build uniforms from camera matrices
    pub fn new(view: &Mat4, projection: &Mat4, ambient: [f32; 4]) -> Self {
        Self {
            view: to_columns(view),
            projection: to_columns(projection),
            ambient,
        }
    }
}

impl Default for GlobalUniforms {
    fn default() -> Self {
        Self::new(&Mat4::identity(), &Mat4::identity(), [1.0, 1.0, 1.0, 0.2])
    }
}

/// Per-instance record read by the vertex shader at input rate `INSTANCE`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Model-to-world transform (column-major)
    pub transform: [[f32; 4]; 4],
    /// Instance colour (RGBA)
    pub color: [f32; 4],
}

impl InstanceData {
    /// Build an instance record from a transform and colour
    pub fn new(transform: &Mat4, color: Vec4) -> Self {
        Self {
            transform: to_columns(transform),
            color: color.into(),
        }
    }
}

/// A contiguous run of instances sharing mesh, texture and shader
///
/// Groups carry no offset; the pipeline derives each group's range from the
/// running sum of the counts before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawGroup {
    /// Mesh drawn by every instance in the group
    pub mesh: MeshId,
    /// Texture sampled by every instance in the group
    pub texture: TextureId,
    /// Shader/pipeline state the group is drawn with
    pub shader: ShaderId,
    /// Number of instances in the group
    pub instance_count: u32,
}

impl DrawGroup {
    /// Create a draw group
    pub const fn new(mesh: MeshId, texture: TextureId, shader: ShaderId, instance_count: u32) -> Self {
        Self {
            mesh,
            texture,
            shader,
            instance_count,
        }
    }
}

/// Complete description of one frame
///
/// Borrowed from the producer; valid until the producer is called again.
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot<'a> {
    /// Camera and scene uniforms
    pub globals: GlobalUniforms,
    /// Background colour (RGB); alpha is always 1
    pub clear_color: [f32; 3],
    /// Flat instance array, partitioned by `groups`
    pub instances: &'a [InstanceData],
    /// Ordered draw groups; order is preserved for layering
    pub groups: &'a [DrawGroup],
    /// Audio cue ids to trigger this frame
    pub audio_cues: &'a [u32],
}

impl<'a> FrameSnapshot<'a> {
    /// Snapshot with no instances, groups or cues
    pub fn empty(globals: GlobalUniforms, clear_color: [f32; 3]) -> Self {
        Self {
            globals,
            clear_color,
            instances: &[],
            groups: &[],
            audio_cues: &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_record_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 80);
        assert_eq!(std::mem::size_of::<GlobalUniforms>(), 144);
    }

    #[test]
    fn test_instance_from_transform() {
        let transform = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let instance = InstanceData::new(&transform, Vec4::new(1.0, 0.5, 0.25, 1.0));

        assert_eq!(instance.transform[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(instance.color, [1.0, 0.5, 0.25, 1.0]);
    }
}
