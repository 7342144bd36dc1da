//! Backend abstraction traits for the rendering system
//!
//! A backend owns the GPU: resource tables, the presentable surface, command
//! buffers and the queue. The pipeline drives it through a fixed per-frame
//! sequence:
//!
//! ```text
//! begin_frame(slot) ─► { bind_mesh | bind_texture | bind_shader | draw_instanced }* ─► submit_frame(ticket)
//! ```

use crate::render::api::resources::{MeshId, ShaderId, TextureId};
use crate::render::frame::{FrameSlot, FrameTicket};
use crate::render::{RenderError, RenderResult};

/// What a host-visible allocation is read as on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Per-frame global uniforms
    Uniform,
    /// Per-instance vertex attributes
    Instance,
}

/// CPU-writable, GPU-readable memory region
///
/// Writes are plain copies; callers are responsible for not writing while the
/// GPU may read the region.
pub trait HostBuffer {
    /// Region size in bytes
    fn size(&self) -> usize;

    /// Copy `bytes` into the region at `offset`
    fn write(&mut self, offset: usize, bytes: &[u8]) -> RenderResult<()>;
}

/// Checks a write against a region before touching it
pub(crate) fn check_region(offset: usize, len: usize, size: usize) -> RenderResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RenderError::RegionOverflow { offset, len, size }),
    }
}

/// Plain heap memory standing in for a mapped GPU allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMemory {
    bytes: Vec<u8>,
}

impl HostMemory {
    /// Zero-filled region of `size` bytes
    pub fn zeroed(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    /// Current contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reinterpret the first `count` records of the region
    pub fn read<T: bytemuck::Pod>(&self, count: usize) -> RenderResult<Vec<T>> {
        let record = std::mem::size_of::<T>();
        check_region(0, count * record, self.bytes.len())?;
        Ok(self.bytes[..count * record]
            .chunks_exact(record)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}

impl HostBuffer for HostMemory {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> RenderResult<()> {
        check_region(offset, bytes.len(), self.bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Main rendering backend trait
///
/// Every error is fatal for the frame; the pipeline propagates it without
/// retrying.
pub trait RenderBackend {
    /// Host-visible memory type the ring slots live in
    type Memory: HostBuffer;

    /// Allocate one host-visible region; called only at startup
    fn allocate_host_buffer(&mut self, usage: BufferUsage, size: usize) -> RenderResult<Self::Memory>;

    /// Current presentable surface size (width, height) in pixels
    fn surface_extent(&self) -> (u32, u32);

    /// Whether a mesh id is loaded
    fn has_mesh(&self, mesh: MeshId) -> bool;

    /// Whether a texture id is loaded
    fn has_texture(&self, texture: TextureId) -> bool;

    /// Whether a shader id is loaded
    fn has_shader(&self, shader: ShaderId) -> bool;

    /// Start recording a frame that reads from `slot`
    ///
    /// Acquires the presentable image, begins the command buffer and render
    /// pass with `clear_color`, and binds the slot's uniform and instance
    /// regions once for the whole frame.
    fn begin_frame(&mut self, slot: &FrameSlot<Self::Memory>, clear_color: [f32; 3]) -> RenderResult<()>;

    /// Bind a mesh's vertex and index buffers
    fn bind_mesh(&mut self, mesh: MeshId) -> RenderResult<()>;

    /// Bind a texture for sampling
    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()>;

    /// Bind a shader's pipeline state
    fn bind_shader(&mut self, shader: ShaderId) -> RenderResult<()>;

    /// Draw `instance_count` instances of `mesh` starting at `base_instance`
    fn draw_instanced(&mut self, mesh: MeshId, base_instance: u32, instance_count: u32) -> RenderResult<()>;

    /// Finish the frame, submit it and present
    ///
    /// The backend completes `ticket` once the GPU has finished the
    /// submitted work; dropping it early releases the slot too soon.
    fn submit_frame(&mut self, ticket: FrameTicket) -> RenderResult<()>;

    /// Block until the GPU is idle
    fn wait_idle(&mut self) -> RenderResult<()>;
}

/// Reject a ticket submitted against a different slot than the one recorded
///
/// Completing such a ticket would release a slot the GPU may still be
/// reading, so both backends fail the submission instead.
pub fn check_ticket_slot(ticket: &FrameTicket, recorded_slot: usize) -> RenderResult<()> {
    if ticket.slot() == recorded_slot {
        return Ok(());
    }
    Err(RenderError::Backend(format!(
        "ticket for frame {} names slot {} but the frame was recorded into slot {}",
        ticket.frame().0,
        ticket.slot(),
        recorded_slot
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::FrameGate;

    #[test]
    fn test_ticket_slot_must_match_recording() {
        let mut gate = FrameGate::new(3).unwrap();
        let ticket = gate.acquire().unwrap().with_slot(1);

        assert!(check_ticket_slot(&ticket, 1).is_ok());
        assert!(matches!(check_ticket_slot(&ticket, 2), Err(RenderError::Backend(_))));
    }

    #[test]
    fn test_host_memory_bounds() {
        let mut memory = HostMemory::zeroed(8);
        memory.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.as_bytes(), &[0, 0, 0, 0, 1, 2, 3, 4]);

        assert!(matches!(
            memory.write(6, &[0; 4]),
            Err(RenderError::RegionOverflow { offset: 6, len: 4, size: 8 })
        ));
        assert!(memory.write(usize::MAX, &[0]).is_err());
    }

    #[test]
    fn test_host_memory_read_records() {
        let mut memory = HostMemory::zeroed(16);
        memory.write(0, bytemuck::cast_slice(&[1.5f32, 2.5])).unwrap();

        assert_eq!(memory.read::<f32>(2).unwrap(), vec![1.5, 2.5]);
        assert!(memory.read::<f32>(5).is_err());
    }
}
