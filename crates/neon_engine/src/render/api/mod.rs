//! Public rendering API
//!
//! The types that cross the pipeline's boundaries: the per-frame snapshot the
//! producer hands over, the producer trait itself, the resource tables and the
//! backend trait the pipeline records into.

pub mod frame_data;
pub mod producer;
pub mod render_backend;
pub mod resources;

// Re-export commonly used types
pub use frame_data::{DrawGroup, FrameSnapshot, GlobalUniforms, InstanceData};
pub use producer::FrameProducer;
pub use render_backend::{check_ticket_slot, BufferUsage, HostBuffer, HostMemory, RenderBackend};
pub use resources::{MeshData, MeshId, ResourceTable, ShaderId, TextureData, TextureId, Vertex};
