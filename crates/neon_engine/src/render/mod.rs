//! Rendering system
//!
//! The per-frame path is owned by [`FramePipeline`]:
//!
//! ```text
//! FrameGate::acquire ─► forward_input ─► FrameProducer::render_frame
//!        ▲                                         │
//!        │                                         ▼
//!  FrameTicket (GPU done)           RingBufferSet::advance + writes
//!        ▲                                         │
//!        │                                         ▼
//! RenderBackend::submit_frame ◄── CommandList ◄── BatchEmitter::emit
//! ```
//!
//! Everything below the backend trait is backend-specific; everything above it
//! is plain data and can be exercised with the headless backend.

pub mod api;
pub mod frame;
pub mod batch;
pub mod pipeline;
pub mod primitives;
pub mod backends;

pub use api::{
    DrawGroup, FrameSnapshot, GlobalUniforms, InstanceData,
    FrameProducer, RenderBackend, HostBuffer, HostMemory, BufferUsage,
    MeshId, TextureId, ShaderId, ResourceTable, MeshData, TextureData, Vertex,
};
pub use batch::{plan_ranges, BatchEmitter, BatchStats, CommandList, DrawCommand, DrawRange, EmptyGroupPolicy, StateChanges};
pub use frame::{FrameCompleted, FrameGate, FrameTicket, FrameId, RingBufferSet, FrameSlot, MAX_FRAMES_IN_FLIGHT};
pub use pipeline::{FramePipeline, FrameReport};

/// Errors raised by the rendering pipeline
///
/// Every variant is fatal: the pipeline has no retry or degraded-frame path, so
/// callers propagate these to the loop owner, which stops rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// More instances than a ring slot can hold
    #[error("Instance capacity exceeded: {requested} > {capacity}")]
    CapacityExceeded {
        /// Instances the frame tried to write
        requested: usize,
        /// Fixed per-slot capacity
        capacity: usize,
    },

    /// Group instance counts do not add up to the instance array length
    #[error("Draw groups cover {grouped} instances but the frame has {instances}")]
    GroupCountMismatch {
        /// Sum of all group instance counts
        grouped: usize,
        /// Length of the flat instance array
        instances: usize,
    },

    /// A draw group with no instances under the reject policy
    #[error("Draw group {index} has zero instances")]
    EmptyDrawGroup {
        /// Position of the group in the frame's group list
        index: usize,
    },

    /// A required GPU resource is missing
    #[error("Missing {kind} resource {id}")]
    MissingResource {
        /// Resource table the lookup went to
        kind: &'static str,
        /// Requested id
        id: u32,
    },

    /// A byte write that does not fit its region
    #[error("Write of {len} bytes at offset {offset} exceeds region of {size} bytes")]
    RegionOverflow {
        /// Write offset in bytes
        offset: usize,
        /// Write length in bytes
        len: usize,
        /// Region size in bytes
        size: usize,
    },

    /// A slot was handed out while the GPU may still read it
    #[error("Frame slot {slot} is still in use by the GPU")]
    SlotInUse {
        /// Ring slot index
        slot: usize,
    },

    /// The presentable surface could not be acquired or presented
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// Invalid renderer configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
