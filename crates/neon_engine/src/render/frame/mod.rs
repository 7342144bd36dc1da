//! Frame synchronization: the in-flight gate and the per-frame buffer ring

pub mod gate;
pub mod ring;

pub use gate::{FrameCompleted, FrameGate, FrameId, FrameTicket, MAX_FRAMES_IN_FLIGHT};
pub use ring::{FrameSlot, RingBufferSet};
