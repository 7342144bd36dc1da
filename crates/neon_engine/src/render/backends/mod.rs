//! Render backend implementations

pub mod headless;
pub mod vulkan;

pub use headless::{CompletionMode, HeadlessBackend, RecordedFrame};
pub use vulkan::VulkanBackend;
