//! Vulkan backend
//!
//! Drives a single graphics queue through the frame pipeline's per-frame
//! command sequence. Each ring slot gets its own command buffer, semaphores and
//! fence; a watcher thread waits the fences in submission order and completes
//! the frame tickets.
//!
//! Windowing stays with the application. The backend only needs a
//! [`VulkanSurfaceSource`] to learn the instance extensions, create the surface
//! and query the framebuffer size.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptors;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod swapchain;
pub mod sync;

use std::ffi::CStr;

use ash::{vk, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use thiserror::Error;

use crate::render::RenderError;

pub use buffer::{Buffer, VulkanHostBuffer};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanInstance};
pub use renderer::VulkanBackend;
pub use swapchain::Swapchain;
pub use sync::{CompletionWatcher, Fence, FrameSync, Semaphore};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The surface cannot be presented to right now (minimized, out of date)
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// Shader file could not be read
    #[error("Shader I/O error for {path}: {source}")]
    ShaderIo {
        /// Path of the SPIR-V file
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl From<VulkanError> for RenderError {
    fn from(error: VulkanError) -> Self {
        match error {
            VulkanError::SurfaceUnavailable(reason) => Self::SurfaceUnavailable(reason),
            VulkanError::InitializationFailed(reason) => Self::InitializationFailed(reason),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Window-side hooks the backend needs to present
pub trait VulkanSurfaceSource {
    /// Instance extensions required to create a surface for this window
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create the presentable surface
    fn create_surface(&mut self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Surface source for any window exposing raw window handles
pub struct RawWindowSurface<'a, W> {
    window: &'a W,
    size: (u32, u32),
}

impl<'a, W> RawWindowSurface<'a, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    /// Wrap a window whose framebuffer is currently `size` pixels
    pub fn new(window: &'a W, size: (u32, u32)) -> Self {
        Self { window, size }
    }
}

impl<W> VulkanSurfaceSource for RawWindowSurface<'_, W>
where
    W: HasRawWindowHandle + HasRawDisplayHandle,
{
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        let names = ash_window::enumerate_required_extensions(self.window.raw_display_handle())
            .map_err(VulkanError::Api)?;
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
            .collect())
    }

    fn create_surface(&mut self, entry: &Entry, instance: &Instance) -> VulkanResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.window.raw_display_handle(),
                self.window.raw_window_handle(),
                None,
            )
        }
        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create surface: {:?}", e)))
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }
}
