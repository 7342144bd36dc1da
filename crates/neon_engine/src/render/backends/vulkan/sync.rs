//! Synchronization primitives and GPU completion watching
//!
//! Each frame slot owns a [`FrameSync`]: an image-available semaphore
//! (acquire → render), a render-finished semaphore (render → present) and an
//! in-flight fence signalled by the queue submission.
//!
//! The fence is the only CPU-visible completion signal. Instead of waiting on
//! it on the frame thread, [`CompletionWatcher`] waits on a dedicated thread
//! and completes the frame's ticket, which releases the slot through the
//! frame gate. Submissions are watched strictly in order.

use std::thread::{self, JoinHandle};

use ash::{vk, Device};
use crossbeam_channel::{Receiver, Sender};

use super::{VulkanError, VulkanResult};
use crate::render::frame::FrameTicket;

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, semaphore })
    }

    /// Semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signalled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, fence })
    }

    /// Block until signalled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Return the fence to the unsignalled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Per-slot synchronization objects and command buffer
pub struct FrameSync {
    /// Signalled when the swapchain image is ready to be rendered to
    pub image_available: Semaphore,
    /// Signalled when rendering is done and the image can be presented
    pub render_finished: Semaphore,
    /// Signalled when the slot's submission has finished on the GPU
    pub in_flight: Fence,
    /// Command buffer re-recorded every time the slot comes round
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSync {
    /// Create sync objects for one slot; the fence starts signalled
    pub fn new(device: Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
            command_buffer,
        })
    }
}

struct Watch {
    fence: vk::Fence,
    ticket: FrameTicket,
}

/// Thread completing frame tickets as their fences signal
pub struct CompletionWatcher {
    sender: Option<Sender<Watch>>,
    handle: Option<JoinHandle<()>>,
}

impl CompletionWatcher {
    /// Start the watcher thread
    pub fn spawn(device: Device) -> VulkanResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("fence-watcher".to_string())
            .spawn(move || watch_fences(&device, &receiver))
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to spawn fence watcher: {}", e)))?;

        log::debug!("Started fence watcher thread");
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Complete `ticket` once `fence` signals
    ///
    /// Must be called in submission order.
    pub fn watch(&self, fence: vk::Fence, ticket: FrameTicket) -> VulkanResult<()> {
        let sender = self.sender.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "fence watcher already shut down".to_string(),
        })?;
        sender.send(Watch { fence, ticket }).map_err(|_| VulkanError::InvalidOperation {
            reason: "fence watcher thread exited".to_string(),
        })
    }

    /// Finish watching outstanding fences and join the thread
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Fence watcher thread panicked");
            }
        }
    }
}

impl Drop for CompletionWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_fences(device: &Device, receiver: &Receiver<Watch>) {
    for Watch { fence, ticket } in receiver.iter() {
        let frame = ticket.frame();
        // No timeout: a frame that never finishes keeps its slot forever
        match unsafe { device.wait_for_fences(&[fence], true, u64::MAX) } {
            Ok(()) => log::trace!("Frame {} finished on the GPU", frame.0),
            Err(e) => log::error!("Waiting for frame {} failed: {:?}", frame.0, e),
        }
        ticket.complete();
    }
    log::debug!("Fence watcher thread exiting");
}
