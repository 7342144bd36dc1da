//! Buffer management for mesh data and frame slots
//!
//! All buffers live in host-visible, host-coherent memory. Frame slot buffers
//! stay mapped for their whole lifetime; the ring writes straight into the
//! mapping.

use std::ptr::NonNull;

use ash::{vk, Device};

use super::context::VulkanContext;
use super::{VulkanError, VulkanResult};
use crate::render::api::render_backend::{check_region, HostBuffer};
use crate::render::RenderResult;

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

impl Buffer {
    /// Create a buffer with dedicated memory
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match context
            .physical_device
            .find_memory_type(requirements.memory_type_bits, properties)
        {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let result = Self {
            device,
            buffer,
            memory,
            size,
            mapped: None,
        };
        unsafe {
            result
                .device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }
        Ok(result)
    }

    /// Host-visible, host-coherent buffer filled with `bytes`
    pub fn with_data(context: &VulkanContext, usage: vk::BufferUsageFlags, bytes: &[u8]) -> VulkanResult<Self> {
        let mut buffer = Self::new(
            context,
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = buffer.map()?;
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.as_ptr(), bytes.len()) };
        buffer.unmap();
        Ok(buffer)
    }

    /// Map the whole buffer, reusing an existing mapping
    pub fn map(&mut self) -> VulkanResult<NonNull<u8>> {
        if let Some(mapped) = self.mapped {
            return Ok(mapped);
        }
        let pointer = unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };
        let mapped = NonNull::new(pointer.cast::<u8>()).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "vkMapMemory returned a null pointer".to_string(),
        })?;
        self.mapped = Some(mapped);
        Ok(mapped)
    }

    /// Unmap the buffer if mapped
    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.device.unmap_memory(self.memory) };
        }
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Mapped view of a frame slot buffer owned by the backend
///
/// The backend keeps the [`Buffer`] alive until it is dropped; the view must
/// not be written after that.
#[derive(Debug)]
pub struct VulkanHostBuffer {
    buffer: vk::Buffer,
    mapped: NonNull<u8>,
    size: usize,
    descriptor_set: vk::DescriptorSet,
}

impl VulkanHostBuffer {
    pub(crate) fn new(buffer: &mut Buffer, descriptor_set: vk::DescriptorSet) -> VulkanResult<Self> {
        Ok(Self {
            buffer: buffer.handle(),
            mapped: buffer.map()?,
            size: buffer.size() as usize,
            descriptor_set,
        })
    }

    /// Underlying buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Global-uniform descriptor set; null for instance buffers
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

impl HostBuffer for VulkanHostBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> RenderResult<()> {
        check_region(offset, bytes.len(), self.size)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }
}
