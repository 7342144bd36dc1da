//! GPU-side meshes and textures
//!
//! Uploaded once at startup and immutable afterwards.

use ash::{vk, Device};

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::context::VulkanContext;
use super::descriptors::{DescriptorPool, DescriptorSetLayout};
use super::swapchain::create_image_view;
use super::{VulkanError, VulkanResult};
use crate::render::api::resources::{MeshData, TextureData};

/// Vertex and index buffers of one mesh
pub struct GpuMesh {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Upload mesh data into host-visible vertex and index buffers
    pub fn upload(context: &VulkanContext, mesh: &MeshData) -> VulkanResult<Self> {
        let vertices = Buffer::with_data(
            context,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let indices = Buffer::with_data(
            context,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        Ok(Self {
            vertices,
            indices,
            index_count: mesh.index_count(),
        })
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    /// Index buffer handle (`u16` indices)
    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    /// Indices drawn per instance
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Sampled RGBA8 texture with its own descriptor set
pub struct GpuTexture {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    descriptor_set: vk::DescriptorSet,
}

impl GpuTexture {
    /// Upload pixels through a staging buffer and write the texture's descriptor set
    pub fn upload(
        context: &VulkanContext,
        command_pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        texture: &TextureData,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent3D {
            width: texture.width,
            height: texture.height,
            depth: 1,
        };

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_create_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = context
            .physical_device
            .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        let memory = memory_type_index.and_then(|memory_type_index| {
            let alloc_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type_index);
            unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
        });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // From here on Drop releases whatever has been created.
        let mut result = Self {
            device: device.clone(),
            image,
            memory,
            image_view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            descriptor_set: vk::DescriptorSet::null(),
        };
        unsafe { device.bind_image_memory(image, memory, 0).map_err(VulkanError::Api)? };

        let staging = Buffer::with_data(context, vk::BufferUsageFlags::TRANSFER_SRC, &texture.pixels)?;
        command_pool.submit_once(context.graphics_queue(), |device, command_buffer| {
            record_upload(device, command_buffer, staging.handle(), image, extent);
        })?;

        result.image_view = create_image_view(&device, image, format, vk::ImageAspectFlags::COLOR)?;

        let sampler_create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .min_lod(0.0)
            .max_lod(0.0);
        result.sampler = unsafe { device.create_sampler(&sampler_create_info, None).map_err(VulkanError::Api)? };

        result.descriptor_set = descriptor_pool.allocate(layout)?;
        descriptor_pool.write_texture(result.descriptor_set, result.image_view, result.sampler);

        log::debug!("Uploaded {}x{} texture", texture.width, texture.height);
        Ok(result)
    }

    /// Descriptor set bound at set 1
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build()
}

fn record_upload(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent3D,
) {
    let to_transfer = layout_barrier(
        image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::AccessFlags::empty(),
        vk::AccessFlags::TRANSFER_WRITE,
    );
    let region = vk::BufferImageCopy::builder()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(extent)
        .build();
    let to_shader = layout_barrier(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::SHADER_READ,
    );

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
}
