//! Descriptor layouts, pool and set updates
//!
//! Two sets are shared by every pipeline:
//! - set 0, binding 0: the frame slot's `GlobalUniforms` block
//! - set 1, binding 0: the bound texture's combined image sampler

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Layout with a single descriptor at binding 0
    pub fn single(device: Device, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> VulkanResult<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage_flags)
            .build()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// The two set layouts every pipeline is built against
pub struct FrameDescriptorLayouts {
    /// Set 0: global uniforms
    pub globals: DescriptorSetLayout,
    /// Set 1: sampled texture
    pub texture: DescriptorSetLayout,
}

impl FrameDescriptorLayouts {
    /// Create both layouts
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            globals: DescriptorSetLayout::single(
                device.clone(),
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )?,
            texture: DescriptorSetLayout::single(
                device.clone(),
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )?,
        })
    }

    /// Layout handles in set order
    pub fn all_layouts(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.globals.handle(), self.texture.handle()]
    }
}

/// Descriptor pool sized exactly for the slots and textures loaded at startup
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool for `uniform_sets` uniform sets and `texture_sets` sampler sets
    pub fn new(device: Device, uniform_sets: u32, texture_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: uniform_sets.max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: texture_sets.max(1),
            },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets((uniform_sets + texture_sets).max(1))
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        log::debug!(
            "Created descriptor pool for {} uniform and {} texture sets",
            uniform_sets,
            texture_sets
        );
        Ok(Self { device, pool })
    }

    /// Allocate one set of `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)?;
        sets.first().copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor pool returned no sets".to_string(),
        })
    }

    /// Point a uniform set at `range` bytes of `buffer`
    pub fn write_uniform(&self, set: vk::DescriptorSet, buffer: vk::Buffer, range: vk::DeviceSize) {
        let buffer_infos = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];
        let writes = [vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build()];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Point a texture set at an image view and sampler
    pub fn write_texture(&self, set: vk::DescriptorSet, view: vk::ImageView, sampler: vk::Sampler) {
        let image_infos = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = [vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos)
            .build()];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
