//! Shader modules and graphics pipelines
//!
//! One pipeline per configured shader, all sharing a single layout so the
//! frame's descriptor sets stay bound across pipeline switches. Vertex input
//! reads per-vertex data from binding 0 and per-instance data from binding 1.

use std::ffi::CStr;
use std::mem::{offset_of, size_of};
use std::path::Path;

use ash::{vk, Device};

use super::descriptors::FrameDescriptorLayouts;
use super::{VulkanError, VulkanResult};
use crate::config::{CullMode, ShaderConfig};
use crate::render::api::frame_data::InstanceData;
use crate::render::api::resources::Vertex;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| {
            VulkanError::InitializationFailed(format!("Invalid SPIR-V ({} bytes): {}", bytes.len(), e))
        })?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, module })
    }

    /// Load a shader module from a SPIR-V file
    pub fn from_file(device: Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| VulkanError::ShaderIo {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Read {} bytes of SPIR-V from {}", bytes.len(), path.display());
        Self::from_bytes(device, &bytes)
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn cull_mode_flags(cull_mode: CullMode) -> vk::CullModeFlags {
    match cull_mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

fn vertex_bindings() -> [vk::VertexInputBindingDescription; 2] {
    [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride: size_of::<InstanceData>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
    ]
}

fn vertex_attributes() -> Vec<vk::VertexInputAttributeDescription> {
    let vec4 = vk::Format::R32G32B32A32_SFLOAT;
    let mut attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(Vertex, normal) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: offset_of!(Vertex, uv) as u32,
        },
    ];

    // mat4 transform takes four consecutive locations, one per column
    let transform = offset_of!(InstanceData, transform) as u32;
    attributes.extend((0..4).map(|column| vk::VertexInputAttributeDescription {
        location: 3 + column,
        binding: 1,
        format: vec4,
        offset: transform + column * 16,
    }));
    attributes.push(vk::VertexInputAttributeDescription {
        location: 7,
        binding: 1,
        format: vec4,
        offset: offset_of!(InstanceData, color) as u32,
    });
    attributes
}

/// Shared pipeline layout plus one pipeline per shader id
pub struct PipelineSet {
    device: Device,
    layout: vk::PipelineLayout,
    pipelines: Vec<(u32, vk::Pipeline)>,
}

impl PipelineSet {
    /// Create the shared layout and a pipeline for every shader config
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        layouts: &FrameDescriptorLayouts,
        shaders: &[ShaderConfig],
    ) -> VulkanResult<Self> {
        let set_layouts = layouts.all_layouts();
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let mut set = Self {
            device,
            layout,
            pipelines: Vec::with_capacity(shaders.len()),
        };
        for shader in shaders {
            let pipeline = set.create_pipeline(render_pass, shader)?;
            set.pipelines.push((shader.id.0, pipeline));
            log::debug!(
                "Created pipeline '{}' ({}, blending {}, depth test {})",
                shader.name,
                shader.id,
                shader.blending,
                shader.depth_test
            );
        }
        Ok(set)
    }

    fn create_pipeline(&self, render_pass: vk::RenderPass, shader: &ShaderConfig) -> VulkanResult<vk::Pipeline> {
        let vertex = ShaderModule::from_file(self.device.clone(), &shader.vertex_shader_path)?;
        let fragment = ShaderModule::from_file(self.device.clone(), &shader.fragment_shader_path)?;
        let stages = [
            vertex.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = vertex_bindings();
        let attributes = vertex_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_flags(shader.cull_mode))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(shader.depth_test)
            .depth_write_enable(shader.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [if shader.blending {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build()
        } else {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()
        }];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };
        pipelines.first().copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("no pipeline created for shader '{}'", shader.name),
        })
    }

    /// Shared pipeline layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Pipeline for a shader id
    pub fn get(&self, shader: u32) -> Option<vk::Pipeline> {
        self.pipelines
            .iter()
            .find(|(id, _)| *id == shader)
            .map(|&(_, pipeline)| pipeline)
    }

    /// Whether a pipeline exists for a shader id
    pub fn contains(&self, shader: u32) -> bool {
        self.get(shader).is_some()
    }
}

impl Drop for PipelineSet {
    fn drop(&mut self) {
        unsafe {
            for &(_, pipeline) in &self.pipelines {
                self.device.destroy_pipeline(pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
