//! Vulkan implementation of the render backend
//!
//! Per frame:
//! 1. `begin_frame` acquires a swapchain image, re-records the slot's command
//!    buffer from scratch, begins the render pass and binds the slot's global
//!    uniforms (set 0) and instance buffer (binding 1) once
//! 2. the replayed command list binds meshes, textures (set 1) and pipelines
//!    and issues one instanced indexed draw per range
//! 3. `submit_frame` submits with the slot's fence, hands the ticket to the
//!    fence watcher and presents

use ash::vk;

use super::buffer::{Buffer, VulkanHostBuffer};
use super::commands::CommandPool;
use super::context::VulkanContext;
use super::descriptors::{DescriptorPool, FrameDescriptorLayouts};
use super::pipeline::PipelineSet;
use super::resources::{GpuMesh, GpuTexture};
use super::swapchain::{RenderPass, RenderTargets, Swapchain};
use super::sync::{CompletionWatcher, FrameSync};
use super::{VulkanError, VulkanResult, VulkanSurfaceSource};
use crate::config::RendererConfig;
use crate::render::api::render_backend::{check_ticket_slot, BufferUsage, RenderBackend};
use crate::render::api::resources::{MeshData, MeshId, ResourceTable, ShaderId, TextureData, TextureId};
use crate::render::frame::{FrameSlot, FrameTicket};
use crate::render::{RenderError, RenderResult};

struct Recording {
    slot: usize,
    image_index: u32,
    command_buffer: vk::CommandBuffer,
}

/// Vulkan render backend
///
/// Field order is drop order; the explicit `Drop` drains the GPU and the fence
/// watcher before anything is destroyed.
pub struct VulkanBackend {
    watcher: CompletionWatcher,
    frames: Vec<FrameSync>,
    slot_buffers: Vec<Buffer>,
    textures: ResourceTable<GpuTexture>,
    meshes: ResourceTable<GpuMesh>,
    pipelines: PipelineSet,
    descriptor_pool: DescriptorPool,
    layouts: FrameDescriptorLayouts,
    targets: Option<RenderTargets>,
    render_pass: RenderPass,
    command_pool: CommandPool,
    context: VulkanContext,
    images_in_flight: Vec<Option<usize>>,
    recording: Option<Recording>,
    frames_submitted: u64,
}

impl VulkanBackend {
    /// Bring up Vulkan for a window and load every resource the config lists
    pub fn new(source: &mut dyn VulkanSurfaceSource, config: &RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        log::info!("Initializing Vulkan backend for '{}'", config.application_name);

        let context = VulkanContext::new(source, &config.application_name, config.validation_enabled())?;
        let device = context.raw_device();

        let swapchain = Swapchain::new(&context, source.framebuffer_size(), vk::SwapchainKHR::null())?;
        let render_pass = RenderPass::new_forward_pass(device.clone(), swapchain.format().format)?;
        let images_in_flight = vec![None; swapchain.image_count()];
        let targets = RenderTargets::new(&context, &render_pass, swapchain)?;

        let command_pool = CommandPool::new(device.clone(), context.graphics_queue_family())?;
        let layouts = FrameDescriptorLayouts::new(&device)?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            config.frames_in_flight as u32,
            config.textures.len() as u32,
        )?;
        let pipelines = PipelineSet::new(device.clone(), render_pass.handle(), &layouts, &config.shaders)?;

        let command_buffers = command_pool.allocate_command_buffers(config.frames_in_flight as u32)?;
        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| FrameSync::new(device.clone(), command_buffer))
            .collect::<VulkanResult<Vec<_>>>()?;

        let watcher = CompletionWatcher::spawn(device)?;

        let mut backend = Self {
            watcher,
            frames,
            slot_buffers: Vec::new(),
            textures: ResourceTable::new(TextureId::KIND),
            meshes: ResourceTable::new(MeshId::KIND),
            pipelines,
            descriptor_pool,
            layouts,
            targets: Some(targets),
            render_pass,
            command_pool,
            context,
            images_in_flight,
            recording: None,
            frames_submitted: 0,
        };

        for mesh in &config.meshes {
            log::debug!("Loading mesh '{}' as {}", mesh.name, mesh.id);
            backend.load_mesh(mesh.id, &mesh.shape.build()?)?;
        }
        for texture in &config.textures {
            log::debug!("Loading texture '{}' as {}", texture.name, texture.id);
            backend.load_texture(texture.id, &texture.source.build())?;
        }

        log::info!(
            "Vulkan backend ready: {} meshes, {} textures, {} pipelines, {} frame slots",
            backend.meshes.len(),
            backend.textures.len(),
            config.shaders.len(),
            backend.frames.len()
        );
        Ok(backend)
    }

    /// Upload a mesh; startup only
    pub fn load_mesh(&mut self, id: MeshId, mesh: &MeshData) -> RenderResult<()> {
        mesh.validate()?;
        let gpu = GpuMesh::upload(&self.context, mesh)?;
        self.meshes.insert(id.0, gpu)
    }

    /// Upload a texture; startup only
    ///
    /// The descriptor pool is sized for the configured textures, so extra
    /// textures fail with a backend error.
    pub fn load_texture(&mut self, id: TextureId, texture: &TextureData) -> RenderResult<()> {
        texture.validate()?;
        let gpu = GpuTexture::upload(
            &self.context,
            &self.command_pool,
            &self.descriptor_pool,
            &self.layouts.texture,
            texture,
        )?;
        self.textures.insert(id.0, gpu)
    }

    /// Frames submitted so far
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Recreate the swapchain for a new framebuffer size
    ///
    /// A zero-sized framebuffer (minimized window) drops the swapchain; frames
    /// fail with `SurfaceUnavailable` until the next non-zero resize.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if self.recording.is_some() {
            return Err(RenderError::Backend("cannot resize while recording a frame".to_string()));
        }
        self.context.wait_idle()?;

        let old = self.targets.take();
        if width == 0 || height == 0 {
            log::debug!("Framebuffer is empty, releasing swapchain");
            return Ok(());
        }

        let old_handle = old
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |targets| targets.swapchain().handle());
        let swapchain = Swapchain::new(&self.context, (width, height), old_handle)?;
        drop(old);

        let targets = RenderTargets::new(&self.context, &self.render_pass, swapchain)?;
        self.images_in_flight = vec![None; targets.swapchain().image_count()];
        log::info!("Swapchain recreated at {}x{}", targets.extent().width, targets.extent().height);
        self.targets = Some(targets);
        Ok(())
    }

    fn recording(&self) -> RenderResult<&Recording> {
        self.recording
            .as_ref()
            .ok_or_else(|| RenderError::Backend("command recorded outside a frame".to_string()))
    }

    fn frame_sync(&self, slot: usize) -> RenderResult<&FrameSync> {
        self.frames
            .get(slot)
            .ok_or_else(|| RenderError::Backend(format!("no sync objects for slot {}", slot)))
    }

    fn record_frame_start(
        &self,
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        slot: &FrameSlot<VulkanHostBuffer>,
        clear_color: [f32; 3],
    ) -> VulkanResult<()> {
        let device = &self.context.device.device;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [clear_color[0], clear_color[1], clear_color[2], 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass.handle())
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);

            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.layout(),
                0,
                &[slot.uniforms().descriptor_set()],
                &[],
            );
            device.cmd_bind_vertex_buffers(command_buffer, 1, &[slot.instances().handle()], &[0]);
        }
        Ok(())
    }
}

impl RenderBackend for VulkanBackend {
    type Memory = VulkanHostBuffer;

    fn allocate_host_buffer(&mut self, usage: BufferUsage, size: usize) -> RenderResult<Self::Memory> {
        let vk_usage = match usage {
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Instance => vk::BufferUsageFlags::VERTEX_BUFFER,
        };
        let mut buffer = Buffer::new(
            &self.context,
            size as vk::DeviceSize,
            vk_usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let descriptor_set = match usage {
            BufferUsage::Uniform => {
                let set = self.descriptor_pool.allocate(&self.layouts.globals)?;
                self.descriptor_pool
                    .write_uniform(set, buffer.handle(), size as vk::DeviceSize);
                set
            }
            BufferUsage::Instance => vk::DescriptorSet::null(),
        };

        let view = VulkanHostBuffer::new(&mut buffer, descriptor_set)?;
        self.slot_buffers.push(buffer);
        log::debug!("Allocated {} byte {:?} slot buffer", size, usage);
        Ok(view)
    }

    fn surface_extent(&self) -> (u32, u32) {
        self.targets
            .as_ref()
            .map_or((0, 0), |targets| (targets.extent().width, targets.extent().height))
    }

    fn has_mesh(&self, mesh: MeshId) -> bool {
        self.meshes.contains(mesh.0)
    }

    fn has_texture(&self, texture: TextureId) -> bool {
        self.textures.contains(texture.0)
    }

    fn has_shader(&self, shader: ShaderId) -> bool {
        self.pipelines.contains(shader.0)
    }

    fn begin_frame(&mut self, slot: &FrameSlot<Self::Memory>, clear_color: [f32; 3]) -> RenderResult<()> {
        if self.recording.is_some() {
            return Err(RenderError::Backend("begin_frame called twice without submit".to_string()));
        }
        let targets = self
            .targets
            .as_ref()
            .ok_or_else(|| RenderError::SurfaceUnavailable("no swapchain (window minimized)".to_string()))?;

        let sync = self.frame_sync(slot.index())?;
        // Already signalled unless the gate let a busy slot through
        sync.in_flight.wait(u64::MAX)?;

        let image_index = targets.swapchain().acquire_next_image(sync.image_available.handle())?;
        let image = image_index as usize;
        if let Some(Some(owner)) = self.images_in_flight.get(image).copied() {
            if owner != slot.index() {
                self.frame_sync(owner)?.in_flight.wait(u64::MAX)?;
            }
        }
        if let Some(entry) = self.images_in_flight.get_mut(image) {
            *entry = Some(slot.index());
        }

        let command_buffer = self.frame_sync(slot.index())?.command_buffer;
        let framebuffer = targets.framebuffer(image_index)?;
        self.record_frame_start(command_buffer, framebuffer, targets.extent(), slot, clear_color)?;

        self.recording = Some(Recording {
            slot: slot.index(),
            image_index,
            command_buffer,
        });
        Ok(())
    }

    fn bind_mesh(&mut self, mesh: MeshId) -> RenderResult<()> {
        let command_buffer = self.recording()?.command_buffer;
        let gpu = self.meshes.get(mesh.0)?;
        let device = &self.context.device.device;
        unsafe {
            device.cmd_bind_vertex_buffers(command_buffer, 0, &[gpu.vertex_buffer()], &[0]);
            device.cmd_bind_index_buffer(command_buffer, gpu.index_buffer(), 0, vk::IndexType::UINT16);
        }
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        let command_buffer = self.recording()?.command_buffer;
        let set = self.textures.get(texture.0)?.descriptor_set();
        unsafe {
            self.context.device.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.layout(),
                1,
                &[set],
                &[],
            );
        }
        Ok(())
    }

    fn bind_shader(&mut self, shader: ShaderId) -> RenderResult<()> {
        let command_buffer = self.recording()?.command_buffer;
        let pipeline = self.pipelines.get(shader.0).ok_or(RenderError::MissingResource {
            kind: ShaderId::KIND,
            id: shader.0,
        })?;
        unsafe {
            self.context
                .device
                .device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        Ok(())
    }

    fn draw_instanced(&mut self, mesh: MeshId, base_instance: u32, instance_count: u32) -> RenderResult<()> {
        let command_buffer = self.recording()?.command_buffer;
        let index_count = self.meshes.get(mesh.0)?.index_count();
        unsafe {
            self.context.device.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                0,
                0,
                base_instance,
            );
        }
        Ok(())
    }

    fn submit_frame(&mut self, ticket: FrameTicket) -> RenderResult<()> {
        let recording = self
            .recording
            .take()
            .ok_or_else(|| RenderError::Backend("submit_frame without begin_frame".to_string()))?;

        let device = &self.context.device.device;
        let sync = self.frame_sync(recording.slot)?;
        unsafe {
            device.cmd_end_render_pass(recording.command_buffer);
            device
                .end_command_buffer(recording.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        check_ticket_slot(&ticket, recording.slot)?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [recording.command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe {
            device
                .queue_submit(self.context.graphics_queue(), &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }
        self.watcher.watch(sync.in_flight.handle(), ticket)?;

        let targets = self
            .targets
            .as_ref()
            .ok_or_else(|| RenderError::SurfaceUnavailable("swapchain released mid-frame".to_string()))?;
        targets.swapchain().present(
            self.context.present_queue(),
            recording.image_index,
            sync.render_finished.handle(),
        )?;

        self.frames_submitted += 1;
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.context.wait_idle()?;
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", e);
        }
        self.watcher.shutdown();
        log::info!("Vulkan backend shut down after {} frames", self.frames_submitted);
    }
}
