//! Headless backend
//!
//! Records every frame's command stream instead of talking to a GPU. Slot
//! regions are plain host memory, and frame completion is simulated in one of
//! three ways so the pipeline's synchronization can be exercised without a
//! device.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::config::{RendererConfig, ShaderConfig};
use crate::render::api::frame_data::{GlobalUniforms, InstanceData};
use crate::render::api::render_backend::{check_ticket_slot, BufferUsage, HostMemory, RenderBackend};
use crate::render::api::resources::{MeshData, MeshId, ResourceTable, ShaderId, TextureData, TextureId};
use crate::render::batch::DrawCommand;
use crate::render::frame::{FrameId, FrameSlot, FrameTicket};
use crate::render::{RenderError, RenderResult};

/// How submitted frames complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Complete during `submit_frame`
    Immediate,
    /// Hold tickets until [`HeadlessBackend::complete_oldest`] is called
    Deferred,
    /// Complete on a worker thread after a simulated GPU latency
    Threaded {
        /// Per-frame execution time
        latency: Duration,
    },
}

/// One frame as the backend saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Frame number from the ticket
    pub frame: FrameId,
    /// Ring slot bound by `begin_frame`
    pub slot: usize,
    /// Clear colour passed to `begin_frame`
    pub clear_color: [f32; 3],
    /// Uniforms the slot held at `begin_frame`
    pub globals: GlobalUniforms,
    /// Binding and draw commands in issue order
    pub commands: Vec<DrawCommand>,
    /// Instances read by the draws, in draw order
    pub drawn_instances: Vec<InstanceData>,
}

impl RecordedFrame {
    /// Number of draw commands
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Draw { .. }))
            .count()
    }
}

#[derive(Debug)]
struct OpenFrame {
    slot: usize,
    clear_color: [f32; 3],
    globals: GlobalUniforms,
    instances: HostMemory,
    commands: Vec<DrawCommand>,
    drawn_instances: Vec<InstanceData>,
    bound_mesh: Option<MeshId>,
    bound_texture: Option<TextureId>,
    bound_shader: Option<ShaderId>,
}

/// Slots the simulated GPU is still reading, keyed by slot index
type BusySlots = Arc<Mutex<HashMap<usize, FrameId>>>;

struct CompletionWorker {
    sender: Option<Sender<FrameTicket>>,
    handle: Option<JoinHandle<()>>,
}

impl CompletionWorker {
    fn spawn(latency: Duration, busy: BusySlots) -> RenderResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<FrameTicket>();
        let handle = thread::Builder::new()
            .name("headless-gpu".into())
            .spawn(move || {
                for ticket in receiver {
                    thread::sleep(latency);
                    busy.lock().remove(&ticket.slot());
                    ticket.complete();
                }
            })
            .map_err(|e| RenderError::InitializationFailed(format!("failed to spawn completion thread: {}", e)))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn submit(&self, ticket: FrameTicket) -> RenderResult<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| RenderError::Backend("completion thread stopped".to_string()))?;
        sender
            .send(ticket)
            .map_err(|_| RenderError::Backend("completion thread stopped".to_string()))
    }
}

impl Drop for CompletionWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Headless completion thread panicked");
            }
        }
    }
}

/// Backend that records frames in memory
pub struct HeadlessBackend {
    extent: (u32, u32),
    meshes: ResourceTable<MeshData>,
    textures: ResourceTable<TextureData>,
    shaders: ResourceTable<ShaderConfig>,
    mode: CompletionMode,
    busy: BusySlots,
    deferred: VecDeque<FrameTicket>,
    worker: Option<CompletionWorker>,
    open: Option<OpenFrame>,
    frames: Vec<RecordedFrame>,
    allocations: Vec<(BufferUsage, usize)>,
    peak_busy: usize,
}

impl HeadlessBackend {
    /// Create an empty backend with the given surface size
    pub fn new(extent: (u32, u32)) -> Self {
        Self {
            extent,
            meshes: ResourceTable::new(MeshId::KIND),
            textures: ResourceTable::new(TextureId::KIND),
            shaders: ResourceTable::new(ShaderId::KIND),
            mode: CompletionMode::Immediate,
            busy: Arc::new(Mutex::new(HashMap::new())),
            deferred: VecDeque::new(),
            worker: None,
            open: None,
            frames: Vec::new(),
            allocations: Vec::new(),
            peak_busy: 0,
        }
    }

    /// Create a backend with every resource the config lists
    pub fn from_config(extent: (u32, u32), config: &RendererConfig) -> RenderResult<Self> {
        let mut backend = Self::new(extent);
        for mesh in &config.meshes {
            backend.load_mesh(mesh.id, mesh.shape.build()?)?;
        }
        for texture in &config.textures {
            backend.load_texture(texture.id, texture.source.build())?;
        }
        for shader in &config.shaders {
            backend.load_shader(shader.clone())?;
        }
        log::debug!(
            "Headless backend loaded {} meshes, {} textures, {} shaders",
            backend.meshes.len(),
            backend.textures.len(),
            backend.shaders.len()
        );
        Ok(backend)
    }

    /// Switch completion mode; only valid while nothing is in flight
    pub fn with_completion(mut self, mode: CompletionMode) -> RenderResult<Self> {
        if !self.busy.lock().is_empty() {
            return Err(RenderError::Backend("cannot change completion mode with frames in flight".to_string()));
        }
        self.worker = match mode {
            CompletionMode::Threaded { latency } => Some(CompletionWorker::spawn(latency, Arc::clone(&self.busy))?),
            CompletionMode::Immediate | CompletionMode::Deferred => None,
        };
        self.mode = mode;
        Ok(self)
    }

    /// Load a mesh
    pub fn load_mesh(&mut self, id: MeshId, mesh: MeshData) -> RenderResult<()> {
        mesh.validate()?;
        self.meshes.insert(id.0, mesh)
    }

    /// Load a texture
    pub fn load_texture(&mut self, id: TextureId, texture: TextureData) -> RenderResult<()> {
        texture.validate()?;
        self.textures.insert(id.0, texture)
    }

    /// Load a shader
    pub fn load_shader(&mut self, shader: ShaderConfig) -> RenderResult<()> {
        self.shaders.insert(shader.id.0, shader)
    }

    /// Change the reported surface size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = (width, height);
    }

    /// Frames submitted so far
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Host allocations made so far
    pub fn allocations(&self) -> &[(BufferUsage, usize)] {
        &self.allocations
    }

    /// Most slots observed busy at once
    pub fn peak_busy_slots(&self) -> usize {
        self.peak_busy
    }

    /// Frames submitted but not yet completed
    pub fn pending(&self) -> usize {
        self.busy.lock().len()
    }

    /// Complete the oldest deferred frame; `false` if none is pending
    pub fn complete_oldest(&mut self) -> bool {
        match self.deferred.pop_front() {
            Some(ticket) => {
                self.busy.lock().remove(&ticket.slot());
                ticket.complete();
                true
            }
            None => false,
        }
    }

    /// Complete every deferred frame in submission order
    pub fn complete_all(&mut self) {
        while self.complete_oldest() {}
    }

    fn open_frame(&mut self) -> RenderResult<&mut OpenFrame> {
        self.open
            .as_mut()
            .ok_or_else(|| RenderError::Backend("command recorded outside a frame".to_string()))
    }
}

impl RenderBackend for HeadlessBackend {
    type Memory = HostMemory;

    fn allocate_host_buffer(&mut self, usage: BufferUsage, size: usize) -> RenderResult<HostMemory> {
        self.allocations.push((usage, size));
        Ok(HostMemory::zeroed(size))
    }

    fn surface_extent(&self) -> (u32, u32) {
        self.extent
    }

    fn has_mesh(&self, mesh: MeshId) -> bool {
        self.meshes.contains(mesh.0)
    }

    fn has_texture(&self, texture: TextureId) -> bool {
        self.textures.contains(texture.0)
    }

    fn has_shader(&self, shader: ShaderId) -> bool {
        self.shaders.contains(shader.0)
    }

    fn begin_frame(&mut self, slot: &FrameSlot<HostMemory>, clear_color: [f32; 3]) -> RenderResult<()> {
        if self.open.is_some() {
            return Err(RenderError::Backend("begin_frame called twice without submit".to_string()));
        }
        if let Some(frame) = self.busy.lock().get(&slot.index()) {
            log::error!("Slot {} written while frame {} still reads it", slot.index(), frame.0);
            return Err(RenderError::SlotInUse { slot: slot.index() });
        }

        let globals = slot
            .uniforms()
            .read::<GlobalUniforms>(1)?
            .first()
            .copied()
            .unwrap_or_default();

        self.open = Some(OpenFrame {
            slot: slot.index(),
            clear_color,
            globals,
            instances: slot.instances().clone(),
            commands: Vec::new(),
            drawn_instances: Vec::new(),
            bound_mesh: None,
            bound_texture: None,
            bound_shader: None,
        });
        Ok(())
    }

    fn bind_mesh(&mut self, mesh: MeshId) -> RenderResult<()> {
        self.meshes.get(mesh.0)?;
        let frame = self.open_frame()?;
        frame.bound_mesh = Some(mesh);
        frame.commands.push(DrawCommand::BindMesh(mesh));
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> RenderResult<()> {
        self.textures.get(texture.0)?;
        let frame = self.open_frame()?;
        frame.bound_texture = Some(texture);
        frame.commands.push(DrawCommand::BindTexture(texture));
        Ok(())
    }

    fn bind_shader(&mut self, shader: ShaderId) -> RenderResult<()> {
        self.shaders.get(shader.0)?;
        let frame = self.open_frame()?;
        frame.bound_shader = Some(shader);
        frame.commands.push(DrawCommand::BindShader(shader));
        Ok(())
    }

    fn draw_instanced(&mut self, mesh: MeshId, base_instance: u32, instance_count: u32) -> RenderResult<()> {
        let frame = self.open_frame()?;
        if frame.bound_mesh != Some(mesh) || frame.bound_texture.is_none() || frame.bound_shader.is_none() {
            return Err(RenderError::Backend(format!(
                "draw of {} without its bindings (mesh {:?}, texture {:?}, shader {:?})",
                mesh, frame.bound_mesh, frame.bound_texture, frame.bound_shader
            )));
        }

        let end = base_instance as usize + instance_count as usize;
        let instances: Vec<InstanceData> = frame.instances.read(end)?;
        frame.drawn_instances.extend_from_slice(&instances[base_instance as usize..]);
        frame.commands.push(DrawCommand::Draw {
            mesh,
            base_instance,
            instance_count,
        });
        Ok(())
    }

    fn submit_frame(&mut self, ticket: FrameTicket) -> RenderResult<()> {
        let open = self
            .open
            .take()
            .ok_or_else(|| RenderError::Backend("submit_frame without begin_frame".to_string()))?;
        check_ticket_slot(&ticket, open.slot)?;

        self.frames.push(RecordedFrame {
            frame: ticket.frame(),
            slot: open.slot,
            clear_color: open.clear_color,
            globals: open.globals,
            commands: open.commands,
            drawn_instances: open.drawn_instances,
        });

        {
            let mut busy = self.busy.lock();
            busy.insert(ticket.slot(), ticket.frame());
            self.peak_busy = self.peak_busy.max(busy.len());
        }

        match self.mode {
            CompletionMode::Immediate => {
                self.busy.lock().remove(&ticket.slot());
                ticket.complete();
            }
            CompletionMode::Deferred => self.deferred.push_back(ticket),
            CompletionMode::Threaded { .. } => {
                let worker = self
                    .worker
                    .as_ref()
                    .ok_or_else(|| RenderError::Backend("completion thread not running".to_string()))?;
                worker.submit(ticket)?;
            }
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        self.complete_all();
        while self.pending() > 0 {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        self.complete_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::frame::FrameGate;

    fn slot(index: usize, capacity: usize) -> FrameSlot<HostMemory> {
        FrameSlot::new(
            index,
            HostMemory::zeroed(std::mem::size_of::<GlobalUniforms>()),
            HostMemory::zeroed(capacity * std::mem::size_of::<InstanceData>()),
        )
        .unwrap()
    }

    #[test]
    fn test_from_config_loads_all_resources() {
        let backend = HeadlessBackend::from_config((640, 480), &RendererConfig::default()).unwrap();
        assert!(backend.has_mesh(MeshId(2)));
        assert!(backend.has_texture(TextureId(1)));
        assert!(backend.has_shader(ShaderId(1)));
        assert!(!backend.has_mesh(MeshId(3)));
        assert_eq!(backend.surface_extent(), (640, 480));
    }

    #[test]
    fn test_draw_requires_bindings() {
        let mut backend = HeadlessBackend::from_config((1, 1), &RendererConfig::default()).unwrap();
        backend.begin_frame(&slot(0, 4), [0.0; 3]).unwrap();

        assert!(backend.draw_instanced(MeshId(0), 0, 1).is_err());
        backend.bind_mesh(MeshId(0)).unwrap();
        backend.bind_texture(TextureId(0)).unwrap();
        backend.bind_shader(ShaderId(0)).unwrap();
        backend.draw_instanced(MeshId(0), 0, 4).unwrap();
        assert!(matches!(
            backend.draw_instanced(MeshId(0), 2, 3),
            Err(RenderError::RegionOverflow { .. })
        ));
        assert!(matches!(
            backend.bind_mesh(MeshId(9)),
            Err(RenderError::MissingResource { kind: "mesh", id: 9 })
        ));
    }

    #[test]
    fn test_submit_rejects_ticket_for_other_slot() {
        let mut gate = FrameGate::new(2).unwrap();
        let mut backend = HeadlessBackend::from_config((1, 1), &RendererConfig::default()).unwrap();

        backend.begin_frame(&slot(0, 1), [0.0; 3]).unwrap();
        let result = backend.submit_frame(gate.acquire().unwrap().with_slot(1));

        assert!(matches!(result, Err(RenderError::Backend(_))));
        assert!(backend.frames().is_empty());
    }

    #[test]
    fn test_deferred_slot_stays_busy() {
        let mut gate = FrameGate::new(3).unwrap();
        let mut backend = HeadlessBackend::from_config((1, 1), &RendererConfig::default())
            .unwrap()
            .with_completion(CompletionMode::Deferred)
            .unwrap();
        let slot0 = slot(0, 1);

        backend.begin_frame(&slot0, [0.0; 3]).unwrap();
        backend.submit_frame(gate.acquire().unwrap().with_slot(0)).unwrap();
        assert_eq!(backend.pending(), 1);

        assert!(matches!(
            backend.begin_frame(&slot0, [0.0; 3]),
            Err(RenderError::SlotInUse { slot: 0 })
        ));

        assert!(backend.complete_oldest());
        assert!(!backend.complete_oldest());
        backend.begin_frame(&slot0, [0.0; 3]).unwrap();
    }

    #[test]
    fn test_threaded_completion_releases_gate() {
        let mut gate = FrameGate::new(2).unwrap();
        let mut backend = HeadlessBackend::new((1, 1))
            .with_completion(CompletionMode::Threaded {
                latency: Duration::from_millis(2),
            })
            .unwrap();
        let slots = [slot(0, 1), slot(1, 1)];

        for frame in 0..6 {
            let ticket = gate.acquire().unwrap().with_slot(frame % 2);
            backend.begin_frame(&slots[frame % 2], [0.0; 3]).unwrap();
            backend.submit_frame(ticket).unwrap();
        }
        backend.wait_idle().unwrap();
        gate.wait_all().unwrap();

        assert_eq!(backend.frames().len(), 6);
        assert!(backend.peak_busy_slots() <= 2);
    }
}
