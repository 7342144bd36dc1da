//! Per-frame orchestration
//!
//! [`FramePipeline`] owns the backend, the frames-in-flight gate, the slot
//! ring and the batch emitter, and runs one frame per [`FramePipeline::render_frame`]
//! call on the caller's thread.

use crate::audio::{AudioCue, AudioSink};
use crate::config::RendererConfig;
use crate::input::{forward_input, InputSource};
use crate::render::api::producer::FrameProducer;
use crate::render::api::render_backend::RenderBackend;
use crate::render::api::resources::{MeshId, ShaderId, TextureId};
use crate::render::batch::{BatchEmitter, BatchStats, CommandList};
use crate::render::frame::{FrameGate, FrameId, RingBufferSet};
use crate::render::{RenderError, RenderResult};

/// What happened in one rendered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frame number
    pub frame: FrameId,
    /// Ring slot the frame was written to
    pub slot: usize,
    /// Instances written to the slot
    pub instance_count: usize,
    /// Batching statistics
    pub stats: BatchStats,
    /// Audio cues forwarded after submission
    pub audio_cues: usize,
    /// Aspect ratio handed to the producer
    pub aspect_ratio: f32,
}

/// Triple-buffered instanced frame pipeline
pub struct FramePipeline<B: RenderBackend> {
    backend: B,
    gate: FrameGate,
    ring: RingBufferSet<B::Memory>,
    emitter: BatchEmitter,
    commands: CommandList,
    cues: Vec<u32>,
    started: bool,
    frames_rendered: u64,
}

impl<B: RenderBackend> FramePipeline<B> {
    /// Build the pipeline and allocate every ring slot through the backend
    ///
    /// Fails if the config is invalid or names a resource the backend did not
    /// load.
    pub fn new(mut backend: B, config: &RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        check_configured_resources(&backend, config)?;

        let gate = FrameGate::new(config.frames_in_flight)?;
        let ring = RingBufferSet::allocate(&mut backend, config.frames_in_flight, config.max_instance_count)?;
        let emitter = BatchEmitter::new(config.max_instance_count, config.empty_group_policy);

        log::info!(
            "Frame pipeline ready: {} frames in flight, {} instances per slot, {:?} empty groups",
            config.frames_in_flight,
            config.max_instance_count,
            config.empty_group_policy
        );

        Ok(Self {
            backend,
            gate,
            ring,
            emitter,
            commands: CommandList::new(),
            cues: Vec::new(),
            started: false,
            frames_rendered: 0,
        })
    }

    /// Backend in use
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend access, e.g. for resize handling between frames
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Frames submitted whose GPU completion has not been observed
    pub fn frames_in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Commands recorded for the last frame
    pub fn last_commands(&self) -> &CommandList {
        &self.commands
    }

    /// Produce, record and submit one frame
    ///
    /// Blocks while the maximum number of frames is already in flight. Any
    /// error is fatal: the frame is not submitted and the caller should stop
    /// rendering.
    pub fn render_frame<P, I, A>(&mut self, producer: &mut P, input: &mut I, audio: &mut A) -> RenderResult<FrameReport>
    where
        P: FrameProducer + ?Sized,
        I: InputSource + ?Sized,
        A: AudioSink + ?Sized,
    {
        if !self.started {
            log::debug!("Starting frame producer");
            producer.start();
            self.started = true;
        }

        let ticket = self.gate.acquire()?;

        let state = input.sample();
        forward_input(&state, producer);

        let aspect_ratio = aspect_ratio(self.backend.surface_extent());
        let slot = self.ring.advance();
        let ticket = ticket.with_slot(slot);

        let (clear_color, instance_count) = {
            let snapshot = producer.render_frame(aspect_ratio);
            self.ring.write_global_uniforms(slot, &snapshot.globals)?;
            self.ring.write_instances(slot, snapshot.instances)?;
            self.emitter
                .emit(snapshot.groups, snapshot.instances.len(), &mut self.commands)?;

            self.cues.clear();
            self.cues.extend_from_slice(snapshot.audio_cues);
            (snapshot.clear_color, snapshot.instances.len())
        };

        self.commands.check_resources(&self.backend)?;
        self.backend.begin_frame(self.ring.slot(slot)?, clear_color)?;
        self.commands.replay(&mut self.backend)?;

        let frame = ticket.frame();
        self.backend.submit_frame(ticket)?;
        self.frames_rendered += 1;

        for &id in &self.cues {
            audio.play(AudioCue::new(id, producer.audio_category(id)));
        }
        audio.end_frame();

        let report = FrameReport {
            frame,
            slot,
            instance_count,
            stats: *self.emitter.stats(),
            audio_cues: self.cues.len(),
            aspect_ratio,
        };
        log::trace!(
            "Frame {} on slot {}: {} instances, {} draws",
            frame.0,
            slot,
            instance_count,
            report.stats.draw_calls
        );
        Ok(report)
    }

    /// Wait for the GPU and every outstanding frame completion
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.backend.wait_idle()?;
        self.gate.wait_all()
    }

    /// Drain in-flight frames and hand back the backend
    pub fn into_backend(mut self) -> RenderResult<B> {
        self.wait_idle()?;
        Ok(self.backend)
    }
}

fn aspect_ratio((width, height): (u32, u32)) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

fn check_configured_resources<B: RenderBackend>(backend: &B, config: &RendererConfig) -> RenderResult<()> {
    let missing = config
        .meshes
        .iter()
        .find(|mesh| !backend.has_mesh(mesh.id))
        .map(|mesh| (MeshId::KIND, mesh.id.0))
        .or_else(|| {
            config
                .textures
                .iter()
                .find(|texture| !backend.has_texture(texture.id))
                .map(|texture| (TextureId::KIND, texture.id.0))
        })
        .or_else(|| {
            config
                .shaders
                .iter()
                .find(|shader| !backend.has_shader(shader.id))
                .map(|shader| (ShaderId::KIND, shader.id.0))
        });

    match missing {
        Some((kind, id)) => Err(RenderError::MissingResource { kind, id }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_guards_zero_extent() {
        assert_eq!(aspect_ratio((1600, 900)), 1600.0 / 900.0);
        assert_eq!(aspect_ratio((0, 900)), 1.0);
        assert_eq!(aspect_ratio((800, 0)), 1.0);
    }
}
