//! # Neon Engine
//!
//! A triple-buffered, instanced frame pipeline with a Vulkan backend.
//!
//! ## Features
//!
//! - **Frames in flight**: up to three frames queued on the GPU, each writing
//!   its own ring slot of uniforms and instances
//! - **Instanced batching**: one draw per group of instances sharing mesh,
//!   texture and shader, with redundant binds elided
//! - **Backend seam**: a Vulkan backend for windows and a headless backend for
//!   tests and tooling
//! - **Producer interface**: the simulation hands over one flat snapshot per
//!   frame and receives input before it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neon_engine::prelude::*;
//!
//! struct Empty;
//!
//! impl FrameProducer for Empty {
//!     fn render_frame(&mut self, _aspect_ratio: f32) -> FrameSnapshot<'_> {
//!         FrameSnapshot::empty(GlobalUniforms::default(), [0.0, 0.0, 0.0])
//!     }
//!     fn update_cursor_position(&mut self, _position: Vec2) {}
//!     fn update_move_direction(&mut self, _direction: Vec2) {}
//!     fn update_mouse_button(&mut self, _is_down: bool) {}
//!     fn update_key_pressed(&mut self, _key_code: i32) {}
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let backend = HeadlessBackend::from_config((1280, 720), &config)?;
//!     let mut pipeline = FramePipeline::new(backend, &config)?;
//!     pipeline.render_frame(&mut Empty, &mut NoInput, &mut NullAudioSink)?;
//!     pipeline.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod foundation;
pub mod config;
pub mod input;
pub mod audio;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::{AudioCategory, AudioCue, AudioSink, LoggingAudioSink, NullAudioSink},
        config::{Config, ConfigError, RendererConfig, ShaderConfig},
        foundation::{
            math::{Mat4, Vec2, Vec3, Vec4},
            time::FramePacer,
        },
        input::{InputSource, InputState, NoInput},
        render::{
            backends::{CompletionMode, HeadlessBackend, VulkanBackend},
            DrawGroup, EmptyGroupPolicy, FramePipeline, FrameProducer, FrameReport, FrameSnapshot,
            GlobalUniforms, InstanceData, MeshId, RenderBackend, RenderError, RenderResult, ShaderId,
            TextureId,
        },
    };
}
