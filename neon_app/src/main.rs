//! Neon demo: a windowed scene of instanced spheres, crates and UI quads
//!
//! Controls: WASD/arrows move the camera, left click doubles the spheres,
//! space resets them, escape quits.

mod demo;
mod input;
mod window;

use std::process::ExitCode;
use std::time::Instant;

use glfw::WindowEvent;
use neon_engine::audio::LoggingAudioSink;
use neon_engine::config::{Config, RendererConfig};
use neon_engine::foundation::{logging, time::FramePacer};
use neon_engine::render::backends::VulkanBackend;
use neon_engine::render::{FramePipeline, FrameProducer, RenderBackend};

use demo::DemoProducer;
use input::WindowInput;
use window::Window;

const DEFAULT_CONFIG_PATH: &str = "neon_app/config.toml";
const WINDOW_SIZE: (u32, u32) = (1280, 720);

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = RendererConfig::load_or_default(&config_path)?;
    config.validate()?;
    log::info!("Loaded renderer config from {}", config_path);

    let mut window = Window::new(&config.application_name, WINDOW_SIZE.0, WINDOW_SIZE.1)?;
    let backend = VulkanBackend::new(&mut window, &config)?;
    let mut pipeline = FramePipeline::new(backend, &config)?;

    let mut input = WindowInput::new(window.get_window_size());
    let mut producer = DemoProducer::new();
    let mut audio = LoggingAudioSink::default();
    let mut pacer = FramePacer::new(config.frame_rate_target);

    let mut last_report = Instant::now();
    let mut frames_since_report = 0u32;
    let mut resized: Option<(u32, u32)> = None;

    while !window.should_close() && !producer.should_quit() {
        for event in window.poll_events() {
            match event {
                WindowEvent::FramebufferSize(width, height) => {
                    resized = Some((width.max(0) as u32, height.max(0) as u32));
                }
                WindowEvent::Close => window.set_should_close(true),
                _ => {}
            }
            input.handle_event(&event);
        }

        if let Some((width, height)) = resized.take() {
            pipeline.backend_mut().resize(width, height)?;
        }

        // Minimized: keep pumping events but produce nothing
        let (width, height) = pipeline.backend().surface_extent();
        if width == 0 || height == 0 {
            pacer.wait_for_next_frame();
            continue;
        }

        let report = pipeline.render_frame(&mut producer, &mut input, &mut audio)?;
        frames_since_report += 1;

        if last_report.elapsed().as_secs() >= 2 {
            let fps = frames_since_report as f32 / last_report.elapsed().as_secs_f32();
            log::info!(
                "{:.1} fps, {} instances in {} draws ({:.1} per draw), {} state changes",
                fps,
                report.instance_count,
                report.stats.draw_calls,
                report.stats.avg_instances_per_draw(),
                report.stats.state_changes()
            );
            last_report = Instant::now();
            frames_since_report = 0;
        }

        pacer.wait_for_next_frame();
    }

    pipeline.wait_idle()?;
    log::info!(
        "Demo finished after {} frames ({} distinct audio cues)",
        pipeline.frames_rendered(),
        audio.played().count()
    );
    Ok(())
}

fn main() -> ExitCode {
    logging::init();
    log::info!("Starting Neon demo");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Demo aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
