//! End-to-end frame pipeline behaviour on the headless backend

use std::time::Duration;

use neon_engine::audio::{AudioCategory, LoggingAudioSink, NullAudioSink};
use neon_engine::config::RendererConfig;
use neon_engine::foundation::logging;
use neon_engine::foundation::math::{Mat4, Vec2, Vec3, Vec4};
use neon_engine::input::{InputSource, InputState, NoInput};
use neon_engine::render::backends::{CompletionMode, HeadlessBackend};
use neon_engine::render::{
    DrawCommand, DrawGroup, EmptyGroupPolicy, FramePipeline, FrameProducer, FrameSnapshot, GlobalUniforms,
    InstanceData, MeshId, RenderError, ShaderId, TextureId,
};

const SPHERE: MeshId = MeshId(0);
const CUBE: MeshId = MeshId(1);
const WHITE: TextureId = TextureId(0);
const GRID: TextureId = TextureId(1);
const LIT: ShaderId = ShaderId(0);
const UI: ShaderId = ShaderId(1);

/// Producer replaying a fixed scene, tagging every instance with the frame number
#[derive(Default)]
struct SceneProducer {
    groups: Vec<DrawGroup>,
    instances: Vec<InstanceData>,
    cues: Vec<u32>,
    frame: u32,
    events: Vec<String>,
    aspect_ratios: Vec<f32>,
    started: u32,
    extra_instances: usize,
}

impl SceneProducer {
    fn new(groups: Vec<DrawGroup>) -> Self {
        Self {
            groups,
            ..Self::default()
        }
    }

    fn with_cues(mut self, cues: Vec<u32>) -> Self {
        self.cues = cues;
        self
    }

    fn instance(frame: u32, index: usize) -> InstanceData {
        let transform = Mat4::new_translation(&Vec3::new(index as f32, frame as f32, 0.0));
        InstanceData::new(&transform, Vec4::new(frame as f32, index as f32, 0.0, 1.0))
    }
}

impl FrameProducer for SceneProducer {
    fn start(&mut self) {
        self.started += 1;
    }

    fn render_frame(&mut self, aspect_ratio: f32) -> FrameSnapshot<'_> {
        self.events.push("render".to_string());
        self.aspect_ratios.push(aspect_ratio);

        let count = self.groups.iter().map(|group| group.instance_count as usize).sum::<usize>() + self.extra_instances;
        let frame = self.frame;
        self.instances = (0..count).map(|index| Self::instance(frame, index)).collect();
        self.frame += 1;

        FrameSnapshot {
            globals: GlobalUniforms::default(),
            clear_color: [0.1, 0.2, frame as f32 / 100.0],
            instances: &self.instances,
            groups: &self.groups,
            audio_cues: &self.cues,
        }
    }

    fn update_cursor_position(&mut self, position: Vec2) {
        self.events.push(format!("cursor {:.1} {:.1}", position.x, position.y));
    }

    fn update_move_direction(&mut self, _direction: Vec2) {}

    fn update_mouse_button(&mut self, is_down: bool) {
        self.events.push(format!("mouse {}", is_down));
    }

    fn update_key_pressed(&mut self, key_code: i32) {
        self.events.push(format!("key {}", key_code));
    }

    fn audio_category(&self, cue: u32) -> AudioCategory {
        if cue >= 100 {
            AudioCategory::Music
        } else {
            AudioCategory::Effect
        }
    }
}

/// Input source replaying a scripted sequence, then idling
struct ScriptedInput {
    states: Vec<InputState>,
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputState {
        if self.states.is_empty() {
            InputState::default()
        } else {
            self.states.remove(0)
        }
    }
}

fn mixed_scene() -> Vec<DrawGroup> {
    vec![
        DrawGroup::new(SPHERE, WHITE, LIT, 3),
        DrawGroup::new(SPHERE, WHITE, LIT, 2),
        DrawGroup::new(CUBE, GRID, LIT, 4),
        DrawGroup::new(CUBE, GRID, UI, 1),
    ]
}

fn pipeline(config: &RendererConfig, mode: CompletionMode) -> FramePipeline<HeadlessBackend> {
    logging::init_for_tests();
    let backend = HeadlessBackend::from_config((1280, 720), config)
        .unwrap()
        .with_completion(mode)
        .unwrap();
    FramePipeline::new(backend, config).unwrap()
}

#[test]
fn test_slots_rotate_through_the_ring() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    let slots: Vec<usize> = (0..7)
        .map(|_| pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap().slot)
        .collect();

    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(producer.started, 1);
    assert_eq!(pipeline.frames_rendered(), 7);
}

#[test]
fn test_drawn_instances_match_the_producer() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    for _ in 0..4 {
        pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    }

    let backend = pipeline.into_backend().unwrap();
    for (frame_number, frame) in backend.frames().iter().enumerate() {
        let expected: Vec<InstanceData> = (0..10)
            .map(|index| SceneProducer::instance(frame_number as u32, index))
            .collect();
        assert_eq!(frame.drawn_instances, expected, "frame {}", frame_number);
        assert_eq!(frame.frame.0, frame_number as u64);
    }
}

#[test]
fn test_redundant_bindings_are_elided() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();

    assert_eq!(
        pipeline.last_commands().commands(),
        &[
            DrawCommand::BindMesh(SPHERE),
            DrawCommand::BindTexture(WHITE),
            DrawCommand::BindShader(LIT),
            DrawCommand::Draw { mesh: SPHERE, base_instance: 0, instance_count: 3 },
            DrawCommand::Draw { mesh: SPHERE, base_instance: 3, instance_count: 2 },
            DrawCommand::BindMesh(CUBE),
            DrawCommand::BindTexture(GRID),
            DrawCommand::Draw { mesh: CUBE, base_instance: 5, instance_count: 4 },
            DrawCommand::BindShader(UI),
            DrawCommand::Draw { mesh: CUBE, base_instance: 9, instance_count: 1 },
        ]
    );
    assert_eq!(report.stats.draw_calls, 4);
    assert_eq!(report.stats.state_changes(), 6);
    assert_eq!(report.instance_count, 10);
}

#[test]
fn test_deferred_completion_holds_the_oldest_slot() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Deferred);
    let mut producer = SceneProducer::new(mixed_scene());

    for _ in 0..3 {
        pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    }
    assert_eq!(pipeline.frames_in_flight(), 3);
    assert_eq!(pipeline.backend().pending(), 3);

    // Releasing frame 0 frees exactly slot 0 for the fourth frame
    assert!(pipeline.backend_mut().complete_oldest());
    let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(report.frame.0, 3);
    assert_eq!(pipeline.backend().peak_busy_slots(), 3);

    pipeline.wait_idle().unwrap();
    assert_eq!(pipeline.frames_in_flight(), 0);
}

#[test]
fn test_threaded_completion_never_exceeds_frames_in_flight() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(
        &config,
        CompletionMode::Threaded {
            latency: Duration::from_millis(3),
        },
    );
    let mut producer = SceneProducer::new(mixed_scene());

    for _ in 0..12 {
        pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
        assert!(pipeline.frames_in_flight() <= 3);
    }
    pipeline.wait_idle().unwrap();

    let backend = pipeline.into_backend().unwrap();
    assert_eq!(backend.frames().len(), 12);
    assert!(backend.peak_busy_slots() <= 3);
}

#[test]
fn test_single_frame_in_flight_serializes_frames() {
    let config = RendererConfig::default().with_frames_in_flight(1);
    let mut pipeline = pipeline(
        &config,
        CompletionMode::Threaded {
            latency: Duration::from_millis(1),
        },
    );
    let mut producer = SceneProducer::new(mixed_scene());

    for _ in 0..4 {
        let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
        assert_eq!(report.slot, 0);
    }
    let backend = pipeline.into_backend().unwrap();
    assert_eq!(backend.peak_busy_slots(), 1);
}

#[test]
fn test_capacity_exceeded_fails_the_frame() {
    let config = RendererConfig::default().with_max_instances(8);
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    let result = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink);

    assert!(matches!(
        result,
        Err(RenderError::CapacityExceeded { requested: 10, capacity: 8 })
    ));
    assert!(pipeline.backend().frames().is_empty());

    // The abandoned frame's ticket was released, so the next frame still gets a slot
    let mut smaller = SceneProducer::new(vec![DrawGroup::new(SPHERE, WHITE, LIT, 8)]);
    let report = pipeline.render_frame(&mut smaller, &mut NoInput, &mut NullAudioSink).unwrap();
    assert_eq!(report.frame.0, 1);
}

#[test]
fn test_exact_capacity_is_accepted() {
    let config = RendererConfig::default().with_max_instances(10);
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    assert_eq!(report.instance_count, 10);
}

#[test]
fn test_group_count_mismatch_fails_the_frame() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());
    producer.extra_instances = 2;

    let result = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink);

    assert!(matches!(
        result,
        Err(RenderError::GroupCountMismatch { grouped: 10, instances: 12 })
    ));
    assert!(pipeline.backend().frames().is_empty());
}

#[test]
fn test_missing_resource_is_not_submitted() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(vec![DrawGroup::new(MeshId(7), WHITE, LIT, 1)]);

    let result = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink);

    assert!(matches!(result, Err(RenderError::MissingResource { kind: "mesh", id: 7 })));
    assert!(pipeline.backend().frames().is_empty());
}

#[test]
fn test_empty_groups_follow_policy() {
    let groups = vec![
        DrawGroup::new(SPHERE, WHITE, LIT, 2),
        DrawGroup::new(CUBE, GRID, UI, 0),
        DrawGroup::new(SPHERE, WHITE, LIT, 1),
    ];

    let config = RendererConfig::default();
    let mut skipping = pipeline(&config, CompletionMode::Immediate);
    let report = skipping
        .render_frame(&mut SceneProducer::new(groups.clone()), &mut NoInput, &mut NullAudioSink)
        .unwrap();
    assert_eq!(report.stats.groups_skipped, 1);
    assert_eq!(report.stats.draw_calls, 2);
    // The skipped group does not break the binding run
    assert_eq!(report.stats.state_changes(), 3);

    let config = RendererConfig::default().with_empty_group_policy(EmptyGroupPolicy::Reject);
    let mut rejecting = pipeline(&config, CompletionMode::Immediate);
    let result = rejecting.render_frame(&mut SceneProducer::new(groups), &mut NoInput, &mut NullAudioSink);
    assert!(matches!(result, Err(RenderError::EmptyDrawGroup { index: 1 })));
}

#[test]
fn test_empty_frame_clears_without_draws() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(Vec::new());

    let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();

    assert_eq!(report.instance_count, 0);
    let frame = &pipeline.backend().frames()[0];
    assert_eq!(frame.draw_count(), 0);
    assert_eq!(frame.clear_color, [0.1, 0.2, 0.0]);
}

#[test]
fn test_input_reaches_producer_before_the_frame() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());
    let mut input = ScriptedInput {
        states: vec![
            InputState {
                cursor: Vec2::new(0.5, 2.0),
                mouse_events: vec![true, false, true],
                keys_pressed: vec![87],
                ..InputState::default()
            },
            InputState {
                cursor: Vec2::new(0.5, 0.5),
                ..InputState::default()
            },
        ],
    };

    pipeline.render_frame(&mut producer, &mut input, &mut NullAudioSink).unwrap();
    pipeline.render_frame(&mut producer, &mut input, &mut NullAudioSink).unwrap();

    assert_eq!(
        producer.events,
        vec![
            "cursor 0.5 1.0",
            "mouse true",
            "mouse false",
            "mouse true",
            "key 87",
            "render",
            "cursor 0.5 0.5",
            "render"
        ]
    );
}

#[test]
fn test_audio_cues_forwarded_after_submit() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene()).with_cues(vec![3, 100, 4]);
    let mut audio = LoggingAudioSink::new(1);

    let report = pipeline.render_frame(&mut producer, &mut NoInput, &mut audio).unwrap();
    pipeline.render_frame(&mut producer, &mut NoInput, &mut audio).unwrap();

    assert_eq!(report.audio_cues, 3);
    assert_eq!(audio.current_music(), Some(100));
    // One effect voice per frame: cue 4 is dropped each frame
    assert_eq!(audio.dropped(), 2);
    assert_eq!(audio.played().collect::<Vec<_>>(), vec![3, 100]);
}

#[test]
fn test_aspect_ratio_follows_resize() {
    let config = RendererConfig::default();
    let mut pipeline = pipeline(&config, CompletionMode::Immediate);
    let mut producer = SceneProducer::new(mixed_scene());

    pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    pipeline.backend_mut().resize(800, 400);
    pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();
    pipeline.backend_mut().resize(800, 0);
    pipeline.render_frame(&mut producer, &mut NoInput, &mut NullAudioSink).unwrap();

    assert_eq!(producer.aspect_ratios, vec![1280.0 / 720.0, 2.0, 1.0]);
}

#[test]
fn test_pipeline_rejects_unloaded_resources() {
    logging::init_for_tests();
    let config = RendererConfig::default();
    let backend = HeadlessBackend::new((64, 64));

    let result = FramePipeline::new(backend, &config);

    assert!(matches!(result, Err(RenderError::MissingResource { kind: "mesh", id: 0 })));
}

#[test]
fn test_ring_allocations_follow_config() {
    let config = RendererConfig::default().with_max_instances(16);
    let pipeline = pipeline(&config, CompletionMode::Immediate);

    let allocations = pipeline.backend().allocations();
    assert_eq!(allocations.len(), 6);
    let instance_bytes = 16 * std::mem::size_of::<InstanceData>();
    assert_eq!(
        allocations
            .iter()
            .filter(|(_, size)| *size == instance_bytes)
            .count(),
        3
    );
}
