//! Demo scene: orbiting spheres, spinning crates, a floor and a cursor overlay

use std::f32::consts::TAU;
use std::time::Instant;

use neon_engine::audio::AudioCategory;
use neon_engine::foundation::math::{look_at, perspective, Mat4, Vec2, Vec3, Vec4};
use neon_engine::render::{DrawGroup, FrameProducer, FrameSnapshot, GlobalUniforms, InstanceData, MeshId, ShaderId, TextureId};

const SPHERE: MeshId = MeshId(0);
const CUBE: MeshId = MeshId(1);
const PLANE: MeshId = MeshId(2);
const WHITE: TextureId = TextureId(0);
const GRID: TextureId = TextureId(1);
const LIT: ShaderId = ShaderId(0);
const UI: ShaderId = ShaderId(1);

const CUE_BURST: u32 = 1;
const CUE_CHIME: u32 = 2;
const CUE_MUSIC: u32 = 100;

const KEY_SPACE: i32 = 32;
const KEY_ESCAPE: i32 = 256;

const START_SPHERES: usize = 12;
const MAX_SPHERES: usize = 240;
const CRATE_GRID: i32 = 5;
const CAMERA_SPEED: f32 = 6.0;

pub struct DemoProducer {
    started: Instant,
    last_frame: Instant,
    camera: Vec3,
    move_direction: Vec2,
    cursor: Vec2,
    sphere_count: usize,
    pending_cues: Vec<u32>,
    quit: bool,

    instances: Vec<InstanceData>,
    groups: Vec<DrawGroup>,
    cues: Vec<u32>,
}

impl DemoProducer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_frame: now,
            camera: Vec3::new(0.0, 6.0, 16.0),
            move_direction: Vec2::zeros(),
            cursor: Vec2::zeros(),
            sphere_count: START_SPHERES,
            pending_cues: Vec::new(),
            quit: false,
            instances: Vec::new(),
            groups: Vec::new(),
            cues: Vec::new(),
        }
    }

    /// Append a group covering the instances pushed since `first`
    fn close_group(&mut self, first: usize, mesh: MeshId, texture: TextureId, shader: ShaderId) {
        let count = (self.instances.len() - first) as u32;
        self.groups.push(DrawGroup::new(mesh, texture, shader, count));
    }

    fn push_spheres(&mut self, time: f32) {
        let first = self.instances.len();
        for index in 0..self.sphere_count {
            let t = index as f32 / self.sphere_count as f32;
            let angle = t * TAU + time * 0.4;
            let radius = 4.0 + (index % 3) as f32 * 1.5;
            let height = 1.0 + (time * 1.3 + t * TAU * 2.0).sin() * 0.8;
            let transform = Mat4::new_translation(&Vec3::new(angle.cos() * radius, height, angle.sin() * radius))
                * Mat4::new_scaling(0.6);
            let color = Vec4::new(0.5 + 0.5 * (t * TAU).cos(), 0.6, 0.5 + 0.5 * (t * TAU).sin(), 1.0);
            self.instances.push(InstanceData::new(&transform, color));
        }
        self.close_group(first, SPHERE, WHITE, LIT);
    }

    fn push_crates(&mut self, time: f32) {
        let first = self.instances.len();
        for x in -CRATE_GRID / 2..=CRATE_GRID / 2 {
            for z in -CRATE_GRID / 2..=CRATE_GRID / 2 {
                if x == 0 && z == 0 {
                    continue;
                }
                let spin = time * 0.7 + (x * 7 + z * 3) as f32;
                let transform = Mat4::new_translation(&Vec3::new(x as f32 * 2.5, 0.5, z as f32 * 2.5))
                    * Mat4::from_euler_angles(0.0, spin, 0.0)
                    * Mat4::new_scaling(0.8);
                self.instances.push(InstanceData::new(&transform, Vec4::new(0.9, 0.75, 0.5, 1.0)));
            }
        }
        self.close_group(first, CUBE, GRID, LIT);

        // The floor shares the grid texture, so only the mesh is rebound
        let first = self.instances.len();
        let floor = Mat4::from_euler_angles(-std::f32::consts::FRAC_PI_2, 0.0, 0.0) * Mat4::new_scaling(30.0);
        self.instances.push(InstanceData::new(&floor, Vec4::new(0.35, 0.4, 0.45, 1.0)));
        self.close_group(first, PLANE, GRID, LIT);
    }

    fn push_overlay(&mut self, aspect_ratio: f32) {
        let first = self.instances.len();

        // Clip space has +Y down
        let reticle = Mat4::new_translation(&Vec3::new(self.cursor.x, -self.cursor.y, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(0.04 / aspect_ratio, 0.04, 1.0));
        self.instances.push(InstanceData::new(&reticle, Vec4::new(1.0, 0.3, 0.2, 0.8)));

        let fill = self.sphere_count as f32 / MAX_SPHERES as f32;
        let bar = Mat4::new_translation(&Vec3::new(-0.95 + fill * 0.5, 0.92, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(fill.max(0.01), 0.04, 1.0));
        self.instances.push(InstanceData::new(&bar, Vec4::new(0.2, 0.9, 0.4, 0.7)));

        self.close_group(first, PLANE, WHITE, UI);
    }
}

impl FrameProducer for DemoProducer {
    fn start(&mut self) {
        log::info!("Demo scene starting with {} spheres", self.sphere_count);
        self.pending_cues.push(CUE_MUSIC);
    }

    fn render_frame(&mut self, aspect_ratio: f32) -> FrameSnapshot<'_> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        let time = now.duration_since(self.started).as_secs_f32();

        self.camera.x += self.move_direction.x * CAMERA_SPEED * dt;
        self.camera.z -= self.move_direction.y * CAMERA_SPEED * dt;

        self.instances.clear();
        self.groups.clear();
        self.push_spheres(time);
        self.push_crates(time);
        self.push_overlay(aspect_ratio);

        self.cues.clear();
        self.cues.append(&mut self.pending_cues);

        let target = Vec3::new(self.camera.x, 0.0, self.camera.z - 16.0);
        let view = look_at(self.camera, target, Vec3::y());
        let projection = perspective(aspect_ratio, 60f32.to_radians(), 0.1, 200.0);

        FrameSnapshot {
            globals: GlobalUniforms::new(&view, &projection, [0.6, 0.7, 1.0, 0.25]),
            clear_color: [0.02, 0.02, 0.05],
            instances: &self.instances,
            groups: &self.groups,
            audio_cues: &self.cues,
        }
    }

    fn update_cursor_position(&mut self, position: Vec2) {
        self.cursor = position;
    }

    fn update_move_direction(&mut self, direction: Vec2) {
        self.move_direction = direction;
    }

    fn update_mouse_button(&mut self, is_down: bool) {
        if is_down {
            self.sphere_count = (self.sphere_count * 2).min(MAX_SPHERES);
            self.pending_cues.push(CUE_BURST);
            log::debug!("Burst: {} spheres", self.sphere_count);
        }
    }

    fn update_key_pressed(&mut self, key_code: i32) {
        match key_code {
            KEY_SPACE => {
                self.sphere_count = START_SPHERES;
                self.pending_cues.push(CUE_CHIME);
            }
            KEY_ESCAPE => self.quit = true,
            _ => {}
        }
    }

    fn audio_category(&self, cue: u32) -> AudioCategory {
        if cue == CUE_MUSIC {
            AudioCategory::Music
        } else {
            AudioCategory::Effect
        }
    }

    fn should_quit(&self) -> bool {
        self.quit
    }
}
