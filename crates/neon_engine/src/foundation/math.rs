//! Math utilities and types
//!
//! Provides the nalgebra aliases used throughout the engine and the conversions
//! into the column-major arrays the GPU records expect.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Point3,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Convert a matrix into GLSL-compatible column-major arrays
pub fn to_columns(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

/// Right-handed perspective projection for Vulkan clip space
///
/// Depth maps to `[0, 1]` and the Y axis is flipped so +Y points up on screen.
pub fn perspective(aspect_ratio: f32, fov_y_radians: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y_radians * 0.5).tan();
    let depth_scale = far / (near - far);

    Mat4::new(
        focal / aspect_ratio, 0.0, 0.0, 0.0,
        0.0, -focal, 0.0, 0.0,
        0.0, 0.0, depth_scale, near * depth_scale,
        0.0, 0.0, -1.0, 0.0,
    )
}

/// Right-handed orthographic projection for Vulkan clip space
///
/// Used for UI billboards; the visible height is `2 * half_height` world units
/// and the width follows the aspect ratio.
pub fn orthographic(aspect_ratio: f32, half_height: f32, near: f32, far: f32) -> Mat4 {
    let half_width = half_height * aspect_ratio;

    Mat4::new(
        1.0 / half_width, 0.0, 0.0, 0.0,
        0.0, -1.0 / half_height, 0.0, 0.0,
        0.0, 0.0, 1.0 / (near - far), near / (near - far),
        0.0, 0.0, 0.0, 1.0,
    )
}

/// View matrix looking from `eye` towards `target`
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project(matrix: &Mat4, point: Vec3) -> Vec3 {
        let clip = matrix * Vec4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective(16.0 / 9.0, std::f32::consts::FRAC_PI_3, 0.1, 100.0);

        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -0.1)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -100.0)).z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = perspective(1.0, std::f32::consts::FRAC_PI_2, 0.1, 10.0);
        let projected = project(&proj, Vec3::new(0.0, 1.0, -1.0));

        assert_relative_eq!(projected.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_maps_extents() {
        let proj = orthographic(2.0, 1.0, 0.0, 10.0);

        let corner = project(&proj, Vec3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(corner.y, -1.0, epsilon = 1e-6);

        let far = project(&proj, Vec3::new(0.0, 0.0, -10.0));
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_to_columns_is_column_major() {
        let translation = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let columns = to_columns(&translation);

        assert_eq!(columns[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(columns[0], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_look_at_moves_eye_to_origin() {
        let view = look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), Vec3::y());
        let eye_in_view = view * Vec4::new(0.0, 0.0, 5.0, 1.0);

        assert_relative_eq!(eye_in_view.xyz(), Vec3::zeros(), epsilon = 1e-6);
    }
}
