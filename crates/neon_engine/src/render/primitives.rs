//! Procedural primitive meshes
//!
//! Every shape fits a unit cube centred on the origin, so instance transforms
//! alone decide world size.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::render::api::resources::{MeshData, Vertex};
use crate::render::{RenderError, RenderResult};

/// Shapes the engine can generate at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveShape {
    /// UV sphere of radius 0.5
    Sphere {
        /// Segments around the equator
        segments: u32,
        /// Rings from pole to pole
        rings: u32,
    },
    /// Axis-aligned box with half-extent 0.5
    Cube,
    /// Quad in the XY plane facing +Z, for billboards and UI
    Plane,
}

impl PrimitiveShape {
    /// Generate the mesh
    pub fn build(self) -> RenderResult<MeshData> {
        match self {
            Self::Sphere { segments, rings } => sphere(segments, rings),
            Self::Cube => Ok(cube()),
            Self::Plane => Ok(plane()),
        }
    }
}

/// UV sphere with radius 0.5
pub fn sphere(segments: u32, rings: u32) -> RenderResult<MeshData> {
    if segments < 3 || rings < 2 {
        return Err(RenderError::InvalidConfig(format!(
            "sphere needs at least 3 segments and 2 rings, got {}x{}",
            segments, rings
        )));
    }
    let vertex_count = (segments as usize + 1) * (rings as usize + 1);
    if vertex_count > usize::from(u16::MAX) {
        return Err(RenderError::InvalidConfig(format!(
            "sphere {}x{} needs {} vertices, more than 16-bit indices address",
            segments, rings, vertex_count
        )));
    }

    let mut vertices = Vec::with_capacity(vertex_count);
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let phi = v * PI;
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let theta = u * 2.0 * PI;
            let normal = [phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin()];
            let position = [normal[0] * 0.5, normal[1] * 0.5, normal[2] * 0.5];
            vertices.push(Vertex::new(position, normal, [u, v]));
        }
    }

    let stride = segments as u16 + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for ring in 0..rings as u16 {
        for segment in 0..segments as u16 {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
        }
    }

    Ok(MeshData { vertices, indices })
}

/// Box with half-extent 0.5, four vertices per face for flat normals
pub fn cube() -> MeshData {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // normal, tangent u, tangent v
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, u_axis, v_axis)) in FACES.iter().enumerate() {
        let base = (face * 4) as u16;
        for &(u, v) in &CORNERS {
            let position = [
                normal[0] * 0.5 + u_axis[0] * u + v_axis[0] * v,
                normal[1] * 0.5 + u_axis[1] * u + v_axis[1] * v,
                normal[2] * 0.5 + u_axis[2] * u + v_axis[2] * v,
            ];
            vertices.push(Vertex::new(position, *normal, [u + 0.5, 0.5 - v]));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { vertices, indices }
}

/// Unit quad in the XY plane facing +Z
pub fn plane() -> MeshData {
    let normal = [0.0, 0.0, 1.0];
    MeshData {
        vertices: vec![
            Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 0.0]),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn length(v: [f32; 3]) -> f32 {
        (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
    }

    #[test]
    fn test_sphere_radius_and_counts() {
        let mesh = sphere(16, 8).unwrap();
        assert_eq!(mesh.vertices.len(), 17 * 9);
        assert_eq!(mesh.indices.len(), 16 * 8 * 6);
        mesh.validate().unwrap();

        for vertex in &mesh.vertices {
            assert_relative_eq!(length(vertex.position), 0.5, epsilon = 1e-5);
            assert_relative_eq!(length(vertex.normal), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sphere_rejects_degenerate_and_oversized() {
        assert!(sphere(2, 8).is_err());
        assert!(sphere(8, 1).is_err());
        assert!(sphere(512, 512).is_err());
    }

    #[test]
    fn test_cube_fits_unit_box() {
        let mesh = cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        mesh.validate().unwrap();

        for vertex in &mesh.vertices {
            assert!(vertex.position.iter().all(|c| c.abs() <= 0.5 + f32::EPSILON));
            // Every vertex lies on the face its normal points at
            let along: f32 = (0..3).map(|i| vertex.position[i] * vertex.normal[i]).sum();
            assert_relative_eq!(along, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_shape_dispatch() {
        assert_eq!(PrimitiveShape::Plane.build().unwrap(), plane());
        assert_eq!(PrimitiveShape::Cube.build().unwrap().vertices.len(), 24);
        let sphere = PrimitiveShape::Sphere { segments: 8, rings: 4 }.build().unwrap();
        assert_eq!(sphere.vertices.len(), 45);
    }
}
