//! GPU resource ids and tables
//!
//! Meshes, textures and shaders are loaded once at startup into
//! [`ResourceTable`]s and addressed by the small integer ids the producer puts
//! in its draw groups. Tables are never mutated after load.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::render::{RenderError, RenderResult};

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Resource kind used in error messages
            pub const KIND: &'static str = $kind;

            /// Table index for this id
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

resource_id!(
    /// Id of a mesh (vertex + index buffers)
    MeshId, "mesh"
);
resource_id!(
    /// Id of a sampled texture
    TextureId, "texture"
);
resource_id!(
    /// Id of a shader / graphics pipeline state
    ShaderId, "shader"
);

/// Immutable table of GPU resources indexed by id
#[derive(Debug)]
pub struct ResourceTable<T> {
    kind: &'static str,
    entries: Vec<Option<T>>,
}

impl<T> ResourceTable<T> {
    /// Create an empty table for the given resource kind
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Insert a resource during startup loading
    ///
    /// Ids may be sparse; gaps stay empty and fail lookups.
    pub fn insert(&mut self, id: u32, resource: T) -> RenderResult<()> {
        let index = id as usize;
        if index >= self.entries.len() {
            self.entries.resize_with(index + 1, || None);
        }
        if self.entries[index].is_some() {
            return Err(RenderError::InvalidConfig(format!("duplicate {} id {}", self.kind, id)));
        }
        self.entries[index] = Some(resource);
        Ok(())
    }

    /// Look up a resource
    pub fn get(&self, id: u32) -> RenderResult<&T> {
        self.entries
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(RenderError::MissingResource { kind: self.kind, id })
    }

    /// Whether the table holds a resource for `id`
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_ok()
    }

    /// Number of loaded resources
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// Whether no resources are loaded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(id, resource)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|resource| (index as u32, resource)))
    }

    /// Fail with `MissingResource` for the first id in `required` not loaded
    pub fn require_all(&self, required: impl IntoIterator<Item = u32>) -> RenderResult<()> {
        for id in required {
            self.get(id)?;
        }
        Ok(())
    }
}

/// Mesh vertex: position, normal, texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

/// CPU-side mesh handed over by the asset layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Number of indices drawn per instance
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Check that every index refers to an existing vertex
    pub fn validate(&self) -> RenderResult<()> {
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(RenderError::InvalidConfig(format!(
                "mesh has {} indices, expected a non-empty triangle list",
                self.indices.len()
            )));
        }
        if let Some(&index) = self.indices.iter().find(|&&index| index as usize >= self.vertices.len()) {
            return Err(RenderError::InvalidConfig(format!(
                "mesh index {} out of range for {} vertices",
                index,
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// CPU-side RGBA8 texture handed over by the asset layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 pixels, row-major
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// A 1x1 texture of a single colour
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// Square checkerboard of two colours with `cell`-pixel squares
    pub fn checker(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let pixels = (0..size)
            .flat_map(|y| (0..size).map(move |x| if (x / cell + y / cell) % 2 == 0 { a } else { b }))
            .flatten()
            .collect();
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Check the pixel buffer matches the dimensions
    pub fn validate(&self) -> RenderResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(RenderError::InvalidConfig(format!(
                "texture {}x{} has {} bytes, expected {}",
                self.width,
                self.height,
                self.pixels.len(),
                expected
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_table_sparse_lookup() {
        let mut table = ResourceTable::new(MeshId::KIND);
        table.insert(0, "sphere").unwrap();
        table.insert(3, "quad").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(*table.get(3).unwrap(), "quad");
        assert!(!table.contains(1));
        assert!(matches!(
            table.get(1),
            Err(RenderError::MissingResource { kind: "mesh", id: 1 })
        ));
        assert!(table.get(42).is_err());

        let ids: Vec<u32> = table.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[test]
    fn test_resource_table_rejects_duplicates() {
        let mut table = ResourceTable::new(TextureId::KIND);
        table.insert(1, ()).unwrap();
        assert!(matches!(table.insert(1, ()), Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn test_require_all_reports_first_missing() {
        let mut table = ResourceTable::new(ShaderId::KIND);
        table.insert(0, ()).unwrap();

        assert!(table.require_all([0]).is_ok());
        assert!(matches!(
            table.require_all([0, 1, 2]),
            Err(RenderError::MissingResource { kind: "shader", id: 1 })
        ));
    }

    #[test]
    fn test_mesh_validation() {
        let vertex = Vertex::new([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2]);
        let mut mesh = MeshData {
            vertices: vec![vertex; 3],
            indices: vec![0, 1, 2],
        };
        assert!(mesh.validate().is_ok());

        mesh.indices = vec![0, 1, 3];
        assert!(mesh.validate().is_err());

        mesh.indices = vec![0, 1];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_texture_validation() {
        assert!(TextureData::solid([255, 0, 0, 255]).validate().is_ok());

        let broken = TextureData { width: 2, height: 2, pixels: vec![0; 4] };
        assert!(broken.validate().is_err());

        let checker = TextureData::checker(4, 2, [255; 4], [0, 0, 0, 255]);
        checker.validate().unwrap();
        assert_eq!(&checker.pixels[0..4], &[255; 4]);
        assert_eq!(&checker.pixels[8..12], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(MeshId(2).to_string(), "mesh#2");
        assert_eq!(TextureId(0).index(), 0);
    }
}
