use glam::{DMat3, Vec3};

use super::property::Property;
use crate::define_entity;

define_entity!(
    /// Handle of a [`GameObject`] inside its scene.
    ObjectId
);

/// Which of the two object trees an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Clip,
    Main,
}

/// Mesh range an object renders (`extras & 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshRef {
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub face_start: u32,
    pub face_count: u32,
    pub flags: u32,
}

/// Light attached to an object (`extras & 2`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Light {
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
    pub inner_cone: f32,
    pub outer_cone: f32,
}

/// One node of the scene graph.
///
/// `parent` and `children` are maintained by the owning scene; build objects
/// with [`GameObject::new`] and attach them through the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub name: String,
    pub type_id: u32,
    pub position: Vec3,
    pub orientation: DMat3,
    pub state: u8,
    pub property_flags: u32,
    pub properties: Vec<Property>,
    pub mesh: Option<MeshRef>,
    pub light: Option<Light>,
    pub(crate) layer: Layer,
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
}

impl GameObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: 0,
            position: Vec3::ZERO,
            orientation: DMat3::IDENTITY,
            state: 0,
            property_flags: 0,
            properties: Vec::new(),
            mesh: None,
            light: None,
            layer: Layer::Main,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: DMat3) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_properties(mut self, flags: u32, properties: Vec<Property>) -> Self {
        self.property_flags = flags;
        self.properties = properties;
        self
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Bits of the header's `extras` byte this object encodes with.
    pub(crate) fn extras(&self) -> u8 {
        let mut extras = 0;
        if self.mesh.is_some() {
            extras |= super::EXTRA_MESH;
        }
        if self.light.is_some() {
            extras |= super::EXTRA_LIGHT;
        }
        extras
    }
}
