//! Scene graph stored in a `SCNE` chunk.
//!
//! ```text
//! SCNE
//!   CLIP   clip tree roots (GOBJ nodes, nested like the objects)
//!   MAIN   main tree roots
//!   NAME   NUL-terminated names, addressed by byte offset
//!   POSI   3×f32 positions, addressed by index
//!   ORNT   packed orientations, addressed by index
//!   PROP   property lists, addressed by byte offset
//! ```
//!
//! Every `GOBJ` node's raw payload is the object's header record. Objects are
//! referenced on disk by their 1-based position in a pre-order walk of the
//! clip tree followed by the main tree.

mod decode;
mod encode;
pub mod object;
pub mod orientation;
pub mod property;
pub mod verify;

use std::collections::HashMap;

use glam::DAffine3;

use crate::entity::{EntityRef, PrimaryMap};
use crate::error::{Error, Result};
use crate::tag::Tag;

pub use decode::{decode, load};
pub use encode::{encode, encode_with_report, save};
pub use object::{GameObject, Layer, Light, MeshRef, ObjectId};
pub use property::{IntKind, Property};
pub use verify::{ContainerMismatch, SaveReport};

pub const SCENE_TAG: Tag = Tag::new(b"SCNE");
pub const CLIP_TAG: Tag = Tag::new(b"CLIP");
pub const MAIN_TAG: Tag = Tag::new(b"MAIN");
pub const OBJECT_TAG: Tag = Tag::new(b"GOBJ");
pub const NAMES_TAG: Tag = Tag::new(b"NAME");
pub const POSITIONS_TAG: Tag = Tag::new(b"POSI");
pub const ORIENTATIONS_TAG: Tag = Tag::new(b"ORNT");
pub const PROPERTIES_TAG: Tag = Tag::new(b"PROP");

/// Size of an object header without its optional records.
pub const HEADER_SIZE: usize = 18;
pub const MESH_RECORD_SIZE: usize = 20;
pub const LIGHT_RECORD_SIZE: usize = 28;

pub(crate) const EXTRA_MESH: u8 = 1;
pub(crate) const EXTRA_LIGHT: u8 = 2;

impl Layer {
    pub fn tag(self) -> Tag {
        match self {
            Self::Clip => CLIP_TAG,
            Self::Main => MAIN_TAG,
        }
    }
}

/// An object graph: two forests of [`GameObject`]s in one arena.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: PrimaryMap<ObjectId, GameObject>,
    clip: Vec<ObjectId>,
    main: Vec<ObjectId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root object to a layer.
    pub fn add_object(&mut self, layer: Layer, mut object: GameObject) -> ObjectId {
        object.layer = layer;
        object.parent = None;
        object.children.clear();
        let id = self.objects.push(object);
        match layer {
            Layer::Clip => self.clip.push(id),
            Layer::Main => self.main.push(id),
        }
        id
    }

    /// Add an object as the last child of `parent`.
    pub fn add_child(&mut self, parent: ObjectId, mut object: GameObject) -> Result<ObjectId> {
        let limit = self.objects.len() as u32;
        let layer = self
            .objects
            .get(parent)
            .ok_or(Error::DanglingReference {
                context: "parent object",
                index: parent.index(),
                limit,
            })?
            .layer;
        object.layer = layer;
        object.parent = Some(parent);
        object.children.clear();
        let id = self.objects.push(object);
        self.objects[parent].children.push(id);
        Ok(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Root objects of a layer, in order.
    pub fn roots(&self, layer: Layer) -> &[ObjectId] {
        match layer {
            Layer::Clip => &self.clip,
            Layer::Main => &self.main,
        }
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.objects.get(id).map_or(&[], |o| o.children.as_slice())
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(id).and_then(|o| o.parent)
    }

    /// Topmost ancestor of `id` (itself for a root).
    pub fn root_of(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Pre-order walk of the clip tree, then the main tree.
    pub fn walk(&self) -> Vec<ObjectId> {
        let mut order = Vec::with_capacity(self.objects.len());
        for roots in [&self.clip, &self.main] {
            let mut stack: Vec<ObjectId> = roots.iter().rev().copied().collect();
            while let Some(id) = stack.pop() {
                order.push(id);
                stack.extend(self.children(id).iter().rev());
            }
        }
        order
    }

    /// The on-disk reference id of every object: its 1-based walk position.
    pub fn reference_ids(&self) -> HashMap<ObjectId, u32> {
        self.walk()
            .into_iter()
            .zip(1u32..)
            .collect()
    }

    /// Object-space transform: orientation plus translation.
    pub fn transform(&self, id: ObjectId) -> Option<DAffine3> {
        let object = self.objects.get(id)?;
        Some(DAffine3::from_mat3_translation(
            object.orientation,
            object.position.as_dvec3(),
        ))
    }

    /// World transform, composing every ancestor's object-space transform.
    pub fn world_transform(&self, id: ObjectId) -> Option<DAffine3> {
        let mut transform = self.transform(id)?;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            transform = self.transform(parent)? * transform;
            current = parent;
        }
        Some(transform)
    }

    /// First object with the given name in walk order.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.walk()
            .into_iter()
            .find(|&id| self.objects[id].name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &GameObject)> {
        self.objects.iter()
    }

    /// Whether two scenes hold the same trees with the same object data.
    ///
    /// References are compared by walk position, so scenes built in a
    /// different arena order still compare equal.
    pub fn is_isomorphic(&self, other: &Scene) -> bool {
        let ours = self.walk();
        let theirs = other.walk();
        if ours.len() != theirs.len() {
            return false;
        }
        let our_ids = self.reference_ids();
        let their_ids = other.reference_ids();
        let same_parent = |a: Option<ObjectId>, b: Option<ObjectId>| match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => our_ids.get(&a) == their_ids.get(&b),
            _ => false,
        };
        ours.iter().zip(&theirs).all(|(&a, &b)| {
            let (x, y) = (&self.objects[a], &other.objects[b]);
            x.name == y.name
                && x.type_id == y.type_id
                && x.position == y.position
                && x.orientation == y.orientation
                && x.state == y.state
                && x.property_flags == y.property_flags
                && x.mesh == y.mesh
                && x.light == y.light
                && x.layer == y.layer
                && same_parent(x.parent, y.parent)
                && x.properties.len() == y.properties.len()
                && x.properties.iter().zip(&y.properties).all(|(p, q)| {
                    same_value(p, q)
                        && p.references()
                            .map(|r| our_ids.get(&r))
                            .eq(q.references().map(|r| their_ids.get(&r)))
                })
        })
    }
}

/// Property equality ignoring which handles references hold.
fn same_value(a: &Property, b: &Property) -> bool {
    match (a, b) {
        (Property::Object(x), Property::Object(y)) => x.is_some() == y.is_some(),
        (Property::ObjectList(x), Property::ObjectList(y)) => x.len() == y.len(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use glam::{DMat3, DVec3, Vec3};

    use super::*;

    fn sample() -> (Scene, [ObjectId; 4]) {
        let mut scene = Scene::new();
        let cam = scene.add_object(Layer::Clip, GameObject::new("camera"));
        let house = scene.add_object(Layer::Main, GameObject::new("house"));
        let door = scene
            .add_child(house, GameObject::new("door").with_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let tree = scene.add_object(Layer::Main, GameObject::new("tree"));
        (scene, [cam, house, door, tree])
    }

    #[test]
    fn walk_visits_clip_then_main_in_pre_order() {
        let (scene, [cam, house, door, tree]) = sample();
        assert_eq!(scene.walk(), [cam, house, door, tree]);
        let ids = scene.reference_ids();
        assert_eq!((ids[&cam], ids[&door], ids[&tree]), (1, 3, 4));
    }

    #[test]
    fn links_follow_the_tree() {
        let (scene, [_, house, door, _]) = sample();
        assert_eq!(scene.parent(door), Some(house));
        assert_eq!(scene.children(house), [door]);
        assert_eq!(scene.root_of(door), house);
        assert_eq!(scene.root_of(house), house);
        assert_eq!(scene.get(door).unwrap().layer(), Layer::Main);
        assert_eq!(scene.find_by_name("door"), Some(door));
        assert_eq!(scene.find_by_name("roof"), None);
    }

    #[test]
    fn add_child_rejects_unknown_parent() {
        let mut scene = Scene::new();
        let err = scene
            .add_child(ObjectId::new(3), GameObject::new("orphan"))
            .unwrap_err();
        assert!(matches!(err, Error::DanglingReference { index: 3, limit: 0, .. }));
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut scene = Scene::new();
        let parent = scene.add_object(
            Layer::Main,
            GameObject::new("arm")
                .with_position(Vec3::new(0.0, 0.0, 2.0))
                .with_orientation(DMat3::from_rotation_z(std::f64::consts::FRAC_PI_2)),
        );
        let child = scene
            .add_child(parent, GameObject::new("hand").with_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let world = scene.world_transform(child).unwrap();
        let origin = world.transform_point3(DVec3::ZERO);
        assert!(origin.abs_diff_eq(DVec3::new(0.0, 1.0, 2.0), 1e-12));
        assert_eq!(
            scene.transform(child).unwrap().translation,
            DVec3::new(1.0, 0.0, 0.0)
        );
    }
}
