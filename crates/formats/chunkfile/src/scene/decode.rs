use glam::Vec3;

use super::object::{GameObject, Layer, Light, MeshRef, ObjectId};
use super::{orientation, property, Scene};
use super::{
    CLIP_TAG, EXTRA_LIGHT, EXTRA_MESH, HEADER_SIZE, LIGHT_RECORD_SIZE, MAIN_TAG,
    MESH_RECORD_SIZE, NAMES_TAG, OBJECT_TAG, ORIENTATIONS_TAG, POSITIONS_TAG, PROPERTIES_TAG,
    SCENE_TAG,
};
use crate::chunk::{self, Chunk};
use crate::config::CodecConfig;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Flat tables every header points into.
struct Tables<'a> {
    names: &'a [u8],
    positions: &'a [u8],
    orientations: &'a [u8],
    properties: &'a [u8],
}

/// Decode a serialized `SCNE` chunk.
pub fn load(data: &[u8], config: &CodecConfig) -> Result<Scene> {
    decode(&chunk::decode(data)?, config)
}

/// Build a scene from a decoded `SCNE` chunk.
///
/// Pass 1 creates one stub object per `GOBJ` node in walk order, so that
/// reference id `n` names the `n`-th object created. Pass 2 fills in each
/// object from its header, resolving object references against pass 1.
pub fn decode(root: &Chunk, config: &CodecConfig) -> Result<Scene> {
    if root.tag != SCENE_TAG {
        return Err(Error::malformed(
            root.tag,
            0,
            format!("expected {SCENE_TAG} chunk"),
        ));
    }
    let tables = Tables {
        names: root.require(NAMES_TAG)?.expect_raw()?,
        positions: root.require(POSITIONS_TAG)?.expect_raw()?,
        orientations: root.require(ORIENTATIONS_TAG)?.expect_raw()?,
        properties: root.require(PROPERTIES_TAG)?.expect_raw()?,
    };

    // Pass 1: stubs.
    let mut scene = Scene::new();
    let mut nodes: Vec<(ObjectId, &Chunk)> = Vec::new();
    for (layer, tag) in [(Layer::Clip, CLIP_TAG), (Layer::Main, MAIN_TAG)] {
        for node in &root.require(tag)?.subchunks {
            create_stubs(&mut scene, layer, None, node, &mut nodes)?;
        }
    }
    let by_ref: Vec<ObjectId> = nodes.iter().map(|(id, _)| *id).collect();

    // Pass 2: headers and properties.
    for &(id, node) in &nodes {
        let object = read_object(node, &tables, &by_ref, config)?;
        let stub = &mut scene.objects[id];
        stub.name = object.name;
        stub.type_id = object.type_id;
        stub.position = object.position;
        stub.orientation = object.orientation;
        stub.state = object.state;
        stub.property_flags = object.property_flags;
        stub.properties = object.properties;
        stub.mesh = object.mesh;
        stub.light = object.light;
    }

    log::debug!(
        "decoded scene: {} objects ({} clip roots, {} main roots)",
        scene.len(),
        scene.clip.len(),
        scene.main.len()
    );
    Ok(scene)
}

fn create_stubs<'c>(
    scene: &mut Scene,
    layer: Layer,
    parent: Option<ObjectId>,
    node: &'c Chunk,
    nodes: &mut Vec<(ObjectId, &'c Chunk)>,
) -> Result<()> {
    if node.tag != OBJECT_TAG {
        return Err(Error::malformed(
            node.tag,
            0,
            format!("expected {OBJECT_TAG} node in object tree"),
        ));
    }
    let id = match parent {
        None => scene.add_object(layer, GameObject::new("")),
        Some(parent) => scene.add_child(parent, GameObject::new(""))?,
    };
    nodes.push((id, node));
    for child in &node.subchunks {
        create_stubs(scene, layer, Some(id), child, nodes)?;
    }
    Ok(())
}

fn read_object(
    node: &Chunk,
    tables: &Tables<'_>,
    by_ref: &[ObjectId],
    config: &CodecConfig,
) -> Result<GameObject> {
    let header = node.expect_raw()?;
    let mut c = Cursor::new(header);
    let name_offset = c.read_u32()?;
    let type_id = c.read_u32()?;
    let props_offset = c.read_u32()?;
    let position_index = c.read_u16()?;
    let orientation_index = c.read_u16()?;
    let state = c.read_u8()?;
    let extras = c.read_u8()?;

    let mut expected = HEADER_SIZE;
    if extras & EXTRA_MESH != 0 {
        expected += MESH_RECORD_SIZE;
    }
    if extras & EXTRA_LIGHT != 0 {
        expected += LIGHT_RECORD_SIZE;
    }
    if extras & !(EXTRA_MESH | EXTRA_LIGHT) != 0 || header.len() != expected {
        return Err(Error::malformed(
            node.tag,
            0,
            format!(
                "object header is {} bytes with extras {extras:#04x}, expected {expected}",
                header.len()
            ),
        ));
    }
    let mesh = if extras & EXTRA_MESH != 0 {
        Some(MeshRef {
            vertex_start: c.read_u32()?,
            vertex_count: c.read_u32()?,
            face_start: c.read_u32()?,
            face_count: c.read_u32()?,
            flags: c.read_u32()?,
        })
    } else {
        None
    };
    let light = if extras & EXTRA_LIGHT != 0 {
        Some(Light {
            color: c.read_f32x3()?,
            intensity: c.read_f32()?,
            range: c.read_f32()?,
            inner_cone: c.read_f32()?,
            outer_cone: c.read_f32()?,
        })
    } else {
        None
    };

    let name = {
        let mut c = table_cursor(tables.names, name_offset, "object name")?;
        c.read_cstring()?
    };

    let position = {
        let mut c = element_cursor(tables.positions, position_index, 12, "position index")?;
        Vec3::from_array(c.read_f32x3()?)
    };

    let orientation = {
        let mut c = element_cursor(tables.orientations, orientation_index, 16, "orientation index")?;
        let words = [c.read_i32()?, c.read_i32()?, c.read_i32()?, c.read_i32()?];
        orientation::unpack(words)
    };
    if config.check_orthonormal && !orientation::is_orthonormal(&orientation) {
        log::warn!(
            "object {name:?}: orientation {orientation_index} is not orthonormal ({orientation:?})"
        );
    }

    let mut c = table_cursor(tables.properties, props_offset, "property offset")?;
    let property_flags = c.read_u32()?;
    let properties = property::read_list(&mut c, |id| resolve_ref(by_ref, id))?;

    let mut object = GameObject::new(name);
    object.type_id = type_id;
    object.position = position;
    object.orientation = orientation;
    object.state = state;
    object.property_flags = property_flags;
    object.properties = properties;
    object.mesh = mesh;
    object.light = light;
    Ok(object)
}

/// Cursor at a byte offset that must lie inside the table.
fn table_cursor<'a>(table: &'a [u8], offset: u32, context: &'static str) -> Result<Cursor<'a>> {
    if offset as usize >= table.len() {
        return Err(Error::DanglingReference {
            context,
            index: offset,
            limit: table.len() as u32,
        });
    }
    let mut c = Cursor::new(table);
    c.seek(offset as usize);
    Ok(c)
}

/// Cursor at element `index` of a table of `stride`-byte elements.
fn element_cursor<'a>(
    table: &'a [u8],
    index: u16,
    stride: usize,
    context: &'static str,
) -> Result<Cursor<'a>> {
    let count = table.len() / stride;
    if usize::from(index) >= count {
        return Err(Error::DanglingReference {
            context,
            index: u32::from(index),
            limit: count as u32,
        });
    }
    let mut c = Cursor::new(table);
    c.seek(usize::from(index) * stride);
    Ok(c)
}

fn resolve_ref(by_ref: &[ObjectId], id: u32) -> Result<ObjectId> {
    id.checked_sub(1)
        .and_then(|i| by_ref.get(i as usize))
        .copied()
        .ok_or(Error::DanglingReference {
            context: "object reference",
            index: id,
            limit: by_ref.len() as u32,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Writer;

    fn header(name: u32, props: u32, position: u16, orientation: u16) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(name);
        w.write_u32(7);
        w.write_u32(props);
        w.write_u16(position);
        w.write_u16(orientation);
        w.write_u8(0);
        w.write_u8(0);
        w.into_bytes()
    }

    fn identity_words() -> Vec<u8> {
        let mut w = Writer::new();
        for v in [1 << 30, 0, 0, 1 << 30] {
            w.write_i32(v);
        }
        w.into_bytes()
    }

    fn archive(main: Vec<Chunk>, props: Vec<u8>) -> Chunk {
        let clip = Chunk::new(CLIP_TAG);
        let mut main_root = Chunk::new(MAIN_TAG);
        main_root.subchunks = main;
        let mut positions = Writer::new();
        positions.write_f32x3([1.0, 2.0, 3.0]);
        Chunk::new(SCENE_TAG)
            .with_child(clip)
            .with_child(main_root)
            .with_child(Chunk::with_raw(NAMES_TAG, b"root\0leaf\0".to_vec()))
            .with_child(Chunk::with_raw(POSITIONS_TAG, positions.into_bytes()))
            .with_child(Chunk::with_raw(ORIENTATIONS_TAG, identity_words()))
            .with_child(Chunk::with_raw(PROPERTIES_TAG, props))
    }

    /// Property entry pointing at object `target`.
    fn ref_props(target: u32) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u32(0);
        w.write_u8(10);
        w.write_u32(target);
        w.write_u8(255);
        w.into_bytes()
    }

    #[test]
    fn references_resolve_by_walk_order() {
        let leaf = Chunk::with_raw(OBJECT_TAG, header(5, 0, 0, 0));
        let root = Chunk::with_raw(OBJECT_TAG, header(0, 0, 0, 0)).with_child(leaf);
        let scene = decode(&archive(vec![root], ref_props(2)), &CodecConfig::default()).unwrap();
        assert_eq!(scene.len(), 2);
        let root_id = scene.roots(Layer::Main)[0];
        let leaf_id = scene.children(root_id)[0];
        let root = scene.get(root_id).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.type_id, 7);
        assert_eq!(root.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(root.properties, [property::Property::Object(Some(leaf_id))]);
        assert_eq!(scene.get(leaf_id).unwrap().name, "leaf");
    }

    #[test]
    fn out_of_range_reference_fails() {
        let root = Chunk::with_raw(OBJECT_TAG, header(0, 0, 0, 0));
        let err = decode(&archive(vec![root], ref_props(2)), &CodecConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::DanglingReference { context: "object reference", index: 2, limit: 1 }
        ));
    }

    #[test]
    fn out_of_range_position_fails() {
        let root = Chunk::with_raw(OBJECT_TAG, header(0, 0, 1, 0));
        let err = decode(&archive(vec![root], ref_props(0)), &CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { context: "position index", .. }));
    }

    #[test]
    fn header_size_must_match_extras() {
        let mut bytes = header(0, 0, 0, 0);
        bytes[17] = EXTRA_MESH;
        let root = Chunk::with_raw(OBJECT_TAG, bytes);
        let err = decode(&archive(vec![root], ref_props(0)), &CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn wrong_node_tag_fails() {
        let root = Chunk::with_raw(b"JUNK", header(0, 0, 0, 0));
        let err = decode(&archive(vec![root], ref_props(0)), &CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn missing_table_fails() {
        let mut scene = archive(vec![], ref_props(0));
        scene.subchunks.retain(|c| c.tag != ORIENTATIONS_TAG);
        let err = decode(&scene, &CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ChunkNotFound { tag } if tag == ORIENTATIONS_TAG));
    }
}
