use std::collections::HashMap;

use super::object::{Layer, ObjectId};
use super::verify::{self, SaveReport};
use super::{orientation, property, Scene};
use super::{
    NAMES_TAG, OBJECT_TAG, ORIENTATIONS_TAG, POSITIONS_TAG, PROPERTIES_TAG, SCENE_TAG,
};
use crate::chunk::{self, Chunk};
use crate::config::CodecConfig;
use crate::cursor::Writer;
use crate::dedup::SaveContext;
use crate::entity::EntityRef;
use crate::error::{Error, Result};

/// Encode a scene and serialize the resulting chunk tree.
pub fn save(scene: &Scene) -> Result<Vec<u8>> {
    chunk::encode(&encode(scene)?)
}

/// Build the `SCNE` chunk for a scene.
///
/// Objects are renumbered by walk order; every table is deduplicated through
/// a fresh [`SaveContext`].
pub fn encode(scene: &Scene) -> Result<Chunk> {
    let ids = scene.reference_ids();
    let mut ctx = SaveContext::new();
    let mut root = Chunk::new(SCENE_TAG);
    for layer in [Layer::Clip, Layer::Main] {
        let mut container = Chunk::new(layer.tag());
        for &id in scene.roots(layer) {
            container.subchunks.push(encode_object(scene, id, &ids, &mut ctx)?);
        }
        root.subchunks.push(container);
    }

    log::debug!(
        "encoded scene: {} objects, {} names, {} positions, {} orientations, {} property sets",
        ids.len(),
        ctx.names.len(),
        ctx.positions.len(),
        ctx.orientations.len(),
        ctx.properties.len()
    );
    root.subchunks.extend([
        Chunk::with_raw(NAMES_TAG, ctx.names.into_bytes()),
        Chunk::with_raw(POSITIONS_TAG, ctx.positions.into_bytes()),
        Chunk::with_raw(ORIENTATIONS_TAG, ctx.orientations.into_bytes()),
        Chunk::with_raw(PROPERTIES_TAG, ctx.properties.into_bytes()),
    ]);
    Ok(root)
}

/// Encode, then compare against the chunk the scene was loaded from.
///
/// The comparison only reports; a mismatch never fails the save. It is
/// skipped when `config.verify_on_save` is off or there is no previous chunk.
pub fn encode_with_report(
    scene: &Scene,
    config: &CodecConfig,
    previous: Option<&Chunk>,
) -> Result<(Chunk, SaveReport)> {
    let chunk = encode(scene)?;
    let report = match previous {
        Some(previous) if config.verify_on_save => verify::compare(previous, &chunk),
        _ => SaveReport::default(),
    };
    Ok((chunk, report))
}

fn encode_object(
    scene: &Scene,
    id: ObjectId,
    ids: &HashMap<ObjectId, u32>,
    ctx: &mut SaveContext,
) -> Result<Chunk> {
    let object = &scene.objects[id];

    let mut list = Writer::new();
    property::write_list(&object.properties, &mut list, |target| {
        ids.get(&target).copied().ok_or(Error::DanglingReference {
            context: "object reference",
            index: target.index(),
            limit: scene.len() as u32,
        })
    })?;

    let mut w = Writer::with_capacity(super::HEADER_SIZE);
    w.write_u32(ctx.intern_name(&object.name)?);
    w.write_u32(object.type_id);
    w.write_u32(ctx.intern_properties(object.property_flags, list.into_bytes())?);
    w.write_u16(ctx.intern_position(object.position)?);
    w.write_u16(ctx.intern_orientation(orientation::pack(&object.orientation))?);
    w.write_u8(object.state);
    w.write_u8(object.extras());
    if let Some(mesh) = &object.mesh {
        w.write_u32(mesh.vertex_start);
        w.write_u32(mesh.vertex_count);
        w.write_u32(mesh.face_start);
        w.write_u32(mesh.face_count);
        w.write_u32(mesh.flags);
    }
    if let Some(light) = &object.light {
        w.write_f32x3(light.color);
        w.write_f32(light.intensity);
        w.write_f32(light.range);
        w.write_f32(light.inner_cone);
        w.write_f32(light.outer_cone);
    }

    let mut node = Chunk::with_raw(OBJECT_TAG, w.into_bytes());
    for &child in &object.children {
        node.subchunks.push(encode_object(scene, child, ids, ctx)?);
    }
    Ok(node)
}
