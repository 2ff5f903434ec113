//! Tagged property lists.
//!
//! A list is a sequence of `kind:u8 value` entries closed by kind `255`.
//! Blob and object-list values start with a `u32` length that counts itself.

use super::object::ObjectId;
use super::PROPERTIES_TAG;
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

const KIND_EMPTY: u8 = 0;
const KIND_DOUBLE: u8 = 1;
const KIND_FLOAT: u8 = 2;
const KIND_INT: u8 = 3;
const KIND_BOOL: u8 = 4;
const KIND_ENUM: u8 = 5;
const KIND_COLOR: u8 = 6;
const KIND_STRING: u8 = 7;
const KIND_FILENAME: u8 = 8;
const KIND_BLOB: u8 = 9;
const KIND_OBJECT: u8 = 10;
const KIND_OBJECT_LIST: u8 = 11;
const KIND_END: u8 = 255;

/// Interpretation of a 32-bit integer property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Int,
    Bool,
    Enum,
    Color,
}

impl IntKind {
    fn kind_byte(self) -> u8 {
        match self {
            Self::Int => KIND_INT,
            Self::Bool => KIND_BOOL,
            Self::Enum => KIND_ENUM,
            Self::Color => KIND_COLOR,
        }
    }
}

/// One entry of an object's property list.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Empty,
    Double(f64),
    Float(f32),
    Int(IntKind, i32),
    String(String),
    Filename(String),
    Blob(Vec<u8>),
    /// Reference to another object, or none.
    Object(Option<ObjectId>),
    ObjectList(Vec<ObjectId>),
}

impl Property {
    /// Objects this property points at.
    pub fn references(&self) -> impl Iterator<Item = ObjectId> + '_ {
        let refs: &[ObjectId] = match self {
            Self::Object(Some(id)) => std::slice::from_ref(id),
            Self::ObjectList(ids) => ids.as_slice(),
            _ => &[],
        };
        refs.iter().copied()
    }
}

/// Serialize a property list, closing it with the end marker.
///
/// `id_of` maps an object handle to the reference id stored on disk.
pub fn write_list(
    properties: &[Property],
    w: &mut Writer,
    mut id_of: impl FnMut(ObjectId) -> Result<u32>,
) -> Result<()> {
    for property in properties {
        match property {
            Property::Empty => w.write_u8(KIND_EMPTY),
            Property::Double(v) => {
                w.write_u8(KIND_DOUBLE);
                w.write_f64(*v);
            }
            Property::Float(v) => {
                w.write_u8(KIND_FLOAT);
                w.write_f32(*v);
            }
            Property::Int(kind, v) => {
                w.write_u8(kind.kind_byte());
                w.write_i32(*v);
            }
            Property::String(s) => {
                w.write_u8(KIND_STRING);
                w.write_cstring(s);
            }
            Property::Filename(s) => {
                w.write_u8(KIND_FILENAME);
                w.write_cstring(s);
            }
            Property::Blob(bytes) => {
                w.write_u8(KIND_BLOB);
                w.write_u32(prefixed_len(bytes.len())?);
                w.write_bytes(bytes);
            }
            Property::Object(target) => {
                w.write_u8(KIND_OBJECT);
                w.write_u32(match target {
                    Some(id) => id_of(*id)?,
                    None => 0,
                });
            }
            Property::ObjectList(ids) => {
                w.write_u8(KIND_OBJECT_LIST);
                w.write_u32(prefixed_len(ids.len() * 4)?);
                for id in ids {
                    w.write_u32(id_of(*id)?);
                }
            }
        }
    }
    w.write_u8(KIND_END);
    Ok(())
}

fn prefixed_len(len: usize) -> Result<u32> {
    u32::try_from(len + 4).map_err(|_| Error::TableOverflow {
        table: "property value",
        limit: u32::MAX as usize,
    })
}

/// Read a property list up to and including its end marker.
///
/// `object_at` resolves a non-zero reference id to an object handle.
pub fn read_list(
    c: &mut Cursor<'_>,
    mut object_at: impl FnMut(u32) -> Result<ObjectId>,
) -> Result<Vec<Property>> {
    let mut properties = Vec::new();
    loop {
        let offset = c.position();
        let property = match c.read_u8()? {
            KIND_END => return Ok(properties),
            KIND_EMPTY => Property::Empty,
            KIND_DOUBLE => Property::Double(c.read_f64()?),
            KIND_FLOAT => Property::Float(c.read_f32()?),
            KIND_INT => Property::Int(IntKind::Int, c.read_i32()?),
            KIND_BOOL => Property::Int(IntKind::Bool, c.read_i32()?),
            KIND_ENUM => Property::Int(IntKind::Enum, c.read_i32()?),
            KIND_COLOR => Property::Int(IntKind::Color, c.read_i32()?),
            KIND_STRING => Property::String(c.read_cstring()?),
            KIND_FILENAME => Property::Filename(c.read_cstring()?),
            KIND_BLOB => {
                let len = read_prefixed_len(c)?;
                Property::Blob(c.read_bytes(len)?.to_vec())
            }
            KIND_OBJECT => match c.read_u32()? {
                0 => Property::Object(None),
                id => Property::Object(Some(object_at(id)?)),
            },
            KIND_OBJECT_LIST => {
                let len = read_prefixed_len(c)?;
                if len % 4 != 0 {
                    return Err(Error::malformed(
                        PROPERTIES_TAG,
                        offset,
                        format!("object list payload of {len} bytes is not a multiple of 4"),
                    ));
                }
                let mut ids = Vec::with_capacity(len / 4);
                for _ in 0..len / 4 {
                    ids.push(object_at(c.read_u32()?)?);
                }
                Property::ObjectList(ids)
            }
            other => {
                return Err(Error::malformed(
                    PROPERTIES_TAG,
                    offset,
                    format!("unknown property kind {other}"),
                ))
            }
        };
        properties.push(property);
    }
}

/// Read a self-inclusive length and return the payload size after it.
fn read_prefixed_len(c: &mut Cursor<'_>) -> Result<usize> {
    let offset = c.position();
    let len = c.read_u32()? as usize;
    len.checked_sub(4).ok_or_else(|| {
        Error::malformed(
            PROPERTIES_TAG,
            offset,
            format!("length prefix {len} is smaller than itself"),
        )
    })
}
