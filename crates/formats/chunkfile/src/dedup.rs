//! Content-addressed interning for scene encoding.
//!
//! Each table maps a value to the offset where its first occurrence was
//! written into the table's flat buffer. A [`SaveContext`] bundles the four
//! tables one save needs; it is built fresh per save and dropped afterwards.

use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec3;

use crate::cursor::Writer;
use crate::error::{Error, Result};

/// Largest entry count of a table addressed through a 16-bit index.
pub const MAX_INDEXED_ENTRIES: usize = u16::MAX as usize;

/// Unit a table reports offsets in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Byte offset into the buffer.
    Bytes,
    /// Element index, each element `stride` bytes wide.
    Elements { stride: usize },
}

/// One intern table with its backing buffer.
#[derive(Debug)]
pub struct DedupTable<K> {
    name: &'static str,
    unit: Unit,
    limit: usize,
    offsets: HashMap<K, u32>,
    data: Writer,
}

impl<K: Hash + Eq> DedupTable<K> {
    /// `limit` is the largest offset (in `unit`s) a new entry may receive, plus one.
    pub fn new(name: &'static str, unit: Unit, limit: usize) -> Self {
        Self {
            name,
            unit,
            limit,
            offsets: HashMap::new(),
            data: Writer::new(),
        }
    }

    /// Return the offset of `key`, appending it with `write` on first sight.
    pub fn intern(&mut self, key: K, write: impl FnOnce(&K, &mut Writer)) -> Result<u32> {
        if let Some(&offset) = self.offsets.get(&key) {
            return Ok(offset);
        }
        let offset = match self.unit {
            Unit::Bytes => self.data.position(),
            Unit::Elements { stride } => self.data.position() / stride,
        };
        if offset >= self.limit {
            return Err(Error::TableOverflow {
                table: self.name,
                limit: self.limit,
            });
        }
        let before = self.data.position();
        write(&key, &mut self.data);
        if let Unit::Elements { stride } = self.unit {
            debug_assert_eq!(self.data.position() - before, stride, "{} element size", self.name);
        }
        self.offsets.insert(key, offset as u32);
        Ok(offset as u32)
    }

    /// Offset of an already interned value.
    pub fn get(&self, key: &K) -> Option<u32> {
        self.offsets.get(key).copied()
    }

    /// Number of distinct values interned.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_bytes()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.data = Writer::new();
    }
}

/// Bit-exact key for a position.
pub fn position_key(v: Vec3) -> [u32; 3] {
    [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
}

/// Scratch state for one scene save.
#[derive(Debug)]
pub struct SaveContext {
    /// `3×f32` per entry, element indexed.
    pub positions: DedupTable<[u32; 3]>,
    /// Packed orientation words, element indexed.
    pub orientations: DedupTable<[i32; 4]>,
    /// NUL-terminated names, byte offsets.
    pub names: DedupTable<String>,
    /// `(flags, serialized property list)`, byte offsets.
    pub properties: DedupTable<(u32, Vec<u8>)>,
}

impl Default for SaveContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveContext {
    pub fn new() -> Self {
        Self {
            positions: DedupTable::new("position", Unit::Elements { stride: 12 }, MAX_INDEXED_ENTRIES),
            orientations: DedupTable::new("orientation", Unit::Elements { stride: 16 }, MAX_INDEXED_ENTRIES),
            names: DedupTable::new("name", Unit::Bytes, u32::MAX as usize),
            properties: DedupTable::new("property", Unit::Bytes, u32::MAX as usize),
        }
    }

    pub fn intern_position(&mut self, position: Vec3) -> Result<u16> {
        let index = self.positions.intern(position_key(position), |bits, w| {
            for &b in bits {
                w.write_u32(b);
            }
        })?;
        Ok(index as u16)
    }

    pub fn intern_orientation(&mut self, words: [i32; 4]) -> Result<u16> {
        let index = self.orientations.intern(words, |words, w| {
            for &word in words {
                w.write_i32(word);
            }
        })?;
        Ok(index as u16)
    }

    pub fn intern_name(&mut self, name: &str) -> Result<u32> {
        self.names.intern(name.to_string(), |name, w| w.write_cstring(name))
    }

    pub fn intern_properties(&mut self, flags: u32, list: Vec<u8>) -> Result<u32> {
        self.properties.intern((flags, list), |(flags, list), w| {
            w.write_u32(*flags);
            w.write_bytes(list);
        })
    }

    /// Reset every table.
    pub fn clear(&mut self) {
        self.positions.clear();
        self.orientations.clear();
        self.names.clear();
        self.properties.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_positions_share_an_offset() {
        let mut ctx = SaveContext::new();
        let a = ctx.intern_position(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let b = ctx.intern_position(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let c = ctx.intern_position(Vec3::new(1.0, 2.0, 3.1)).unwrap();
        assert_eq!(a, b);
        assert!(c > a);
        assert_eq!(ctx.positions.len(), 2);
        assert_eq!(ctx.positions.bytes().len(), 24);
    }

    #[test]
    fn offsets_increase_in_first_seen_order() {
        let mut ctx = SaveContext::new();
        let names = ["door", "lamp", "door", "guard", "lamp"];
        let offsets: Vec<u32> = names.iter().map(|n| ctx.intern_name(n).unwrap()).collect();
        assert_eq!(offsets, [0, 5, 0, 10, 5]);
        assert_eq!(ctx.names.bytes(), b"door\0lamp\0guard\0");
    }

    #[test]
    fn property_key_includes_flags() {
        let mut ctx = SaveContext::new();
        let a = ctx.intern_properties(1, vec![0xFF]).unwrap();
        let b = ctx.intern_properties(2, vec![0xFF]).unwrap();
        let c = ctx.intern_properties(1, vec![0xFF]).unwrap();
        assert_eq!((a, b, c), (0, 5, 0));
    }

    #[test]
    fn signed_zero_is_a_distinct_position() {
        let mut ctx = SaveContext::new();
        let a = ctx.intern_position(Vec3::new(0.0, 0.0, 0.0)).unwrap();
        let b = ctx.intern_position(Vec3::new(-0.0, 0.0, 0.0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn indexed_table_overflow_is_detected() {
        let mut ctx = SaveContext::new();
        for i in 0..MAX_INDEXED_ENTRIES {
            ctx.intern_orientation([i as i32, 0, 0, 0]).unwrap();
        }
        // Already-seen values still resolve once the table is full.
        assert_eq!(ctx.intern_orientation([7, 0, 0, 0]).unwrap(), 7);
        assert!(matches!(
            ctx.intern_orientation([-1, 0, 0, 0]),
            Err(Error::TableOverflow { table: "orientation", .. })
        ));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut ctx = SaveContext::new();
        ctx.intern_name("a").unwrap();
        ctx.intern_name("b").unwrap();
        ctx.clear();
        assert!(ctx.names.is_empty());
        assert_eq!(ctx.intern_name("b").unwrap(), 0);
    }
}
