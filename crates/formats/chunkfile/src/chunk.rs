//! Recursive chunk container.
//!
//! Node layout (little-endian):
//!
//! ```text
//! tag[4] lenAndFlags:u32
//! [payloadOffset:u32]            if has subchunks or has multidata
//! [count:u32 child*]             if has subchunks
//! [count:u32 size:u32*]          if has multidata
//! payload                        at node start + payloadOffset
//! ```
//!
//! `lenAndFlags & 0x3FFF_FFFF` is the node's total encoded size including every
//! descendant; bit 31 flags subchunks and bit 30 flags multidata.

use std::fmt::Write as _;

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::tag::Tag;

pub const FLAG_SUBCHUNKS: u32 = 1 << 31;
pub const FLAG_MULTIDATA: u32 = 1 << 30;
pub const LENGTH_MASK: u32 = 0x3FFF_FFFF;

/// Size of the fixed node header (tag + length/flags).
pub const HEADER_SIZE: usize = 8;

/// Nesting limit for decoding; deeper trees are rejected as malformed.
const MAX_DEPTH: usize = 256;

/// A chunk's own payload.
///
/// An empty `Multi` carries no blobs to size, so it encodes like (and compares
/// equal to) an empty `Raw`.
#[derive(Debug, Clone)]
pub enum ChunkData {
    /// A single raw byte blob ("maindata").
    Raw(Vec<u8>),
    /// Independently sized blobs ("multidata").
    Multi(Vec<Vec<u8>>),
}

impl Default for ChunkData {
    fn default() -> Self {
        Self::Raw(Vec::new())
    }
}

impl PartialEq for ChunkData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Raw(a), Self::Raw(b)) => a == b,
            (Self::Multi(a), Self::Multi(b)) => a == b,
            (Self::Raw(raw), Self::Multi(blobs)) | (Self::Multi(blobs), Self::Raw(raw)) => {
                raw.is_empty() && blobs.is_empty()
            }
        }
    }
}

impl Eq for ChunkData {}

impl ChunkData {
    /// Whether the payload needs a blob size table.
    pub fn has_blobs(&self) -> bool {
        matches!(self, Self::Multi(blobs) if !blobs.is_empty())
    }

    /// Total payload byte count.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Raw(bytes) => bytes.len(),
            Self::Multi(blobs) => blobs.iter().map(Vec::len).sum(),
        }
    }
}

/// A node of the chunk tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    pub tag: Tag,
    pub data: ChunkData,
    /// Ordered children. Tags need not be unique; lookups return the first match.
    pub subchunks: Vec<Chunk>,
}

impl Chunk {
    /// An empty chunk: no payload, no children.
    pub fn new(tag: impl Into<Tag>) -> Self {
        Self {
            tag: tag.into(),
            data: ChunkData::default(),
            subchunks: Vec::new(),
        }
    }

    pub fn with_raw(tag: impl Into<Tag>, bytes: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            data: ChunkData::Raw(bytes),
            subchunks: Vec::new(),
        }
    }

    pub fn with_multi(tag: impl Into<Tag>, blobs: Vec<Vec<u8>>) -> Self {
        Self {
            tag: tag.into(),
            data: ChunkData::Multi(blobs),
            subchunks: Vec::new(),
        }
    }

    /// Append a child, builder style.
    pub fn with_child(mut self, child: Chunk) -> Self {
        self.subchunks.push(child);
        self
    }

    /// Header flag bits this chunk encodes with.
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if !self.subchunks.is_empty() {
            flags |= FLAG_SUBCHUNKS;
        }
        if self.data.has_blobs() {
            flags |= FLAG_MULTIDATA;
        }
        flags
    }

    /// Raw payload, or `None` for a multidata chunk.
    pub fn raw(&self) -> Option<&[u8]> {
        match &self.data {
            ChunkData::Raw(bytes) => Some(bytes),
            ChunkData::Multi(_) => None,
        }
    }

    /// Multidata blobs, or `None` for a raw chunk.
    pub fn multi(&self) -> Option<&[Vec<u8>]> {
        match &self.data {
            ChunkData::Raw(_) => None,
            ChunkData::Multi(blobs) => Some(blobs),
        }
    }

    /// Raw payload, failing if this chunk carries multidata.
    pub fn expect_raw(&self) -> Result<&[u8]> {
        self.raw()
            .ok_or_else(|| Error::malformed(self.tag, 0, "expected raw payload, found multidata"))
    }

    /// Multidata blobs, failing if this chunk carries a raw payload.
    pub fn expect_multi(&self) -> Result<&[Vec<u8>]> {
        self.multi()
            .ok_or_else(|| Error::malformed(self.tag, 0, "expected multidata, found raw payload"))
    }

    /// Find a direct child by tag. Returns the first match.
    pub fn find(&self, tag: impl Into<Tag>) -> Option<&Chunk> {
        let tag = tag.into();
        self.subchunks.iter().find(|c| c.tag == tag)
    }

    pub fn find_mut(&mut self, tag: impl Into<Tag>) -> Option<&mut Chunk> {
        let tag = tag.into();
        self.subchunks.iter_mut().find(|c| c.tag == tag)
    }

    /// All direct children with the given tag, in order.
    pub fn find_all(&self, tag: impl Into<Tag>) -> impl Iterator<Item = &Chunk> {
        let tag = tag.into();
        self.subchunks.iter().filter(move |c| c.tag == tag)
    }

    /// Find a direct child that must exist.
    pub fn require(&self, tag: impl Into<Tag>) -> Result<&Chunk> {
        let tag = tag.into();
        self.find(tag).ok_or(Error::ChunkNotFound { tag })
    }

    /// Encoded size of this node, computed without encoding it.
    pub fn encoded_len(&self) -> usize {
        let mut len = HEADER_SIZE;
        if self.flags() != 0 {
            len += 4;
        }
        if !self.subchunks.is_empty() {
            len += 4 + self.subchunks.iter().map(Chunk::encoded_len).sum::<usize>();
        }
        if let ChunkData::Multi(blobs) = &self.data {
            if !blobs.is_empty() {
                len += 4 + 4 * blobs.len();
            }
        }
        len + self.data.byte_len()
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.subchunks.iter().map(Chunk::node_count).sum::<usize>()
    }
}

/// Decode a buffer holding exactly one chunk tree.
pub fn decode(data: &[u8]) -> Result<Chunk> {
    let (chunk, len) = decode_node(data, 0, 0)?;
    if len != data.len() {
        return Err(Error::malformed(
            chunk.tag,
            len,
            format!("{} trailing bytes after root chunk", data.len() - len),
        ));
    }
    log::debug!("decoded chunk {} ({} nodes, {len} bytes)", chunk.tag, chunk.node_count());
    Ok(chunk)
}

/// Decode a buffer holding several back-to-back chunk trees.
pub fn decode_sequence(data: &[u8]) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (chunk, len) = decode_node(data, pos, 0)?;
        chunks.push(chunk);
        pos += len;
    }
    Ok(chunks)
}

/// Decode the node starting at `start`. Returns the chunk and its encoded length.
fn decode_node(data: &[u8], start: usize, depth: usize) -> Result<(Chunk, usize)> {
    let mut c = Cursor::new(data);
    c.seek(start);

    let tag = c.read_tag()?;
    if depth > MAX_DEPTH {
        return Err(Error::malformed(tag, start, format!("nesting deeper than {MAX_DEPTH}")));
    }
    let word = c.read_u32()?;
    let len = (word & LENGTH_MASK) as usize;
    let has_subchunks = word & FLAG_SUBCHUNKS != 0;
    let has_multidata = word & FLAG_MULTIDATA != 0;

    if len < HEADER_SIZE {
        return Err(Error::malformed(tag, start, format!("declared length {len} smaller than header")));
    }
    let end = start + len;
    if end > data.len() {
        return Err(Error::malformed(
            tag,
            start,
            format!("declared length {len} exceeds available {} bytes", data.len() - start),
        ));
    }

    // Everything below is confined to this node's bytes.
    let node = &data[..end];
    let mut c = Cursor::new(node);
    c.seek(start + HEADER_SIZE);

    let payload_offset = if has_subchunks || has_multidata {
        c.read_u32()? as usize
    } else {
        HEADER_SIZE
    };

    let mut subchunks = Vec::new();
    if has_subchunks {
        let count = c.read_u32()? as usize;
        if count == 0 {
            return Err(Error::malformed(tag, start, "subchunk flag set with zero children"));
        }
        if count.saturating_mul(HEADER_SIZE) > c.remaining() {
            return Err(Error::malformed(tag, start, format!("{count} subchunks cannot fit")));
        }
        subchunks.reserve(count);
        for _ in 0..count {
            let (child, child_len) = decode_node(node, c.position(), depth + 1)?;
            subchunks.push(child);
            c.skip(child_len)?;
        }
    }

    let sizes = if has_multidata {
        let count = c.read_u32()? as usize;
        if count == 0 {
            return Err(Error::malformed(tag, start, "multidata flag set with zero blobs"));
        }
        if count.saturating_mul(4) > c.remaining() {
            return Err(Error::malformed(tag, start, format!("{count} blob sizes cannot fit")));
        }
        let mut sizes = Vec::with_capacity(count);
        for _ in 0..count {
            sizes.push(c.read_u32()? as usize);
        }
        Some(sizes)
    } else {
        None
    };

    if c.position() - start != payload_offset {
        return Err(Error::malformed(
            tag,
            start,
            format!(
                "payload offset {payload_offset} does not follow header end {}",
                c.position() - start
            ),
        ));
    }

    let payload = &node[start + payload_offset..end];
    let data = match sizes {
        None => ChunkData::Raw(payload.to_vec()),
        Some(sizes) => {
            let total: usize = sizes.iter().sum();
            if total != payload.len() {
                return Err(Error::malformed(
                    tag,
                    start,
                    format!("blob sizes sum to {total} but payload is {} bytes", payload.len()),
                ));
            }
            let mut blobs = Vec::with_capacity(sizes.len());
            let mut pos = 0;
            for size in sizes {
                blobs.push(payload[pos..pos + size].to_vec());
                pos += size;
            }
            ChunkData::Multi(blobs)
        }
    };

    Ok((Chunk { tag, data, subchunks }, len))
}

/// Encode a chunk tree.
pub fn encode(chunk: &Chunk) -> Result<Vec<u8>> {
    let mut w = Writer::with_capacity(chunk.encoded_len());
    encode_node(chunk, &mut w)?;
    Ok(w.into_bytes())
}

/// Encode several chunk trees back to back.
pub fn encode_sequence(chunks: &[Chunk]) -> Result<Vec<u8>> {
    let mut w = Writer::with_capacity(chunks.iter().map(Chunk::encoded_len).sum());
    for chunk in chunks {
        encode_node(chunk, &mut w)?;
    }
    Ok(w.into_bytes())
}

fn encode_node(chunk: &Chunk, w: &mut Writer) -> Result<()> {
    let start = w.position();
    let flags = chunk.flags();

    w.write_tag(chunk.tag);
    let len_pos = w.position();
    w.write_u32(0);

    let offset_pos = if flags != 0 {
        let pos = w.position();
        w.write_u32(0);
        Some(pos)
    } else {
        None
    };

    if !chunk.subchunks.is_empty() {
        w.write_u32(chunk.subchunks.len() as u32);
        for child in &chunk.subchunks {
            encode_node(child, w)?;
        }
    }

    // An empty blob list has no size table and is written as a bare node.
    if let ChunkData::Multi(blobs) = &chunk.data {
        if !blobs.is_empty() {
            w.write_u32(blobs.len() as u32);
            for blob in blobs {
                w.write_u32(blob.len() as u32);
            }
        }
    }

    let payload_offset = w.position() - start;
    match &chunk.data {
        ChunkData::Raw(bytes) => w.write_bytes(bytes),
        ChunkData::Multi(blobs) => {
            for blob in blobs {
                w.write_bytes(blob);
            }
        }
    }

    let total = w.position() - start;
    if total > LENGTH_MASK as usize {
        return Err(Error::TableOverflow {
            table: "chunk length",
            limit: LENGTH_MASK as usize,
        });
    }
    if let Some(pos) = offset_pos {
        w.patch_u32(pos, payload_offset as u32);
    }
    w.patch_u32(len_pos, total as u32 | flags);
    Ok(())
}

/// Render an indented listing of a chunk tree.
pub fn dump(chunk: &Chunk) -> String {
    let mut out = String::new();
    dump_into(chunk, 0, &mut out);
    out
}

fn dump_into(chunk: &Chunk, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let payload = match &chunk.data {
        ChunkData::Raw(bytes) => format!("raw {} bytes", bytes.len()),
        ChunkData::Multi(blobs) => format!("multi {} blobs, {} bytes", blobs.len(), chunk.data.byte_len()),
    };
    let _ = writeln!(out, "{indent}{} len={} {payload}", chunk.tag, chunk.encoded_len());
    for child in &chunk.subchunks {
        dump_into(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_at(bytes: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap())
    }

    #[test]
    fn raw_chunk_bytes() {
        let chunk = Chunk::with_raw(b"TEST", vec![1, 2, 3, 4]);
        let bytes = encode(&chunk).unwrap();
        assert_eq!(bytes, [0x54, 0x45, 0x53, 0x54, 0x0C, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn empty_chunk_is_eight_bytes() {
        let bytes = encode(&Chunk::new(b"NONE")).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(word_at(&bytes, 4), 8);
    }

    #[test]
    fn subchunks_without_multidata() {
        let parent = Chunk::new(b"PRNT")
            .with_child(Chunk::with_raw(b"AAAA", vec![0; 2]))
            .with_child(Chunk::with_raw(b"BBBB", vec![0; 4]));
        assert_eq!(parent.subchunks[0].encoded_len(), 10);
        assert_eq!(parent.subchunks[1].encoded_len(), 12);

        let bytes = encode(&parent).unwrap();
        let word = word_at(&bytes, 4);
        assert_ne!(word & FLAG_SUBCHUNKS, 0);
        assert_eq!(word & FLAG_MULTIDATA, 0);
        // tag + len + offset + count, then 10 + 12 bytes of children.
        assert_eq!(word_at(&bytes, 8), 16 + 22);
        assert_eq!(word & LENGTH_MASK, 38);
        assert_eq!(bytes.len(), 38);
        assert_eq!(word_at(&bytes, 12), 2);
        assert_eq!(decode(&bytes).unwrap(), parent);
    }

    #[test]
    fn multidata_has_single_offset_field() {
        let chunk = Chunk::with_multi(b"MULT", vec![vec![1], vec![2, 3], vec![]]);
        let bytes = encode(&chunk).unwrap();
        let word = word_at(&bytes, 4);
        assert_eq!(word & FLAG_SUBCHUNKS, 0);
        assert_ne!(word & FLAG_MULTIDATA, 0);
        // header 8 + offset 4 + count 4 + 3 sizes
        assert_eq!(word_at(&bytes, 8), 28);
        assert_eq!(bytes.len(), 31);
        assert_eq!(&bytes[28..], &[1, 2, 3]);
        assert_eq!(decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn empty_blob_list_encodes_as_bare_node() {
        let chunk = Chunk::with_multi(b"EMPT", Vec::new());
        assert_eq!(chunk.flags(), 0);
        assert_eq!(chunk.encoded_len(), 8);
        let bytes = encode(&chunk).unwrap();
        assert_eq!(bytes, encode(&Chunk::new(b"EMPT")).unwrap());
        assert_eq!(word_at(&bytes, 4), 8);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.raw(), Some(&[][..]));
        assert_eq!(decoded, chunk);
        assert_ne!(Chunk::with_multi(b"EMPT", vec![vec![]]), chunk);
    }

    #[test]
    fn nested_mixed_tree_is_byte_stable() {
        let tree = Chunk::with_multi(b"ROOT", vec![vec![9; 3], vec![7; 5]])
            .with_child(
                Chunk::new(b"LIST")
                    .with_child(Chunk::with_raw(b"ITEM", b"one".to_vec()))
                    .with_child(Chunk::with_raw(b"ITEM", b"two".to_vec())),
            )
            .with_child(Chunk::with_multi(b"EMPT", Vec::new()));
        let bytes = encode(&tree).unwrap();
        assert_eq!(bytes.len(), tree.encoded_len());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(encode(&decoded).unwrap(), bytes);
        assert_eq!(decoded.find_all(b"LIST").count(), 1);
        let list = decoded.require(b"LIST").unwrap();
        assert_eq!(list.find(b"ITEM").unwrap().raw(), Some(&b"one"[..]));
    }

    #[test]
    fn missing_required_child() {
        let chunk = Chunk::new(b"ROOT");
        assert!(matches!(
            chunk.require(b"GONE"),
            Err(Error::ChunkNotFound { tag }) if tag == Tag::new(b"GONE")
        ));
    }

    #[test]
    fn truncated_buffer_is_malformed() {
        let bytes = encode(&Chunk::with_raw(b"TEST", vec![1, 2, 3, 4])).unwrap();
        assert!(matches!(decode(&bytes[..10]), Err(Error::Malformed { .. })));
        assert!(matches!(decode(&bytes[..6]), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&Chunk::new(b"TEST")).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(Error::Malformed { .. })));
    }

    #[test]
    fn payload_offset_gap_is_rejected() {
        let mut w = Writer::new();
        w.write_tag(Tag::new(b"MULT"));
        w.write_u32(22 | FLAG_MULTIDATA);
        w.write_u32(21); // claims one byte of padding after the size table
        w.write_u32(1);
        w.write_u32(1);
        w.write_u8(0);
        w.write_u8(5);
        assert!(matches!(decode(&w.into_bytes()), Err(Error::Malformed { .. })));
    }

    #[test]
    fn blob_sizes_must_cover_payload() {
        let mut w = Writer::new();
        w.write_tag(Tag::new(b"MULT"));
        w.write_u32(22 | FLAG_MULTIDATA);
        w.write_u32(20);
        w.write_u32(1);
        w.write_u32(1);
        w.write_bytes(&[1, 2]);
        assert!(matches!(decode(&w.into_bytes()), Err(Error::Malformed { .. })));
    }

    #[test]
    fn zero_children_with_flag_is_rejected() {
        let mut w = Writer::new();
        w.write_tag(Tag::new(b"PRNT"));
        w.write_u32(16 | FLAG_SUBCHUNKS);
        w.write_u32(16);
        w.write_u32(0);
        assert!(matches!(decode(&w.into_bytes()), Err(Error::Malformed { .. })));
    }

    #[test]
    fn zero_blobs_with_flag_is_rejected() {
        let mut w = Writer::new();
        w.write_tag(Tag::new(b"MULT"));
        w.write_u32(16 | FLAG_MULTIDATA);
        w.write_u32(16);
        w.write_u32(0);
        assert!(matches!(decode(&w.into_bytes()), Err(Error::Malformed { .. })));
    }

    #[test]
    fn child_overrunning_parent_is_rejected() {
        let child = encode(&Chunk::with_raw(b"KIDS", vec![0; 8])).unwrap();
        let mut w = Writer::new();
        w.write_tag(Tag::new(b"PRNT"));
        // Parent length stops short of the child's end.
        w.write_u32((16 + 10) | FLAG_SUBCHUNKS);
        w.write_u32(16 + 16);
        w.write_u32(1);
        w.write_bytes(&child);
        assert!(decode(&w.into_bytes()).is_err());
    }

    #[test]
    fn sequence_round_trip() {
        let chunks = vec![Chunk::with_raw(b"AAAA", vec![1]), Chunk::new(b"BBBB")];
        let bytes = encode_sequence(&chunks).unwrap();
        assert_eq!(decode_sequence(&bytes).unwrap(), chunks);
    }

    #[test]
    fn dump_lists_tree() {
        let tree = Chunk::new(b"ROOT").with_child(Chunk::with_raw(b"LEAF", vec![0; 3]));
        let text = dump(&tree);
        assert_eq!(text, "ROOT len=27 raw 0 bytes\n  LEAF len=11 raw 3 bytes\n");
    }
}
