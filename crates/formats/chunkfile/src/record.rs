//! Fixed-schema records stored in a chunk's multidata blobs.
//!
//! Every field of a record occupies its own blob, in schema order. A record
//! container chunk holds:
//!
//! ```text
//! blob 0       marker (u32, always 1)
//! blob 1       record count (u32)
//! per record:  slot id (u32), display name (NUL string), one blob per field
//! ```
//!
//! Records whose schema points into a shared id list (`Record::USES_REFS`)
//! additionally own a `SREF` raw subchunk: `count:u32 id:u32*`.

use crate::chunk::Chunk;
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::tag::Tag;

/// Container marker stored in the first blob.
pub const CONTAINER_MARKER: u32 = 1;

/// Tag of the shared id list subchunk.
pub const REFS_TAG: Tag = Tag::new(b"SREF");

/// Wire kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FieldKind {
    /// Unsigned 32-bit integer.
    U32,
    /// IEEE single-precision float.
    F32,
    /// String bytes plus a NUL terminator.
    Str,
    /// 32-bit reference id.
    Ref,
}

impl FieldKind {
    /// Fixed blob size, or `None` for strings.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::U32 | Self::F32 | Self::Ref => Some(4),
            Self::Str => None,
        }
    }
}

/// One entry of a record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// A Rust type that can be stored in one record field blob.
pub trait FieldType: Sized {
    const KIND: FieldKind;

    fn encode(&self) -> Vec<u8>;

    /// Decode a blob. `None` means the blob has the wrong shape for this kind.
    fn decode(blob: &[u8]) -> Option<Self>;
}

impl FieldType for u32 {
    const KIND: FieldKind = FieldKind::U32;

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(blob: &[u8]) -> Option<Self> {
        Some(u32::from_le_bytes(blob.try_into().ok()?))
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::F32;

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(blob: &[u8]) -> Option<Self> {
        Some(f32::from_le_bytes(blob.try_into().ok()?))
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Str;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len() + 1);
        bytes.extend_from_slice(self.as_bytes());
        bytes.push(0);
        bytes
    }

    fn decode(blob: &[u8]) -> Option<Self> {
        let (&last, text) = blob.split_last()?;
        if last != 0 {
            return None;
        }
        String::from_utf8(text.to_vec()).ok()
    }
}

/// A record type with a fixed schema.
pub trait Record: Sized {
    /// Tag of the container chunk holding records of this type.
    const TAG: Tag;
    /// Human-readable variant name.
    const NAME: &'static str;
    const SCHEMA: &'static [FieldDef];
    /// Whether the container carries a shared `SREF` id list.
    const USES_REFS: bool = false;

    fn read_fields(r: &mut RecordReader<'_>) -> Result<Self>;
    fn write_fields(&self, w: &mut RecordWriter);
}

/// Define a record struct whose schema is its field list.
///
/// ```ignore
/// define_record! {
///     /// A wave file.
///     Wave, b"WAVE", "wave" {
///         filename: String,
///         sample_rate: u32,
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_record {
    (
        $(#[$meta:meta])*
        $name:ident, $tag:literal, $display:literal {
            $($(#[$fmeta:meta])* $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            $($(#[$fmeta])* pub $field: $ty,)*
        }

        impl $crate::record::Record for $name {
            const TAG: $crate::tag::Tag = $crate::tag::Tag::new($tag);
            const NAME: &'static str = $display;
            const SCHEMA: &'static [$crate::record::FieldDef] = &[
                $($crate::record::FieldDef {
                    name: stringify!($field),
                    kind: <$ty as $crate::record::FieldType>::KIND,
                },)*
            ];

            fn read_fields(r: &mut $crate::record::RecordReader<'_>) -> $crate::error::Result<Self> {
                Ok(Self {
                    $($field: r.field::<$ty>(stringify!($field))?,)*
                })
            }

            fn write_fields(&self, w: &mut $crate::record::RecordWriter) {
                $(w.field(&self.$field);)*
            }
        }
    };
}

/// Sequential reader over a record container's blobs.
pub struct RecordReader<'a> {
    tag: Tag,
    blobs: &'a [Vec<u8>],
    pos: usize,
    refs: &'a [u32],
}

impl<'a> RecordReader<'a> {
    pub fn new(tag: Tag, blobs: &'a [Vec<u8>], refs: &'a [u32]) -> Self {
        Self {
            tag,
            blobs,
            pos: 0,
            refs,
        }
    }

    /// Index of the next blob.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.blobs.len()
    }

    fn next_blob(&mut self, what: &str) -> Result<&'a [u8]> {
        let blob = self.blobs.get(self.pos).ok_or_else(|| {
            Error::malformed(
                self.tag,
                0,
                format!("ran out of blobs reading {what} (blob {})", self.pos),
            )
        })?;
        self.pos += 1;
        Ok(blob)
    }

    /// Read the next blob as a field of type `T`.
    pub fn field<T: FieldType>(&mut self, name: &str) -> Result<T> {
        let index = self.pos;
        let blob = self.next_blob(name)?;
        T::decode(blob).ok_or_else(|| {
            Error::malformed(
                self.tag,
                0,
                format!(
                    "field `{name}` (blob {index}): {} bytes do not hold a {:?}",
                    blob.len(),
                    T::KIND
                ),
            )
        })
    }

    /// `len` ids of the shared list starting at `start`.
    pub fn refs(&self, start: u32, len: u32) -> Result<&'a [u32]> {
        let start = start as usize;
        let end = start.checked_add(len as usize);
        match end {
            Some(end) if end <= self.refs.len() => Ok(&self.refs[start..end]),
            _ => Err(Error::DanglingReference {
                context: "shared id list",
                index: start as u32 + len,
                limit: self.refs.len() as u32,
            }),
        }
    }
}

/// Sequential writer producing a record container's blobs.
#[derive(Debug, Default)]
pub struct RecordWriter {
    blobs: Vec<Vec<u8>>,
    refs: Vec<u32>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T: FieldType>(&mut self, value: &T) {
        self.blobs.push(value.encode());
    }

    /// Overwrite a previously written u32 blob.
    pub fn patch_u32(&mut self, index: usize, value: u32) {
        self.blobs[index] = value.encode();
    }

    pub fn into_blobs(self) -> Vec<Vec<u8>> {
        self.blobs
    }

    /// Append ids to the shared list. Returns the start index.
    pub fn push_refs(&mut self, ids: impl IntoIterator<Item = u32>) -> u32 {
        let start = self.refs.len() as u32;
        self.refs.extend(ids);
        start
    }
}

/// One decoded record with its slot id and display name.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry<T> {
    pub slot: u32,
    pub name: String,
    pub record: T,
}

/// Decode every record in a container chunk.
pub fn read_container<T: Record>(chunk: &Chunk) -> Result<Vec<RecordEntry<T>>> {
    let blobs = chunk.expect_multi()?;
    let refs = if T::USES_REFS {
        let data = chunk.require(REFS_TAG)?.expect_raw()?;
        let mut c = Cursor::new(data);
        let ids = c.read_u32_list()?;
        if !c.is_empty() {
            return Err(Error::malformed(REFS_TAG, c.position(), "trailing bytes after id list"));
        }
        ids
    } else {
        Vec::new()
    };

    let mut r = RecordReader::new(chunk.tag, blobs, &refs);
    let marker = r.field::<u32>("marker")?;
    if marker != CONTAINER_MARKER {
        return Err(Error::malformed(chunk.tag, 0, format!("container marker {marker}, expected 1")));
    }
    let count = r.field::<u32>("count")? as usize;
    // Each record needs at least its slot and name blobs.
    if count.saturating_mul(2) > blobs.len() {
        return Err(Error::malformed(chunk.tag, 0, format!("{count} records cannot fit")));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let slot = r.field::<u32>("slot")?;
        let name = r.field::<String>("name")?;
        let record = T::read_fields(&mut r)?;
        entries.push(RecordEntry { slot, name, record });
    }
    if !r.is_done() {
        return Err(Error::malformed(
            chunk.tag,
            0,
            format!("{} blobs left after {count} records", blobs.len() - r.position()),
        ));
    }
    Ok(entries)
}

/// Encode records into a container chunk, in iteration order.
pub fn write_container<'a, T: Record + 'a>(entries: impl IntoIterator<Item = (u32, &'a str, &'a T)>) -> Chunk {
    let mut w = RecordWriter::new();
    w.field(&CONTAINER_MARKER);
    let count_blob = w.blobs.len();
    w.field(&0u32);

    let mut count = 0u32;
    for (slot, name, record) in entries {
        w.field(&slot);
        w.field(&name.to_string());
        record.write_fields(&mut w);
        count += 1;
    }
    w.patch_u32(count_blob, count);

    let mut chunk = Chunk::with_multi(T::TAG, w.blobs);
    if T::USES_REFS {
        let mut list = Writer::with_capacity(4 + 4 * w.refs.len());
        list.write_u32_list(&w.refs);
        chunk.subchunks.push(Chunk::with_raw(REFS_TAG, list.into_bytes()));
    }
    chunk
}
