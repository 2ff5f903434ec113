//! Audio object registry.
//!
//! A sparse, 1-based slot space shared by six record variants plus a names
//! list that may name slots without a record. Stored as a `SNDR` chunk with
//! one record container per variant (in [`AudioKind::ALL`] order) followed by
//! the `SNAM` names list.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::config::{CodecConfig, MismatchPolicy};
use crate::entity::{EntityRef, SparseMap};
use crate::error::{Error, Result};
use crate::record::{self, FieldDef, FieldKind, FieldType, Record, RecordReader, RecordWriter};
use crate::tag::Tag;

pub const REGISTRY_TAG: Tag = Tag::new(b"SNDR");
pub const NAMES_TAG: Tag = Tag::new(b"SNAM");

/// Highest slot a registry file may use. Slot ids come straight from the
/// file and size the slot array, so anything above this is rejected before
/// storage grows.
pub const MAX_SLOT: u32 = 0xFFFF;

/// A 1-based registry slot. Index 0 is never a valid slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Slot(u32);

impl Slot {
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Slot for an id read out of `tag`, which must lie in `1..=MAX_SLOT`.
    fn decoded(tag: Tag, raw: u32, what: &str) -> Result<Self> {
        match raw {
            0 => Err(Error::malformed(tag, 0, format!("{what} uses slot 0"))),
            1..=MAX_SLOT => Ok(Self(raw)),
            _ => Err(Error::malformed(tag, 0, format!("{what} uses slot {raw}, above {MAX_SLOT}"))),
        }
    }
}

impl EntityRef for Slot {
    fn new(index: u32) -> Self {
        debug_assert!(index != 0, "slot 0 is reserved");
        Self(index)
    }

    fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Optional slot reference; stored as `0` when absent.
impl FieldType for Option<Slot> {
    const KIND: FieldKind = FieldKind::Ref;

    fn encode(&self) -> Vec<u8> {
        self.map_or(0, Slot::get).to_le_bytes().to_vec()
    }

    fn decode(blob: &[u8]) -> Option<Self> {
        Some(Slot::new(u32::decode(blob)?))
    }
}

crate::define_record! {
    /// A waveform stored elsewhere in the archive.
    Wave, b"WAVE", "wave" {
        filename: String,
        sample_rate: u32,
        channels: u32,
        bits_per_sample: u32,
        data_offset: u32,
        data_size: u32,
        loop_start: u32,
        loop_end: u32,
    }
}

crate::define_record! {
    /// A playable sound referencing a wave.
    Sound, b"SNDO", "sound" {
        wave: Option<Slot>,
        volume: f32,
        pitch: f32,
        min_distance: f32,
        max_distance: f32,
        priority: u32,
        flags: u32,
    }
}

crate::define_record! {
    Material, b"SMAT", "material" {
        hardness: f32,
        damping: f32,
        footstep: Option<Slot>,
    }
}

crate::define_record! {
    /// Sound played when two materials collide.
    Impact, b"SIMP", "impact" {
        material_a: Option<Slot>,
        material_b: Option<Slot>,
        sound: Option<Slot>,
        min_velocity: f32,
    }
}

crate::define_record! {
    /// Acoustic room parameters.
    AudioRoom, b"SROM", "room" {
        reverb: u32,
        size: f32,
        damping: f32,
        volume: f32,
        ambience: Option<Slot>,
    }
}

/// A set of sounds picked from at random or in sequence.
///
/// Its entries live in the container's shared `SREF` list; the record itself
/// stores the start and length of its run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SoundSet {
    pub mode: u32,
    pub volume: f32,
    pub entries: Vec<Option<Slot>>,
}

impl Record for SoundSet {
    const TAG: Tag = Tag::new(b"SSET");
    const NAME: &'static str = "set";
    const SCHEMA: &'static [FieldDef] = &[
        FieldDef { name: "mode", kind: FieldKind::U32 },
        FieldDef { name: "volume", kind: FieldKind::F32 },
        FieldDef { name: "entry_start", kind: FieldKind::U32 },
        FieldDef { name: "entry_count", kind: FieldKind::U32 },
    ];
    const USES_REFS: bool = true;

    fn read_fields(r: &mut RecordReader<'_>) -> Result<Self> {
        let mode = r.field("mode")?;
        let volume = r.field("volume")?;
        let start = r.field::<u32>("entry_start")?;
        let count = r.field::<u32>("entry_count")?;
        let entries = r.refs(start, count)?.iter().map(|&id| Slot::new(id)).collect();
        Ok(Self { mode, volume, entries })
    }

    fn write_fields(&self, w: &mut RecordWriter) {
        let start = w.push_refs(self.entries.iter().map(|s| s.map_or(0, Slot::get)));
        w.field(&self.mode);
        w.field(&self.volume);
        w.field(&start);
        w.field(&(self.entries.len() as u32));
    }
}

/// The six audio object variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AudioKind {
    Wave,
    Sound,
    Set,
    Material,
    Impact,
    Room,
}

impl AudioKind {
    /// Container order inside the registry chunk.
    pub const ALL: [AudioKind; 6] = [
        AudioKind::Wave,
        AudioKind::Sound,
        AudioKind::Set,
        AudioKind::Material,
        AudioKind::Impact,
        AudioKind::Room,
    ];

    pub fn tag(self) -> Tag {
        match self {
            Self::Wave => Wave::TAG,
            Self::Sound => Sound::TAG,
            Self::Set => SoundSet::TAG,
            Self::Material => Material::TAG,
            Self::Impact => Impact::TAG,
            Self::Room => AudioRoom::TAG,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Wave => Wave::NAME,
            Self::Sound => Sound::NAME,
            Self::Set => SoundSet::NAME,
            Self::Material => Material::NAME,
            Self::Impact => Impact::NAME,
            Self::Room => AudioRoom::NAME,
        }
    }

    pub fn schema(self) -> &'static [FieldDef] {
        match self {
            Self::Wave => Wave::SCHEMA,
            Self::Sound => Sound::SCHEMA,
            Self::Set => SoundSet::SCHEMA,
            Self::Material => Material::SCHEMA,
            Self::Impact => Impact::SCHEMA,
            Self::Room => AudioRoom::SCHEMA,
        }
    }
}

/// A registry record of any variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioObject {
    Wave(Wave),
    Sound(Sound),
    Set(SoundSet),
    Material(Material),
    Impact(Impact),
    Room(AudioRoom),
}

impl AudioObject {
    pub fn kind(&self) -> AudioKind {
        match self {
            Self::Wave(_) => AudioKind::Wave,
            Self::Sound(_) => AudioKind::Sound,
            Self::Set(_) => AudioKind::Set,
            Self::Material(_) => AudioKind::Material,
            Self::Impact(_) => AudioKind::Impact,
            Self::Room(_) => AudioKind::Room,
        }
    }

    /// Every slot this record refers to.
    pub fn references(&self) -> Vec<Slot> {
        let refs: Vec<Option<Slot>> = match self {
            Self::Wave(_) => Vec::new(),
            Self::Sound(s) => vec![s.wave],
            Self::Set(s) => s.entries.clone(),
            Self::Material(m) => vec![m.footstep],
            Self::Impact(i) => vec![i.material_a, i.material_b, i.sound],
            Self::Room(r) => vec![r.ambience],
        };
        refs.into_iter().flatten().collect()
    }
}

/// What a slot holds. Either part may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SlotEntry {
    pub name: Option<String>,
    pub object: Option<AudioObject>,
}

/// The audio registry.
#[derive(Debug, Clone, Default)]
pub struct AudioRegistry {
    slots: SparseMap<Slot, SlotEntry>,
}

impl AudioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every slot up to and including `slot` addressable.
    pub fn ensure_capacity(&mut self, slot: Slot) {
        self.slots.ensure_capacity(slot);
    }

    /// Highest addressable slot plus one (slot 0 included in the count).
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, slot: Slot) -> Option<&SlotEntry> {
        self.slots.get(slot)
    }

    pub fn object(&self, slot: Slot) -> Option<&AudioObject> {
        self.get(slot).and_then(|e| e.object.as_ref())
    }

    pub fn name(&self, slot: Slot) -> Option<&str> {
        self.get(slot).and_then(|e| e.name.as_deref())
    }

    /// Put a record (and optionally its name) in a slot, replacing what was there.
    pub fn insert(&mut self, slot: Slot, name: Option<String>, object: AudioObject) {
        self.slots.insert(
            slot,
            SlotEntry {
                name,
                object: Some(object),
            },
        );
    }

    /// Name a slot without touching its record.
    pub fn set_name(&mut self, slot: Slot, name: impl Into<String>) {
        self.slots.get_or_insert_with(slot, SlotEntry::default).name = Some(name.into());
    }

    /// Append a record in the first slot past the current end.
    pub fn push(&mut self, name: Option<String>, object: AudioObject) -> Slot {
        let slot = Slot(self.slots.capacity().max(1) as u32);
        self.insert(slot, name, object);
        slot
    }

    /// Occupied slots in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &SlotEntry)> {
        self.slots.iter()
    }

    /// Records of one variant in increasing slot order.
    pub fn objects_of(&self, kind: AudioKind) -> impl Iterator<Item = (Slot, &SlotEntry, &AudioObject)> {
        self.iter().filter_map(move |(slot, entry)| {
            entry
                .object
                .as_ref()
                .filter(|o| o.kind() == kind)
                .map(|o| (slot, entry, o))
        })
    }

    /// Check that every occupied slot can be decoded again and that every
    /// record reference lands on an occupied slot.
    pub fn validate(&self) -> Result<()> {
        for (slot, entry) in self.iter() {
            if slot.get() > MAX_SLOT {
                return Err(Error::TableOverflow {
                    table: "audio slots",
                    limit: MAX_SLOT as usize,
                });
            }
            let Some(object) = &entry.object else { continue };
            for target in object.references() {
                self.slots.resolve(target, "audio slot reference")?;
            }
        }
        Ok(())
    }
}

/// Decode a `SNDR` registry chunk.
pub fn decode(chunk: &Chunk, config: &CodecConfig) -> Result<AudioRegistry> {
    if chunk.tag != REGISTRY_TAG {
        return Err(Error::malformed(chunk.tag, 0, format!("expected {REGISTRY_TAG} registry chunk")));
    }

    let mut registry = AudioRegistry::new();
    for kind in AudioKind::ALL {
        let container = chunk.require(kind.tag())?;
        match kind {
            AudioKind::Wave => load::<Wave>(&mut registry, container, AudioObject::Wave)?,
            AudioKind::Sound => load::<Sound>(&mut registry, container, AudioObject::Sound)?,
            AudioKind::Set => load::<SoundSet>(&mut registry, container, AudioObject::Set)?,
            AudioKind::Material => load::<Material>(&mut registry, container, AudioObject::Material)?,
            AudioKind::Impact => load::<Impact>(&mut registry, container, AudioObject::Impact)?,
            AudioKind::Room => load::<AudioRoom>(&mut registry, container, AudioObject::Room)?,
        }
    }

    for (raw, listed) in read_names(chunk.require(NAMES_TAG)?)? {
        let slot = Slot::decoded(NAMES_TAG, raw, "names list")?;
        let entry = registry.slots.get_or_insert_with(slot, SlotEntry::default);
        let conflict = entry.name.as_ref().filter(|record| **record != listed).cloned();
        match conflict {
            None => entry.name = Some(listed),
            Some(record) => match config.name_mismatch {
                MismatchPolicy::Warn => {
                    log::warn!("audio slot {slot}: record name {record:?} but names list says {listed:?}");
                }
                MismatchPolicy::Error => {
                    return Err(Error::NameMismatch {
                        slot: raw,
                        record,
                        listed,
                    });
                }
            },
        }
    }

    registry.validate()?;
    log::debug!(
        "decoded audio registry: {} slots in use, capacity {}",
        registry.len(),
        registry.capacity()
    );
    Ok(registry)
}

fn load<T: Record>(registry: &mut AudioRegistry, container: &Chunk, wrap: fn(T) -> AudioObject) -> Result<()> {
    for entry in record::read_container::<T>(container)? {
        let slot = Slot::decoded(T::TAG, entry.slot, &format!("{} record", T::NAME))?;
        if registry.object(slot).is_some() {
            return Err(Error::malformed(T::TAG, 0, format!("slot {slot} holds two records")));
        }
        let name = (!entry.name.is_empty()).then_some(entry.name);
        let existing = registry.slots.get_or_insert_with(slot, SlotEntry::default);
        existing.object = Some(wrap(entry.record));
        if name.is_some() {
            existing.name = name;
        }
    }
    Ok(())
}

fn read_names(chunk: &Chunk) -> Result<Vec<(u32, String)>> {
    let blobs = chunk.expect_multi()?;
    let mut r = RecordReader::new(chunk.tag, blobs, &[]);
    let count = r.field::<u32>("count")? as usize;
    if count.saturating_mul(2) > blobs.len() {
        return Err(Error::malformed(chunk.tag, 0, format!("{count} names cannot fit")));
    }
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let slot = r.field::<u32>("slot")?;
        let name = r.field::<String>("name")?;
        names.push((slot, name));
    }
    if !r.is_done() {
        return Err(Error::malformed(chunk.tag, 0, "trailing blobs after names list"));
    }
    Ok(names)
}

/// Encode the registry as a `SNDR` chunk.
pub fn encode(registry: &AudioRegistry) -> Result<Chunk> {
    registry.validate()?;

    let mut root = Chunk::new(REGISTRY_TAG);
    for kind in AudioKind::ALL {
        let container = match kind {
            AudioKind::Wave => store(registry, kind, |o| match o {
                AudioObject::Wave(r) => Some(r),
                _ => None,
            }),
            AudioKind::Sound => store(registry, kind, |o| match o {
                AudioObject::Sound(r) => Some(r),
                _ => None,
            }),
            AudioKind::Set => store(registry, kind, |o| match o {
                AudioObject::Set(r) => Some(r),
                _ => None,
            }),
            AudioKind::Material => store(registry, kind, |o| match o {
                AudioObject::Material(r) => Some(r),
                _ => None,
            }),
            AudioKind::Impact => store(registry, kind, |o| match o {
                AudioObject::Impact(r) => Some(r),
                _ => None,
            }),
            AudioKind::Room => store(registry, kind, |o| match o {
                AudioObject::Room(r) => Some(r),
                _ => None,
            }),
        };
        root.subchunks.push(container);
    }

    let mut w = RecordWriter::new();
    let named: Vec<(Slot, &str)> = registry
        .iter()
        .filter_map(|(slot, e)| e.name.as_deref().map(|n| (slot, n)))
        .collect();
    w.field(&(named.len() as u32));
    for (slot, name) in named {
        w.field(&slot.get());
        w.field(&name.to_string());
    }
    root.subchunks.push(Chunk::with_multi(NAMES_TAG, w.into_blobs()));
    Ok(root)
}

fn store<'a, T: Record + 'a>(
    registry: &'a AudioRegistry,
    kind: AudioKind,
    unwrap: fn(&'a AudioObject) -> Option<&'a T>,
) -> Chunk {
    record::write_container::<T>(registry.objects_of(kind).filter_map(move |(slot, entry, object)| {
        let record = unwrap(object)?;
        Some((slot.get(), entry.name.as_deref().unwrap_or(""), record))
    }))
}
