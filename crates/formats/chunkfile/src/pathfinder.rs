//! Flat pathfinding blob.
//!
//! ```text
//! [0x12312312] heapSize:u32 heap[heapSize]
//! roomCount:u32 Room*
//! roomInstanceCount:u32 RoomInstance*
//! doorInstanceCount:u32 DoorInstance*
//! trailer:u32
//! ```
//!
//! Blobs written without the leading sentinel start directly with the heap
//! size. Names are byte offsets into the NUL-terminated string heap.
//!
//! A room stores `n` doors followed by `n(n-1)/2` door edges, one per
//! unordered pair of doors; the edge count itself is never stored.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// Marks a blob whose heap size follows as a separate field.
pub const SENTINEL: u32 = 0x1231_2312;

/// Empty slot in a room-instance or door-instance link.
pub const NONE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub min: Vec3,
    pub max: Vec3,
    pub layer: u32,
    pub flags: u32,
}

/// Split node of the room's leaf tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub axis: u32,
    pub split: f32,
    pub front: i32,
    pub back: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub height: f32,
    pub flags: u32,
}

/// Traversable connection between two leaves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafEdge {
    pub from: u32,
    pub to: u32,
    pub cost: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DoorExtra {
    pub flags: u32,
    pub group: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub leaf: u32,
    pub center: Vec3,
    pub normal: Vec3,
    pub width: f32,
    pub extra: DoorExtra,
}

/// Precomputed route between two doors of the same room.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DoorEdge {
    pub cost: f32,
    pub hops: u32,
}

/// Attachment point inside a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kong {
    pub leaf: u32,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub leaves: Vec<Leaf>,
    pub nodes: Vec<Node>,
    pub layers: Vec<Layer>,
    pub edges: Vec<LeafEdge>,
    pub min: Vec3,
    pub max: Vec3,
    pub resolution: Vec3,
    pub doors: Vec<Door>,
    /// One entry per unordered door pair, `(0,1), (0,2), .., (1,2), ..`.
    pub door_edges: Vec<DoorEdge>,
    pub kongs: Vec<Kong>,
}

/// Number of door edges a room with `doors` doors carries.
pub fn door_edge_count(doors: usize) -> usize {
    doors * doors.saturating_sub(1) / 2
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            leaves: Vec::new(),
            nodes: Vec::new(),
            layers: Vec::new(),
            edges: Vec::new(),
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            resolution: Vec3::ONE,
            doors: Vec::new(),
            door_edges: Vec::new(),
            kongs: Vec::new(),
        }
    }

    /// Edge between doors `i` and `j`, in either order.
    pub fn door_edge(&self, i: usize, j: usize) -> Option<&DoorEdge> {
        let n = self.doors.len();
        if i == j || i >= n || j >= n {
            return None;
        }
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        self.door_edges.get(a * (2 * n - a - 1) / 2 + (b - a - 1))
    }

    /// Add a door and grow the edge list with default edges to every existing door.
    pub fn push_door(&mut self, door: Door) {
        let n = self.doors.len();
        // Edge lists are grouped by the lower door index; insert (a, n) at the end of each group.
        let mut edges = Vec::with_capacity(door_edge_count(n + 1));
        let mut old = self.door_edges.iter().copied();
        for a in 0..n {
            edges.extend(old.by_ref().take(n - a - 1));
            edges.push(DoorEdge::default());
        }
        self.door_edges = edges;
        self.doors.push(door);
    }
}

/// A placed copy of a room, linked to door instances per door.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInstance {
    pub name: String,
    pub room: u32,
    /// Door instance for each door of the room, or [`NONE`].
    pub doors: Vec<u32>,
}

/// Connects up to four room instances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoorInstance {
    pub room_instances: [u32; 4],
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pathfinder {
    pub rooms: Vec<Room>,
    pub room_instances: Vec<RoomInstance>,
    pub door_instances: Vec<DoorInstance>,
    pub trailer: u32,
}

impl Pathfinder {
    /// Check every cross-index and the door-edge count of every room.
    pub fn validate(&self) -> Result<()> {
        for room in &self.rooms {
            let leaves = room.leaves.len() as u32;
            for edge in &room.edges {
                check(edge.from, leaves, "leaf edge source")?;
                check(edge.to, leaves, "leaf edge target")?;
            }
            for door in &room.doors {
                check(door.leaf, leaves, "door leaf")?;
            }
            for kong in &room.kongs {
                check(kong.leaf, leaves, "kong leaf")?;
            }
            let expected = door_edge_count(room.doors.len());
            if room.door_edges.len() != expected {
                return Err(Error::parse(
                    "door edges",
                    format!(
                        "room {:?} has {} doors and {} door edges, expected {expected}",
                        room.name,
                        room.doors.len(),
                        room.door_edges.len()
                    ),
                ));
            }
        }
        let rooms = self.rooms.len() as u32;
        let door_instances = self.door_instances.len() as u32;
        for instance in &self.room_instances {
            check(instance.room, rooms, "room instance room")?;
            let doors = self.rooms[instance.room as usize].doors.len();
            if instance.doors.len() != doors {
                return Err(Error::parse(
                    "room instance",
                    format!(
                        "{:?} links {} doors, its room has {doors}",
                        instance.name,
                        instance.doors.len()
                    ),
                ));
            }
            for &door in &instance.doors {
                check_link(door, door_instances, "room instance door")?;
            }
        }
        let room_instances = self.room_instances.len() as u32;
        for door in &self.door_instances {
            for &link in &door.room_instances {
                check_link(link, room_instances, "door instance room")?;
            }
        }
        Ok(())
    }
}

fn check(index: u32, limit: u32, context: &'static str) -> Result<()> {
    if index < limit {
        Ok(())
    } else {
        Err(Error::DanglingReference {
            context,
            index,
            limit,
        })
    }
}

fn check_link(index: u32, limit: u32, context: &'static str) -> Result<()> {
    if index == NONE {
        Ok(())
    } else {
        check(index, limit, context)
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub fn decode(data: &[u8]) -> Result<Pathfinder> {
    let mut c = Cursor::new(data);
    let first = c.read_u32()?;
    let heap_size = if first == SENTINEL {
        c.read_u32()?
    } else {
        log::debug!("pathfinder blob without sentinel, heap size {first}");
        first
    };
    let heap = c.read_bytes(heap_size as usize)?;

    let rooms = read_vec(&mut c, 4, |c| read_room(c, heap))?;

    let count = c.read_u32()? as usize;
    let mut room_instances = Vec::with_capacity(count.min(c.remaining() / 8));
    for _ in 0..count {
        let name = heap_string(heap, c.read_u32()?)?;
        let room = c.read_u32()?;
        check(room, rooms.len() as u32, "room instance room")?;
        let doors = rooms[room as usize].doors.len();
        let mut links = Vec::with_capacity(doors.min(c.remaining() / 4));
        for _ in 0..doors {
            links.push(c.read_u32()?);
        }
        room_instances.push(RoomInstance {
            name,
            room,
            doors: links,
        });
    }

    let door_instances = read_vec(&mut c, 16, |c| {
        Ok(DoorInstance {
            room_instances: [c.read_u32()?, c.read_u32()?, c.read_u32()?, c.read_u32()?],
        })
    })?;
    let trailer = c.read_u32()?;
    if c.remaining() != 0 {
        return Err(Error::parse(
            "pathfinder",
            format!("{} trailing bytes after trailer", c.remaining()),
        ));
    }

    let pathfinder = Pathfinder {
        rooms,
        room_instances,
        door_instances,
        trailer,
    };
    pathfinder.validate()?;
    log::debug!(
        "decoded pathfinder: {} rooms, {} room instances, {} door instances",
        pathfinder.rooms.len(),
        pathfinder.room_instances.len(),
        pathfinder.door_instances.len()
    );
    Ok(pathfinder)
}

/// Read a `u32` count and that many elements of at least `min_size` bytes.
fn read_vec<'a, T>(
    c: &mut Cursor<'a>,
    min_size: usize,
    mut read: impl FnMut(&mut Cursor<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let count = c.read_u32()? as usize;
    let mut items = Vec::with_capacity(count.min(c.remaining() / min_size));
    for _ in 0..count {
        items.push(read(c)?);
    }
    Ok(items)
}

fn read_vec3(c: &mut Cursor<'_>) -> Result<Vec3> {
    Ok(Vec3::from_array(c.read_f32x3()?))
}

fn heap_string(heap: &[u8], offset: u32) -> Result<String> {
    check(offset, heap.len() as u32, "name offset")?;
    let mut c = Cursor::new(heap);
    c.seek(offset as usize);
    c.read_cstring()
}

fn read_room(c: &mut Cursor<'_>, heap: &[u8]) -> Result<Room> {
    let leaves = read_vec(c, 32, |c| {
        Ok(Leaf {
            min: read_vec3(c)?,
            max: read_vec3(c)?,
            layer: c.read_u32()?,
            flags: c.read_u32()?,
        })
    })?;
    let nodes = read_vec(c, 16, |c| {
        Ok(Node {
            axis: c.read_u32()?,
            split: c.read_f32()?,
            front: c.read_i32()?,
            back: c.read_i32()?,
        })
    })?;
    let layers = read_vec(c, 8, |c| {
        Ok(Layer {
            height: c.read_f32()?,
            flags: c.read_u32()?,
        })
    })?;
    let mut edges = read_vec(c, 8, |c| {
        Ok(LeafEdge {
            from: c.read_u32()?,
            to: c.read_u32()?,
            cost: 0.0,
        })
    })?;
    for edge in &mut edges {
        edge.cost = c.read_f32()?;
    }
    let min = read_vec3(c)?;
    let max = read_vec3(c)?;
    let resolution = read_vec3(c)?;

    let mut doors = read_vec(c, 32, |c| {
        Ok(Door {
            leaf: c.read_u32()?,
            center: read_vec3(c)?,
            normal: read_vec3(c)?,
            width: c.read_f32()?,
            extra: DoorExtra::default(),
        })
    })?;
    let edge_count = door_edge_count(doors.len());
    let mut door_edges = Vec::with_capacity(edge_count.min(c.remaining() / 8));
    for _ in 0..edge_count {
        door_edges.push(DoorEdge {
            cost: c.read_f32()?,
            hops: c.read_u32()?,
        });
    }
    for door in &mut doors {
        door.extra = DoorExtra {
            flags: c.read_u32()?,
            group: c.read_u32()?,
            weight: c.read_f32()?,
        };
    }
    let kongs = read_vec(c, 16, |c| {
        Ok(Kong {
            leaf: c.read_u32()?,
            position: read_vec3(c)?,
        })
    })?;
    let name = heap_string(heap, c.read_u32()?)?;

    Ok(Room {
        name,
        leaves,
        nodes,
        layers,
        edges,
        min,
        max,
        resolution,
        doors,
        door_edges,
        kongs,
    })
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize a pathfinder blob, always in the sentinel form.
pub fn encode(pathfinder: &Pathfinder) -> Result<Vec<u8>> {
    pathfinder.validate()?;

    let mut heap = Writer::new();
    let mut intern = |name: &str| {
        let offset = heap.position() as u32;
        heap.write_cstring(name);
        offset
    };
    let room_names: Vec<u32> = pathfinder.rooms.iter().map(|r| intern(&r.name)).collect();
    let instance_names: Vec<u32> = pathfinder
        .room_instances
        .iter()
        .map(|r| intern(&r.name))
        .collect();
    let heap = heap.into_bytes();

    let mut w = Writer::new();
    w.write_u32(SENTINEL);
    w.write_u32(heap.len() as u32);
    w.write_bytes(&heap);

    w.write_u32(pathfinder.rooms.len() as u32);
    for (room, &name) in pathfinder.rooms.iter().zip(&room_names) {
        write_room(&mut w, room, name);
    }

    w.write_u32(pathfinder.room_instances.len() as u32);
    for (instance, &name) in pathfinder.room_instances.iter().zip(&instance_names) {
        w.write_u32(name);
        w.write_u32(instance.room);
        for &door in &instance.doors {
            w.write_u32(door);
        }
    }

    w.write_u32(pathfinder.door_instances.len() as u32);
    for door in &pathfinder.door_instances {
        for &link in &door.room_instances {
            w.write_u32(link);
        }
    }
    w.write_u32(pathfinder.trailer);

    log::debug!(
        "encoded pathfinder: {} bytes, heap {} bytes",
        w.position(),
        heap.len()
    );
    Ok(w.into_bytes())
}

fn write_vec3(w: &mut Writer, v: Vec3) {
    w.write_f32x3(v.to_array());
}

fn write_room(w: &mut Writer, room: &Room, name: u32) {
    w.write_u32(room.leaves.len() as u32);
    for leaf in &room.leaves {
        write_vec3(w, leaf.min);
        write_vec3(w, leaf.max);
        w.write_u32(leaf.layer);
        w.write_u32(leaf.flags);
    }
    w.write_u32(room.nodes.len() as u32);
    for node in &room.nodes {
        w.write_u32(node.axis);
        w.write_f32(node.split);
        w.write_i32(node.front);
        w.write_i32(node.back);
    }
    w.write_u32(room.layers.len() as u32);
    for layer in &room.layers {
        w.write_f32(layer.height);
        w.write_u32(layer.flags);
    }
    w.write_u32(room.edges.len() as u32);
    for edge in &room.edges {
        w.write_u32(edge.from);
        w.write_u32(edge.to);
    }
    for edge in &room.edges {
        w.write_f32(edge.cost);
    }
    write_vec3(w, room.min);
    write_vec3(w, room.max);
    write_vec3(w, room.resolution);

    w.write_u32(room.doors.len() as u32);
    for door in &room.doors {
        w.write_u32(door.leaf);
        write_vec3(w, door.center);
        write_vec3(w, door.normal);
        w.write_f32(door.width);
    }
    for edge in &room.door_edges {
        w.write_f32(edge.cost);
        w.write_u32(edge.hops);
    }
    for door in &room.doors {
        w.write_u32(door.extra.flags);
        w.write_u32(door.extra.group);
        w.write_f32(door.extra.weight);
    }
    w.write_u32(room.kongs.len() as u32);
    for kong in &room.kongs {
        w.write_u32(kong.leaf);
        write_vec3(w, kong.position);
    }
    w.write_u32(name);
}
