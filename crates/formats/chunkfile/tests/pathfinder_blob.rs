use chunkfile::cursor::Writer;
use chunkfile::pathfinder::{self, NONE, SENTINEL};
use chunkfile::Error;

/// One room named at heap offset 0 with `doors` doors, no other geometry
/// except a single leaf, followed by empty instance lists.
fn hand_built(doors: u32, sentinel: bool) -> Vec<u8> {
    let heap = b"cellar\0";
    let mut w = Writer::new();
    if sentinel {
        w.write_u32(SENTINEL);
    }
    w.write_u32(heap.len() as u32);
    w.write_bytes(heap);

    w.write_u32(1); // rooms
    w.write_u32(1); // leaves
    w.write_f32x3([0.0; 3]);
    w.write_f32x3([1.0; 3]);
    w.write_u32(0);
    w.write_u32(0);
    w.write_u32(0); // nodes
    w.write_u32(0); // layers
    w.write_u32(0); // leaf edges
    w.write_f32x3([0.0; 3]);
    w.write_f32x3([8.0; 3]);
    w.write_f32x3([0.5; 3]);
    w.write_u32(doors);
    for i in 0..doors {
        w.write_u32(0);
        w.write_f32x3([i as f32, 0.0, 0.0]);
        w.write_f32x3([1.0, 0.0, 0.0]);
        w.write_f32(1.0);
    }
    // Door edges follow the doors directly, with no count of their own.
    let pairs = doors * doors.saturating_sub(1) / 2;
    for i in 0..pairs {
        w.write_f32(i as f32 * 0.5);
        w.write_u32(i + 1);
    }
    for i in 0..doors {
        w.write_u32(i);
        w.write_u32(0);
        w.write_f32(1.0);
    }
    w.write_u32(0); // kongs
    w.write_u32(0); // room name

    w.write_u32(0); // room instances
    w.write_u32(0); // door instances
    w.write_u32(0x1234);
    w.into_bytes()
}

#[test]
fn four_doors_derive_six_edges() {
    let pf = pathfinder::decode(&hand_built(4, true)).unwrap();
    let room = &pf.rooms[0];
    assert_eq!(room.name, "cellar");
    assert_eq!(room.doors.len(), 4);
    assert_eq!(room.door_edges.len(), 6);
    assert_eq!(room.door_edge(2, 3).unwrap().hops, 6);
    assert_eq!(room.doors[3].extra.flags, 3);
    assert_eq!(pf.trailer, 0x1234);
}

#[test]
fn door_edge_count_matches_for_small_rooms() {
    for (doors, edges) in [(0, 0), (1, 0), (2, 1), (3, 3), (5, 10)] {
        let pf = pathfinder::decode(&hand_built(doors, true)).unwrap();
        assert_eq!(pf.rooms[0].door_edges.len(), edges, "{doors} doors");
    }
}

#[test]
fn both_header_forms_decode_alike() {
    let with = pathfinder::decode(&hand_built(3, true)).unwrap();
    let without = pathfinder::decode(&hand_built(3, false)).unwrap();
    assert_eq!(with, without);
}

#[test]
fn encoding_normalizes_to_sentinel_form() {
    let legacy = hand_built(4, false);
    let pf = pathfinder::decode(&legacy).unwrap();
    assert_eq!(pathfinder::encode(&pf).unwrap(), hand_built(4, true));
}

#[test]
fn name_offset_outside_heap_fails() {
    let mut bytes = hand_built(0, true);
    // Room name offset sits right before the two instance counts and trailer.
    let at = bytes.len() - 16;
    bytes[at..at + 4].copy_from_slice(&100u32.to_le_bytes());
    assert!(matches!(
        pathfinder::decode(&bytes),
        Err(Error::DanglingReference { context: "name offset", index: 100, limit: 7 })
    ));
}

#[test]
fn door_on_missing_leaf_fails() {
    let mut pf = pathfinder::decode(&hand_built(2, true)).unwrap();
    pf.rooms[0].doors[1].leaf = 1;
    assert!(matches!(
        pathfinder::encode(&pf),
        Err(Error::DanglingReference { context: "door leaf", index: 1, limit: 1 })
    ));
    pf.rooms[0].doors[1].leaf = 0;
    pf.door_instances.push(pathfinder::DoorInstance {
        room_instances: [NONE; 4],
    });
    assert!(pathfinder::encode(&pf).is_ok());
}
