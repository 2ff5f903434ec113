//! End-to-end: an archive chunk holding an audio registry and a scene,
//! serialized to bytes and read back.

use chunkfile::audio::{self, AudioObject, AudioRegistry, Sound, SoundSet, Wave};
use chunkfile::scene::{self, GameObject, Layer, Property, Scene};
use chunkfile::{chunk, Chunk, ChunkData, CodecConfig, Error, Tag};
use glam::Vec3;

const ARCHIVE: Tag = Tag::new(b"ARCV");

fn registry() -> AudioRegistry {
    let mut registry = AudioRegistry::new();
    let wave = registry.push(
        Some("step.wav".into()),
        AudioObject::Wave(Wave {
            filename: "sfx/step.wav".into(),
            sample_rate: 22050,
            channels: 1,
            bits_per_sample: 16,
            data_size: 4410,
            ..Default::default()
        }),
    );
    let sound = registry.push(
        Some("step".into()),
        AudioObject::Sound(Sound {
            wave: Some(wave),
            volume: 0.8,
            pitch: 1.0,
            ..Default::default()
        }),
    );
    registry.push(
        Some("steps".into()),
        AudioObject::Set(SoundSet {
            mode: 1,
            volume: 1.0,
            entries: vec![Some(sound), Some(sound), None],
        }),
    );
    registry
}

fn world() -> Scene {
    let mut scene = Scene::new();
    scene.add_object(Layer::Clip, GameObject::new("camera"));
    let room = scene.add_object(Layer::Main, GameObject::new("room"));
    let speaker = scene
        .add_child(
            room,
            GameObject::new("speaker")
                .with_position(Vec3::new(4.0, 1.0, -2.0))
                .with_properties(1, vec![Property::String("steps".into())]),
        )
        .unwrap();
    scene
        .add_child(
            room,
            GameObject::new("trigger").with_properties(0, vec![Property::Object(Some(speaker))]),
        )
        .unwrap();
    scene
}

fn archive() -> Vec<u8> {
    let root = Chunk::new(ARCHIVE)
        .with_child(audio::encode(&registry()).unwrap())
        .with_child(scene::encode(&world()).unwrap())
        .with_child(Chunk::with_raw(b"MESH", vec![0xAB; 64]));
    chunk::encode(&root).unwrap()
}

#[test]
fn archive_round_trips_byte_exact() {
    let bytes = archive();
    let root = chunk::decode(&bytes).unwrap();
    assert_eq!(root.tag, ARCHIVE);
    assert_eq!(root.encoded_len(), bytes.len());
    assert_eq!(chunk::encode(&root).unwrap(), bytes);
}

#[test]
fn subsystems_decode_from_the_archive() {
    let config = CodecConfig::default();
    let root = chunk::decode(&archive()).unwrap();

    let registry = audio::decode(root.require(audio::REGISTRY_TAG).unwrap(), &config).unwrap();
    let expected = self::registry();
    assert_eq!(
        registry.iter().collect::<Vec<_>>(),
        expected.iter().collect::<Vec<_>>()
    );

    let scene = scene::decode(root.require(scene::SCENE_TAG).unwrap(), &config).unwrap();
    assert!(scene.is_isomorphic(&world()));
    let trigger = scene.find_by_name("trigger").unwrap();
    let speaker = scene.find_by_name("speaker").unwrap();
    assert_eq!(
        scene.get(trigger).unwrap().properties,
        [Property::Object(Some(speaker))]
    );
    assert_eq!(scene.parent(trigger), scene.parent(speaker));

    let mesh = root.require(b"MESH").unwrap();
    assert_eq!(mesh.data, ChunkData::Raw(vec![0xAB; 64]));
}

#[test]
fn rewriting_the_scene_keeps_other_chunks() {
    let config = CodecConfig::default();
    let mut root = chunk::decode(&archive()).unwrap();
    let previous = root.require(scene::SCENE_TAG).unwrap().clone();
    let mut scene = scene::decode(&previous, &config).unwrap();
    let speaker = scene.find_by_name("speaker").unwrap();
    scene.get_mut(speaker).unwrap().position = Vec3::new(5.0, 1.0, -2.0);

    let (encoded, report) = scene::encode_with_report(&scene, &config, Some(&previous)).unwrap();
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].container, scene::POSITIONS_TAG);
    *root.find_mut(scene::SCENE_TAG).unwrap() = encoded;

    let bytes = chunk::encode(&root).unwrap();
    let reread = chunk::decode(&bytes).unwrap();
    assert_eq!(reread.require(audio::REGISTRY_TAG).unwrap(), root.require(audio::REGISTRY_TAG).unwrap());
    let scene = scene::decode(reread.require(scene::SCENE_TAG).unwrap(), &config).unwrap();
    let speaker = scene.find_by_name("speaker").unwrap();
    assert_eq!(scene.get(speaker).unwrap().position, Vec3::new(5.0, 1.0, -2.0));
}

#[test]
fn truncated_archive_is_rejected() {
    let bytes = archive();
    for cut in [1, 9, bytes.len() / 2, bytes.len() - 1] {
        let err = chunk::decode(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, Error::UnexpectedEof { .. } | Error::Malformed { .. }),
            "cut at {cut}: {err}"
        );
    }
}

#[test]
fn decode_sample_file() {
    let Ok(path) = std::env::var("CHUNKFILE_SAMPLE") else {
        eprintln!("skipping: CHUNKFILE_SAMPLE not set");
        return;
    };
    let data = std::fs::read(&path).expect("failed to read sample");
    let chunks = chunk::decode_sequence(&data).expect("failed to decode sample");
    assert_eq!(chunk::encode_sequence(&chunks).unwrap(), data);
}
