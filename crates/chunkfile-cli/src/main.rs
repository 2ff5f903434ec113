use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chunkfile::audio::{self, AudioKind, AudioRegistry, Slot, SlotEntry};
use chunkfile::pathfinder::{self, Pathfinder};
use chunkfile::scene::{self, ObjectId, Scene};
use chunkfile::{chunk, Chunk, CodecConfig, Tag};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "chunkfile", about = "Inspect and round-trip chunk container files")]
struct Cli {
    /// JSON file with codec options.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Option flags layered on top of the config ("strict-names", "no-check-orthonormal", "no-verify-on-save").
    #[arg(long = "flag", global = true)]
    flags: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the chunk tree of a file.
    Tree {
        file: PathBuf,
    },
    /// Decode and re-encode a file, checking the bytes are unchanged.
    Roundtrip {
        file: PathBuf,
    },
    /// List the object trees of a scene chunk.
    Scene {
        file: PathBuf,
        /// Re-encode the scene to this path and report container differences.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the audio registry.
    Audio {
        /// Not needed with `--schema`.
        file: Option<PathBuf>,
        /// Print the record schema of every variant instead.
        #[arg(long)]
        schema: bool,
        /// Print slots as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Decode a pathfinder blob.
    Pathfinder {
        file: PathBuf,
        /// Print the decoded blob as JSON.
        #[arg(long)]
        json: bool,
        /// Re-encode the blob to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>, flags: &[String]) -> Result<CodecConfig> {
    let mut config = match path {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open config: {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CodecConfig::default(),
    };
    let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
    config.apply_flags(&flags);
    log::debug!("codec config: {config:?}");
    Ok(config)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_chunk(path: &Path) -> Result<Chunk> {
    let data = read_file(path)?;
    chunk::decode(&data).with_context(|| format!("failed to decode {}", path.display()))
}

/// Depth-first search for the first chunk with `tag`, including `root`.
fn find_tagged(root: &Chunk, tag: Tag) -> Option<&Chunk> {
    if root.tag == tag {
        return Some(root);
    }
    root.subchunks.iter().find_map(|c| find_tagged(c, tag))
}

fn cmd_tree(file: &Path) -> Result<()> {
    let data = read_file(file)?;
    let chunks =
        chunk::decode_sequence(&data).with_context(|| format!("failed to decode {}", file.display()))?;
    for root in &chunks {
        print!("{}", chunk::dump(root));
    }
    Ok(())
}

fn cmd_roundtrip(file: &Path) -> Result<()> {
    let data = read_file(file)?;
    let chunks =
        chunk::decode_sequence(&data).with_context(|| format!("failed to decode {}", file.display()))?;
    let nodes: usize = chunks.iter().map(Chunk::node_count).sum();
    eprintln!("[roundtrip] decoded {} root chunks, {nodes} nodes", chunks.len());
    let encoded = chunk::encode_sequence(&chunks).context("failed to re-encode")?;
    if encoded != data {
        let first = encoded
            .iter()
            .zip(&data)
            .position(|(a, b)| a != b)
            .unwrap_or(encoded.len().min(data.len()));
        bail!(
            "re-encoded bytes differ at offset {first:#x} ({} bytes in, {} bytes out)",
            data.len(),
            encoded.len()
        );
    }
    println!("{}: {} bytes, byte-exact", file.display(), data.len());
    Ok(())
}

fn print_object(scene: &Scene, id: ObjectId, depth: usize) {
    let Some(object) = scene.get(id) else {
        return;
    };
    let p = object.position;
    println!(
        "{:indent$}{} [type {}] at ({}, {}, {}), {} properties{}{}",
        "",
        object.name,
        object.type_id,
        p.x,
        p.y,
        p.z,
        object.properties.len(),
        if object.mesh.is_some() { ", mesh" } else { "" },
        if object.light.is_some() { ", light" } else { "" },
        indent = depth * 2
    );
    for &child in scene.children(id) {
        print_object(scene, child, depth + 1);
    }
}

fn cmd_scene(file: &Path, out: Option<&Path>, config: &CodecConfig) -> Result<()> {
    let root = read_chunk(file)?;
    let Some(previous) = find_tagged(&root, scene::SCENE_TAG) else {
        bail!("no {} chunk in {}", scene::SCENE_TAG, file.display());
    };
    let scene = scene::decode(previous, config).context("failed to decode scene")?;
    eprintln!("[scene] decoded {} objects", scene.len());
    for layer in [scene::Layer::Clip, scene::Layer::Main] {
        println!("{}:", layer.tag());
        for &id in scene.roots(layer) {
            print_object(&scene, id, 1);
        }
    }

    if let Some(out) = out {
        let (encoded, report) =
            scene::encode_with_report(&scene, config, Some(previous)).context("failed to encode scene")?;
        for mismatch in &report.mismatches {
            eprintln!("[scene] changed: {mismatch}");
        }
        let bytes = chunk::encode(&encoded).context("failed to serialize scene")?;
        fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("[scene] wrote {} bytes to {}", bytes.len(), out.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct SlotRow<'a> {
    slot: Slot,
    #[serde(flatten)]
    entry: &'a SlotEntry,
}

fn cmd_audio(file: Option<&Path>, schema: bool, json: bool, config: &CodecConfig) -> Result<()> {
    if schema {
        for kind in AudioKind::ALL {
            let fields: Vec<String> = kind
                .schema()
                .iter()
                .map(|f| format!("{}:{:?}", f.name, f.kind))
                .collect();
            println!("{} ({}): {}", kind.name(), kind.tag(), fields.join(" "));
        }
        return Ok(());
    }

    let Some(file) = file else {
        bail!("audio: a file is required unless --schema is given");
    };
    let root = read_chunk(file)?;
    let Some(registry_chunk) = find_tagged(&root, audio::REGISTRY_TAG) else {
        bail!("no {} chunk in {}", audio::REGISTRY_TAG, file.display());
    };
    let registry: AudioRegistry = audio::decode(registry_chunk, config).context("failed to decode audio registry")?;
    eprintln!(
        "[audio] {} slots in use, capacity {}",
        registry.len(),
        registry.capacity()
    );

    if json {
        let rows: Vec<SlotRow<'_>> = registry
            .iter()
            .map(|(slot, entry)| SlotRow { slot, entry })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for (slot, entry) in registry.iter() {
        let slot = slot.to_string();
        let kind = entry.object.as_ref().map_or("-", |o| o.kind().name());
        let name = entry.name.as_deref().unwrap_or("");
        let refs: Vec<String> = entry
            .object
            .as_ref()
            .map(|o| o.references().iter().map(Slot::to_string).collect())
            .unwrap_or_default();
        if refs.is_empty() {
            println!("{slot:>6} {kind:<8} {name}");
        } else {
            println!("{slot:>6} {kind:<8} {name} -> {}", refs.join(", "));
        }
    }
    Ok(())
}

fn cmd_pathfinder(file: &Path, json: bool, out: Option<&Path>) -> Result<()> {
    let data = read_file(file)?;
    let pf: Pathfinder =
        pathfinder::decode(&data).with_context(|| format!("failed to decode {}", file.display()))?;
    eprintln!(
        "[pathfinder] {} rooms, {} room instances, {} door instances",
        pf.rooms.len(),
        pf.room_instances.len(),
        pf.door_instances.len()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&pf)?);
    } else {
        for (i, room) in pf.rooms.iter().enumerate() {
            println!(
                "room {i} {:?}: {} leaves, {} nodes, {} doors, {} door edges, {} kongs",
                room.name,
                room.leaves.len(),
                room.nodes.len(),
                room.doors.len(),
                room.door_edges.len(),
                room.kongs.len()
            );
        }
        for (i, instance) in pf.room_instances.iter().enumerate() {
            println!("instance {i} {:?} of room {}", instance.name, instance.room);
        }
    }

    if let Some(out) = out {
        let bytes = pathfinder::encode(&pf).context("failed to encode pathfinder blob")?;
        fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("[pathfinder] wrote {} bytes to {}", bytes.len(), out.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), &cli.flags)?;
    match &cli.command {
        Command::Tree { file } => cmd_tree(file),
        Command::Roundtrip { file } => cmd_roundtrip(file),
        Command::Scene { file, out } => cmd_scene(file, out.as_deref(), &config),
        Command::Audio { file, schema, json } => cmd_audio(file.as_deref(), *schema, *json, &config),
        Command::Pathfinder { file, json, out } => cmd_pathfinder(file, *json, out.as_deref()),
    }
}
