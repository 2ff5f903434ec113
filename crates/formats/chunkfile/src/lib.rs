//! Reader and writer for a tagged binary chunk container and the game data
//! stored in it: the audio object registry, the scene graph, and the
//! pathfinder blob.
//!
//! Everything here works on in-memory byte buffers. Decoding is strict:
//! a buffer either decodes completely or the call fails with an [`Error`].

pub mod audio;
pub mod chunk;
pub mod config;
pub mod cursor;
pub mod dedup;
pub mod entity;
pub mod error;
pub mod pathfinder;
pub mod record;
pub mod scene;
pub mod tag;

pub use chunk::{Chunk, ChunkData};
pub use config::{CodecConfig, MismatchPolicy};
pub use error::{Error, Result};
pub use tag::Tag;
