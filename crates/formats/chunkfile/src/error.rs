use thiserror::Error;

use crate::tag::Tag;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("malformed chunk {tag} at offset {offset:#x}: {message}")]
    Malformed {
        tag: Tag,
        offset: usize,
        message: String,
    },

    #[error("chunk {tag} not found")]
    ChunkNotFound { tag: Tag },

    #[error("string at offset {offset:#x} is not valid UTF-8: {source}")]
    InvalidString {
        offset: usize,
        source: std::string::FromUtf8Error,
    },

    #[error("{context}: index {index} out of range (limit {limit})")]
    DanglingReference {
        context: &'static str,
        index: u32,
        limit: u32,
    },

    #[error("{table} table exceeds {limit} entries")]
    TableOverflow { table: &'static str, limit: usize },

    #[error("slot {slot}: record name {record:?} disagrees with names list entry {listed:?}")]
    NameMismatch {
        slot: u32,
        record: String,
        listed: String,
    },

    #[error("{context}: {message}")]
    Parse { context: &'static str, message: String },
}

impl Error {
    pub(crate) fn malformed(tag: Tag, offset: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            tag,
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn parse(context: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            context,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
