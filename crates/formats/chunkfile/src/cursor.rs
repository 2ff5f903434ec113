//! Little-endian byte reading and writing.
//!
//! [`Cursor`] walks a borrowed buffer and fails with
//! [`Error::UnexpectedEof`] instead of panicking on short input; [`Writer`]
//! appends to an owned buffer and supports patching words written earlier.

use crate::error::{Error, Result};
use crate::tag::Tag;

#[derive(Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

/// Fixed-width little-endian reads.
macro_rules! read_le {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }
        )*
    };
}

/// Fixed-width little-endian writes.
macro_rules! write_le {
    ($($name:ident($ty:ty)),* $(,)?) => {
        $(
            pub fn $name(&mut self, v: $ty) {
                self.out.extend_from_slice(&v.to_le_bytes());
            }
        )*
    };
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    pub fn position(&self) -> usize {
        self.at
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.at)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Jump to an absolute position. Reads past the end fail later, not here.
    pub fn seek(&mut self, pos: usize) {
        self.at = pos;
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Borrow the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.at.checked_add(n).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(Error::UnexpectedEof {
                offset: self.at,
                need: n,
                have: self.remaining(),
            });
        };
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        self.read_array().map(Tag)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    read_le! {
        read_u16 -> u16,
        read_i32 -> i32,
        read_u32 -> u32,
        read_f32 -> f32,
        read_f64 -> f64,
    }

    pub fn read_f32x3(&mut self) -> Result<[f32; 3]> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    /// Read up to the next NUL and consume it.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.at;
        let rest = self.bytes.get(start..).unwrap_or_default();
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::UnexpectedEof {
                offset: start,
                need: rest.len() + 1,
                have: rest.len(),
            });
        };
        let text = self.read_bytes(len)?.to_vec();
        self.skip(1)?;
        String::from_utf8(text).map_err(|source| Error::InvalidString { offset: start, source })
    }

    /// `count:u32` then `count` words.
    pub fn read_u32_list(&mut self) -> Result<Vec<u32>> {
        let count = self.read_u32()? as usize;
        let words = self.read_bytes(count.saturating_mul(4))?;
        Ok(words
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }
}

/// Growable output buffer.
#[derive(Debug, Default)]
pub struct Writer {
    out: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            out: Vec::with_capacity(cap),
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.out.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn write_tag(&mut self, tag: Tag) {
        self.write_bytes(&tag.0);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.out.push(v);
    }

    write_le! {
        write_u16(u16),
        write_i32(i32),
        write_u32(u32),
        write_f32(f32),
        write_f64(f64),
    }

    pub fn write_f32x3(&mut self, v: [f32; 3]) {
        v.into_iter().for_each(|c| self.write_f32(c));
    }

    pub fn write_cstring(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
        self.write_u8(0);
    }

    pub fn write_u32_list(&mut self, values: &[u32]) {
        self.write_u32(values.len() as u32);
        values.iter().for_each(|&v| self.write_u32(v));
    }

    /// Overwrite the word at `pos`, which must already have been written.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.out[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}
