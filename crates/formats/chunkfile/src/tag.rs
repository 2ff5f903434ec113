/// A 4-byte chunk identifier.
///
/// Stored and written in declaration order, so `Tag(*b"TEST")` is the byte
/// sequence `54 45 53 54` on disk.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Tag as a string (for display).
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Whether every byte is printable ASCII.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl From<&[u8; 4]> for Tag {
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_printable() {
            f.write_str(self.as_str())
        } else {
            write!(f, "{:08x}", u32::from_be_bytes(self.0))
        }
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({self})")
    }
}
