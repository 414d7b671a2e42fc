//! Raw record tuples as produced by a LevelDB reader.

/// Liveness of a raw LevelDB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// A value write
    Live,
    /// A deletion marker
    Deleted,
}

/// One versioned key/value entry from the LevelDB log or tables.
///
/// Several raw records may share the same key. `sequence` totally orders
/// them; the highest sequence is the most recent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub sequence: u64,
    pub state: KeyState,
    /// File the entry was read from (`.log` or `.ldb`)
    pub origin_file: String,
}

impl RawRecord {
    /// Create a live record
    pub fn live(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        sequence: u64,
        origin_file: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            sequence,
            state: KeyState::Live,
            origin_file: origin_file.into(),
        }
    }

    /// Create a deletion marker. Deletions carry no value.
    pub fn deleted(key: impl Into<Vec<u8>>, sequence: u64, origin_file: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            sequence,
            state: KeyState::Deleted,
            origin_file: origin_file.into(),
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.state == KeyState::Live
    }

    /// Lowercase hex rendering of the key, used in skip reports.
    pub fn key_hex(&self) -> String {
        hex::encode(&self.key)
    }
}
