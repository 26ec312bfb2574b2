use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error returned when parsing a fixed-length hex identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    pub message: String,
}

impl std::fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "identifier parse error: {}", self.message)
    }
}

impl std::error::Error for ParseIdError {}

fn decode_hex<const N: usize>(s: &str, what: &str) -> Result<[u8; N], ParseIdError> {
    let stripped = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    // Byte-offset slicing below requires single-byte chars.
    if !stripped.is_ascii() {
        return Err(ParseIdError {
            message: format!("{what} contains non-ASCII characters"),
        });
    }
    if stripped.len() != N * 2 {
        return Err(ParseIdError {
            message: format!(
                "{what} must be {} hex chars, got {}",
                N * 2,
                stripped.len()
            ),
        });
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        let pair = &stripped[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16).map_err(|_| ParseIdError {
            message: format!("{what} contains non-hex char in {pair:?}"),
        })?;
    }
    Ok(out)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// A fixed-length (20-byte) driver account identifier.
///
/// The canonical textual form is a lowercase `0x`-prefixed hex string,
/// 42 characters long, matching how the event log identifies accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverAddress([u8; 20]);

impl DriverAddress {
    /// Creates an address from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parses an address from its hex string form.
    pub fn parse(s: &str) -> Result<Self, ParseIdError> {
        decode_hex::<20>(s, "driver address").map(Self)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for DriverAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl std::str::FromStr for DriverAddress {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DriverAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DriverAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte transaction hash, hex form `0x…` (66 chars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn parse(s: &str) -> Result<Self, ParseIdError> {
        decode_hex::<32>(s, "transaction hash").map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl std::str::FromStr for TxHash {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A ledger-assigned violation identifier.
///
/// Assigned monotonically by the ledger at recording time, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ViolationId(u64);

impl ViolationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ViolationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ViolationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A position in the ordered event log: block number plus log index.
///
/// Total order: block number first, then log index within the block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl LogPosition {
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }

    /// The first position in the log.
    pub fn genesis() -> Self {
        Self::default()
    }

    /// The position immediately after this one.
    ///
    /// Backfill resumes from the cursor's successor; positions within the
    /// same block follow by log index, so a cursor parked mid-block never
    /// skips the block's remaining entries. Saturates at the index bound
    /// rather than spilling into the next block.
    pub fn successor(&self) -> Self {
        Self {
            block_number: self.block_number,
            log_index: self.log_index.saturating_add(1),
        }
    }
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.block_number, self.log_index)
    }
}
