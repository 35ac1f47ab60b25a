//! The capability header rtl_tcp sends once, right after a client connects.
//!
//! ```text
//! [magic:4 = "RTL0"][tuner_type:4][tuner_gain_count:4]
//! ```
//!
//! All integers are big-endian.  The splitter treats the header as an opaque
//! blob and replays it byte-for-byte; [`DongleInfo`] exists only so the
//! tuner can be named in the startup log.

use std::fmt;

use crate::protocol::codec::ProtocolError;

/// Size of a complete capability header.
pub const HEADER_SIZE: usize = 12;

/// Magic bytes at the start of a well-formed header.
pub const HEADER_MAGIC: [u8; 4] = *b"RTL0";

/// The header bytes as captured from upstream.
///
/// Holds at most [`HEADER_SIZE`] bytes.  A short header (the peer sent fewer
/// bytes in its first write) is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamHeader {
    bytes: Vec<u8>,
}

impl StreamHeader {
    /// Captures `bytes`, truncating anything past [`HEADER_SIZE`].
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(HEADER_SIZE);
        Self {
            bytes: bytes[..len].to_vec(),
        }
    }

    /// The captured bytes, exactly as they will be replayed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` when all twelve bytes were captured.
    pub fn is_complete(&self) -> bool {
        self.bytes.len() == HEADER_SIZE
    }

    /// Decodes the header for display purposes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the header is short or lacks the magic.
    pub fn dongle_info(&self) -> Result<DongleInfo, ProtocolError> {
        crate::protocol::codec::decode_dongle_info(&self.bytes)
    }
}

/// Tuner chip reported in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerType {
    Unknown,
    E4000,
    Fc0012,
    Fc0013,
    Fc2580,
    R820t,
    R828d,
    /// A code this table does not know.
    Other(u32),
}

impl From<u32> for TunerType {
    fn from(value: u32) -> Self {
        match value {
            0 => TunerType::Unknown,
            1 => TunerType::E4000,
            2 => TunerType::Fc0012,
            3 => TunerType::Fc0013,
            4 => TunerType::Fc2580,
            5 => TunerType::R820t,
            6 => TunerType::R828d,
            n => TunerType::Other(n),
        }
    }
}

impl fmt::Display for TunerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerType::Unknown => f.write_str("unknown"),
            TunerType::E4000 => f.write_str("E4000"),
            TunerType::Fc0012 => f.write_str("FC0012"),
            TunerType::Fc0013 => f.write_str("FC0013"),
            TunerType::Fc2580 => f.write_str("FC2580"),
            TunerType::R820t => f.write_str("R820T"),
            TunerType::R828d => f.write_str("R828D"),
            TunerType::Other(n) => write!(f, "tuner #{n}"),
        }
    }
}

/// Decoded view of a complete header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub tuner: TunerType,
    /// Number of discrete gain steps the tuner supports.
    pub gain_count: u32,
}
