//! Decoders for the two fixed-size rtl_tcp structures.
//!
//! Neither structure carries a length prefix, so decoding is a matter of
//! checking that enough bytes are present and slicing them out.  Callers that
//! read from a socket normally use `read_exact` and never see
//! [`ProtocolError::InsufficientData`]; the variant exists for buffer-based
//! callers.

use thiserror::Error;

use crate::protocol::command::{CommandFrame, COMMAND_SIZE};
use crate::protocol::header::{DongleInfo, HEADER_MAGIC, HEADER_SIZE};

/// Errors that can occur while decoding rtl_tcp structures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the structure being decoded.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The header does not start with `RTL0`.
    #[error("bad header magic: {0:02X?}")]
    BadMagic([u8; 4]),
}

/// Decodes one [`CommandFrame`] from the start of `bytes`.
///
/// Returns the frame and the number of bytes consumed (always
/// [`COMMAND_SIZE`]).  Any opcode is accepted.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than five bytes are
/// available.
///
/// # Examples
///
/// ```rust
/// use rtl_core::protocol::decode_command;
///
/// let (frame, used) = decode_command(&[0x01, 0x00, 0x00, 0x00, 0x64, 0xFF]).unwrap();
/// assert_eq!(frame.value(), 100);
/// assert_eq!(used, 5);
/// ```
pub fn decode_command(bytes: &[u8]) -> Result<(CommandFrame, usize), ProtocolError> {
    let Some(raw) = bytes.get(..COMMAND_SIZE) else {
        return Err(ProtocolError::InsufficientData {
            needed: COMMAND_SIZE,
            available: bytes.len(),
        });
    };

    let mut frame = [0u8; COMMAND_SIZE];
    frame.copy_from_slice(raw);
    Ok((CommandFrame::from_bytes(frame), COMMAND_SIZE))
}

/// Decodes the tuner description from a captured header.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for a short header and
/// [`ProtocolError::BadMagic`] when the first four bytes are not `RTL0`.
pub fn decode_dongle_info(bytes: &[u8]) -> Result<DongleInfo, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != HEADER_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let tuner = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let gain_count = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    Ok(DongleInfo {
        tuner: tuner.into(),
        gain_count,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
