//! # rtl-core
//!
//! Wire types for the rtl_tcp protocol spoken between an RTL-SDR server and
//! its clients.
//!
//! The protocol is tiny:
//!
//! - **Header** – on connect the server sends a 12-byte capability block
//!   (`"RTL0"`, tuner type, gain step count).
//! - **Samples** – after the header, an endless stream of interleaved 8-bit
//!   I/Q bytes with no framing at all.
//! - **Commands** – the client may send 5-byte frames (`opcode`, big-endian
//!   `u32` value) to retune the dongle.
//!
//! This crate has no I/O.  It is shared by the splitter and by its tests,
//! which play the role of both server and client.

pub mod protocol;

pub use protocol::codec::{decode_command, ProtocolError};
pub use protocol::command::{CommandFrame, Opcode, TunerCommand, COMMAND_SIZE};
pub use protocol::header::{DongleInfo, StreamHeader, TunerType, HEADER_SIZE};
