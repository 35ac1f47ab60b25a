//! Protocol module: header, command frames, and their decoders.

pub mod codec;
pub mod command;
pub mod header;

pub use codec::{decode_command, decode_dongle_info, ProtocolError};
pub use command::{CommandFrame, DirectSampling, Opcode, TunerCommand, COMMAND_SIZE};
pub use header::{DongleInfo, StreamHeader, TunerType, HEADER_MAGIC, HEADER_SIZE};
