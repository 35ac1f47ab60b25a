//! Tuning command frames sent by clients to the rtl_tcp server.
//!
//! Every command on the wire is exactly five bytes:
//!
//! ```text
//! [opcode:1][value:4]
//! ```
//!
//! The value is a big-endian `u32`.  Some commands reinterpret it as a signed
//! number or as packed sub-fields; [`TunerCommand`] decodes those for log
//! output.  Decoding is advisory only: a frame is always forwarded exactly as
//! it was received, whether or not its opcode is known.

use std::fmt;

/// Size of one command frame on the wire.
pub const COMMAND_SIZE: usize = 5;

// ── Raw frame ─────────────────────────────────────────────────────────────────

/// One 5-byte command frame, stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame([u8; COMMAND_SIZE]);

impl CommandFrame {
    /// Builds a frame from an opcode byte and a value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rtl_core::protocol::CommandFrame;
    ///
    /// let frame = CommandFrame::new(0x01, 100_000_000);
    /// assert_eq!(frame.as_bytes(), &[0x01, 0x05, 0xF5, 0xE1, 0x00]);
    /// ```
    pub fn new(opcode: u8, value: u32) -> Self {
        let v = value.to_be_bytes();
        Self([opcode, v[0], v[1], v[2], v[3]])
    }

    /// Wraps five raw bytes without inspecting them.
    pub fn from_bytes(bytes: [u8; COMMAND_SIZE]) -> Self {
        Self(bytes)
    }

    /// The exact bytes to put on the wire.
    pub fn as_bytes(&self) -> &[u8; COMMAND_SIZE] {
        &self.0
    }

    /// The raw opcode byte.
    pub fn opcode_byte(&self) -> u8 {
        self.0[0]
    }

    /// The known opcode, if any.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.0[0]).ok()
    }

    /// The big-endian value field.
    pub fn value(&self) -> u32 {
        u32::from_be_bytes([self.0[1], self.0[2], self.0[3], self.0[4]])
    }

    /// Interprets the frame for logging.
    pub fn interpret(&self) -> TunerCommand {
        TunerCommand::from(*self)
    }

    /// Lower-case hex rendering of the raw bytes, e.g. `0100000064`.
    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<[u8; COMMAND_SIZE]> for CommandFrame {
    fn from(bytes: [u8; COMMAND_SIZE]) -> Self {
        Self(bytes)
    }
}

// ── Opcodes ───────────────────────────────────────────────────────────────────

/// The command opcodes understood by rtl_tcp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetFrequency = 0x01,
    SetSampleRate = 0x02,
    SetGainMode = 0x03,
    SetGain = 0x04,
    SetFrequencyCorrection = 0x05,
    SetIfGain = 0x06,
    SetTestMode = 0x07,
    SetAgcMode = 0x08,
    SetDirectSampling = 0x09,
    SetOffsetTuning = 0x0A,
    SetRtlXtal = 0x0B,
    SetTunerXtal = 0x0C,
    SetTunerGainByIndex = 0x0D,
    SetBiasTee = 0x0E,
}

impl Opcode {
    /// Every known opcode in wire order.
    pub const ALL: [Opcode; 14] = [
        Opcode::SetFrequency,
        Opcode::SetSampleRate,
        Opcode::SetGainMode,
        Opcode::SetGain,
        Opcode::SetFrequencyCorrection,
        Opcode::SetIfGain,
        Opcode::SetTestMode,
        Opcode::SetAgcMode,
        Opcode::SetDirectSampling,
        Opcode::SetOffsetTuning,
        Opcode::SetRtlXtal,
        Opcode::SetTunerXtal,
        Opcode::SetTunerGainByIndex,
        Opcode::SetBiasTee,
    ];

    /// Short snake_case name used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::SetFrequency => "set_freq",
            Opcode::SetSampleRate => "set_sample_rate",
            Opcode::SetGainMode => "set_gain_mode",
            Opcode::SetGain => "set_gain",
            Opcode::SetFrequencyCorrection => "set_freq_correction",
            Opcode::SetIfGain => "set_if_gain",
            Opcode::SetTestMode => "set_test_mode",
            Opcode::SetAgcMode => "set_agc_mode",
            Opcode::SetDirectSampling => "set_direct_sampling",
            Opcode::SetOffsetTuning => "set_offset_tuning",
            Opcode::SetRtlXtal => "set_rtl_xtal",
            Opcode::SetTunerXtal => "set_tuner_xtal",
            Opcode::SetTunerGainByIndex => "set_tuner_gain_by_index",
            Opcode::SetBiasTee => "set_bias_tee",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        Opcode::ALL
            .into_iter()
            .find(|op| *op as u8 == value)
            .ok_or(())
    }
}

// ── Interpreted command ───────────────────────────────────────────────────────

/// Direct-sampling branch selected by [`Opcode::SetDirectSampling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectSampling {
    Off,
    IBranch,
    QBranch,
    Other(u32),
}

impl From<u32> for DirectSampling {
    fn from(value: u32) -> Self {
        match value {
            0 => DirectSampling::Off,
            1 => DirectSampling::IBranch,
            2 => DirectSampling::QBranch,
            n => DirectSampling::Other(n),
        }
    }
}

/// A command frame decoded into its meaning.
///
/// Gains are in tenths of a dB, as rtl_tcp transmits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerCommand {
    SetFrequency { hz: u32 },
    SetSampleRate { sps: u32 },
    SetGainMode { manual: bool },
    SetGain { tenth_db: i32 },
    SetFrequencyCorrection { ppm: i32 },
    SetIfGain { stage: u16, tenth_db: i16 },
    SetTestMode { enabled: bool },
    SetAgcMode { enabled: bool },
    SetDirectSampling(DirectSampling),
    SetOffsetTuning { enabled: bool },
    SetRtlXtal { hz: u32 },
    SetTunerXtal { hz: u32 },
    SetTunerGainByIndex { index: u32 },
    SetBiasTee { enabled: bool },
    /// Opcode outside the known table; still forwarded.
    Unknown { opcode: u8, value: u32 },
}

impl From<CommandFrame> for TunerCommand {
    fn from(frame: CommandFrame) -> Self {
        let value = frame.value();
        let Some(opcode) = frame.opcode() else {
            return TunerCommand::Unknown {
                opcode: frame.opcode_byte(),
                value,
            };
        };

        match opcode {
            Opcode::SetFrequency => TunerCommand::SetFrequency { hz: value },
            Opcode::SetSampleRate => TunerCommand::SetSampleRate { sps: value },
            Opcode::SetGainMode => TunerCommand::SetGainMode { manual: value != 0 },
            Opcode::SetGain => TunerCommand::SetGain {
                tenth_db: value as i32,
            },
            Opcode::SetFrequencyCorrection => TunerCommand::SetFrequencyCorrection {
                ppm: value as i32,
            },
            Opcode::SetIfGain => TunerCommand::SetIfGain {
                stage: (value >> 16) as u16,
                tenth_db: (value & 0xFFFF) as u16 as i16,
            },
            Opcode::SetTestMode => TunerCommand::SetTestMode { enabled: value != 0 },
            Opcode::SetAgcMode => TunerCommand::SetAgcMode { enabled: value != 0 },
            Opcode::SetDirectSampling => TunerCommand::SetDirectSampling(value.into()),
            Opcode::SetOffsetTuning => TunerCommand::SetOffsetTuning { enabled: value != 0 },
            Opcode::SetRtlXtal => TunerCommand::SetRtlXtal { hz: value },
            Opcode::SetTunerXtal => TunerCommand::SetTunerXtal { hz: value },
            Opcode::SetTunerGainByIndex => TunerCommand::SetTunerGainByIndex { index: value },
            Opcode::SetBiasTee => TunerCommand::SetBiasTee { enabled: value != 0 },
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn fmt_tenth_db(f: &mut fmt::Formatter<'_>, tenth_db: i32) -> fmt::Result {
    let sign = if tenth_db < 0 { "-" } else { "" };
    let abs = tenth_db.unsigned_abs();
    write!(f, "{sign}{}.{} dB", abs / 10, abs % 10)
}

impl TunerCommand {
    /// The opcode this command was decoded from, `None` for `Unknown`.
    pub fn opcode(&self) -> Option<Opcode> {
        let op = match self {
            TunerCommand::SetFrequency { .. } => Opcode::SetFrequency,
            TunerCommand::SetSampleRate { .. } => Opcode::SetSampleRate,
            TunerCommand::SetGainMode { .. } => Opcode::SetGainMode,
            TunerCommand::SetGain { .. } => Opcode::SetGain,
            TunerCommand::SetFrequencyCorrection { .. } => Opcode::SetFrequencyCorrection,
            TunerCommand::SetIfGain { .. } => Opcode::SetIfGain,
            TunerCommand::SetTestMode { .. } => Opcode::SetTestMode,
            TunerCommand::SetAgcMode { .. } => Opcode::SetAgcMode,
            TunerCommand::SetDirectSampling(_) => Opcode::SetDirectSampling,
            TunerCommand::SetOffsetTuning { .. } => Opcode::SetOffsetTuning,
            TunerCommand::SetRtlXtal { .. } => Opcode::SetRtlXtal,
            TunerCommand::SetTunerXtal { .. } => Opcode::SetTunerXtal,
            TunerCommand::SetTunerGainByIndex { .. } => Opcode::SetTunerGainByIndex,
            TunerCommand::SetBiasTee { .. } => Opcode::SetBiasTee,
            TunerCommand::Unknown { .. } => return None,
        };
        Some(op)
    }
}

impl fmt::Display for TunerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            if let TunerCommand::Unknown { opcode, value } = *self {
                return write!(f, "unknown opcode 0x{opcode:02X} value {value}");
            }
            return Ok(());
        };
        write!(f, "{} ", op.name())?;

        match *self {
            TunerCommand::SetFrequency { hz } => write!(f, "{hz} Hz"),
            TunerCommand::SetSampleRate { sps } => write!(f, "{sps} S/s"),
            TunerCommand::SetGainMode { manual } => {
                f.write_str(if manual { "manual" } else { "auto" })
            }
            TunerCommand::SetGain { tenth_db } => fmt_tenth_db(f, tenth_db),
            TunerCommand::SetFrequencyCorrection { ppm } => write!(f, "{ppm} ppm"),
            TunerCommand::SetIfGain { stage, tenth_db } => {
                write!(f, "stage {stage} ")?;
                fmt_tenth_db(f, i32::from(tenth_db))
            }
            TunerCommand::SetTestMode { enabled }
            | TunerCommand::SetAgcMode { enabled }
            | TunerCommand::SetOffsetTuning { enabled }
            | TunerCommand::SetBiasTee { enabled } => f.write_str(on_off(enabled)),
            TunerCommand::SetDirectSampling(mode) => match mode {
                DirectSampling::Off => f.write_str("off"),
                DirectSampling::IBranch => f.write_str("I"),
                DirectSampling::QBranch => f.write_str("Q"),
                DirectSampling::Other(n) => write!(f, "{n}"),
            },
            TunerCommand::SetRtlXtal { hz } | TunerCommand::SetTunerXtal { hz } => {
                write!(f, "{hz} Hz")
            }
            TunerCommand::SetTunerGainByIndex { index } => write!(f, "{index}"),
            TunerCommand::Unknown { .. } => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
