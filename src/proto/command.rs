use std::fmt;

use crate::frame;

pub const CODE_LEN: usize = 5;

/// Five ASCII characters naming a register read or a write operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandCode([u8; CODE_LEN]);

impl CommandCode {
    /// Callers guarantee `bytes` are ASCII alphanumerics.
    pub(crate) const fn from_bytes(bytes: [u8; CODE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub(crate) fn is_valid_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric()
    }
}

impl fmt::Debug for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandCode({})", self.as_str())
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- Fixed codes ----
pub const GET_STATUS: CommandCode = CommandCode::from_bytes(*b"D9000");
pub const GET_ROOM_TEMP: CommandCode = CommandCode::from_bytes(*b"D1000");
pub const GET_FUMES_TEMP: CommandCode = CommandCode::from_bytes(*b"D0000");
pub const GET_POWER_LEVEL: CommandCode = CommandCode::from_bytes(*b"D3000");
pub const GET_PELLET_SPEED: CommandCode = CommandCode::from_bytes(*b"D4000");
pub const GET_EXH_FAN_RPM: CommandCode = CommandCode::from_bytes(*b"EF000");
pub const GET_ERROR: CommandCode = CommandCode::from_bytes(*b"DA000");
pub const GET_SETPOINT: CommandCode = CommandCode::from_bytes(*b"C6000");
pub const GET_FW_VERSION: CommandCode = CommandCode::from_bytes(*b"DC000");
pub const GET_PCB_TEMP: CommandCode = CommandCode::from_bytes(*b"DF000");
pub const GET_AMB_FAN: CommandCode = CommandCode::from_bytes(*b"D2000");
pub const GET_HOPPER: CommandCode = CommandCode::from_bytes(*b"DB000");

// Last digit of a write selects silent (0) or beep (1); we always send silent.
pub const SET_POWER_OFF: CommandCode = CommandCode::from_bytes(*b"F0000");
pub const SET_POWER_ON: CommandCode = CommandCode::from_bytes(*b"F0010");
pub const RESET_ERROR: CommandCode = CommandCode::from_bytes(*b"D6000");

/// A single addressable data item on the stove controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Status,
    RoomTemp,
    FumesTemp,
    PowerLevel,
    PelletSpeed,
    ExhaustFanRpm,
    ErrorCode,
    Setpoint,
    FirmwareVersion,
    BoardTemp,
    AmbientFan,
    Hopper,
}

impl Register {
    pub const ALL: [Register; 12] = [
        Register::Status,
        Register::RoomTemp,
        Register::FumesTemp,
        Register::PowerLevel,
        Register::PelletSpeed,
        Register::ExhaustFanRpm,
        Register::ErrorCode,
        Register::Setpoint,
        Register::FirmwareVersion,
        Register::BoardTemp,
        Register::AmbientFan,
        Register::Hopper,
    ];

    /// Read order of a full-state snapshot.
    pub const SNAPSHOT: [Register; 8] = [
        Register::Status,
        Register::RoomTemp,
        Register::FumesTemp,
        Register::PowerLevel,
        Register::PelletSpeed,
        Register::ExhaustFanRpm,
        Register::ErrorCode,
        Register::Setpoint,
    ];

    pub const fn code(self) -> CommandCode {
        match self {
            Register::Status => GET_STATUS,
            Register::RoomTemp => GET_ROOM_TEMP,
            Register::FumesTemp => GET_FUMES_TEMP,
            Register::PowerLevel => GET_POWER_LEVEL,
            Register::PelletSpeed => GET_PELLET_SPEED,
            Register::ExhaustFanRpm => GET_EXH_FAN_RPM,
            Register::ErrorCode => GET_ERROR,
            Register::Setpoint => GET_SETPOINT,
            Register::FirmwareVersion => GET_FW_VERSION,
            Register::BoardTemp => GET_PCB_TEMP,
            Register::AmbientFan => GET_AMB_FAN,
            Register::Hopper => GET_HOPPER,
        }
    }

    /// Key used in the raw register map and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Register::Status => "status",
            Register::RoomTemp => "room_temp",
            Register::FumesTemp => "fumes_temp",
            Register::PowerLevel => "power_level",
            Register::PelletSpeed => "pellet_speed",
            Register::ExhaustFanRpm => "exh_fan_rpm",
            Register::ErrorCode => "error",
            Register::Setpoint => "setpoint",
            Register::FirmwareVersion => "fw_version",
            Register::BoardTemp => "pcb_temp",
            Register::AmbientFan => "amb_fan",
            Register::Hopper => "hopper",
        }
    }

    /// The status register answers with a 32-bit word, everything else
    /// with 16 bits.
    pub const fn is_status_word(self) -> bool {
        matches!(self, Register::Status)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic operations understood by the stove.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Read(Register),
    PowerOn,
    PowerOff,
    /// 0..=5 manual, 6 automatic. Out-of-range values are clamped.
    SetPowerLevel(i32),
    /// Degrees Celsius, clamped to 10..=35 and rounded.
    SetTemperature(f64),
    ResetError,
    Raw(CommandCode),
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match *self {
            Command::Read(reg) => reg.code(),
            Command::PowerOn => SET_POWER_ON,
            Command::PowerOff => SET_POWER_OFF,
            Command::SetPowerLevel(level) => frame::build_set_power_command(level),
            Command::SetTemperature(temp) => frame::build_set_temperature_command(temp),
            Command::ResetError => RESET_ERROR,
            Command::Raw(code) => code,
        }
    }
}
