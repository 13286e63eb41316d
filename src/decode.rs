//! Register and status-word interpretation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::proto::command::Register;

// Status word bit flags.
pub const STATE_OFF: u32 = 0x0000_0020;
pub const STATE_START: u32 = 0x0100_0000;
pub const STATE_ON: u32 = 0x0200_0000;
pub const STATE_CLEAN: u32 = 0x0400_0000;
pub const STATE_COOL: u32 = 0x0800_0000;
pub const STATE_ECO: u32 = 0x1000_0000;

/// Operating phase decoded from the 32-bit status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoveStatus {
    Working,
    Ignition,
    Cleaning,
    Cooling,
    EcoStandby,
    Off,
    Unknown(u32),
}

impl StoveStatus {
    /// First matching flag wins: ON, START, CLEAN, COOL, ECO, OFF.
    pub fn from_word(word: u32) -> Self {
        if word & STATE_ON != 0 {
            StoveStatus::Working
        } else if word & STATE_START != 0 {
            StoveStatus::Ignition
        } else if word & STATE_CLEAN != 0 {
            StoveStatus::Cleaning
        } else if word & STATE_COOL != 0 {
            StoveStatus::Cooling
        } else if word & STATE_ECO != 0 {
            StoveStatus::EcoStandby
        } else if word & STATE_OFF != 0 || word == 0 {
            StoveStatus::Off
        } else {
            StoveStatus::Unknown(word)
        }
    }

    pub fn text(&self) -> String {
        match self {
            StoveStatus::Working => "Working".into(),
            StoveStatus::Ignition => "Ignition".into(),
            StoveStatus::Cleaning => "Cleaning".into(),
            StoveStatus::Cooling => "Cooling".into(),
            StoveStatus::EcoStandby => "Eco Standby".into(),
            StoveStatus::Off => "Off".into(),
            StoveStatus::Unknown(word) => format!("Unknown (0x{word:08x})"),
        }
    }

    /// Numeric phase code the dashboard keys its icons on.
    pub fn code(&self) -> u8 {
        match self {
            StoveStatus::Off | StoveStatus::Unknown(_) => 0,
            StoveStatus::Ignition => 1,
            StoveStatus::Working => 4,
            StoveStatus::Cleaning => 5,
            StoveStatus::EcoStandby => 7,
            StoveStatus::Cooling => 8,
        }
    }
}

/// Burning, igniting or cleaning.
pub fn is_on(word: u32) -> bool {
    word & (STATE_ON | STATE_START | STATE_CLEAN) != 0
}

/// Actively producing heat: burning or igniting.
pub fn is_heating(word: u32) -> bool {
    word & (STATE_ON | STATE_START) != 0
}

/// Room temperature register is in tenths of a degree.
pub fn room_temperature(raw: u16) -> f64 {
    f64::from(raw) / 10.0
}

/// Exhaust fan register counts tens of RPM.
pub fn exhaust_fan_rpm(raw: u16) -> u32 {
    u32::from(raw) * 10
}

pub fn error_description(code: u16) -> Option<&'static str> {
    Some(match code {
        0 => "No error",
        1 => "No ignition",
        2 => "No flame",
        3 => "Overheating",
        4 => "Exhaust probe error",
        5 => "No flame (timeout)",
        6 => "Pellet jam",
        7 => "Door open",
        8 => "Pressure switch",
        9 => "Clean brazier",
        10 => "Water pressure low",
        11 => "Water too hot",
        12 => "Safety thermostat",
        13 => "Blackout",
        14 => "Air probe error",
        _ => return None,
    })
}

pub fn alarm_text(code: u16) -> String {
    error_description(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Error {code}"))
}

/// Undecoded results of the eight snapshot reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSnapshot {
    pub status: u32,
    pub room_temp: u16,
    pub fumes_temp: u16,
    pub power_level: u16,
    pub pellet_speed: u16,
    pub exh_fan_rpm: u16,
    pub error: u16,
    pub setpoint: u16,
}

impl RawSnapshot {
    /// Each snapshot register paired with its raw value, in read order.
    pub fn fields(&self) -> [(Register, u32); 8] {
        [
            (Register::Status, self.status),
            (Register::RoomTemp, self.room_temp.into()),
            (Register::FumesTemp, self.fumes_temp.into()),
            (Register::PowerLevel, self.power_level.into()),
            (Register::PelletSpeed, self.pellet_speed.into()),
            (Register::ExhaustFanRpm, self.exh_fan_rpm.into()),
            (Register::ErrorCode, self.error.into()),
            (Register::Setpoint, self.setpoint.into()),
        ]
    }

    pub fn registers(&self) -> BTreeMap<String, u32> {
        self.fields()
            .into_iter()
            .map(|(reg, value)| (reg.name().to_string(), value))
            .collect()
    }
}

/// Full decoded stove state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoveState {
    pub status: StoveStatus,
    pub status_code: u8,
    pub status_text: String,
    pub is_on: bool,
    pub is_heating: bool,

    /// °C, one decimal.
    pub room_temp: f64,
    /// °C
    pub target_temp: u16,
    /// °C
    pub fumes_temp: u16,

    pub power_level: u16,
    pub pellet_speed: u16,
    pub fan_rpm: u32,

    pub alarm_code: u16,
    pub alarm_text: String,
    pub has_alarm: bool,

    pub raw_registers: BTreeMap<String, u32>,
}

impl From<RawSnapshot> for StoveState {
    fn from(raw: RawSnapshot) -> Self {
        let status = StoveStatus::from_word(raw.status);
        Self {
            status,
            status_code: status.code(),
            status_text: status.text(),
            is_on: is_on(raw.status),
            is_heating: is_heating(raw.status),
            room_temp: room_temperature(raw.room_temp),
            target_temp: raw.setpoint,
            fumes_temp: raw.fumes_temp,
            power_level: raw.power_level,
            pellet_speed: raw.pellet_speed,
            fan_rpm: exhaust_fan_rpm(raw.exh_fan_rpm),
            alarm_code: raw.error,
            alarm_text: alarm_text(raw.error),
            has_alarm: raw.error > 0,
            raw_registers: raw.registers(),
        }
    }
}
