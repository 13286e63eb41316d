// src/proto/parser.rs
use std::str::FromStr;

use thiserror::Error;

use super::command::{CODE_LEN, Command, CommandCode, Register};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("invalid number for {0}: {1}")]
    BadNumber(&'static str, String),
    #[error("command code must be 5 ASCII letters or digits: {0:?}")]
    BadCode(String),
    #[error("unexpected trailing input: {0}")]
    Trailing(String),
}

impl FromStr for CommandCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != CODE_LEN || !bytes.iter().all(|b| CommandCode::is_valid_byte(*b)) {
            return Err(ParseError::BadCode(s.to_string()));
        }
        let mut code = [0u8; CODE_LEN];
        for (dst, src) in code.iter_mut().zip(bytes) {
            *dst = src.to_ascii_uppercase();
        }
        Ok(CommandCode::from_bytes(code))
    }
}

impl FromStr for Register {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        if let Some(reg) = Register::ALL.iter().find(|r| r.name() == key) {
            return Ok(*reg);
        }
        Ok(match key.as_str() {
            "room" => Register::RoomTemp,
            "fumes" => Register::FumesTemp,
            "power" => Register::PowerLevel,
            "pellet" => Register::PelletSpeed,
            "fan" | "exhaust_fan" => Register::ExhaustFanRpm,
            "alarm" | "error_code" => Register::ErrorCode,
            "target" | "target_temp" => Register::Setpoint,
            "firmware" => Register::FirmwareVersion,
            "board_temp" => Register::BoardTemp,
            "ambient_fan" => Register::AmbientFan,
            _ => return Err(ParseError::UnknownRegister(s.to_string())),
        })
    }
}

/// Public API: parse one command line such as `set_temp 21`, `read room_temp`
/// or a bare five-character code.
///
/// Verb names follow what the HTTP layer posts (`power_on`, `power_off`,
/// `set_temp`, `set_power`, `reset_error`); short aliases are accepted too.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(ParseError::Empty)?;
    let arg = tokens.next();
    if let Some(extra) = tokens.next() {
        return Err(ParseError::Trailing(extra.to_string()));
    }

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "power_on" | "on" => no_arg(Command::PowerOn, arg)?,
        "power_off" | "off" => no_arg(Command::PowerOff, arg)?,
        "reset_error" | "reset" => no_arg(Command::ResetError, arg)?,
        "set_power" | "power" => {
            let level = req_number(arg, "power level")?;
            Command::SetPowerLevel(level.round() as i32)
        }
        "set_temp" | "temp" => Command::SetTemperature(req_number(arg, "temperature")?),
        "read" => {
            let name = arg.ok_or(ParseError::MissingValue("register"))?;
            Command::Read(name.parse()?)
        }
        "raw" => {
            let code = arg.ok_or(ParseError::MissingValue("code"))?;
            Command::Raw(code.parse()?)
        }
        _ if verb.len() == CODE_LEN && arg.is_none() => match verb.parse() {
            Ok(code) => Command::Raw(code),
            Err(_) => return Err(ParseError::UnknownCommand(verb.to_string())),
        },
        _ => return Err(ParseError::UnknownCommand(verb.to_string())),
    };
    Ok(cmd)
}

/* ---------- helpers ---------- */

fn no_arg(cmd: Command, arg: Option<&str>) -> Result<Command, ParseError> {
    match arg {
        Some(extra) => Err(ParseError::Trailing(extra.to_string())),
        None => Ok(cmd),
    }
}

fn req_number(arg: Option<&str>, what: &'static str) -> Result<f64, ParseError> {
    let v = arg.ok_or(ParseError::MissingValue(what))?;
    v.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ParseError::BadNumber(what, v.to_string()))
}
