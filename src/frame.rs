use std::fmt::{self, Write as _};

use thiserror::Error;

use crate::proto::command::{CODE_LEN, CommandCode};

pub const ESC: u8 = 0x1B;
pub const READ_MARKER: u8 = b'R';
pub const TERMINATOR: u8 = b'&';
/// ESC + marker + code + two checksum digits + terminator.
pub const FRAME_LEN: usize = 1 + 1 + CODE_LEN + 2 + 1;
/// Every command is answered with exactly this many ASCII bytes.
pub const RESPONSE_LEN: usize = 10;

pub const POWER_LEVEL_MIN: i32 = 0;
pub const POWER_LEVEL_MAX: i32 = 6;
pub const TEMPERATURE_MIN: u8 = 10;
pub const TEMPERATURE_MAX: u8 = 35;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame must be 10 bytes, got {0}")]
    Length(usize),
    #[error("frame does not start with ESC")]
    MissingEscape,
    #[error("missing 'R' marker")]
    MissingMarker,
    #[error("missing '&' terminator")]
    MissingTerminator,
    #[error("bad hex in checksum field")]
    BadHex,
    #[error("checksum {calc:02X}!={found:02X}")]
    Checksum { calc: u8, found: u8 },
    #[error("invalid command code: {0}")]
    Code(String),
}

/// A complete reply from the stove, as read off the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Response([u8; RESPONSE_LEN]);

impl Response {
    pub fn new(bytes: [u8; RESPONSE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RESPONSE_LEN] {
        &self.0
    }

    pub fn register_value(&self) -> u16 {
        parse_register_value(&self.0)
    }

    pub fn status_word(&self) -> u32 {
        parse_status_word(&self.0)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Sum of the ASCII bytes of `"R" + code`, modulo 256.
pub fn checksum(code: &CommandCode) -> u8 {
    code.as_bytes()
        .iter()
        .fold(READ_MARKER, |sum, b| sum.wrapping_add(*b))
}

pub fn build_frame(code: &CommandCode) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_LEN);
    out.push(ESC);
    out.push(READ_MARKER);
    out.extend_from_slice(code.as_bytes());
    let mut sum = String::with_capacity(2);
    let _ = write!(sum, "{:02X}", checksum(code));
    out.extend_from_slice(sum.as_bytes());
    out.push(TERMINATOR);
    out
}

/// Inverse of [`build_frame`]: recovers the command code and checks every
/// fixed byte plus the checksum.
pub fn decode_frame(frame: &[u8]) -> Result<CommandCode, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::Length(frame.len()));
    }
    if frame[0] != ESC {
        return Err(FrameError::MissingEscape);
    }
    if frame[1] != READ_MARKER {
        return Err(FrameError::MissingMarker);
    }
    if frame[FRAME_LEN - 1] != TERMINATOR {
        return Err(FrameError::MissingTerminator);
    }
    let code_bytes = &frame[2..2 + CODE_LEN];
    let code = std::str::from_utf8(code_bytes)
        .ok()
        .and_then(|s| s.parse::<CommandCode>().ok())
        .ok_or_else(|| FrameError::Code(String::from_utf8_lossy(code_bytes).into_owned()))?;
    let found = parse_hex(&frame[2 + CODE_LEN..2 + CODE_LEN + 2])
        .and_then(|v| u8::try_from(v).ok())
        .ok_or(FrameError::BadHex)?;
    let calc = checksum(&code);
    if calc != found {
        return Err(FrameError::Checksum { calc, found });
    }
    Ok(code)
}

/// `F00<level>0`, level clamped to 0..=6 (6 selects automatic power).
pub fn build_set_power_command(level: i32) -> CommandCode {
    let clamped = level.clamp(POWER_LEVEL_MIN, POWER_LEVEL_MAX) as u8;
    CommandCode::from_bytes([b'F', b'0', b'0', b'0' + clamped, b'0'])
}

/// `F2<HH>0`, temperature clamped to 10..=35 and rounded to whole degrees.
pub fn build_set_temperature_command(temp: f64) -> CommandCode {
    let celsius = clamp_temperature(temp);
    let hex = format!("{:02X}", celsius);
    let hex = hex.as_bytes();
    CommandCode::from_bytes([b'F', b'2', hex[0], hex[1], b'0'])
}

pub fn clamp_temperature(temp: f64) -> u8 {
    if temp.is_nan() {
        return TEMPERATURE_MIN;
    }
    temp.clamp(TEMPERATURE_MIN as f64, TEMPERATURE_MAX as f64)
        .round() as u8
}

/// Four hex digits at offset 1. Malformed input reads as 0 rather than
/// failing; the stove occasionally answers with garbage and a zero reading
/// is what every consumer expects in that case.
pub fn parse_register_value(response: &[u8]) -> u16 {
    response
        .get(1..5)
        .and_then(parse_hex)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0)
}

/// Eight hex digits at offset 1, same lenient policy as
/// [`parse_register_value`].
pub fn parse_status_word(response: &[u8]) -> u32 {
    response.get(1..9).and_then(parse_hex).unwrap_or(0)
}

fn parse_hex(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let s = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(s, 16).ok()
}
