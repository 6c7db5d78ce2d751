//! Relay wire protocol encoding and decoding.
//!
//! All traffic uses 9-byte reports:
//! - Status feature report: request byte 0 = report ID `0x01`. The reply
//!   carries the serial number as a NUL-terminated string from byte 0 and
//!   the port state bit vector at byte 7 (bit `i` = port `i + 1`).
//! - Command output report: `[0x00, opcode, port, 0, 0, 0, 0, 0, 0]` where
//!   opcode is `0xFF` (on) or `0xFD` (off) and port is 1-indexed.
//!
//! Devices identify themselves with a product string `USBRelay<N>`, where
//! `N` is the decimal port count.

use crate::ports::MAX_PORTS;
use serde::Serialize;
use std::fmt;

/// Report length in bytes, for both feature and output reports.
pub const REPORT_LEN: usize = 9;
/// Report ID seeded into byte 0 of a status request.
pub const STATUS_REPORT_ID: u8 = 0x01;
/// Byte offset of the port state bit vector in a status reply.
pub const STATE_BYTE: usize = 7;
/// Maximum serial number length. The serial never reaches the state byte.
pub const SERIAL_MAX_LEN: usize = STATE_BYTE;

/// Command opcodes.
pub mod opcodes {
    /// Close the relay contact (power on).
    pub const ON: u8 = 0xFF;
    /// Open the relay contact (power off).
    pub const OFF: u8 = 0xFD;
}

/// Product string prefix shared by every supported relay.
pub const PRODUCT_PREFIX: &str = "USBRelay";

/// Power state of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Off,
    On,
}

impl PortState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    /// Numeric form used in status lines (0 = off, 1 = on).
    pub fn as_digit(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
        }
    }
}

impl From<bool> for PortState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "OFF"),
            Self::On => write!(f, "ON"),
        }
    }
}

/// A decoded port switching command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCommand {
    pub port: u8,
    pub state: PortState,
}

impl SetCommand {
    pub fn new(port: u8, state: PortState) -> Self {
        Self { port, state }
    }

    /// Encode into an output report.
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[1] = match self.state {
            PortState::On => opcodes::ON,
            PortState::Off => opcodes::OFF,
        };
        buf[2] = self.port;
        buf
    }

    /// Decode an output report. Returns `None` for an unknown opcode.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let (&opcode, &port) = (data.get(1)?, data.get(2)?);
        let state = match opcode {
            opcodes::ON => PortState::On,
            opcodes::OFF => PortState::Off,
            _ => return None,
        };
        Some(Self { port, state })
    }
}

/// Buffer for a status feature report request, with the report ID seeded.
pub fn status_request() -> [u8; REPORT_LEN] {
    let mut buf = [0u8; REPORT_LEN];
    buf[0] = STATUS_REPORT_ID;
    buf
}

/// A decoded status feature report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub serial: String,
    pub state_bits: u8,
}

impl StatusReport {
    /// Decode a status reply.
    ///
    /// The serial number is the run of bytes before the first NUL, capped at
    /// [`SERIAL_MAX_LEN`]. Invalid UTF-8 is replaced. Returns `None` for a
    /// buffer shorter than [`REPORT_LEN`].
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < REPORT_LEN {
            return None;
        }

        let raw = &data[..SERIAL_MAX_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let serial = String::from_utf8_lossy(&raw[..end]).into_owned();

        Some(Self {
            serial,
            state_bits: data[STATE_BYTE],
        })
    }

    /// Encode a reply as a device would send it.
    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        for (dst, src) in buf.iter_mut().zip(self.serial.bytes().take(SERIAL_MAX_LEN)) {
            *dst = src;
        }
        buf[STATE_BYTE] = self.state_bits;
        buf
    }

    /// State of `port` (1-indexed). Ports outside `1..=MAX_PORTS` read as off.
    pub fn port_state(&self, port: u8) -> PortState {
        if !(1..=MAX_PORTS).contains(&port) {
            return PortState::Off;
        }
        PortState::from(self.state_bits & (1 << (port - 1)) != 0)
    }
}

/// Extract the port count from a relay product string such as `USBRelay4`.
///
/// Returns `None` when the prefix is missing or the suffix is not a positive
/// decimal number. Counts above [`MAX_PORTS`] are returned as-is so callers
/// can reject them explicitly.
pub fn parse_product_port_count(product: &str) -> Option<u32> {
    let suffix = product.strip_prefix(PRODUCT_PREFIX)?;
    let digits: &str = {
        let end = suffix
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(suffix.len());
        &suffix[..end]
    };
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}
