//! Port state read/write and status reporting for a single relay.
//!
//! Every operation opens the relay by path, performs one report exchange,
//! and closes the handle again before returning.

use crate::error::{Error, Result};
use crate::ports::PortMask;
use crate::protocol::{PortState, SetCommand};
use crate::registry::RelayDescriptor;
use crate::transport::{read_status, write_command, HidTransport};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, info};

fn check_port(relay: &RelayDescriptor, port: u8) -> Result<()> {
    if port == 0 || port > relay.port_count {
        return Err(Error::PortOutOfRange {
            port,
            port_count: relay.port_count,
        });
    }
    Ok(())
}

/// Read the power state of `port` (1-indexed).
///
/// # Errors
///
/// Fails if the port is outside the relay's range, the relay cannot be
/// opened, or the feature report read fails.
pub fn get_port_state(
    transport: &dyn HidTransport,
    relay: &RelayDescriptor,
    port: u8,
) -> Result<PortState> {
    check_port(relay, port)?;
    let status = {
        let handle = transport.open_path(&relay.path)?;
        read_status(handle.as_ref(), &relay.path)?
    };
    let state = status.port_state(port);
    debug!(serial = %relay.serial, port, %state, "Read port state");
    Ok(state)
}

/// Switch `port` (1-indexed) on or off.
///
/// Each call sends one discrete command; nothing is compared against the
/// current state first.
///
/// # Errors
///
/// Fails under the same conditions as [`get_port_state`], or when the
/// command write fails.
pub fn set_port_state(
    transport: &dyn HidTransport,
    relay: &RelayDescriptor,
    port: u8,
    state: PortState,
) -> Result<()> {
    check_port(relay, port)?;
    let handle = transport.open_path(&relay.path)?;
    write_command(handle.as_ref(), &relay.path, SetCommand::new(port, state))?;
    drop(handle);
    info!(serial = %relay.serial, port, %state, "Set port state");
    Ok(())
}

/// One line of a status dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortReading {
    pub port: u8,
    /// `None` when the read failed; see `error`.
    pub state: Option<PortState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status of the selected ports of one relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    #[serde(flatten)]
    pub relay: RelayDescriptor,
    pub ports: Vec<PortReading>,
}

impl RelayStatus {
    /// Write the human-readable status block.
    pub fn write_text(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Status for relay {} at [{}], {} ports:",
            self.relay.serial, self.relay.path, self.relay.port_count
        )?;
        for reading in &self.ports {
            match (reading.state, &reading.error) {
                (Some(state), _) => {
                    writeln!(out, "  Port {}: {} {}", reading.port, state.as_digit(), state)?
                }
                (None, Some(err)) => writeln!(out, "  Port {}: error ({err})", reading.port)?,
                (None, None) => writeln!(out, "  Port {}: unknown", reading.port)?,
            }
        }
        Ok(())
    }
}

/// Read every port selected by `mask`; an empty mask selects all ports.
///
/// A failed read is recorded on its line and does not stop the others.
pub fn collect_status(
    transport: &dyn HidTransport,
    relay: &RelayDescriptor,
    mask: PortMask,
) -> RelayStatus {
    let ports = (1..=relay.port_count)
        .filter(|&p| mask.selects_for_status(p))
        .map(|port| match get_port_state(transport, relay, port) {
            Ok(state) => PortReading {
                port,
                state: Some(state),
                error: None,
            },
            Err(e) => PortReading {
                port,
                state: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    RelayStatus {
        relay: relay.clone(),
        ports,
    }
}

/// Destination for status dumps.
pub trait StatusSink {
    fn emit(&mut self, status: &RelayStatus) -> Result<()>;
}

/// Renders status blocks as text lines.
pub struct TextSink<W: Write>(pub W);

impl<W: Write> StatusSink for TextSink<W> {
    fn emit(&mut self, status: &RelayStatus) -> Result<()> {
        status.write_text(&mut self.0)?;
        Ok(())
    }
}

/// Read the ports of `relay` selected by `mask` and hand the result to `sink`.
///
/// # Errors
///
/// Only sink failures are returned; per-port read errors are reported
/// inline on their own line.
pub fn print_status(
    transport: &dyn HidTransport,
    relay: &RelayDescriptor,
    mask: PortMask,
    sink: &mut dyn StatusSink,
) -> Result<RelayStatus> {
    let status = collect_status(transport, relay, mask);
    sink.emit(&status)?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::parse_port_spec;
    use crate::transport::mock::{MockDevice, MockTransport};

    const PATH: &str = "/dev/hidraw1";

    fn relay(port_count: u8) -> RelayDescriptor {
        RelayDescriptor {
            serial: "AB12C".into(),
            port_count,
            path: PATH.into(),
        }
    }

    #[test]
    fn get_port_state_reads_bit_vector() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4).with_state(0b1001)]);
        let r = relay(4);
        assert_eq!(get_port_state(&mock, &r, 1).unwrap(), PortState::On);
        assert_eq!(get_port_state(&mock, &r, 2).unwrap(), PortState::Off);
        assert_eq!(get_port_state(&mock, &r, 4).unwrap(), PortState::On);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn port_range_is_checked_before_io() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4)]);
        let r = relay(4);
        assert!(matches!(
            get_port_state(&mock, &r, 0),
            Err(Error::PortOutOfRange { port: 0, port_count: 4 })
        ));
        assert!(matches!(
            set_port_state(&mock, &r, 5, PortState::On),
            Err(Error::PortOutOfRange { port: 5, .. })
        ));
        assert!(mock.events().is_empty());
    }

    #[test]
    fn set_port_state_sends_one_command() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4)]);
        let r = relay(4);
        set_port_state(&mock, &r, 3, PortState::On).unwrap();
        assert_eq!(mock.writes(), vec![(3, PortState::On)]);
        assert_eq!(mock.state_bits(PATH), 0b0100);

        set_port_state(&mock, &r, 3, PortState::Off).unwrap();
        assert_eq!(mock.state_bits(PATH), 0);
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn write_failure_is_reported() {
        let mock =
            MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4).with_failing_writes()]);
        let result = set_port_state(&mock, &relay(4), 1, PortState::On);
        assert!(matches!(result, Err(Error::DeviceIo { .. })));
        assert_eq!(mock.open_handles(), 0);
    }

    #[test]
    fn open_failure_is_reported() {
        let mock = MockTransport::new(vec![
            MockDevice::relay(PATH, "AB12C", 4).with_open_error("No such device")
        ]);
        assert!(matches!(
            get_port_state(&mock, &relay(4), 1),
            Err(Error::DeviceOpen { .. })
        ));
    }

    #[test]
    fn status_with_empty_mask_prints_every_port() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4).with_state(0b0010)]);
        let mut sink = TextSink(Vec::new());
        let status = print_status(&mock, &relay(4), PortMask::EMPTY, &mut sink).unwrap();
        assert_eq!(status.ports.len(), 4);

        let text = String::from_utf8(sink.0).unwrap();
        assert_eq!(
            text,
            "Status for relay AB12C at [/dev/hidraw1], 4 ports:\n\
             \x20 Port 1: 0 OFF\n\
             \x20 Port 2: 1 ON\n\
             \x20 Port 3: 0 OFF\n\
             \x20 Port 4: 0 OFF\n"
        );
    }

    #[test]
    fn status_respects_mask() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 4)]);
        let mask = parse_port_spec("2,4").unwrap();
        let status = collect_status(&mock, &relay(4), mask);
        let ports: Vec<u8> = status.ports.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![2, 4]);
    }

    #[test]
    fn status_read_errors_are_reported_per_line() {
        let mock =
            MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 2).with_failing_reads()]);
        let mut sink = TextSink(Vec::new());
        let status = print_status(&mock, &relay(2), PortMask::ALL, &mut sink).unwrap();
        assert_eq!(status.ports.len(), 2);
        assert!(status.ports.iter().all(|r| r.state.is_none()));

        let text = String::from_utf8(sink.0).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("  Port 1: error ("));
    }

    #[test]
    fn status_serializes_flat() {
        let mock = MockTransport::new(vec![MockDevice::relay(PATH, "AB12C", 1).with_state(1)]);
        let status = collect_status(&mock, &relay(1), PortMask::ALL);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["serial"], "AB12C");
        assert_eq!(json["port_count"], 1);
        assert_eq!(json["ports"][0]["state"], "on");
        assert!(json["ports"][0].get("error").is_none());
    }
}
