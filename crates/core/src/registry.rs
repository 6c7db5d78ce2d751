//! Relay discovery: enumeration, filtering, and the bounded relay list.

use crate::error::{Error, Result};
use crate::ports::MAX_PORTS;
use crate::protocol;
use crate::transport::{read_status, HidTransport};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Maximum number of relays a single discovery pass may return.
pub const MAX_RELAYS: usize = 64;

/// Advice printed on Linux when a relay could not be opened.
#[cfg(target_os = "linux")]
pub const LINUX_PERMISSION_HINT: &str = "\
There were permission problems while accessing USB.
To fix this, run this tool as root using 'sudo hidrelayctl',
or add one or more udev rules like below
to file '/etc/udev/rules.d/52-usb.rules':
SUBSYSTEM==\"usb\", ATTR{idVendor}==\"16c0\", MODE=\"0666\"
then run 'sudo udevadm trigger --attr-match=subsystem=usb'";

/// A discovered relay. Identity is the transport path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayDescriptor {
    pub serial: String,
    pub port_count: u8,
    pub path: String,
}

/// Optional selectors narrowing discovery to one relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayFilter {
    pub serial: Option<String>,
    pub path: Option<String>,
}

impl RelayFilter {
    pub fn new(serial: Option<String>, path: Option<String>) -> Self {
        Self {
            serial: serial.filter(|s| !s.is_empty()),
            path: path.filter(|p| !p.is_empty()),
        }
    }

    fn accepts_path(&self, path: &str) -> bool {
        self.path
            .as_deref()
            .map_or(true, |want| want.eq_ignore_ascii_case(path))
    }

    fn accepts_serial(&self, serial: &str) -> bool {
        self.serial
            .as_deref()
            .map_or(true, |want| want.eq_ignore_ascii_case(serial))
    }
}

/// Result of a discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Matching relays, in enumeration order.
    pub relays: Vec<RelayDescriptor>,
    /// Candidates that could not be opened. Discovery continues past them.
    pub open_failures: Vec<Error>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn serials(&self) -> Vec<String> {
        self.relays.iter().map(|r| r.serial.clone()).collect()
    }

    /// Whether any candidate relay failed to open, which on most hosts
    /// means missing device permissions.
    pub fn had_open_failures(&self) -> bool {
        !self.open_failures.is_empty()
    }

    /// Platform advice for fixing open failures, if any occurred.
    pub fn permission_hint(&self) -> Option<&'static str> {
        if !self.had_open_failures() {
            return None;
        }
        #[cfg(target_os = "linux")]
        {
            Some(LINUX_PERMISSION_HINT)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Enumerate attached HID devices and collect the relays that match `filter`.
///
/// Each candidate is opened only long enough to read its serial number.
/// Devices that fail to open or answer are skipped; an empty result is not
/// an error.
///
/// # Errors
///
/// Returns [`Error::Enumeration`] if the transport cannot list devices and
/// [`Error::TooManyRelays`] if more than [`MAX_RELAYS`] relays match.
pub fn discover(transport: &mut dyn HidTransport, filter: &RelayFilter) -> Result<Discovery> {
    debug!(?filter, "Starting relay enumeration");
    let entries = transport.enumerate()?;
    let transport: &dyn HidTransport = transport;

    let mut found = Discovery::default();
    for entry in entries {
        let Some(product) = entry.product.as_deref() else {
            continue;
        };
        if !product.starts_with(protocol::PRODUCT_PREFIX) {
            continue;
        }
        let Some(port_count) = protocol::parse_product_port_count(product) else {
            debug!(path = %entry.path, product = %product, "Skipping device without a port count");
            continue;
        };
        if !filter.accepts_path(&entry.path) {
            continue;
        }
        let port_count = match u8::try_from(port_count) {
            Ok(n) if n <= MAX_PORTS => n,
            _ => {
                warn!(
                    path = %entry.path,
                    port_count,
                    max = MAX_PORTS,
                    "Skipping relay with unsupported port count"
                );
                continue;
            }
        };

        let serial = {
            let handle = match transport.open_path(&entry.path) {
                Ok(h) => h,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Unable to open relay");
                    found.open_failures.push(e);
                    continue;
                }
            };
            match read_status(handle.as_ref(), &entry.path) {
                Ok(status) => status.serial,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Can't get serial number for relay");
                    continue;
                }
            }
        };

        if !filter.accepts_serial(&serial) {
            debug!(path = %entry.path, serial = %serial, "Relay filtered out by serial");
            continue;
        }

        if found.relays.len() >= MAX_RELAYS {
            return Err(Error::TooManyRelays { max: MAX_RELAYS });
        }

        info!(serial = %serial, port_count, path = %entry.path, "Found relay");
        found.relays.push(RelayDescriptor {
            serial,
            port_count,
            path: entry.path,
        });
    }

    debug!(
        count = found.relays.len(),
        open_failures = found.open_failures.len(),
        "Relay enumeration complete"
    );
    Ok(found)
}
