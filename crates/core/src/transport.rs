//! HID transport abstraction for relay communication.
//!
//! Provides a trait-based transport layer so that real HID devices and
//! mock devices share the same interface. A handle is a scoped resource:
//! closing happens when it is dropped, so callers open one per operation.

use crate::error::{Error, Result};
use crate::protocol::{self, SetCommand, StatusReport, REPORT_LEN};
use tracing::trace;

/// One enumerated HID device, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceEntry {
    /// Opaque platform locator passed back to [`HidTransport::open_path`].
    pub path: String,
    /// USB product string, if the device reports one.
    pub product: Option<String>,
}

/// An open HID device. Dropping the handle closes it.
pub trait HidHandle {
    /// Fill `buf` with a feature report. `buf[0]` carries the report ID.
    /// Returns the number of bytes the transport reported.
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write an output report. Returns the number of bytes written.
    fn write(&self, data: &[u8]) -> Result<usize>;
}

/// Abstraction over the host HID stack.
pub trait HidTransport {
    /// Enumerate every HID device currently attached. Always a fresh pass.
    fn enumerate(&mut self) -> Result<Vec<HidDeviceEntry>>;

    /// Open a device by its enumerated path.
    fn open_path(&self, path: &str) -> Result<Box<dyn HidHandle + '_>>;
}

/// Read a status feature report through an open handle.
///
/// The whole request buffer is decoded regardless of the byte count the
/// transport returns, since several backends report the payload length
/// without the report ID.
pub fn read_status(handle: &dyn HidHandle, path: &str) -> Result<StatusReport> {
    let mut buf = protocol::status_request();
    let n = handle.get_feature_report(&mut buf)?;
    trace!(
        path = %path,
        len = n,
        report_hex = format_args!("{:02X?}", buf),
        "status RX"
    );
    // buf is REPORT_LEN bytes, so decode cannot fail.
    StatusReport::decode(&buf).ok_or_else(|| Error::DeviceIo {
        path: path.to_string(),
        reason: format!("status report shorter than {REPORT_LEN} bytes"),
    })
}

/// Send a switching command through an open handle.
pub fn write_command(handle: &dyn HidHandle, path: &str, cmd: SetCommand) -> Result<()> {
    let encoded = cmd.encode();
    trace!(
        path = %path,
        port = cmd.port,
        report_hex = format_args!("{:02X?}", encoded),
        "command TX"
    );
    handle.write(&encoded)?;
    Ok(())
}
