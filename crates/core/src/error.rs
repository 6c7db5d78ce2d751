//! Error types for hidrelay-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed port list on the command line.
    #[error("bad port spec '{spec}': {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// Unknown power action name.
    #[error("invalid power action: {0}")]
    InvalidAction(String),

    /// Cycle delay that cannot be represented as a duration.
    #[error("invalid delay: {0}")]
    InvalidDelay(String),

    /// HID subsystem failed to initialize.
    #[error("error initializing HID subsystem: {0}")]
    TransportInit(String),

    /// Device enumeration failed as a whole.
    #[error("HID enumeration failed: {0}")]
    Enumeration(String),

    /// Discovery produced an empty relay list.
    #[error("no compatible relays detected")]
    NoRelaysFound,

    /// A mutating action was requested while several relays matched.
    #[error(
        "more than 1 relay found ({}), choose one to operate with -l RELAY",
        serials.join(", ")
    )]
    AmbiguousRelay { serials: Vec<String> },

    /// Discovery found more relays than the registry can hold.
    #[error("too many relays (limit is {max})")]
    TooManyRelays { max: usize },

    /// The device path could not be opened.
    #[error("unable to open relay at [{path}]: {reason}")]
    DeviceOpen { path: String, reason: String },

    /// The device path could not be opened because of access rights.
    #[error("permission denied opening relay at [{path}]: {reason}")]
    PermissionDenied { path: String, reason: String },

    /// Feature report read or command write failed.
    #[error("I/O error on relay at [{path}]: {reason}")]
    DeviceIo { path: String, reason: String },

    /// Port number outside the relay's port range.
    #[error("port {port} out of range (relay has {port_count} ports)")]
    PortOutOfRange { port: u8, port_count: u8 },

    /// Writing status output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an open error, classifying access-rights failures by message.
    pub fn open_failure(path: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_lowercase();
        if lower.contains("permission")
            || lower.contains("access denied")
            || lower.contains("access is denied")
        {
            Self::PermissionDenied {
                path: path.to_string(),
                reason,
            }
        } else {
            Self::DeviceOpen {
                path: path.to_string(),
                reason,
            }
        }
    }

    /// Whether this error most likely stems from missing device permissions.
    pub fn is_permission_issue(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
