//! hidrelay-core: discovery and control of USB HID power relays.
//!
//! This crate provides the cross-platform core logic: port list parsing,
//! the relay wire protocol, relay discovery over an abstract HID transport,
//! per-port state access, and OFF/ON/cycle sequencing.

pub mod error;
pub mod port;
pub mod ports;
pub mod protocol;
pub mod registry;
pub mod sequencer;
pub mod transport;

pub use error::{Error, Result};
pub use ports::{parse_port_spec, PortMask, MAX_PORTS};
pub use protocol::PortState;
pub use registry::{discover, Discovery, RelayDescriptor, RelayFilter, MAX_RELAYS};
pub use sequencer::{ActionPlan, PowerAction, Sequencer};
