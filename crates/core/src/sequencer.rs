//! Power action sequencing: status queries, OFF/ON passes, and power cycles.
//!
//! The sequencer never terminates the process. Every fatal condition comes
//! back as an [`Error`] for the caller to report.

use crate::error::{Error, Result};
use crate::port::{self, RelayStatus, StatusSink};
use crate::ports::PortMask;
use crate::protocol::PortState;
use crate::registry::RelayDescriptor;
use crate::transport::HidTransport;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Default pause between the OFF and ON phases of a cycle.
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(2);

/// What to do with the selected ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerAction {
    /// Query status only.
    #[default]
    Keep,
    Off,
    On,
    /// OFF, wait, then ON.
    Cycle,
}

impl PowerAction {
    /// Whether the action switches hardware.
    pub fn is_mutating(self) -> bool {
        self != Self::Keep
    }

    /// Port states applied by this action, in order.
    fn phases(self) -> &'static [PortState] {
        match self {
            Self::Keep => &[],
            Self::Off => &[PortState::Off],
            Self::On => &[PortState::On],
            Self::Cycle => &[PortState::Off, PortState::On],
        }
    }
}

impl FromStr for PowerAction {
    type Err = Error;

    /// Accepts `off`/`on`/`cycle` (any case) or `0`/`1`/`2`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "off" => Ok(Self::Off),
            "1" | "on" => Ok(Self::On),
            "2" | "cycle" => Ok(Self::Cycle),
            _ => Err(Error::InvalidAction(s.to_string())),
        }
    }
}

/// Parse a delay in (possibly fractional) seconds.
pub fn parse_delay(s: &str) -> Result<Duration> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| Error::InvalidDelay(format!("'{s}' is not a number of seconds")))?;
    Duration::try_from_secs_f64(secs).map_err(|e| Error::InvalidDelay(format!("'{s}': {e}")))
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub action: PowerAction,
    pub ports: PortMask,
    pub delay: Duration,
}

impl Default for ActionPlan {
    fn default() -> Self {
        Self {
            action: PowerAction::Keep,
            ports: PortMask::ALL,
            delay: DEFAULT_CYCLE_DELAY,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Every status block emitted, in order.
    pub statuses: Vec<RelayStatus>,
    /// Number of switching commands sent.
    pub commands_sent: usize,
}

/// Drives a plan against the discovered relays.
pub struct Sequencer<'a> {
    transport: &'a dyn HidTransport,
    sink: &'a mut dyn StatusSink,
    sleep: &'a mut dyn FnMut(Duration),
}

impl<'a> Sequencer<'a> {
    pub fn new(
        transport: &'a dyn HidTransport,
        sink: &'a mut dyn StatusSink,
        sleep: &'a mut dyn FnMut(Duration),
    ) -> Self {
        Self {
            transport,
            sink,
            sleep,
        }
    }

    /// Execute `plan`.
    ///
    /// `Keep` reports every relay. Mutating actions need exactly one relay
    /// and stop at the first failed write.
    ///
    /// # Errors
    ///
    /// [`Error::NoRelaysFound`] for an empty relay list,
    /// [`Error::AmbiguousRelay`] when a mutating action meets several relays
    /// (nothing is switched), or the first write failure of a pass.
    pub fn run(&mut self, relays: &[RelayDescriptor], plan: &ActionPlan) -> Result<Outcome> {
        if relays.is_empty() {
            return Err(Error::NoRelaysFound);
        }

        let mut outcome = Outcome::default();

        if !plan.action.is_mutating() {
            for relay in relays {
                let status = port::print_status(self.transport, relay, plan.ports, self.sink)?;
                outcome.statuses.push(status);
            }
            return Ok(outcome);
        }

        let relay = match relays {
            [only] => only,
            _ => {
                return Err(Error::AmbiguousRelay {
                    serials: relays.iter().map(|r| r.serial.clone()).collect(),
                })
            }
        };

        info!(
            serial = %relay.serial,
            action = ?plan.action,
            ports = %plan.ports,
            "Running power action"
        );
        for (i, &state) in plan.action.phases().iter().enumerate() {
            if i > 0 {
                debug!(delay = ?plan.delay, "Waiting between phases");
                (self.sleep)(plan.delay);
            }
            outcome.commands_sent += self.pass(relay, plan.ports, state)?;
            let status = port::print_status(self.transport, relay, plan.ports, self.sink)?;
            outcome.statuses.push(status);
        }

        Ok(outcome)
    }

    /// Apply `state` to every selected port in ascending order.
    fn pass(
        &self,
        relay: &RelayDescriptor,
        ports: PortMask,
        state: PortState,
    ) -> Result<usize> {
        let mut sent = 0;
        for p in ports.ports_up_to(relay.port_count) {
            port::set_port_state(self.transport, relay, p, state)?;
            sent += 1;
        }
        Ok(sent)
    }
}
