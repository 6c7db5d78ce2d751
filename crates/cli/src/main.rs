//! hidrelayctl: command-line control of USB HID power relays.

use anyhow::Result;
use clap::Parser;
use hidrelay_core::port::{RelayStatus, StatusSink, TextSink};
use hidrelay_core::transport::{HidDeviceEntry, HidHandle, HidTransport};
use hidrelay_core::{
    discover, parse_port_spec, ActionPlan, PortMask, PowerAction, RelayFilter, Sequencer,
};
use std::ffi::CString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

/// hidapi-backed transport. Dropping it shuts the HID library down.
struct CliHidTransport {
    api: hidapi::HidApi,
}

impl CliHidTransport {
    fn init() -> hidrelay_core::Result<Self> {
        let api = hidapi::HidApi::new()
            .map_err(|e| hidrelay_core::Error::TransportInit(e.to_string()))?;
        Ok(Self { api })
    }
}

impl HidTransport for CliHidTransport {
    fn enumerate(&mut self) -> hidrelay_core::Result<Vec<HidDeviceEntry>> {
        self.api
            .refresh_devices()
            .map_err(|e| hidrelay_core::Error::Enumeration(e.to_string()))?;

        Ok(self
            .api
            .device_list()
            .map(|info| HidDeviceEntry {
                path: info.path().to_string_lossy().into_owned(),
                product: info.product_string().map(str::to_string),
            })
            .collect())
    }

    fn open_path(&self, path: &str) -> hidrelay_core::Result<Box<dyn HidHandle + '_>> {
        let c_path = CString::new(path)
            .map_err(|e| hidrelay_core::Error::open_failure(path, e.to_string()))?;
        let device = self
            .api
            .open_path(&c_path)
            .map_err(|e| hidrelay_core::Error::open_failure(path, e.to_string()))?;
        Ok(Box::new(CliHidHandle {
            device,
            path: path.to_string(),
        }))
    }
}

/// An open relay; hidapi closes the device on drop.
struct CliHidHandle {
    device: hidapi::HidDevice,
    path: String,
}

impl CliHidHandle {
    fn io_error(&self, op: &str, e: hidapi::HidError) -> hidrelay_core::Error {
        hidrelay_core::Error::DeviceIo {
            path: self.path.clone(),
            reason: format!("{op}: {e}"),
        }
    }
}

impl HidHandle for CliHidHandle {
    fn get_feature_report(&self, buf: &mut [u8]) -> hidrelay_core::Result<usize> {
        self.device
            .get_feature_report(buf)
            .map_err(|e| self.io_error("get_feature_report", e))
    }

    fn write(&self, data: &[u8]) -> hidrelay_core::Result<usize> {
        self.device
            .write(data)
            .map_err(|e| self.io_error("write", e))
    }
}

/// Emits one JSON object per relay status, one per line.
struct JsonSink<W: Write>(W);

impl<W: Write> StatusSink for JsonSink<W> {
    fn emit(&mut self, status: &RelayStatus) -> hidrelay_core::Result<()> {
        serde_json::to_writer(&mut self.0, status).map_err(io::Error::from)?;
        writeln!(self.0)?;
        Ok(())
    }
}

fn parse_ports(s: &str) -> hidrelay_core::Result<PortMask> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("all") {
        return Ok(PortMask::ALL);
    }
    parse_port_spec(s)
}

fn parse_action(s: &str) -> hidrelay_core::Result<PowerAction> {
    s.parse()
}

#[derive(Parser, Debug)]
#[command(
    name = "hidrelayctl",
    disable_version_flag = true,
    about = "Control USB HID power relays.",
    long_about = "Control USB HID power relays.\nWithout options, show status for all relays.",
    after_help = "Set RUST_LOG=debug to trace device enumeration."
)]
struct Cli {
    /// Specific relay (serial number) to operate on.
    #[arg(short = 'l', long = "relay", value_name = "SERIAL")]
    relay: Option<String>,

    /// Specific relay (USB path) to operate on.
    #[arg(short = 'u', long = "path", value_name = "PATH")]
    path: Option<String>,

    /// Ports to operate on, e.g. 1,3-5 or all.
    #[arg(
        short = 'p',
        long = "ports",
        value_name = "SPEC",
        default_value = "all",
        value_parser = parse_ports
    )]
    ports: PortMask,

    /// Action for affected ports: off/on/cycle (0/1/2). Omit to show status.
    #[arg(short = 'a', long = "action", value_name = "ACTION", value_parser = parse_action)]
    action: Option<PowerAction>,

    /// Delay between OFF and ON for a power cycle, in seconds.
    #[arg(
        short = 'd',
        long = "delay",
        value_name = "SECONDS",
        default_value = "2",
        value_parser = hidrelay_core::sequencer::parse_delay
    )]
    delay: Duration,

    /// Print status as JSON lines instead of text.
    #[arg(short = 'j', long = "json")]
    json: bool,

    /// Print program version.
    #[arg(short = 'v', long = "version")]
    version: bool,
}

impl Cli {
    fn plan(&self) -> ActionPlan {
        ActionPlan {
            action: self.action.unwrap_or_default(),
            ports: self.ports,
            delay: self.delay,
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let plan = cli.plan();
    let filter = RelayFilter::new(cli.relay.clone(), cli.path.clone());
    tracing::debug!(?plan, ?filter, "Parsed command line");

    let mut transport = CliHidTransport::init()?;
    let found = discover(&mut transport, &filter)?;
    if let Some(hint) = found.permission_hint() {
        eprintln!("{hint}");
    }

    let mut sleep = std::thread::sleep;
    let stdout = io::stdout().lock();
    let outcome = if cli.json {
        let mut sink = JsonSink(stdout);
        Sequencer::new(&transport, &mut sink, &mut sleep).run(&found.relays, &plan)?
    } else {
        let mut sink = TextSink(stdout);
        Sequencer::new(&transport, &mut sink, &mut sleep).run(&found.relays, &plan)?
    };

    tracing::debug!(
        statuses = outcome.statuses.len(),
        commands = outcome.commands_sent,
        "Run complete"
    );
    Ok(())
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<hidrelay_core::Error>() {
        Some(hidrelay_core::Error::NoRelaysFound) => {
            eprintln!("No compatible relays detected!");
            eprintln!("Run with -h to get usage info.");
        }
        Some(hidrelay_core::Error::AmbiguousRelay { serials }) => {
            eprintln!("More than 1 relay found, choose one to operate with -l RELAY");
            for serial in serials {
                eprintln!("{serial}");
            }
        }
        Some(
            hidrelay_core::Error::DeviceIo { .. }
            | hidrelay_core::Error::DeviceOpen { .. }
            | hidrelay_core::Error::PermissionDenied { .. }
            | hidrelay_core::Error::PortOutOfRange { .. },
        ) => {
            eprintln!("Cannot set new port state: {err:#}");
        }
        _ => eprintln!("error: {err:#}"),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help goes to stdout, usage errors to stderr. Both exit 1.
            if let Err(print_err) = e.print() {
                eprintln!("error: {print_err}");
            }
            return ExitCode::FAILURE;
        }
    };

    if cli.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("hidrelayctl").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_are_status_query_on_all_ports() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.plan(), ActionPlan::default());
        assert!(cli.relay.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn parses_full_command_line() {
        let cli = parse(&["-l", "AB12C", "-p", "1,3-5", "-a", "cycle", "-d", "0.5"]).unwrap();
        assert_eq!(cli.relay.as_deref(), Some("AB12C"));
        let plan = cli.plan();
        assert_eq!(plan.action, PowerAction::Cycle);
        assert_eq!(plan.ports, parse_port_spec("1,3-5").unwrap());
        assert_eq!(plan.delay, Duration::from_millis(500));
    }

    #[test]
    fn long_flags_and_numeric_actions() {
        let cli = parse(&["--path", "/dev/hidraw3", "--ports", "ALL", "--action", "0"]).unwrap();
        assert_eq!(cli.path.as_deref(), Some("/dev/hidraw3"));
        assert_eq!(cli.ports, PortMask::ALL);
        assert_eq!(cli.action, Some(PowerAction::Off));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["-p", "5-3"]).is_err());
        assert!(parse(&["-p", "9"]).is_err());
        assert!(parse(&["-a", "toggle"]).is_err());
        assert!(parse(&["--delay=-1"]).is_err());
        assert!(parse(&["--delay=soon"]).is_err());
        assert!(parse(&["-p", ","]).is_err());
        assert!(parse(&["stray"]).is_err());
    }

    #[test]
    fn help_and_unknown_flags_do_not_parse() {
        let help = parse(&["-h"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);

        let usage = parse(&["--bogus"]).unwrap_err();
        assert_eq!(usage.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn version_flag_is_lowercase_v() {
        assert!(parse(&["-v"]).unwrap().version);
        assert!(parse(&["--version"]).unwrap().version);
    }

    #[test]
    fn json_sink_writes_one_line_per_status() {
        let status = RelayStatus {
            relay: hidrelay_core::RelayDescriptor {
                serial: "AB12C".into(),
                port_count: 1,
                path: "/dev/hidraw1".into(),
            },
            ports: vec![hidrelay_core::port::PortReading {
                port: 1,
                state: Some(hidrelay_core::PortState::On),
                error: None,
            }],
        };
        let mut sink = JsonSink(Vec::new());
        sink.emit(&status).unwrap();
        sink.emit(&status).unwrap();

        let text = String::from_utf8(sink.0).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["serial"], "AB12C");
        assert_eq!(value["ports"][0]["state"], "on");
    }
}
