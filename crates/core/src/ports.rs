//! Port selection: the textual port list parser and the `PortMask` bitmask.
//!
//! Port lists are comma-separated tokens, each a single port `N` or an
//! inclusive range `N-M`. The following are equivalent:
//!
//! ```text
//! 1,3,4,5
//! 1,3-5
//! 5, 1 ,3-4,4
//! ```
//!
//! Ports are 1-indexed in text and map to bit `port - 1`.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Maximum number of ports a relay may expose.
pub const MAX_PORTS: u8 = 8;

/// Bitmask over ports `1..=MAX_PORTS`.
///
/// An empty mask is treated as "every port" by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct PortMask(u8);

impl PortMask {
    /// No port selected.
    pub const EMPTY: PortMask = PortMask(0);
    /// Every supported port selected.
    pub const ALL: PortMask = PortMask(u8::MAX);

    /// Build a mask from raw bits. Every bit of a `u8` maps to a valid port.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether `port` (1-indexed) is selected. Out-of-range ports never are.
    pub fn contains(self, port: u8) -> bool {
        match port_bit(port) {
            Some(bit) => self.0 & bit != 0,
            None => false,
        }
    }

    /// Whether a status query should include `port`: an empty mask selects all.
    pub fn selects_for_status(self, port: u8) -> bool {
        self.is_empty() || self.contains(port)
    }

    /// Mask with `port` added. Out-of-range ports leave the mask unchanged.
    pub fn with(self, port: u8) -> Self {
        match port_bit(port) {
            Some(bit) => Self(self.0 | bit),
            None => self,
        }
    }

    /// Selected ports in ascending order, limited to `1..=port_count`.
    pub fn ports_up_to(self, port_count: u8) -> impl Iterator<Item = u8> {
        (1..=port_count.min(MAX_PORTS)).filter(move |&p| self.contains(p))
    }
}

impl fmt::Display for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports: Vec<String> = self.ports_up_to(MAX_PORTS).map(|p| p.to_string()).collect();
        if ports.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", ports.join(","))
        }
    }
}

fn port_bit(port: u8) -> Option<u8> {
    if (1..=MAX_PORTS).contains(&port) {
        Some(1 << (port - 1))
    } else {
        None
    }
}

/// Parse a comma-separated list of ports and port ranges into a mask.
///
/// Whitespace around tokens and bounds is ignored, empty tokens are skipped,
/// and duplicates or overlapping ranges simply OR into the result. The `all`
/// keyword is not recognized here; callers map it to [`PortMask::ALL`].
///
/// # Errors
///
/// Returns [`Error::InvalidPortSpec`] for a non-numeric bound, a range whose
/// start exceeds its end, a port outside `1..=MAX_PORTS`, or a non-blank
/// list that names no port at all (such as `","`).
pub fn parse_port_spec(spec: &str) -> Result<PortMask> {
    let mut mask = PortMask::EMPTY;

    for token in spec.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }

        let (first, last) = match token.split_once('-') {
            Some((a, b)) => (parse_bound(spec, a)?, parse_bound(spec, b)?),
            None => {
                let port = parse_bound(spec, token)?;
                (port, port)
            }
        };

        if first > last {
            return Err(invalid(
                spec,
                format!("{first}-{last}, first port must be less than last"),
            ));
        }
        if first == 0 || last > u32::from(MAX_PORTS) {
            return Err(invalid(
                spec,
                format!("{first}-{last}, port numbers must be from 1 to {MAX_PORTS}"),
            ));
        }

        for port in first..=last {
            // Bounded by MAX_PORTS above.
            mask = mask.with(port as u8);
        }
    }

    if mask.is_empty() && !spec.trim().is_empty() {
        return Err(invalid(spec, "no ports selected".to_string()));
    }
    Ok(mask)
}

fn parse_bound(spec: &str, raw: &str) -> Result<u32> {
    let raw = raw.trim();
    raw.parse::<u32>()
        .map_err(|_| invalid(spec, format!("'{raw}' is not a port number")))
}

fn invalid(spec: &str, reason: String) -> Error {
    Error::InvalidPortSpec {
        spec: spec.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_ports_and_ranges() {
        assert_eq!(parse_port_spec("1").unwrap().bits(), 0b0000_0001);
        assert_eq!(parse_port_spec("1,3-5").unwrap().bits(), 0x1D);
        assert_eq!(parse_port_spec("1-8").unwrap(), PortMask::ALL);
    }

    #[test]
    fn duplicates_and_overlaps_collapse() {
        assert_eq!(parse_port_spec("1,1,1").unwrap(), parse_port_spec("1").unwrap());
        assert_eq!(
            parse_port_spec("2-4,3-6,5").unwrap(),
            parse_port_spec("2-6").unwrap()
        );
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(
            parse_port_spec("5,1,3-4").unwrap(),
            parse_port_spec("1,3-5").unwrap()
        );
    }

    #[test]
    fn whitespace_and_empty_tokens_are_accepted() {
        assert_eq!(
            parse_port_spec(" 1 , ,3 - 5,").unwrap(),
            parse_port_spec("1,3-5").unwrap()
        );
        assert_eq!(parse_port_spec("").unwrap(), PortMask::EMPTY);
    }

    #[test]
    fn separators_without_ports_are_rejected() {
        for spec in [",", " , ", ",,"] {
            assert!(
                matches!(parse_port_spec(spec), Err(Error::InvalidPortSpec { .. })),
                "{spec:?} should not parse"
            );
        }
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = parse_port_spec("5-3").unwrap_err();
        assert!(matches!(err, Error::InvalidPortSpec { .. }));
        assert!(err.to_string().contains("first port must be less than last"));
    }

    #[test]
    fn out_of_range_ports_are_rejected() {
        assert!(matches!(
            parse_port_spec("9"),
            Err(Error::InvalidPortSpec { .. })
        ));
        assert!(matches!(
            parse_port_spec("0"),
            Err(Error::InvalidPortSpec { .. })
        ));
        assert!(matches!(
            parse_port_spec("1,3-5,11-13"),
            Err(Error::InvalidPortSpec { .. })
        ));
        assert!(matches!(
            parse_port_spec("300"),
            Err(Error::InvalidPortSpec { .. })
        ));
    }

    #[test]
    fn non_numeric_tokens_are_rejected() {
        for spec in ["a", "1,x", "1-", "-3", "2-b", "all"] {
            assert!(
                matches!(parse_port_spec(spec), Err(Error::InvalidPortSpec { .. })),
                "spec {spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn mask_queries() {
        let mask = parse_port_spec("2,4").unwrap();
        assert!(mask.contains(2));
        assert!(!mask.contains(3));
        assert!(!mask.contains(0));
        assert!(!mask.contains(9));
        assert!(!mask.selects_for_status(1));
        assert!(PortMask::EMPTY.selects_for_status(1));
        assert_eq!(mask.ports_up_to(8).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(mask.ports_up_to(3).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn display_lists_ports() {
        assert_eq!(parse_port_spec("1,3-5").unwrap().to_string(), "1,3,4,5");
        assert_eq!(PortMask::EMPTY.to_string(), "none");
    }
}
