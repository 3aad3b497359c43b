//! Config-server address parsing and rotation.

use std::fmt;

use tracing::warn;

/// One `host:port` endpoint of the config server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigServerAddress {
    pub host: String,
    pub port: u16,
}

impl ConfigServerAddress {
    /// Parses one `"host:port"` entry; the split is on the last colon so
    /// IPv6-ish hosts keep their inner colons. Returns `None` on a missing
    /// port, a port outside `1..=65535`, or an empty host.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (host, port) = trimmed.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok().filter(|port| *port >= 1)?;
        Some(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ConfigServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Ordered address list with a rotating current index.
///
/// The RNG is owned by the book (seeded once at provider init) so rotation
/// is reproducible in tests.
#[derive(Debug)]
pub struct AddressBook {
    addresses: Vec<ConfigServerAddress>,
    current: usize,
    rng: fastrand::Rng,
}

impl AddressBook {
    pub fn new(addresses: Vec<ConfigServerAddress>, rng: fastrand::Rng) -> Self {
        Self {
            addresses,
            current: 0,
            rng,
        }
    }

    /// Parses a list of raw `"host:port"` entries, logging and skipping
    /// malformed ones.
    pub fn from_raw_entries(entries: &[String], rng: fastrand::Rng) -> Self {
        let addresses = entries
            .iter()
            .filter_map(|raw| match ConfigServerAddress::parse(raw) {
                Some(address) => Some(address),
                None => {
                    warn!(address = raw.as_str(), "malformed config server address skipped");
                    None
                }
            })
            .collect();
        Self::new(addresses, rng)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns the current address; when `change` is set, first rotates to a
    /// random index different from the current one (no-op with fewer than
    /// two entries). Returns `None` on an empty list and the caller skips
    /// the cycle.
    pub fn pick(&mut self, change: bool) -> Option<&ConfigServerAddress> {
        if self.addresses.is_empty() {
            return None;
        }
        if change && self.addresses.len() > 1 {
            let mut next = self.rng.usize(..self.addresses.len());
            while next == self.current {
                next = self.rng.usize(..self.addresses.len());
            }
            self.current = next;
        }
        self.addresses.get(self.current)
    }
}
