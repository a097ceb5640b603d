use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use ::time::{format_description::well_known, OffsetDateTime};

/// Open ports per host. Absence of a port means closed or filtered.
pub type OpenPorts = BTreeMap<IpAddr, BTreeSet<u16>>;

/// Discovered credentials per host.
pub type Findings = BTreeMap<IpAddr, Vec<Finding>>;

/// One open port observed by the port scanner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub ip: IpAddr,
    pub port: u16,
    pub open: bool,
    pub latency_ms: u64,
    pub timestamp: String,
}

/// Aggregate port scan results and progress counters.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PortScanReport {
    pub hosts_total: u64,
    pub hosts_done: u64,
    pub open_count: u64,
    pub entries: Vec<PortResult>,
}

impl PortScanReport {
    /// Collapse the per-port records into a host -> sorted ports map.
    pub fn open_ports(&self) -> OpenPorts {
        let mut map = OpenPorts::new();
        for e in &self.entries {
            map.entry(e.ip).or_default().insert(e.port);
        }
        map
    }
}

/// A username/password pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.username, self.password)
    }
}

/// A credential that authenticated against a service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub port: u16,
    pub service: String,
    pub username: String,
    pub password: String,
    pub timestamp: String,
}

impl Finding {
    pub fn new(service: &str, port: u16, credential: Credential) -> Self {
        Self {
            port,
            service: service.to_string(),
            username: credential.username,
            password: credential.password,
            timestamp: now_rfc3339(),
        }
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.username.clone(), self.password.clone())
    }
}

pub(crate) fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn report_collapses_to_sorted_ports() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let entry = |port| PortResult {
            ip,
            port,
            open: true,
            latency_ms: 1,
            timestamp: now_rfc3339(),
        };
        let report = PortScanReport {
            hosts_total: 1,
            hosts_done: 1,
            open_count: 3,
            entries: vec![entry(443), entry(22), entry(80)],
        };
        let open = report.open_ports();
        assert_eq!(open[&ip].iter().copied().collect::<Vec<_>>(), vec![22, 80, 443]);
    }

    #[test]
    fn credential_display() {
        assert_eq!(Credential::new("root", "toor").to_string(), "root:toor");
    }
}
