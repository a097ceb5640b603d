use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::brute::ftp::FtpProtocol;
use crate::brute::ssh::SshProtocol;
use crate::brute::{BruteForcer, Dictionary, ServiceProtocol};
use crate::config::{PipelineConfig, ServiceConfig};
use crate::discovery::{HostDiscovery, LivenessProbe, SystemProbe};
use crate::scanner::PortScanner;
use crate::targets;
use crate::types::{Findings, OpenPorts};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// Addresses after expansion and deduplication.
    pub addresses: usize,
    pub alive: BTreeSet<IpAddr>,
    pub open_ports: OpenPorts,
    pub ssh: Findings,
    pub ftp: Findings,
    pub interrupted: bool,
}

/// A protocol together with the dictionary it is run with.
struct Service {
    protocol: Arc<dyn ServiceProtocol>,
    dictionary: Dictionary,
}

impl Service {
    fn from_config(
        protocol: Arc<dyn ServiceProtocol>,
        config: &ServiceConfig,
        dictionary: Dictionary,
    ) -> Option<Self> {
        config.enabled.then_some(Self {
            protocol,
            dictionary,
        })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    probe: Arc<dyn LivenessProbe>,
    ssh: Option<Service>,
    ftp: Option<Service>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Pipeline with the system liveness probe and the SSH and FTP adapters.
    pub fn new(config: PipelineConfig, cancel: CancellationToken) -> Self {
        let probe = Arc::new(SystemProbe::new(config.scan.probe_timeout));
        let ssh = Service::from_config(
            Arc::new(SshProtocol::default()),
            &config.ssh,
            SshProtocol::dictionary(
                config.ssh.users_file.as_deref(),
                config.ssh.passwords_file.as_deref(),
            ),
        );
        let ftp = Service::from_config(
            Arc::new(FtpProtocol::default()),
            &config.ftp,
            FtpProtocol::dictionary(
                config.ftp.users_file.as_deref(),
                config.ftp.passwords_file.as_deref(),
            ),
        );
        Self {
            config,
            probe,
            ssh,
            ftp,
            cancel,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_ssh(mut self, protocol: Arc<dyn ServiceProtocol>, dictionary: Dictionary) -> Self {
        self.ssh = Service::from_config(protocol, &self.config.ssh, dictionary);
        self
    }

    pub fn with_ftp(mut self, protocol: Arc<dyn ServiceProtocol>, dictionary: Dictionary) -> Self {
        self.ftp = Service::from_config(protocol, &self.config.ftp, dictionary);
        self
    }

    /// Expand `specs` and run every stage over the result.
    pub async fn run<I, S>(&self, specs: I) -> PipelineReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addresses: BTreeSet<IpAddr> = targets::expand_all(specs).collect();
        self.run_addresses(addresses).await
    }

    /// Each stage starts only after the previous one has drained.
    pub async fn run_addresses(&self, addresses: BTreeSet<IpAddr>) -> PipelineReport {
        let mut report = PipelineReport {
            addresses: addresses.len(),
            ..PipelineReport::default()
        };
        if addresses.is_empty() {
            warn!("no valid target addresses");
            return report;
        }

        let scan = &self.config.scan;
        report.alive = if self.config.ping {
            HostDiscovery::new(self.probe.clone(), scan.clone(), self.cancel.clone())
                .discover(&addresses)
                .await
        } else {
            addresses
        };
        if self.interrupted(&mut report) || report.alive.is_empty() {
            if report.alive.is_empty() {
                info!("no alive hosts found");
            }
            return report;
        }

        report.open_ports = PortScanner::new(scan.clone(), self.cancel.clone())
            .scan(&report.alive, &self.config.ports)
            .await;
        if self.interrupted(&mut report) {
            return report;
        }

        if let Some(ssh) = &self.ssh {
            let targets = select_ports(&report.open_ports, &self.config.ssh.ports);
            report.ssh = self.brute(ssh, &targets).await;
        }
        if self.interrupted(&mut report) {
            return report;
        }
        if let Some(ftp) = &self.ftp {
            let targets = select_ports(&report.open_ports, &self.config.ftp.ports);
            report.ftp = self.brute(ftp, &targets).await;
        }
        self.interrupted(&mut report);
        report
    }

    async fn brute(&self, service: &Service, targets: &OpenPorts) -> Findings {
        if targets.is_empty() {
            return Findings::new();
        }
        BruteForcer::new(
            service.protocol.clone(),
            service.dictionary.clone(),
            self.config.scan.clone(),
            self.cancel.clone(),
        )
        .run(targets)
        .await
    }

    fn interrupted(&self, report: &mut PipelineReport) -> bool {
        report.interrupted = self.cancel.is_cancelled();
        report.interrupted
    }
}

/// Keep only the open ports a protocol is interested in, dropping hosts left with none.
pub fn select_ports(open: &OpenPorts, wanted: &BTreeSet<u16>) -> OpenPorts {
    open.iter()
        .filter_map(|(ip, ports)| {
            let matching: BTreeSet<u16> = ports.intersection(wanted).copied().collect();
            (!matching.is_empty()).then_some((*ip, matching))
        })
        .collect()
}

/// Hosts that appear in any findings map.
pub fn compromised_hosts(report: &PipelineReport) -> HashSet<IpAddr> {
    report.ssh.keys().chain(report.ftp.keys()).copied().collect()
}
