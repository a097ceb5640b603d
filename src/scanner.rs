use crate::config::ScanConfig;
use crate::net::connect_timed;
use crate::pool;
use crate::progress::{self, ProgressReporter, ProgressSnapshot, ProgressSource, ScanState};
use crate::types::{now_rfc3339, OpenPorts, PortResult, PortScanReport};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// TCP connect port scanner with two tiers of concurrency.
///
/// - The outer pool runs one task per host, bounded by `ScanConfig::threads`.
/// - Each host task probes its ports on an inner pool of `min(ports, ports_per_host)`.
/// - Uses `tokio::time::timeout` to bound connect time per socket.
/// - Open ports are recorded as soon as they are found, not when the host finishes.
pub struct PortScanner {
    config: ScanConfig,
    cancel: CancellationToken,
}

struct ScanShared {
    state: Mutex<ScanStateInner>,
}

struct ScanStateInner {
    report: PortScanReport,
    progress: ScanState,
}

#[async_trait]
impl ProgressSource for ScanShared {
    async fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().await.progress.snapshot()
    }
}

impl PortScanner {
    pub fn new(config: ScanConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Scan `ports` on every host and return the open ports per host, sorted.
    pub async fn scan(&self, hosts: &BTreeSet<IpAddr>, ports: &[u16]) -> OpenPorts {
        self.scan_detailed(hosts, ports).await.open_ports()
    }

    /// Like [`PortScanner::scan`] but keeps per-port latency and counters.
    pub async fn scan_detailed(&self, hosts: &BTreeSet<IpAddr>, ports: &[u16]) -> PortScanReport {
        let total = hosts.len() as u64;
        if hosts.is_empty() {
            return PortScanReport::default();
        }
        info!(hosts = total, ports = ports.len(), "starting port scan");

        let shared = Arc::new(ScanShared {
            state: Mutex::new(ScanStateInner {
                report: PortScanReport {
                    hosts_total: total,
                    ..PortScanReport::default()
                },
                progress: ScanState::new(total),
            }),
        });
        let reporter = self.config.show_progress.then(|| {
            ProgressReporter::spawn("Port scan", shared.clone(), self.config.progress_interval)
        });

        let ports: Arc<[u16]> = ports.into();
        let inner_width = ports.len().min(self.config.ports_per_host);
        let sem = pool::semaphore(self.config.threads);
        let mut set = JoinSet::new();

        for &ip in hosts {
            let Some(permit) = pool::acquire(&sem, &self.cancel).await else {
                break;
            };
            let host = HostScan {
                ip,
                ports: ports.clone(),
                width: inner_width,
                timeout: self.config.connect_timeout,
                announce: self.config.show_progress,
                shared: shared.clone(),
                cancel: self.cancel.clone(),
            };
            set.spawn(async move {
                let _permit = permit; // keep permit until the host is done
                host.run().await;
            });
        }

        pool::drain(&mut set, &self.cancel, "port scan").await;

        if let Some(reporter) = reporter {
            reporter.finish().await;
        }
        let report = shared.state.lock().await.report.clone();
        info!(
            open = report.open_count,
            hosts_done = report.hosts_done,
            "port scan finished"
        );
        report
    }
}

/// Everything one host task needs.
struct HostScan {
    ip: IpAddr,
    ports: Arc<[u16]>,
    width: usize,
    timeout: Duration,
    announce: bool,
    shared: Arc<ScanShared>,
    cancel: CancellationToken,
}

impl HostScan {
    async fn run(self) {
        let sem = pool::semaphore(self.width);
        let mut set = JoinSet::new();

        for &port in self.ports.iter() {
            let Some(permit) = pool::acquire(&sem, &self.cancel).await else {
                break;
            };
            let ip = self.ip;
            let timeout = self.timeout;
            let announce = self.announce;
            let shared = self.shared.clone();
            set.spawn(async move {
                let _permit = permit;
                let addr = SocketAddr::new(ip, port);
                match connect_timed(addr, timeout).await {
                    Ok((_stream, latency)) => {
                        let entry = PortResult {
                            ip,
                            port,
                            open: true,
                            latency_ms: latency.as_millis() as u64,
                            timestamp: now_rfc3339(),
                        };
                        let mut state = shared.state.lock().await;
                        state.report.open_count += 1;
                        state.report.entries.push(entry);
                        drop(state);
                        if announce {
                            progress::announce(&format!("[+] {ip}:{port} open"));
                        }
                    }
                    Err(_) => {
                        // Closed, filtered, or timed out. Absence in the result means closed.
                    }
                }
            });
        }

        pool::drain(&mut set, &self.cancel, "port scan").await;
        if self.cancel.is_cancelled() {
            debug!(ip = %self.ip, "host scan interrupted");
            return;
        }

        let mut state = self.shared.state.lock().await;
        state.report.hosts_done += 1;
        state.progress.set_current(self.ip.to_string());
        state.progress.complete_one();
        debug!(ip = %self.ip, "host scan complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    fn scanner() -> PortScanner {
        let config = ScanConfig {
            connect_timeout: Duration::from_millis(500),
            ..ScanConfig::default().quiet()
        };
        PortScanner::new(config, CancellationToken::new())
    }

    #[tokio::test]
    async fn no_hosts_means_empty_report() {
        let report = scanner().scan_detailed(&BTreeSet::new(), &[22, 80]).await;
        assert_eq!(report.hosts_total, 0);
        assert!(report.entries.is_empty());
    }

    #[tokio::test]
    async fn host_counted_once_even_with_several_open_ports() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ports = [a.local_addr().unwrap().port(), b.local_addr().unwrap().port()];
        let hosts: BTreeSet<IpAddr> = [IpAddr::V4(Ipv4Addr::LOCALHOST)].into();

        let report = scanner().scan_detailed(&hosts, &ports).await;
        assert_eq!(report.hosts_done, 1);
        assert_eq!(report.open_count, 2);
        assert!(report.entries.iter().all(|e| e.open));
    }

    #[tokio::test]
    async fn interrupted_host_is_not_counted_as_done() {
        let shared = Arc::new(ScanShared {
            state: Mutex::new(ScanStateInner {
                report: PortScanReport::default(),
                progress: ScanState::new(1),
            }),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        HostScan {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ports: vec![22, 80].into(),
            width: 2,
            timeout: Duration::from_millis(100),
            announce: false,
            shared: shared.clone(),
            cancel,
        }
        .run()
        .await;

        let state = shared.state.lock().await;
        assert_eq!(state.report.hosts_done, 0);
        assert_eq!(state.progress.completed, 0);
    }

    #[tokio::test]
    async fn no_ports_still_completes_host() {
        let hosts: BTreeSet<IpAddr> = [IpAddr::V4(Ipv4Addr::LOCALHOST)].into();
        let report = scanner().scan_detailed(&hosts, &[]).await;
        assert_eq!(report.hosts_done, 1);
        assert_eq!(report.open_count, 0);
    }
}
