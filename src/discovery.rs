use std::collections::BTreeSet;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ScanConfig;
use crate::net::connect_timed;
use crate::pool;
use crate::progress::{self, ProgressReporter, ProgressSnapshot, ProgressSource, ScanState};

/// A lightweight check of whether a host responds.
///
/// Implementations must not fail: anything short of a clear answer is "not alive".
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_alive(&self, ip: IpAddr) -> bool;
}

/// One ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `Err` only when the ping tool could not be run at all.
    pub async fn ping(&self, ip: IpAddr) -> io::Result<bool> {
        let mut cmd = ping_command(ip, self.timeout);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd.spawn()?;
        // ping's own deadline plus slack for process startup
        let deadline = self.timeout + Duration::from_secs(1);
        match time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(e)) => {
                trace!(%ip, error = %e, "ping wait failed");
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_alive(&self, ip: IpAddr) -> bool {
        self.ping(ip).await.unwrap_or(false)
    }
}

#[cfg(windows)]
fn ping_command(ip: IpAddr, timeout: Duration) -> Command {
    let mut cmd = Command::new("ping");
    cmd.arg("-n")
        .arg("1")
        .arg("-w")
        .arg(timeout.as_millis().max(1).to_string())
        .arg(ip.to_string());
    cmd
}

#[cfg(not(windows))]
fn ping_command(ip: IpAddr, timeout: Duration) -> Command {
    let program = if ip.is_ipv6() && cfg!(target_os = "macos") {
        "ping6"
    } else {
        "ping"
    };
    let mut cmd = Command::new(program);
    cmd.arg("-c").arg("1");
    if !cfg!(target_os = "macos") {
        cmd.arg("-W").arg(timeout.as_secs().max(1).to_string());
    }
    cmd.arg(ip.to_string());
    cmd
}

/// Unprivileged probe: a host is up if any common port completes or refuses a TCP handshake.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    ports: Vec<u16>,
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ports: vec![22, 80, 443, 445, 3389, 8080],
            timeout,
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }
}

#[async_trait]
impl LivenessProbe for TcpConnectProbe {
    async fn is_alive(&self, ip: IpAddr) -> bool {
        let mut set = JoinSet::new();
        for &port in &self.ports {
            let timeout = self.timeout;
            set.spawn(async move {
                match connect_timed(SocketAddr::new(ip, port), timeout).await {
                    Ok(_) => true,
                    // Refused means something answered with a RST.
                    Err(e) => e.kind() == io::ErrorKind::ConnectionRefused,
                }
            });
        }
        while let Some(res) = set.join_next().await {
            if matches!(res, Ok(true)) {
                return true;
            }
        }
        false
    }
}

/// Default probe: system ping, falling back to TCP connect if ping is not installed.
#[derive(Debug)]
pub struct SystemProbe {
    ping: PingProbe,
    tcp: TcpConnectProbe,
    ping_missing: AtomicBool,
}

impl SystemProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ping: PingProbe::new(timeout),
            tcp: TcpConnectProbe::new(timeout),
            ping_missing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LivenessProbe for SystemProbe {
    async fn is_alive(&self, ip: IpAddr) -> bool {
        if !self.ping_missing.load(Ordering::Relaxed) {
            match self.ping.ping(ip).await {
                Ok(alive) => return alive,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !self.ping_missing.swap(true, Ordering::Relaxed) {
                        warn!("ping tool not found, falling back to TCP connect probes");
                    }
                }
                Err(e) => {
                    debug!(%ip, error = %e, "ping could not be started");
                    return false;
                }
            }
        }
        self.tcp.is_alive(ip).await
    }
}

struct DiscoveryState {
    alive: BTreeSet<IpAddr>,
    progress: ScanState,
}

struct Shared {
    state: Mutex<DiscoveryState>,
}

#[async_trait]
impl ProgressSource for Shared {
    async fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().await.progress.snapshot()
    }
}

/// Runs a [`LivenessProbe`] over a set of addresses on a bounded pool.
pub struct HostDiscovery {
    probe: Arc<dyn LivenessProbe>,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl HostDiscovery {
    pub fn new(probe: Arc<dyn LivenessProbe>, config: ScanConfig, cancel: CancellationToken) -> Self {
        Self {
            probe,
            config,
            cancel,
        }
    }

    /// Return the subset of `addresses` that answered the probe.
    pub async fn discover(&self, addresses: &BTreeSet<IpAddr>) -> BTreeSet<IpAddr> {
        if addresses.is_empty() {
            return BTreeSet::new();
        }
        info!(hosts = addresses.len(), "starting host discovery");

        let shared = Arc::new(Shared {
            state: Mutex::new(DiscoveryState {
                alive: BTreeSet::new(),
                progress: ScanState::new(addresses.len() as u64),
            }),
        });
        let reporter = self.config.show_progress.then(|| {
            ProgressReporter::spawn(
                "Host discovery",
                shared.clone(),
                self.config.progress_interval,
            )
        });

        let loud = self.config.show_progress;
        let sem = pool::semaphore(self.config.discovery_concurrency);
        let mut set = JoinSet::new();
        for &ip in addresses {
            let Some(permit) = pool::acquire(&sem, &self.cancel).await else {
                break;
            };
            let probe = self.probe.clone();
            let shared = shared.clone();
            set.spawn(async move {
                let _permit = permit;
                let alive = probe.is_alive(ip).await;
                let mut state = shared.state.lock().await;
                if alive {
                    state.alive.insert(ip);
                    if loud {
                        progress::announce(&format!("[+] {ip} is alive"));
                    }
                }
                state.progress.set_current(ip.to_string());
                state.progress.complete_one();
            });
        }
        pool::drain(&mut set, &self.cancel, "discovery").await;

        if let Some(reporter) = reporter {
            reporter.finish().await;
        }
        let alive = shared.state.lock().await.alive.clone();
        info!(alive = alive.len(), "host discovery finished");
        alive
    }
}
