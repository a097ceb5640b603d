use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every concurrent stage.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Width of the outer pools (hosts for port scanning, targets for brute force).
    pub threads: usize,
    /// Width of the liveness probe pool.
    pub discovery_concurrency: usize,
    /// Upper bound on concurrent port probes against one host.
    pub ports_per_host: usize,
    /// Concurrent login attempts against one (host, port).
    pub attempts_per_target: usize,
    /// Liveness probe timeout.
    pub probe_timeout: Duration,
    /// TCP connect timeout for port probes.
    pub connect_timeout: Duration,
    pub show_progress: bool,
    pub progress_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 500,
            discovery_concurrency: 100,
            ports_per_host: 50,
            attempts_per_target: 5,
            probe_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            show_progress: true,
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl ScanConfig {
    /// Same settings with the status line disabled.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }
}

/// Per-protocol brute force settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub enabled: bool,
    /// Open ports that are handed to this protocol.
    pub ports: BTreeSet<u16>,
    pub users_file: Option<PathBuf>,
    pub passwords_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn new(ports: &[u16]) -> Self {
        Self {
            enabled: true,
            ports: ports.iter().copied().collect(),
            users_file: None,
            passwords_file: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Everything one end-to-end run needs besides the targets themselves.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub scan: ScanConfig,
    pub ports: Vec<u16>,
    /// When false every expanded address is treated as alive.
    pub ping: bool,
    pub ssh: ServiceConfig,
    pub ftp: ServiceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            ports: crate::ports::PortPreset::Common.ports(),
            ping: true,
            ssh: ServiceConfig::new(crate::brute::ssh::DEFAULT_PORTS),
            ftp: ServiceConfig::new(crate::brute::ftp::DEFAULT_PORTS),
        }
    }
}
