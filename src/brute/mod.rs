pub mod ftp;
pub mod ssh;
pub mod wordlist;

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::ScanConfig;
use crate::pool;
use crate::progress::{self, ProgressReporter, ProgressSnapshot, ProgressSource, ScanState};
use crate::types::{Credential, Finding, Findings, OpenPorts};

pub use wordlist::Dictionary;

/// Result of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Credential),
    /// The service answered and rejected the credential.
    AuthFailure,
    /// Socket or protocol error before a clean accept/reject.
    ConnectionFailure(String),
}

/// Protocol-specific half of a brute force run.
#[async_trait]
pub trait ServiceProtocol: Send + Sync {
    /// Short name used in findings and log output, e.g. `ssh`.
    fn name(&self) -> &'static str;

    /// Fast check that the service is really there.
    async fn probe(&self, host: IpAddr, port: u16) -> bool;

    async fn attempt(&self, host: IpAddr, port: u16, username: &str, password: &str)
        -> AttemptOutcome;

    /// Try short passwords first.
    fn sort_passwords_by_length(&self) -> bool {
        false
    }
}

/// Counters and results of one [`BruteForcer::run_report`] call.
#[derive(Debug, Clone, Default)]
pub struct BruteReport {
    pub findings: Findings,
    pub attempts: u64,
    pub planned: u64,
    pub errors: u64,
    pub skipped_hosts: HashSet<IpAddr>,
}

struct BruteState {
    findings: Findings,
    solved: HashSet<(IpAddr, u16)>,
    skip: HashSet<IpAddr>,
    progress: ScanState,
}

impl BruteState {
    fn should_stop(&self, ip: IpAddr, port: u16) -> bool {
        self.skip.contains(&ip) || self.solved.contains(&(ip, port))
    }
}

struct Shared {
    service: &'static str,
    announce: bool,
    state: Mutex<BruteState>,
}

#[async_trait]
impl ProgressSource for Shared {
    async fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().await.progress.snapshot()
    }
}

/// Runs one [`ServiceProtocol`] over a set of targets.
///
/// One task per (host, port) on a `threads` wide pool, each with its own
/// `attempts_per_target` wide pool of login attempts. A connection failure puts
/// the host in the skip set for every port. The first recorded success for a
/// target wins and stops further scheduling for it; attempts already in flight
/// still run and a late success is discarded, so which of two racing valid
/// credentials is recorded does not follow dictionary order.
pub struct BruteForcer {
    protocol: Arc<dyn ServiceProtocol>,
    dictionary: Arc<Dictionary>,
    config: ScanConfig,
    cancel: CancellationToken,
}

impl BruteForcer {
    pub fn new(
        protocol: Arc<dyn ServiceProtocol>,
        dictionary: Dictionary,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            dictionary: Arc::new(dictionary),
            config,
            cancel,
        }
    }

    /// Try the dictionary against every (host, port) and return what authenticated.
    pub async fn run(&self, targets: &OpenPorts) -> Findings {
        self.run_report(targets).await.findings
    }

    pub async fn run_report(&self, targets: &OpenPorts) -> BruteReport {
        let service = self.protocol.name();
        let target_count: u64 = targets.values().map(|ports| ports.len() as u64).sum();
        let planned = target_count * self.dictionary.size();
        if target_count == 0 {
            return BruteReport::default();
        }
        info!(
            service,
            targets = target_count,
            users = self.dictionary.users.len(),
            passwords = self.dictionary.passwords.len(),
            "starting brute force"
        );

        // Fresh skip set and results for every run.
        let shared = Arc::new(Shared {
            service,
            announce: self.config.show_progress,
            state: Mutex::new(BruteState {
                findings: Findings::new(),
                solved: HashSet::new(),
                skip: HashSet::new(),
                progress: ScanState::new(planned),
            }),
        });
        let reporter = self.config.show_progress.then(|| {
            ProgressReporter::spawn(
                format!("{} brute force", service.to_uppercase()),
                shared.clone(),
                self.config.progress_interval,
            )
        });

        let sem = pool::semaphore(self.config.threads);
        let mut set = JoinSet::new();
        'targets: for (&ip, ports) in targets {
            for &port in ports {
                let Some(permit) = pool::acquire(&sem, &self.cancel).await else {
                    break 'targets;
                };
                let target = TargetRun {
                    ip,
                    port,
                    protocol: self.protocol.clone(),
                    dictionary: self.dictionary.clone(),
                    width: self.config.attempts_per_target,
                    shared: shared.clone(),
                    cancel: self.cancel.clone(),
                };
                set.spawn(async move {
                    let _permit = permit;
                    target.run().await;
                });
            }
        }
        pool::drain(&mut set, &self.cancel, service).await;

        if let Some(reporter) = reporter {
            reporter.finish().await;
        }
        let state = shared.state.lock().await;
        let found: usize = state.findings.values().map(Vec::len).sum();
        info!(
            service,
            found,
            attempts = state.progress.completed,
            errors = state.progress.errors,
            "brute force finished"
        );
        BruteReport {
            findings: state.findings.clone(),
            attempts: state.progress.completed,
            planned,
            errors: state.progress.errors,
            skipped_hosts: state.skip.clone(),
        }
    }
}

/// One (host, port) worth of attempts.
struct TargetRun {
    ip: IpAddr,
    port: u16,
    protocol: Arc<dyn ServiceProtocol>,
    dictionary: Arc<Dictionary>,
    width: usize,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl TargetRun {
    async fn run(self) {
        let (ip, port) = (self.ip, self.port);
        if !self.protocol.probe(ip, port).await {
            debug!(service = self.shared.service, %ip, port, "service probe failed");
            self.shared.state.lock().await.progress.record_error();
            return;
        }

        let plan = self
            .dictionary
            .plan(self.protocol.sort_passwords_by_length());
        let sem = pool::semaphore(self.width);
        let mut set = JoinSet::new();

        for credential in plan {
            let Some(permit) = pool::acquire(&sem, &self.cancel).await else {
                break;
            };
            if self.shared.state.lock().await.should_stop(ip, port) {
                break;
            }
            let protocol = self.protocol.clone();
            let shared = self.shared.clone();
            let cancel = self.cancel.clone();
            set.spawn(async move {
                let _permit = permit;
                attempt_one(protocol, shared, cancel, ip, port, credential).await;
            });
        }

        pool::drain(&mut set, &self.cancel, self.shared.service).await;
    }
}

async fn attempt_one(
    protocol: Arc<dyn ServiceProtocol>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    ip: IpAddr,
    port: u16,
    credential: Credential,
) {
    {
        let mut state = shared.state.lock().await;
        if cancel.is_cancelled() || state.should_stop(ip, port) {
            return;
        }
    }

    let outcome = protocol
        .attempt(ip, port, &credential.username, &credential.password)
        .await;

    let mut state = shared.state.lock().await;
    state.progress.complete_one();
    state.progress.set_current(credential.to_string());
    match outcome {
        AttemptOutcome::Success(found) => {
            if state.solved.insert((ip, port)) {
                if shared.announce {
                    progress::announce(&format!(
                        "[+] {} found: {ip}:{port} {found}",
                        shared.service.to_uppercase()
                    ));
                }
                info!(service = shared.service, %ip, port, username = %found.username, "valid credential");
                state
                    .findings
                    .entry(ip)
                    .or_default()
                    .push(Finding::new(shared.service, port, found));
            } else {
                debug!(service = shared.service, %ip, port, "discarding late success");
            }
        }
        AttemptOutcome::AuthFailure => {
            trace!(service = shared.service, %ip, port, %credential, "rejected");
        }
        AttemptOutcome::ConnectionFailure(reason) => {
            if state.skip.insert(ip) {
                debug!(service = shared.service, %ip, port, %reason, "connection failure, skipping host");
            }
            state.progress.record_error();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::sync::Notify;

    /// Rejects everything, but only once released.
    struct Gated {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ServiceProtocol for Gated {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn probe(&self, _host: IpAddr, _port: u16) -> bool {
            true
        }

        async fn attempt(
            &self,
            _host: IpAddr,
            _port: u16,
            _username: &str,
            _password: &str,
        ) -> AttemptOutcome {
            self.started.notify_one();
            self.release.notified().await;
            AttemptOutcome::AuthFailure
        }
    }

    fn shared() -> Arc<Shared> {
        Arc::new(Shared {
            service: "gated",
            announce: false,
            state: Mutex::new(BruteState {
                findings: Findings::new(),
                solved: HashSet::new(),
                skip: HashSet::new(),
                progress: ScanState::new(1),
            }),
        })
    }

    #[tokio::test]
    async fn current_credential_is_set_when_the_attempt_completes() {
        let protocol = Arc::new(Gated {
            started: Notify::new(),
            release: Notify::new(),
        });
        let shared = shared();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let task = tokio::spawn(attempt_one(
            protocol.clone(),
            shared.clone(),
            CancellationToken::new(),
            ip,
            22,
            Credential::new("root", "toor"),
        ));

        protocol.started.notified().await;
        assert!(shared.snapshot().await.current.is_none());

        protocol.release.notify_one();
        task.await.unwrap();
        let snap = shared.snapshot().await;
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.current.as_deref(), Some("root:toor"));
    }

    #[tokio::test]
    async fn skipped_host_is_not_attempted() {
        let protocol = Arc::new(Gated {
            started: Notify::new(),
            release: Notify::new(),
        });
        let shared = shared();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        shared.state.lock().await.skip.insert(ip);

        attempt_one(
            protocol,
            shared.clone(),
            CancellationToken::new(),
            ip,
            22,
            Credential::new("root", "toor"),
        )
        .await;
        let snap = shared.snapshot().await;
        assert_eq!(snap.completed, 0);
        assert!(snap.current.is_none());
    }
}
