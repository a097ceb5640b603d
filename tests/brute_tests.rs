use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lan_recon_rs::brute::{AttemptOutcome, BruteForcer, Dictionary, ServiceProtocol};
use lan_recon_rs::config::ScanConfig;
use lan_recon_rs::types::{Credential, OpenPorts};
use tokio_util::sync::CancellationToken;

/// In-memory login service.
#[derive(Default)]
struct FakeService {
    valid: HashSet<(String, String)>,
    /// Hosts whose every attempt fails at the connection level.
    unreachable: HashSet<IpAddr>,
    probe_ok: bool,
    delay: Duration,
    attempts: Mutex<Vec<(IpAddr, u16, String)>>,
}

impl FakeService {
    fn new(valid: &[(&str, &str)]) -> Self {
        Self {
            valid: valid
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
            probe_ok: true,
            ..Self::default()
        }
    }

    fn attempts(&self) -> Vec<(IpAddr, u16, String)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceProtocol for FakeService {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, _host: IpAddr, _port: u16) -> bool {
        self.probe_ok
    }

    async fn attempt(
        &self,
        host: IpAddr,
        port: u16,
        username: &str,
        password: &str,
    ) -> AttemptOutcome {
        self.attempts
            .lock()
            .unwrap()
            .push((host, port, format!("{username}:{password}")));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable.contains(&host) {
            return AttemptOutcome::ConnectionFailure("connection refused".into());
        }
        if self.valid.contains(&(username.to_string(), password.to_string())) {
            AttemptOutcome::Success(Credential::new(username, password))
        } else {
            AttemptOutcome::AuthFailure
        }
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

fn targets(entries: &[(IpAddr, &[u16])]) -> OpenPorts {
    entries
        .iter()
        .map(|(ip, ports)| (*ip, ports.iter().copied().collect::<BTreeSet<u16>>()))
        .collect()
}

fn config(threads: usize, attempts_per_target: usize) -> ScanConfig {
    ScanConfig {
        threads,
        attempts_per_target,
        ..ScanConfig::default().quiet()
    }
}

fn forcer(service: &Arc<FakeService>, dict: Dictionary, cfg: ScanConfig) -> BruteForcer {
    BruteForcer::new(service.clone(), dict, cfg, CancellationToken::new())
}

#[tokio::test]
async fn finds_credential_once_despite_duplicates() {
    let service = Arc::new(FakeService::new(&[("admin", "admin123")]));
    let dict = Dictionary::new(["root", "admin", "admin"], ["x", "admin123", "{user}123"]);
    let report = forcer(&service, dict, config(4, 5))
        .run_report(&targets(&[(ip(5), &[22])]))
        .await;

    assert_eq!(report.planned, 9);
    let found = &report.findings[&ip(5)];
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].port, 22);
    assert_eq!(found[0].service, "fake");
    assert_eq!(found[0].credential(), Credential::new("admin", "admin123"));
}

#[tokio::test]
async fn stops_scheduling_after_success() {
    let service = Arc::new(FakeService::new(&[("root", "toor")]));
    let passwords: Vec<String> = std::iter::once("toor".to_string())
        .chain((0..50).map(|i| format!("pw{i}")))
        .collect();
    let dict = Dictionary::new(["root"], passwords);
    let report = forcer(&service, dict, config(1, 1))
        .run_report(&targets(&[(ip(6), &[22])]))
        .await;

    assert_eq!(report.findings[&ip(6)].len(), 1);
    assert_eq!(service.attempts().len(), 1);
    assert_eq!(report.attempts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_valid_credentials_record_one_finding() {
    let service = Arc::new(FakeService {
        delay: Duration::from_millis(20),
        ..FakeService::new(&[("root", "root"), ("admin", "admin")])
    });
    let dict = Dictionary::new(["root", "admin"], ["{user}"]);
    let report = forcer(&service, dict, config(4, 5))
        .run_report(&targets(&[(ip(7), &[2222])]))
        .await;

    let found = &report.findings[&ip(7)];
    assert_eq!(found.len(), 1);
    let cred = found[0].credential();
    assert!(cred == Credential::new("root", "root") || cred == Credential::new("admin", "admin"));
}

#[tokio::test]
async fn connection_failure_skips_every_port_of_the_host() {
    let mut fake = FakeService::new(&[("admin", "admin")]);
    fake.unreachable.insert(ip(1));
    let service = Arc::new(fake);
    let dict = Dictionary::new(["root", "admin"], ["{user}", "x"]);
    let report = forcer(&service, dict, config(1, 1))
        .run_report(&targets(&[(ip(1), &[21, 22, 2222]), (ip(2), &[22])]))
        .await;

    let on_failed_host: Vec<_> = service
        .attempts()
        .into_iter()
        .filter(|(host, _, _)| *host == ip(1))
        .collect();
    assert_eq!(on_failed_host, vec![(ip(1), 21, "root:root".to_string())]);
    assert!(report.skipped_hosts.contains(&ip(1)));
    assert_eq!(report.errors, 1);

    assert!(!report.findings.contains_key(&ip(1)));
    assert_eq!(
        report.findings[&ip(2)][0].credential(),
        Credential::new("admin", "admin")
    );
}

#[tokio::test]
async fn failed_probe_counts_error_without_skipping() {
    let service = Arc::new(FakeService {
        probe_ok: false,
        ..FakeService::new(&[("root", "root")])
    });
    let dict = Dictionary::new(["root"], ["root"]);
    let report = forcer(&service, dict, config(2, 2))
        .run_report(&targets(&[(ip(3), &[22, 2222])]))
        .await;

    assert!(report.findings.is_empty());
    assert_eq!(report.errors, 2);
    assert_eq!(report.attempts, 0);
    assert!(report.skipped_hosts.is_empty());
    assert!(service.attempts().is_empty());
}

#[tokio::test]
async fn cancelled_run_attempts_nothing() {
    let service = Arc::new(FakeService::new(&[("root", "root")]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let findings = BruteForcer::new(
        service.clone(),
        Dictionary::new(["root"], ["root"]),
        config(2, 2),
        cancel,
    )
    .run(&targets(&[(ip(4), &[22])]))
    .await;

    assert!(findings.is_empty());
    assert!(service.attempts().is_empty());
}

#[tokio::test]
async fn each_run_starts_with_a_fresh_skip_set() {
    let mut fake = FakeService::new(&[("root", "root")]);
    fake.unreachable.insert(ip(8));
    let service = Arc::new(fake);
    let bf = forcer(&service, Dictionary::new(["root"], ["root"]), config(1, 1));

    let first = bf.run_report(&targets(&[(ip(8), &[22])])).await;
    assert!(first.skipped_hosts.contains(&ip(8)));
    let second = bf.run_report(&targets(&[(ip(9), &[22])])).await;
    assert!(second.skipped_hosts.is_empty());
    assert_eq!(second.findings[&ip(9)].len(), 1);
}
