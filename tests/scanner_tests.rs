use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use lan_recon_rs::config::ScanConfig;
use lan_recon_rs::scanner::PortScanner;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn config() -> ScanConfig {
    ScanConfig {
        connect_timeout: Duration::from_millis(300),
        ..ScanConfig::default().quiet()
    }
}

/// A port that was just bound and released, so nothing listens on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn finds_only_the_listening_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((_sock, _)) = listener.accept().await {}
    });

    let mut ports = vec![open];
    for _ in 0..4 {
        ports.push(closed_port().await);
    }
    let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let hosts: BTreeSet<IpAddr> = [localhost].into_iter().collect();

    let report = PortScanner::new(config(), CancellationToken::new())
        .scan_detailed(&hosts, &ports)
        .await;
    assert_eq!(report.hosts_total, 1);
    assert_eq!(report.hosts_done, 1);
    assert_eq!(report.open_count, 1);

    let open_ports = report.open_ports();
    assert_eq!(open_ports.len(), 1);
    assert_eq!(open_ports[&localhost].iter().copied().collect::<Vec<_>>(), vec![open]);
}

#[tokio::test]
async fn cancelled_scan_returns_partial_result() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let hosts: BTreeSet<IpAddr> = [IpAddr::V4(Ipv4Addr::LOCALHOST)].into_iter().collect();
    let open = PortScanner::new(config(), cancel)
        .scan(&hosts, &[closed_port().await])
        .await;
    assert!(open.is_empty());
}
