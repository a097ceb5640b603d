use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lan_recon_rs::config::{PipelineConfig, ScanConfig, ServiceConfig};
use lan_recon_rs::error::ScanError;
use lan_recon_rs::logging::{init_logging, LogConfig};
use lan_recon_rs::pipeline::{compromised_hosts, Pipeline, PipelineReport};
use lan_recon_rs::{ports, targets};

/// lan-recon-rs: host discovery, TCP port scanning and SSH/FTP weak credential checks.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-recon-rs",
    version,
    about = "Host discovery, TCP port scanning and SSH/FTP weak credential checks for networks you own.",
    long_about = None
)]
struct Cli {
    /// Address, CIDR block, range (a-b) or @file. Repeatable. If omitted, auto-detect local /24.
    #[arg(long, short = 't')]
    targets: Vec<String>,

    /// Port list ("22,80,8000-8100") or preset (common, minimal, web, database, remote, all, full).
    #[arg(long, short = 'p', default_value = "common")]
    ports: String,

    /// Path to ports list file (one port or range per line). Overrides --ports.
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Width of the host and brute force worker pools.
    #[arg(long, default_value_t = 500)]
    threads: usize,

    /// Connect and liveness probe timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Skip host discovery and treat every address as alive.
    #[arg(long = "no-ping", default_value_t = false)]
    no_ping: bool,

    /// Do not try SSH credentials.
    #[arg(long = "no-ssh", default_value_t = false)]
    no_ssh: bool,

    /// Do not try FTP credentials.
    #[arg(long = "no-ftp", default_value_t = false)]
    no_ftp: bool,

    #[arg(long = "ssh-users")]
    ssh_users: Option<PathBuf>,

    #[arg(long = "ssh-passwords")]
    ssh_passwords: Option<PathBuf>,

    #[arg(long = "ftp-users")]
    ftp_users: Option<PathBuf>,

    #[arg(long = "ftp-passwords")]
    ftp_passwords: Option<PathBuf>,

    /// Print the final report as pretty JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// No status line or live announcements.
    #[arg(long, short = 'q', default_value_t = false)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let port_list = match &self.ports_file {
            Some(path) => ports::load_ports_from_path(path)
                .with_context(|| format!("loading ports from {}", path.display()))?,
            None => ports::resolve_ports(&self.ports)?,
        };
        let timeout = Duration::from_millis(self.timeout_ms.max(1));
        let mut scan = ScanConfig {
            threads: self.threads.max(1),
            probe_timeout: timeout,
            connect_timeout: timeout,
            ..ScanConfig::default()
        };
        if self.quiet {
            scan = scan.quiet();
        }

        let mut config = PipelineConfig {
            scan,
            ports: port_list,
            ping: !self.no_ping,
            ..PipelineConfig::default()
        };
        config.ssh = service(
            config.ssh,
            self.no_ssh,
            &self.ssh_users,
            &self.ssh_passwords,
        );
        config.ftp = service(
            config.ftp,
            self.no_ftp,
            &self.ftp_users,
            &self.ftp_passwords,
        );
        Ok(config)
    }

    /// Explicit targets, or every local /24 when none were given.
    fn target_specs(&self) -> Result<Vec<String>> {
        if !self.targets.is_empty() {
            return Ok(self.targets.clone());
        }
        let cidrs = targets::detect_local_cidrs().context("failed to detect local networks")?;
        if cidrs.is_empty() {
            anyhow::bail!("no local IPv4 networks detected; pass --targets");
        }
        Ok(cidrs.iter().map(ToString::to_string).collect())
    }
}

fn service(
    base: ServiceConfig,
    disabled: bool,
    users: &Option<PathBuf>,
    passwords: &Option<PathBuf>,
) -> ServiceConfig {
    let mut config = ServiceConfig {
        users_file: users.clone(),
        passwords_file: passwords.clone(),
        ..base
    };
    if disabled {
        config = config.disabled();
    }
    config
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&LogConfig::new().verbosity(cli.verbose));

    let config = cli.pipeline_config()?;
    let specs = cli.target_specs()?;
    if !cli.json {
        print_config(&cli, &config, &specs);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    info!(targets = specs.len(), ports = config.ports.len(), "starting run");
    let report = Pipeline::new(config, cancel).run(&specs).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&report)?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    if report.interrupted {
        eprintln!("{}", ScanError::Interrupted.to_string().yellow());
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_config(cli: &Cli, config: &PipelineConfig, specs: &[String]) {
    println!("lan-recon-rs configuration:");
    println!("  targets      : {}", specs.join(", "));
    println!(
        "  ports        : {} ({} ports)",
        cli.ports_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| cli.ports.clone()),
        config.ports.len()
    );
    println!("  threads      : {}", config.scan.threads);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!("  ping         : {}", config.ping);
    println!("  ssh          : {}", config.ssh.enabled);
    println!("  ftp          : {}", config.ftp.enabled);
}

fn print_report(report: &PipelineReport) {
    println!(
        "\nAlive hosts: {} (of {} addresses)",
        report.alive.len(),
        report.addresses
    );
    for ip in &report.alive {
        println!("  {ip}");
    }

    let open_count: usize = report.open_ports.values().map(|p| p.len()).sum();
    println!("\nOpen ports: {open_count}");
    let ip_w = report
        .open_ports
        .keys()
        .map(|ip| ip.to_string().len())
        .max()
        .unwrap_or(0)
        .max("ip".len());
    println!("{:<ip_w$}  ports", "ip", ip_w = ip_w);
    println!("{:-<ip_w$}  {:-<5}", "", "", ip_w = ip_w);
    for (ip, ports) in &report.open_ports {
        let list: Vec<String> = ports.iter().map(u16::to_string).collect();
        println!("{:<ip_w$}  {}", ip.to_string(), list.join(","), ip_w = ip_w);
    }

    let findings: Vec<_> = report
        .ssh
        .iter()
        .chain(report.ftp.iter())
        .flat_map(|(ip, found)| found.iter().map(move |f| (ip, f)))
        .collect();
    println!(
        "\nWeak credentials: {} on {} hosts",
        findings.len(),
        compromised_hosts(report).len()
    );
    if findings.is_empty() {
        return;
    }
    let ip_w = findings
        .iter()
        .map(|(ip, _)| ip.to_string().len())
        .max()
        .unwrap_or(0)
        .max("ip".len());
    let user_w = findings
        .iter()
        .map(|(_, f)| f.username.len())
        .max()
        .unwrap_or(0)
        .max("username".len());
    println!(
        "{:<7}  {:<ip_w$}  {:>5}  {:<user_w$}  password",
        "service",
        "ip",
        "port",
        "username",
        ip_w = ip_w,
        user_w = user_w
    );
    println!(
        "{:-<7}  {:-<ip_w$}  {:-<5}  {:-<user_w$}  {:-<8}",
        "",
        "",
        "",
        "",
        "",
        ip_w = ip_w,
        user_w = user_w
    );
    for (ip, f) in findings {
        let line = format!(
            "{:<7}  {:<ip_w$}  {:>5}  {:<user_w$}  {}",
            f.service,
            ip.to_string(),
            f.port,
            f.username,
            f.password,
            ip_w = ip_w,
            user_w = user_w
        );
        println!("{}", line.red());
    }
}
