use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::Result as AnyResult;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4AddrRange, Ipv4Net, Ipv6AddrRange};
use tracing::{debug, warn};

use crate::error::{Result, ScanError};

/// Maximum nesting of `@list` files.
const MAX_LIST_DEPTH: usize = 8;

/// Lazy sequence of addresses produced from one or more target tokens.
pub struct Targets {
    inner: Box<dyn Iterator<Item = IpAddr> + Send>,
}

impl Targets {
    fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = IpAddr> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for Targets {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        self.inner.next()
    }
}

/// Expand a single token, reporting (not raising) malformed input.
///
/// A token is a literal address (`192.168.1.10`, `fe80::1`), a network block
/// (`192.168.1.0/24`, host bits may be set), an inclusive range
/// (`10.0.0.5-10.0.0.20`) or `@targets.txt`, a list file with one token per line.
/// Blocks and ranges are expanded lazily.
pub fn expand(spec: &str) -> Targets {
    expand_or_report(spec, 0)
}

/// Expand a batch of tokens. A bad token contributes nothing; its siblings are unaffected.
pub fn expand_all<I, S>(specs: I) -> Targets
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let specs: Vec<String> = specs.into_iter().map(|s| s.as_ref().to_string()).collect();
    Targets::new(specs.into_iter().flat_map(|spec| expand(&spec)))
}

/// Fallible form of [`expand`].
pub fn try_expand(spec: &str) -> Result<Targets> {
    expand_at_depth(spec.trim(), 0)
}

fn expand_or_report(spec: &str, depth: usize) -> Targets {
    match expand_at_depth(spec.trim(), depth) {
        Ok(targets) => targets,
        Err(e) => {
            warn!(target_spec = spec, error = %e, "skipping target");
            Targets::empty()
        }
    }
}

fn expand_at_depth(spec: &str, depth: usize) -> Result<Targets> {
    if spec.is_empty() {
        return Err(ScanError::invalid_target(spec, "empty target"));
    }
    if let Some(path) = spec.strip_prefix('@') {
        return expand_list(spec, Path::new(path.trim()), depth);
    }
    if spec.contains('/') {
        let net: IpNet = spec
            .parse()
            .map_err(|e| ScanError::invalid_target(spec, format!("{e}")))?;
        // IPv6 blocks drop the Subnet-Router anycast (network) address, except /127 and /128.
        let skip_network = matches!(net, IpNet::V6(v6) if v6.prefix_len() < 127);
        return Ok(Targets::new(net.hosts().skip(usize::from(skip_network))));
    }
    if let Some((start, end)) = spec.split_once('-') {
        return expand_range(spec, start.trim(), end.trim());
    }
    let ip: IpAddr = spec
        .parse()
        .map_err(|_| ScanError::invalid_target(spec, "not an IP address"))?;
    Ok(Targets::new(std::iter::once(ip)))
}

fn expand_list(spec: &str, path: &Path, depth: usize) -> Result<Targets> {
    if depth >= MAX_LIST_DEPTH {
        return Err(ScanError::invalid_target(
            spec,
            format!("target lists nested deeper than {MAX_LIST_DEPTH} levels"),
        ));
    }
    let content = fs::read_to_string(path).map_err(|source| ScanError::TargetList {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    debug!(path = %path.display(), entries = lines.len(), "loaded target list");
    Ok(Targets::new(
        lines
            .into_iter()
            .flat_map(move |line| expand_or_report(&line, depth + 1)),
    ))
}

fn expand_range(spec: &str, start: &str, end: &str) -> Result<Targets> {
    let start: IpAddr = start
        .parse()
        .map_err(|_| ScanError::invalid_target(spec, format!("invalid start address: {start}")))?;
    let end: IpAddr = end
        .parse()
        .map_err(|_| ScanError::invalid_target(spec, format!("invalid end address: {end}")))?;
    if start > end {
        return Err(ScanError::invalid_target(spec, "start is after end"));
    }
    match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => {
            Ok(Targets::new(Ipv4AddrRange::new(s, e).map(IpAddr::V4)))
        }
        (IpAddr::V6(s), IpAddr::V6(e)) => {
            Ok(Targets::new(Ipv6AddrRange::new(s, e).map(IpAddr::V6)))
        }
        _ => Err(ScanError::invalid_target(
            spec,
            "range mixes IPv4 and IPv6 addresses",
        )),
    }
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> AnyResult<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<IpNet> = set.into_iter().map(IpNet::V4).collect();
    cidrs.sort();
    Ok(cidrs)
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}
