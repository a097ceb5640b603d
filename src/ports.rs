use anyhow::{bail, Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ScanError;

/// Parse a port specification into a deduplicated list of TCP ports (1..=65535).
///
/// Entries are separated by commas and/or newlines:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` on a line is ignored
/// - whitespace and empty entries are ignored
///
/// Order of first appearance is preserved.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for entry in line.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            if let Some((a, b)) = entry.split_once('-') {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port_str(entry)
                .with_context(|| format!("line {line_no}: invalid port value: {entry}"))?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

/// Load a ports list from a file path. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

/// Resolve either a preset name (`common`, `web`, ...) or an explicit port list.
pub fn resolve_ports(spec: &str) -> Result<Vec<u16>> {
    let spec = spec.trim();
    if spec.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        let preset: PortPreset = spec.parse()?;
        return Ok(preset.ports());
    }
    let ports = parse_ports_str(spec)?;
    if ports.is_empty() {
        return Err(ScanError::InvalidPort(format!("no ports in '{spec}'")).into());
    }
    Ok(ports)
}

/// Named port groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortPreset {
    Common,
    Minimal,
    Web,
    Database,
    Remote,
    /// Union of every preset above.
    All,
    /// 1-10000.
    Full,
}

const COMMON: &[u16] = &[
    21, 22, 80, 81, 135, 139, 443, 445, 1433, 1521, 3306, 5432, 6379, 7001, 8000, 8080, 8089, 9000,
    9200, 11211, 27017,
];
const FULL_MAX: u16 = 10000;
const MINIMAL: &[u16] = &[80, 443, 8080];
const WEB: &[u16] = &[80, 81, 443, 7001, 8000, 8080, 8089, 9000];
const DATABASE: &[u16] = &[1433, 1521, 3306, 5432, 6379, 27017];
const REMOTE: &[u16] = &[22, 23, 3389];

impl PortPreset {
    pub fn ports(self) -> Vec<u16> {
        match self {
            PortPreset::Common => COMMON.to_vec(),
            PortPreset::Minimal => MINIMAL.to_vec(),
            PortPreset::Web => WEB.to_vec(),
            PortPreset::Database => DATABASE.to_vec(),
            PortPreset::Remote => REMOTE.to_vec(),
            PortPreset::All => [COMMON, MINIMAL, WEB, DATABASE, REMOTE]
                .iter()
                .flat_map(|group| group.iter().copied())
                .collect::<BTreeSet<u16>>()
                .into_iter()
                .collect(),
            PortPreset::Full => (1..=FULL_MAX).collect(),
        }
    }
}

impl FromStr for PortPreset {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "common" => Ok(PortPreset::Common),
            "minimal" => Ok(PortPreset::Minimal),
            "web" => Ok(PortPreset::Web),
            "database" | "db" => Ok(PortPreset::Database),
            "remote" => Ok(PortPreset::Remote),
            "all" => Ok(PortPreset::All),
            "full" => Ok(PortPreset::Full),
            _ => Err(ScanError::UnknownPreset(s.to_string())),
        }
    }
}

impl fmt::Display for PortPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortPreset::Common => "common",
            PortPreset::Minimal => "minimal",
            PortPreset::Web => "web",
            PortPreset::Database => "database",
            PortPreset::Remote => "remote",
            PortPreset::All => "all",
            PortPreset::Full => "full",
        };
        f.write_str(name)
    }
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!(ScanError::InvalidPort(format!("port out of range: {val}")));
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comma_separated() {
        let ports = parse_ports_str("22, 80,443").unwrap();
        assert_eq!(ports, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let input = "8000-8002\n80\n8001,80\n";
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002, 80]);
    }

    #[test]
    fn parse_with_comments_and_whitespace() {
        let input = r#"
            # common web ports
            80  # http
            443,8443 # https
            8000-8002   # dev servers

            # blank lines and spaces should be fine
        "#;
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![80, 443, 8443, 8000, 8001, 8002]);
    }

    #[test]
    fn invalid_values_error() {
        assert!(parse_ports_str("70000\n").is_err());
        assert!(parse_ports_str("90-80").is_err());
        assert!(parse_ports_str("ssh").is_err());
    }

    #[test]
    fn resolve_preset_by_name() {
        assert_eq!(resolve_ports("minimal").unwrap(), vec![80, 443, 8080]);
        assert_eq!(resolve_ports("Remote").unwrap(), vec![22, 23, 3389]);
        assert_eq!(resolve_ports("full").unwrap().len(), 10000);
    }

    #[test]
    fn resolve_unknown_preset_fails() {
        let err = resolve_ports("everything").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::UnknownPreset(_))
        ));
    }

    #[test]
    fn resolve_empty_list_fails() {
        assert!(resolve_ports(" , ").is_err());
    }

    #[test]
    fn all_preset_is_sorted_union() {
        let all = PortPreset::All.ports();
        let mut sorted = all.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(all, sorted);
        assert!(all.contains(&81) && all.contains(&27017) && all.contains(&5900));
    }
}
