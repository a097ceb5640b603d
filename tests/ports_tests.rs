use lan_recon_rs::error::ScanError;
use lan_recon_rs::ports::{load_ports_from_path, parse_ports_str, resolve_ports, PortPreset};
use std::io::Write;

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8001  # duplicate
        # blank line follows

    "#;

    let ports = parse_ports_str(input).expect("parse ok");
    // Dedup, preserve order of first appearance
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn comma_separated_list() {
    let ports = parse_ports_str("22, 80,8080-8081,22").expect("parse ok");
    assert_eq!(ports, vec![22, 80, 8080, 8081]);
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_ports_str("0\n").is_err());
    assert!(parse_ports_str("70000").is_err());
    assert!(parse_ports_str("90-80").is_err());
}

#[test]
fn presets_and_lists_resolve() {
    assert_eq!(resolve_ports("minimal").unwrap(), vec![80, 443, 8080]);
    assert_eq!(resolve_ports("WEB").unwrap(), PortPreset::Web.ports());
    assert_eq!(resolve_ports("21,22").unwrap(), vec![21, 22]);
    let full = resolve_ports("full").unwrap();
    assert_eq!(full.len(), 10000);
    assert_eq!(full.last(), Some(&10000));

    let common = resolve_ports("common").unwrap();
    assert_eq!(common.len(), 21);
    assert!(common.contains(&11211));
    assert!(!common.contains(&23));

    let err = resolve_ports("bogus").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::UnknownPreset(_))
    ));
    assert!(resolve_ports("# nothing").is_err());
}

#[test]
fn ports_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "21\n22-23 # remote").unwrap();
    assert_eq!(load_ports_from_path(file.path()).unwrap(), vec![21, 22, 23]);
    assert!(load_ports_from_path("/no/such/ports.txt").is_err());
}
