use std::path::PathBuf;

use spyglass_config::{ConfigError, SpyglassConfig};

#[test]
fn empty_config_uses_defaults() {
    let config = SpyglassConfig::load_from_str("").expect("empty config should parse");
    assert_eq!(config, SpyglassConfig::default());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.breakpoints.event_capacity, 256);
    assert!(config.source_maps.enabled);
    assert!(!config.formatting.format_source);
}

#[test]
fn parses_every_section() {
    let text = r#"
[logging]
level = "debug"
json = true

[breakpoints]
storage_path = "/var/lib/spyglass/breakpoints.json"
event_capacity = 16

[source_maps]
enabled = false
inspected_url = "http://localhost:8080/index.html"

[formatting]
format_source = true
"#;

    let config = SpyglassConfig::load_from_str(text).expect("config should parse");
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert_eq!(
        config.breakpoints.storage_path,
        Some(PathBuf::from("/var/lib/spyglass/breakpoints.json"))
    );
    assert_eq!(config.breakpoints.event_capacity, 16);
    assert!(!config.source_maps.enabled);
    assert_eq!(
        config.source_maps.inspected_url.as_ref().map(|url| url.as_str()),
        Some("http://localhost:8080/index.html")
    );
    assert!(config.formatting.format_source);
}

#[test]
fn unknown_keys_are_rejected_without_echoing_input() {
    let err = SpyglassConfig::load_from_str("[breakpoints]\nstorage = \"secret-path\"\n")
        .expect_err("unknown key should fail");
    let ConfigError::Toml(message) = &err else {
        panic!("expected toml error, got {err:?}");
    };
    assert!(message.contains("storage"), "unexpected message: {message}");
}

#[test]
fn zero_event_capacity_is_invalid() {
    let err = SpyglassConfig::load_from_str("[breakpoints]\nevent_capacity = 0\n")
        .expect_err("zero capacity should fail");
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
}

#[test]
fn relative_storage_path_resolves_against_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spyglass.toml");
    std::fs::write(&path, "[breakpoints]\nstorage_path = \"state/bps.json\"\n").unwrap();

    let config = SpyglassConfig::load_from_path(&path).expect("config should load");
    assert_eq!(
        config.breakpoints.storage_path,
        Some(dir.path().join("state/bps.json"))
    );
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    let err = SpyglassConfig::load_from_path(&path).expect_err("missing file should fail");
    assert!(
        err.to_string().contains("missing.toml"),
        "unexpected message: {err}"
    );
}
