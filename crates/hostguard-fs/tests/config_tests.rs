use std::fs;
use std::path::Path;

use hostguard_fs::{ConfigFormat, Error, load_config};
use rstest::rstest;
use serde::Deserialize;
use tempfile::TempDir;

#[derive(Debug, PartialEq, Deserialize)]
struct Sample {
    root: String,
    retries: u32,
}

#[rstest]
#[case("settings.toml", "root = \"/var/db/hostguard\"\nretries = 3\n")]
#[case("settings.json", r#"{"root": "/var/db/hostguard", "retries": 3}"#)]
#[case("settings.yml", "root: /var/db/hostguard\nretries: 3\n")]
fn test_load_by_extension(#[case] name: &str, #[case] content: &str) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(name);
    fs::write(&path, content).unwrap();

    let loaded: Sample = load_config(&path).unwrap();
    assert_eq!(
        loaded,
        Sample {
            root: "/var/db/hostguard".into(),
            retries: 3,
        }
    );
}

#[test]
fn test_detect_is_case_insensitive() {
    assert_eq!(
        ConfigFormat::detect(Path::new("/etc/hostguard.TOML")).unwrap(),
        ConfigFormat::Toml
    );
}

#[test]
fn test_load_rejects_unknown_extension() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("settings.ini");
    fs::write(&path, "root=/").unwrap();

    let result: Result<Sample, _> = load_config(&path);
    assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
}

#[test]
fn test_load_reports_parse_errors_with_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    fs::write(&path, "root = [unterminated").unwrap();

    let err = load_config::<Sample>(&path).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { format: "TOML", .. }));
    assert!(err.to_string().contains("broken.toml"));
}
