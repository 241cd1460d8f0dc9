use std::path::Path;
use std::time::Duration;

use clap::Parser;

use filecity::config::{determine_root_dir, parse_bool, resolve_root_dir, Cli};
use filecity::error::FileCityError;
use filecity::lsof::MIN_INTERVAL;

use crate::helpers::TestRoot;

#[test]
fn test_parse_bool_accepts_common_spellings() {
    for value in ["1", "true", "T", "yes", "Y", " on ", "TRUE"] {
        assert!(parse_bool(value), "{:?}", value);
    }
    for value in ["0", "false", "off", "no", "", "maybe"] {
        assert!(!parse_bool(value), "{:?}", value);
    }
}

#[test]
fn test_resolve_root_dir_validates() {
    let root = TestRoot::new();
    let file = root.write("file.txt", "x");

    assert_eq!(resolve_root_dir(root.path()).unwrap(), root.path());
    assert!(matches!(
        resolve_root_dir(&file),
        Err(FileCityError::Config(_))
    ));
    assert!(matches!(
        resolve_root_dir(&root.path().join("missing")),
        Err(FileCityError::Config(_))
    ));
}

#[test]
fn test_unusable_root_falls_back_to_home() {
    let Some(home) = dirs::home_dir().and_then(|home| std::fs::canonicalize(home).ok()) else {
        return;
    };
    let root = TestRoot::new();

    let resolved = determine_root_dir(Some(&root.path().join("missing"))).unwrap();
    assert_eq!(resolved, home);
    assert_eq!(determine_root_dir(None).unwrap(), home);
    assert_eq!(determine_root_dir(Some(root.path())).unwrap(), root.path());
}

#[test]
fn test_tilde_expands_to_home_directory() {
    let Some(home) = dirs::home_dir().and_then(|home| std::fs::canonicalize(home).ok()) else {
        return;
    };

    assert_eq!(resolve_root_dir(Path::new("~")).unwrap(), home);
}

#[test]
fn test_cli_flags_build_config() {
    let root = TestRoot::new();
    let cli = Cli::try_parse_from([
        "filecity",
        "--root-dir",
        root.path().to_str().unwrap(),
        "--host",
        "127.0.0.1",
        "--port",
        "9001",
        "--no-reload",
        "--no-lsof",
        "--favourites-file",
        "/tmp/favs.json",
    ])
    .unwrap();
    let config = cli.into_config().unwrap();

    assert_eq!(config.root_dir, root.path());
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 9001);
    assert!(!config.reload);
    assert!(!config.lsof_requested);
    assert!(!config.lsof_enabled());
    assert_eq!(config.favourites_file.to_str(), Some("/tmp/favs.json"));
}

#[test]
fn test_last_toggle_wins() {
    let cli = Cli::try_parse_from(["filecity", "--no-reload", "--reload"]).unwrap();
    assert!(cli.reload);
    assert!(!cli.no_reload);
}

#[test]
fn test_missing_lsof_binary_disables_monitoring() {
    let root = TestRoot::new();
    let cli = Cli::try_parse_from([
        "filecity",
        "--root-dir",
        root.path().to_str().unwrap(),
        "--lsof-enabled",
        "--lsof-binary",
        "/nonexistent/bin/lsof",
    ])
    .unwrap();
    let config = cli.into_config().unwrap();

    assert!(config.lsof_requested);
    assert!(config.lsof.is_none());
}

#[test]
fn test_lsof_interval_is_clamped() {
    let root = TestRoot::new();
    let cli = Cli::try_parse_from([
        "filecity",
        "--root-dir",
        root.path().to_str().unwrap(),
        "--lsof-enabled",
        "--lsof-binary",
        "/bin/sh",
        "--lsof-interval-ms",
        "100",
    ])
    .unwrap();
    let config = cli.into_config().unwrap();

    let settings = config.lsof.expect("lsof should be enabled");
    assert_eq!(settings.interval, MIN_INTERVAL);
    assert!(settings.interval >= Duration::from_millis(500));
}
