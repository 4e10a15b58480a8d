use super::settings::{PartialSettings, Settings};
use super::{load_config, load_config_from};

use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 9620);
    assert_eq!(settings.broker.max_connections, 1000);
    assert_eq!(settings.broker.take_timeout_ms, 0);
    assert_eq!(settings.log.level, "info");
    assert_eq!(settings.bind_addr(), "0.0.0.0:9620");
}

#[test]
fn test_merge_of_empty_partial_is_default() {
    assert_eq!(Settings::merged(PartialSettings::default()), Settings::default());
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // load_config looks for config/default.toml relative to the cwd.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 9000

        [broker]
        take_timeout_ms = 2500
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    // restore cwd before asserting so a failure doesn't leak into other tests
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.broker.take_timeout_ms, 2500);
    assert_eq!(cfg.broker.max_connections, 1000);
    assert_eq!(cfg.log.level, "info");
}

#[test]
#[serial]
fn env_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("popmq.toml");
    fs::write(&path, "[server]\nport = 9000\n\n[log]\nlevel = \"warn\"\n").expect("write config");

    temp_env::with_vars(
        [
            ("POPMQ_SERVER__PORT", Some("9100")),
            ("POPMQ_BROKER__MAX_CONNECTIONS", Some("5")),
        ],
        || {
            let cfg = load_config_from(Some(&path)).expect("load_config_from failed");
            assert_eq!(cfg.server.port, 9100);
            assert_eq!(cfg.broker.max_connections, 5);
            assert_eq!(cfg.log.level, "warn");
        },
    );
}

#[test]
#[serial]
fn explicit_missing_file_is_an_error() {
    let result = load_config_from(Some(Path::new("/nonexistent/popmq.toml")));
    assert!(result.is_err());
}
