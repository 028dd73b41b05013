//! Configuration layering: defaults < TOML file < environment < CLI flags.

use blobtier::cli::Cli;
use blobtier::config::Config;
use blobtier::resolve_config;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all BLOBTIER_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("BLOBTIER_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_config_load_from_toml() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
cache_dir = "/var/cache/app"
disk_quota_bytes = 2048
working_set_capacity = 10
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/app")));
    assert_eq!(config.disk_quota_bytes, 2048);
    assert_eq!(config.working_set_capacity, 10);
    // Unset keys keep their defaults.
    assert_eq!(config.memory_quota_bytes, 8 * 1024 * 1024);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();

    let config = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_env_overrides_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "disk_quota_bytes = 2048\n").unwrap();

    std::env::set_var("BLOBTIER_DISK_QUOTA_BYTES", "4096");
    let config = Config::load_from_path(&config_path);
    clear_env();

    assert_eq!(config.unwrap().disk_quota_bytes, 4096);
}

#[test]
fn test_invalid_value_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "disk_quota_bytes = \"lots\"\n").unwrap();

    assert!(Config::load_from_path(&config_path).is_err());
}

#[test]
fn test_cli_flags_override_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "disk_quota_bytes = 2048\nmemory_quota_bytes = 512\n",
    )
    .unwrap();
    let config_arg = config_path.to_string_lossy().into_owned();

    let cli = Cli::try_parse_from([
        "blobtier",
        "--config",
        config_arg.as_str(),
        "--cache-dir",
        "/tmp/blobs",
        "--disk-quota",
        "1MiB",
        "stats",
    ])
    .unwrap();
    let config = resolve_config(&cli).unwrap();

    assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/blobs")));
    assert_eq!(config.disk_quota_bytes, 1_048_576);
    assert_eq!(config.memory_quota_bytes, 512);
}
