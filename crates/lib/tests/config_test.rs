//! # Configuration Tests
//!
//! Checks the layering of defaults, the optional YAML file and `COURSESYNC_*`
//! environment variables.

use coursesync::constants::{DEFAULT_AI_CACHE_CAPACITY, DEFAULT_API_BASE_URL, DEFAULT_DB_FILE};
use coursesync::SyncConfig;
use std::env;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

// Environment variables are process-wide, so tests touching them run one at a time.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env_vars() {
    for key in [
        "COURSESYNC_API_BASE_URL",
        "COURSESYNC_DB_PATH",
        "COURSESYNC_MEDIA_DIR",
        "COURSESYNC_REQUEST_TIMEOUT_SECS",
        "COURSESYNC_AI_CACHE_CAPACITY",
        "COURSESYNC_BACKGROUND_SYNC_INTERVAL_SECS",
        "COURSESYNC_START_ONLINE",
    ] {
        env::remove_var(key);
    }
}

#[test]
fn test_defaults_apply_without_file_or_env() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();

    let config = SyncConfig::load_from(None).expect("Defaults should load");

    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.db_path, DEFAULT_DB_FILE);
    assert_eq!(config.ai_cache_capacity, DEFAULT_AI_CACHE_CAPACITY);
    assert!(config.start_online);
    assert_eq!(config.background_sync_interval(), None);
}

#[test]
fn test_missing_file_is_not_an_error() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();

    let config = SyncConfig::load_from(Some("/nonexistent/coursesync.yml"))
        .expect("A missing file should be skipped");

    assert_eq!(config, SyncConfig::default());
}

#[test]
fn test_yaml_file_overrides_defaults() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();

    // --- Arrange ---
    let mut file = tempfile::Builder::new()
        .suffix(".yml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "api_base_url: https://learn.example.com\nai_cache_capacity: 50\nbackground_sync_interval_secs: 15"
    )
    .expect("write config");

    // --- Act ---
    let config = SyncConfig::load_from(file.path().to_str()).expect("File should load");

    // --- Assert ---
    assert_eq!(config.api_base_url, "https://learn.example.com");
    assert_eq!(config.ai_cache_capacity, 50);
    assert_eq!(config.background_sync_interval(), Some(Duration::from_secs(15)));
    assert_eq!(config.db_path, DEFAULT_DB_FILE);
}

#[test]
fn test_env_overrides_file_and_defaults() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();

    // --- Arrange ---
    let mut file = tempfile::Builder::new()
        .suffix(".yml")
        .tempfile()
        .expect("temp file");
    writeln!(file, "api_base_url: https://from-file.example.com").expect("write config");
    env::set_var("COURSESYNC_API_BASE_URL", "https://from-env.example.com");
    env::set_var("COURSESYNC_DB_PATH", ":memory:");
    env::set_var("COURSESYNC_REQUEST_TIMEOUT_SECS", "5");
    env::set_var("COURSESYNC_START_ONLINE", "false");
    env::set_var("COURSESYNC_BACKGROUND_SYNC_INTERVAL_SECS", "0");

    // --- Act ---
    let config = SyncConfig::load_from(file.path().to_str()).expect("Config should load");

    // --- Assert ---
    assert_eq!(config.api_base_url, "https://from-env.example.com");
    assert_eq!(config.db_path, ":memory:");
    assert_eq!(config.request_timeout(), Duration::from_secs(5));
    assert!(!config.start_online);
    assert_eq!(
        config.background_sync_interval(),
        None,
        "A zero interval means foreground-only draining"
    );

    clear_env_vars();
}

#[test]
fn test_unparsable_value_is_an_error() {
    let _lock = ENV_LOCK.lock().unwrap();
    clear_env_vars();
    env::set_var("COURSESYNC_AI_CACHE_CAPACITY", "lots");

    let result = SyncConfig::load_from(None);

    assert!(result.is_err());
    clear_env_vars();
}
