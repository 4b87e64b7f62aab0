use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tracewatch::config::{Config, ConfigError, DEFAULT_GATEWAY_URL};
use tracewatch::models::StageId;


fn write_rc(home: &TempDir, content: &str) {
    let config_dir = home.path().join(".tracewatch");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("rc"), content).unwrap();
}

#[test]
fn test_load_without_rc_uses_defaults() {
    let _guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    std::env::set_var("HOME", temp_dir.path());

    let config = Config::load().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
    assert_eq!(
        Config::config_path().unwrap(),
        temp_dir.path().join(".tracewatch").join("rc")
    );
}

#[test]
fn test_load_reads_rc_from_home() {
    let _guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    write_rc(
        &temp_dir,
        "# gateway under test\ngateway.url = http://gw.internal:9000/\nstages=AUTH,forward\nwatch.idle_timeout=1m30s\nunknown.key=ignored\n",
    );
    std::env::set_var("HOME", temp_dir.path());

    let config = Config::load().unwrap();
    assert_eq!(config.gateway_url, "http://gw.internal:9000");
    assert_eq!(config.stages.as_slice(), &[StageId::Auth, StageId::Forward]);
    assert_eq!(config.idle_timeout, Duration::from_secs(90));
    assert_eq!(config.channel_url("abc"), "ws://gw.internal:9000/ws/trace/abc");
}

#[test]
fn test_load_rejects_bad_rc() {
    let _guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    write_rc(&temp_dir, "stages=RECEIVED,RECEIVED\n");
    std::env::set_var("HOME", temp_dir.path());

    assert!(matches!(Config::load(), Err(ConfigError::DuplicateStage(_))));
}
