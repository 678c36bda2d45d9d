//! Tests for loading the TOML config from disk.

use std::io::Write;
use std::time::Duration;

use futaba_replay::config::ReplayConfig;
use futaba_replay::error::ReplayError;

#[test]
fn test_load_full_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
poll_interval_ms = 3000
tick_interval_ms = 250
tail_comparison = 8
start_paused = false
user_agent = "replay-test/1.0"

[keys]
speed_up = "k"
speed_down = "j"
toggle_pause = " "
"#
    )
    .expect("write config");

    let cfg = ReplayConfig::load_from_path(file.path()).expect("load");
    assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
    assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
    assert_eq!(cfg.tail_comparison, 8);
    assert!(!cfg.start_paused);
    assert_eq!(cfg.user_agent.as_deref(), Some("replay-test/1.0"));
    assert_eq!(cfg.keys.speed_up, 'k');
    assert_eq!(cfg.keys.toggle_pause, ' ');
}

#[test]
fn test_missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.toml");
    let err = ReplayConfig::load_from_path(&path).unwrap_err();
    match err {
        ReplayError::Config { path: p, detail } => {
            assert!(p.ends_with("absent.toml"));
            assert!(detail.starts_with("read failed"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_file_names_the_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "tick_interval_ms = [1, 2]").expect("write config");
    let err = ReplayConfig::load_from_path(file.path()).unwrap_err();
    assert!(err.is_user_facing());
    let text = err.to_string();
    assert!(text.contains("parse failed"));
    assert!(text.contains(&file.path().display().to_string()));
}

#[test]
fn test_multi_char_key_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[keys]\nspeed_up = \"up\"").expect("write config");
    assert!(ReplayConfig::load_from_path(file.path()).is_err());
}
