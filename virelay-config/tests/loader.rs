use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tempfile::tempdir;

use virelay_config::{load, ConfigError, Settings};

// Environment overrides are process-wide; serialize the tests that touch
// them.
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const OVERRIDE_KEYS: &[&str] = &[
    "VIRELAY_SERVER_HOST",
    "VIRELAY_SERVER_PORT",
    "VIRELAY_STORAGE_BASE_PATH",
    "VIRELAY_CACHE_BLOCK_SIZE",
    "VIRELAY_FFMPEG_PATH",
    "VIRELAY_SEGMENT_SECONDS",
];

fn clear_overrides() {
    for key in OVERRIDE_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let settings = load(None).expect("defaults load");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.cache.block_size, 64 * 1024);
    assert_eq!(settings.transcode.ffmpeg_path, "ffmpeg");
}

#[test]
fn toml_file_overrides_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let dir = tempdir().unwrap();
    let path = dir.path().join("virelay.toml");
    std::fs::write(
        &path,
        r#"
[server]
host = "0.0.0.0"
port = 9000

[storage]
base_path = "/srv/virelay"

[cache]
block_size = 4096
"#,
    )
    .unwrap();

    let settings = load(Some(&path)).expect("file load");
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 9000);
    assert_eq!(settings.storage.base_path, PathBuf::from("/srv/virelay"));
    assert_eq!(settings.cache.block_size, 4096);
    // Sections absent from the file keep their defaults.
    assert_eq!(settings.transcode.segment_seconds, 6);
}

#[test]
fn environment_overrides_win_over_the_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let dir = tempdir().unwrap();
    let path = dir.path().join("virelay.toml");
    std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

    unsafe {
        std::env::set_var("VIRELAY_SERVER_PORT", "9100");
        std::env::set_var("VIRELAY_CACHE_BLOCK_SIZE", "512");
    }
    let settings = load(Some(&path)).expect("load with overrides");
    clear_overrides();

    assert_eq!(settings.server.port, 9100);
    assert_eq!(settings.cache.block_size, 512);
}

#[test]
fn malformed_override_is_reported_with_its_key() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    unsafe { std::env::set_var("VIRELAY_SERVER_PORT", "not-a-port") };
    let err = load(None).unwrap_err();
    clear_overrides();

    match err {
        ConfigError::InvalidOverride { key, .. } => assert_eq!(key, "VIRELAY_SERVER_PORT"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_keys_in_the_file_reject() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let dir = tempdir().unwrap();
    let path = dir.path().join("virelay.toml");
    std::fs::write(&path, "[server]\nhots = \"typo\"\n").unwrap();

    assert!(matches!(load(Some(&path)), Err(ConfigError::Parse { .. })));
}

#[test]
fn zero_block_size_rejects() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let dir = tempdir().unwrap();
    let path = dir.path().join("virelay.toml");
    std::fs::write(&path, "[cache]\nblock_size = 0\n").unwrap();

    assert!(matches!(load(Some(&path)), Err(ConfigError::Invalid(_))));
}

#[test]
fn missing_file_is_a_read_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_overrides();

    let err = load(Some(std::path::Path::new("/definitely/not/here.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
