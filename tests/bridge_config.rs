use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use dslr_webcam::config::BridgeConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DSLR_WEBCAM_CONFIG",
        "DSLR_WEBCAM_CAMERA",
        "DSLR_WEBCAM_DEVICE",
        "DSLR_WEBCAM_RETRY_ATTEMPTS",
        "DSLR_WEBCAM_RETRY_BACKOFF_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = BridgeConfig::load().expect("load config");

    assert_eq!(cfg.width, 640);
    assert_eq!(cfg.height, 426);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.retry.backoff, Duration::from_millis(200));
    assert_eq!(cfg.stats_interval, Duration::from_secs(10));
    let pipeline = cfg.pipeline_config().expect("pipeline config");
    assert_eq!(pipeline.dims.yuyv_len(), 545_120);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": { "uri": "stub://bench" },
            "sink": { "device": "/tmp/preview.yuyv" },
            "frame": { "width": 1024, "height": 680 },
            "retry": { "max_attempts": 5, "backoff_ms": 50 },
            "stats_interval_secs": 30
        }"#,
    );

    std::env::set_var("DSLR_WEBCAM_CONFIG", file.path());
    std::env::set_var("DSLR_WEBCAM_DEVICE", "-");
    std::env::set_var("DSLR_WEBCAM_RETRY_ATTEMPTS", "1");

    let cfg = BridgeConfig::load().expect("load config");

    assert_eq!(cfg.camera_uri, "stub://bench");
    assert_eq!(cfg.sink_device, "-");
    assert_eq!(cfg.width, 1024);
    assert_eq!(cfg.height, 680);
    assert_eq!(cfg.retry.max_attempts, 1);
    assert_eq!(cfg.retry.backoff, Duration::from_millis(50));
    assert_eq!(cfg.stats_interval, Duration::from_secs(30));
    assert_eq!(cfg.camera_config().expect("camera config").dims.width, 1024);

    clear_env();
}

#[test]
fn rejects_odd_width() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "frame": { "width": 641 } }"#);
    let err = BridgeConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("even"));
}

#[test]
fn rejects_geometry_too_large_for_the_sink() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "frame": { "width": 65536, "height": 32768 } }"#);
    let err = BridgeConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("too large"));
}

#[test]
fn rejects_zero_retry_attempts() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DSLR_WEBCAM_RETRY_ATTEMPTS", "0");
    assert!(BridgeConfig::load().is_err());

    std::env::set_var("DSLR_WEBCAM_RETRY_ATTEMPTS", "three");
    assert!(BridgeConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("{ not json");
    assert!(BridgeConfig::load_from(Some(file.path())).is_err());

    let missing = std::env::temp_dir().join("dslr-webcam-missing-config.json");
    assert!(BridgeConfig::load_from(Some(&missing)).is_err());
}
