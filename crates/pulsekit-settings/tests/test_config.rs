use pulsekit_core::{ExchangeData, ExchangeDataCommand};
use pulsekit_queue::DetectionMethod;
use pulsekit_settings::{Config, QueueKind, SettingsError};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_toml_with_partial_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pulsekit.toml");
    std::fs::write(
        &path,
        r#"
[machine]
machine_id = 12
machine_module_id = 3

[detection]
methods = ["part_count", "cycle_start_signal"]

[output]
flicker_window_ms = 2000
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.machine.machine_id, 12);
    assert_eq!(config.machine.acquisition_name, "default");
    assert_eq!(config.output.mode_refresh_secs, 60);

    let options = config.output_options().unwrap();
    assert_eq!(options.machine_module_id, 3);
    assert_eq!(options.flicker_window, Duration::from_secs(2));
    assert_eq!(
        options.detection,
        DetectionMethod::PART_COUNT | DetectionMethod::CYCLE_START_SIGNAL
    );
}

#[test]
fn test_save_and_reload_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pulsekit.json");

    let mut config = Config::new();
    config.machine.acquisition_name = "lathe-2".to_string();
    config.mtconnect.enabled = true;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pulsekit.toml");
    std::fs::write(&path, "[queue]\nkind = \"file\"\n").unwrap();

    let err = Config::load_from_file(&path).unwrap_err();
    assert!(matches!(err, SettingsError::Config(_)));
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, SettingsError::LoadError { .. }));
}

#[test]
fn test_build_file_queue() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new();
    config.queue.kind = QueueKind::File;
    config.queue.path = Some(dir.path().join("queue.jsonl"));
    config.queue.capacity = Some(1);

    let queue = config.build_queue().unwrap();
    let record = ExchangeData::start_cycle(1, 1, chrono::Utc::now());
    assert_eq!(record.command, ExchangeDataCommand::StartCycle);
    queue.lock().enqueue(record.clone()).unwrap();
    assert!(queue.lock().enqueue(record).is_err());
    assert_eq!(queue.lock().len().unwrap(), 1);
    assert!(dir.path().join("queue.jsonl").exists());
}

#[test]
fn test_tracker_persists_under_configured_directory() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new();
    config.output.tracker_directory = Some(dir.path().to_path_buf());

    let tracker = config.build_tracker();
    assert_eq!(tracker.directory(), Some(dir.path().join("1-1").as_path()));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());

    let mut config = Config::default();
    config.machine.machine_id = 9;
    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_or_default(&path).unwrap().machine.machine_id, 9);

    let default_path = Config::default_path();
    if let Ok(default_path) = default_path {
        assert!(default_path.ends_with("pulsekit/config.toml"));
    }
}
