//! Integration tests for file watching functionality

use std::fs;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tamaya::observer::ObserverSettings;
use tamaya::{ChangeObserver, Configuration, FilePropertySource, FileWatcher, MapPropertySource};
use tempfile::TempDir;

/// Polls `condition` until it holds or five seconds have passed.
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    condition()
}

#[test]
fn test_file_watching_integration() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let config_path = temp_dir.path().join("watch_config.json");
    let initial_content = r#"{
        "app": {
            "name": "initial-app",
            "version": "1.0.0"
        },
        "database": {
            "host": "localhost",
            "port": 5432
        }
    }"#;
    fs::write(&config_path, initial_content).expect("Failed to write initial config");

    let source = Arc::new(FilePropertySource::new(&config_path).unwrap());
    let config = Configuration::builder()
        .add_shared_source(source.clone())
        .build()
        .unwrap();
    assert_eq!(config.get("app.name").as_deref(), Some("initial-app"));

    let mut watcher = FileWatcher::new_empty().unwrap();
    watcher.watch_source(Arc::clone(&source)).unwrap();
    let changed_sources = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changed_sources);
    watcher.on_config_change(move |changed| {
        sink.lock().unwrap().extend(changed.iter().cloned());
    });
    watcher.start_watching().unwrap();

    let updated_content = r#"{
        "app": {
            "name": "updated-app",
            "version": "2.0.0"
        },
        "database": {
            "host": "updated-host",
            "port": 3306
        }
    }"#;
    fs::write(&config_path, updated_content).expect("Failed to write updated config");

    assert!(wait_until(|| config.get("app.name").as_deref() == Some("updated-app")));
    assert_eq!(config.get("app.version").as_deref(), Some("2.0.0"));
    assert_eq!(config.get("database.host").as_deref(), Some("updated-host"));
    assert_eq!(config.get_as::<u16>("database.port").unwrap(), Some(3306));
    assert!(wait_until(|| !changed_sources.lock().unwrap().is_empty()));

    watcher.stop_watching();
    assert!(!watcher.is_watching());
}

#[test]
fn test_multiple_file_watching() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let base_path = temp_dir.path().join("base.yaml");
    let local_path = temp_dir.path().join("local.toml");
    fs::write(&base_path, "server:\n  host: base-host\n  port: 80\n").unwrap();
    fs::write(&local_path, "[server]\nport = 8080\n").unwrap();

    let base = Arc::new(FilePropertySource::new(&base_path).unwrap().with_ordinal(100));
    let local = Arc::new(FilePropertySource::new(&local_path).unwrap().with_ordinal(200));
    let config = Configuration::builder()
        .add_shared_source(base.clone())
        .add_shared_source(local.clone())
        .build()
        .unwrap();
    assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(8080));

    let mut watcher = FileWatcher::new_empty().unwrap();
    watcher.watch_source(base).unwrap();
    watcher.watch_source(local).unwrap();
    assert_eq!(watcher.watched_files().len(), 2);
    watcher.start_watching().unwrap();

    fs::write(&base_path, "server:\n  host: new-host\n  port: 81\n").unwrap();
    assert!(wait_until(|| config.get("server.host").as_deref() == Some("new-host")));
    assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(8080));

    fs::write(&local_path, "[server]\nport = 9090\n").unwrap();
    assert!(wait_until(|| config.get_as::<u16>("server.port").unwrap() == Some(9090)));
}

#[test]
fn test_file_watching_with_invalid_content() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.json");
    fs::write(&config_path, r#"{"key": "valid"}"#).unwrap();

    let source = Arc::new(FilePropertySource::new(&config_path).unwrap());
    let config = Configuration::builder()
        .add_shared_source(source.clone())
        .build()
        .unwrap();

    let mut watcher = FileWatcher::new_empty().unwrap();
    watcher.watch_source(source).unwrap();
    let events = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&events);
    watcher.on_config_change(move |_| *counter.lock().unwrap() += 1);
    watcher.start_watching().unwrap();

    fs::write(&config_path, "{ invalid json").unwrap();
    assert!(wait_until(|| *events.lock().unwrap() > 0));
    assert_eq!(config.get("key").as_deref(), Some("valid"));

    fs::write(&config_path, r#"{"key": "fixed"}"#).unwrap();
    assert!(wait_until(|| config.get("key").as_deref() == Some("fixed")));
}

#[test]
fn test_watcher_feeds_change_observer() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("app.properties");
    fs::write(&config_path, "feature.enabled=false\n").unwrap();

    let source = Arc::new(FilePropertySource::new(&config_path).unwrap());
    let config = Configuration::builder()
        .add_source(MapPropertySource::new("defaults").with_value("feature.name", "beta"))
        .add_shared_source(source.clone())
        .build()
        .unwrap();

    let observer = ChangeObserver::with_settings(
        config,
        ObserverSettings {
            period: Duration::from_millis(20),
            initial_delay: Duration::from_millis(0),
            ..ObserverSettings::default()
        },
    );
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    observer.add_listener(move |change| {
        let _ = tx.lock().unwrap().send(change.clone());
    });
    observer.start().unwrap();

    let mut watcher = FileWatcher::new_empty().unwrap();
    watcher.watch_source(source).unwrap();
    watcher.start_watching().unwrap();

    fs::write(&config_path, "feature.enabled=true\n").unwrap();

    // A reload may observe the truncated file first, so skip intermediate events.
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut enabled = false;
    while !enabled && Instant::now() < deadline {
        let Ok(change) = rx.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };
        assert!(!change.is_key_affected("feature.name"));
        enabled = change
            .change("feature.enabled")
            .is_some_and(|entry| entry.new_value.as_deref() == Some("true"));
    }
    assert!(enabled);

    observer.stop();
}
