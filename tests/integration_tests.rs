//! Integration tests for the terminal host against a machine without GPUs

use std::fs;

use clap::Parser;
use serial_test::serial;
use tempfile::TempDir;

use gkn_core::{decode_with, settings, BackendKind, BindError, ConfigRecord, MetricKind};
use gknvidia::app::App;
use gknvidia::config::Options;
use gknvidia::ui::panel_lines;

const MISSING_LIBRARY: &str = "/nonexistent/gknvidia/libnvidia-ml.so";

#[test]
#[serial]
fn test_create_without_gpus_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gknvidia.conf");
    fs::write(&path, format!("nvidia NVML 7ff abcdefghijk {}\n", MISSING_LIBRARY)).unwrap();

    let mut app = App::load(path);
    // The stored path does not load, so the record falls back to defaults
    assert_eq!(app.plugin.encode_config(), ConfigRecord::default().encode());

    app.create();

    // Whatever the default path did on this machine, a missing library
    // always leaves the panel empty
    let err = app
        .plugin
        .rebind(BackendKind::Nvml, MISSING_LIBRARY)
        .unwrap_err();
    assert!(matches!(err, BindError::NotFound { .. }));
    app.refresh();
    assert!(!app.plugin.is_loaded());
    assert!(app.plugin.inventory().is_empty());
    assert!(app.rows.is_empty());
    assert!(panel_lines(&app.rows, 40).is_empty());
}

#[test]
#[serial]
fn test_options_survive_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("gknvidia.conf");

    let mut app = App::load(path.clone());
    app.options_idx = 8;
    assert_eq!(app.selected_metric(), Some(MetricKind::PowerDraw));
    app.toggle_selected();
    app.move_selected(true);
    assert!(app.save());

    // Path validity depends on the machine, so decode without checking it
    let line = settings::read_record_line(&path).unwrap().unwrap();
    assert_eq!(line, "NVML 6ff abcdefgihjk libnvidia-ml.so");
    let record = decode_with(&line, |_, _| true).unwrap();
    assert!(!record.registry.is_enabled(MetricKind::PowerDraw));
    assert_eq!(record.registry.current_order()[7], MetricKind::PowerDraw);
    assert_eq!(record.backend, BackendKind::Nvml);
}

#[test]
#[serial]
fn test_save_keeps_foreign_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gknvidia.conf");
    fs::write(&path, "clock_meter 1\n").unwrap();

    let mut app = App::load(path.clone());
    assert!(app.save());

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("clock_meter 1\n"));
    assert!(contents.contains("nvidia NVML 7ff abcdefghijk libnvidia-ml.so\n"));
}

#[test]
#[serial]
fn test_default_settings_path_follows_xdg() {
    let dir = TempDir::new().unwrap();
    let previous = std::env::var_os("XDG_CONFIG_HOME");
    std::env::set_var("XDG_CONFIG_HOME", dir.path());

    let options = Options::try_parse_from(["gknvidia"]).unwrap();
    assert_eq!(
        options.settings_path(),
        dir.path().join("gknvidia").join("gknvidia.conf")
    );

    match previous {
        Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
}
