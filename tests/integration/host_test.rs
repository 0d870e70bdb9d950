//! Simulated requests through `ModuleHost`.

use modbridge_plugin::prelude::*;
use plugin_hello_world::{SERVER_VARIABLE_NAME, SERVER_VARIABLE_VALUE};

use crate::helpers::{self, TestHost};

#[test]
fn test_hello_world_sets_server_variable() {
    let mut app = TestHost::new();
    assert_eq!(app.host.init().unwrap(), 1);

    let outcome = app.host.begin_request().unwrap();

    assert_eq!(outcome.verdicts.len(), 1);
    assert_eq!(outcome.verdicts[0].plugin, "hello-world");
    assert_eq!(outcome.verdicts[0].verdict, NotificationVerdict::Continue);
    let name = SERVER_VARIABLE_NAME.to_str().unwrap();
    assert_eq!(
        outcome.server_variables.get(name).map(String::as_str),
        Some(SERVER_VARIABLE_VALUE)
    );
}

#[test]
fn test_registration_is_recorded_once() {
    let app = TestHost::new();

    let recorded = app.host.recorded_registrations();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1.request_mask(), RequestNotifications::BEGIN_REQUEST);
    assert!(recorded[0].1.post_request_mask().is_empty());

    let summaries = app.host.plugins().unwrap();
    assert_eq!(summaries[0].id, app.plugin);
    assert_eq!(summaries[0].registrations[0].request_notifications, vec!["BEGIN_REQUEST"]);
    assert!(summaries[0].unsupported_calls.is_empty());
}

#[test]
fn test_each_request_gets_fresh_variables() {
    let mut app = TestHost::new();
    app.host.init().unwrap();

    for _ in 0..3 {
        let outcome = app.host.begin_request().unwrap();
        assert_eq!(outcome.server_variables.len(), 1);
    }
}

#[test]
fn test_two_modules_both_run() {
    let mut app = TestHost::new();
    unsafe { app.host.load_static("hello-world-2", plugin_hello_world::ENTRY) }.unwrap();
    assert_eq!(app.host.init().unwrap(), 2);

    let outcome = app.host.begin_request().unwrap();

    let plugins: Vec<&str> = outcome.verdicts.iter().map(|v| v.plugin.as_str()).collect();
    assert_eq!(plugins, vec!["hello-world", "hello-world-2"]);
    assert_eq!(outcome.server_variables.len(), 1);
}

#[test]
fn test_shutdown_tears_down_instances() {
    let mut app = TestHost::new();
    app.host.init().unwrap();
    assert_eq!(app.host.instance_count(), 1);

    app.host.shutdown();
    assert_eq!(app.host.instance_count(), 0);
    assert_eq!(app.host.plugins().unwrap()[0].state, PluginState::Unloaded);

    app.host.shutdown();
}

#[test]
fn test_rejecting_host_fails_load() {
    let mut host = ModuleHost::new(&helpers::rejecting_config());

    let err = unsafe { host.load_static("hello-world", plugin_hello_world::ENTRY) }.unwrap_err();

    assert_eq!(err.kind, ErrorKind::RegistrationRejected);
    assert_eq!(host.recorded_registrations().len(), 1);
    assert_eq!(host.init().unwrap(), 0);
}

#[test]
fn test_missing_module_file() {
    let mut host = ModuleHost::new(&Default::default());

    let err = host
        .load(std::path::Path::new("definitely-not-a-module.so"))
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::LibraryNotFound);
}

#[test]
fn test_outcome_serializes() {
    let mut app = TestHost::new();
    app.host.init().unwrap();
    let outcome = app.host.begin_request().unwrap();

    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["verdicts"][0]["verdict"], "continue");
    assert_eq!(json["server_variables"]["FromNativeModule"], "Hello World!");
}
