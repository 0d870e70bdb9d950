//! End-to-end tests against the bundled hello-world module.

use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use modbridge_plugin::callbacks::{CallbackTable, ContextCallbacks, ServerVariableCallback};
use modbridge_plugin::manager::{RegistrationRecorder, ServerVariables};
use modbridge_plugin::prelude::*;

/// Records each call and answers with a fixed status.
struct RecordingSink {
    status: HResult,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn new(status: HResult) -> Arc<Self> {
        Arc::new(Self {
            status,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ServerVariableCallback for RecordingSink {
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        self.calls.lock().unwrap().push((
            name.to_string_lossy().into_owned(),
            value.to_string_lossy(),
        ));
        self.status
    }
}

fn load_hello_world(
    bridge: &mut ModuleBridge,
    recorder: &Arc<RegistrationRecorder>,
) -> PluginId {
    let table = CallbackTable::new(recorder.clone(), Arc::new(ServerVariables::new()));
    unsafe { bridge.load_static_plugin("hello-world", plugin_hello_world::ENTRY, table) }
        .expect("load hello-world")
}

#[test]
fn test_hello_world_scenario() {
    let recorder = Arc::new(RegistrationRecorder::new(true));
    let mut bridge = ModuleBridge::new(PluginLoader::default());

    let plugin = load_hello_world(&mut bridge, &recorder);

    let recorded = recorder.recorded();
    assert_eq!(recorded.len(), 1);
    let (factory, subscription) = recorded[0];
    assert_eq!(subscription.request_mask(), RequestNotifications::BEGIN_REQUEST);
    assert!(subscription.post_request_mask().is_empty());
    assert_eq!(bridge.subscription(plugin).unwrap(), Some(subscription));

    let instance = bridge.create_module_instance(plugin, factory).unwrap();

    let sink = RecordingSink::new(HResult::S_OK);
    let context = bridge.create_execution_context(ContextCallbacks::new(sink.clone()));
    let verdict = bridge
        .dispatch(instance, context, RequestNotifications::BEGIN_REQUEST, false)
        .unwrap();

    assert_eq!(verdict, NotificationVerdict::Continue);
    assert_eq!(
        sink.calls(),
        vec![("FromNativeModule".to_string(), "Hello World!".to_string())]
    );

    bridge.delete_execution_context(context).unwrap();
    bridge.terminate_module_instance(factory).unwrap();
    assert_eq!(bridge.instance_count(), 0);
    bridge.unload_plugin(plugin).unwrap();
    assert_eq!(bridge.plugin(plugin).unwrap().state(), PluginState::Unloaded);
}

#[test]
fn test_hello_world_ignores_other_notifications() {
    let recorder = Arc::new(RegistrationRecorder::new(true));
    let mut bridge = ModuleBridge::new(PluginLoader::default());
    let plugin = load_hello_world(&mut bridge, &recorder);
    let (factory, _) = recorder.recorded()[0];
    let instance = bridge.create_module_instance(plugin, factory).unwrap();

    let sink = RecordingSink::new(HResult::S_OK);
    let context = bridge.create_execution_context(ContextCallbacks::new(sink.clone()));
    for (notification, is_post) in [
        (RequestNotifications::BEGIN_REQUEST, true),
        (RequestNotifications::END_REQUEST, false),
        (RequestNotifications::LOG_REQUEST, false),
    ] {
        let verdict = bridge.dispatch(instance, context, notification, is_post).unwrap();
        assert_eq!(verdict, NotificationVerdict::Continue);
    }

    assert!(sink.calls().is_empty());
}

#[test]
fn test_rejected_registration_frees_factory() {
    let recorder = Arc::new(RegistrationRecorder::new(false));
    let mut bridge = ModuleBridge::new(PluginLoader::default());
    let table = CallbackTable::new(recorder.clone(), Arc::new(ServerVariables::new()));

    let err = unsafe { bridge.load_static_plugin("hello-world", plugin_hello_world::ENTRY, table) }
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::RegistrationRejected);
    assert_eq!(err.status, Some(HResult::E_FAIL.raw()));
    assert_eq!(recorder.recorded().len(), 1);
    assert!(bridge.plugin_ids().is_empty());
}

#[test]
fn test_host_status_reaches_module() {
    // The module ignores the status; the host still sees the call once.
    let recorder = Arc::new(RegistrationRecorder::new(true));
    let mut bridge = ModuleBridge::new(PluginLoader::default());
    let plugin = load_hello_world(&mut bridge, &recorder);
    let (factory, _) = recorder.recorded()[0];
    let instance = bridge.create_module_instance(plugin, factory).unwrap();

    let sink = RecordingSink::new(HResult::E_FAIL);
    let verdict = bridge
        .dispatch_scoped(
            instance,
            ContextCallbacks::new(sink.clone()),
            RequestNotifications::BEGIN_REQUEST,
            false,
        )
        .unwrap();

    assert_eq!(verdict, NotificationVerdict::Continue);
    assert_eq!(sink.calls().len(), 1);
    assert_eq!(bridge.context_count(), 0);
}

/// Path of the built hello-world `cdylib`, if present.
fn hello_world_library() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MODBRIDGE_TEST_MODULE") {
        return Some(PathBuf::from(path));
    }
    let file = format!(
        "{}plugin_hello_world{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    let target = std::env::var("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target"));
    let profile = if cfg!(debug_assertions) { "debug" } else { "release" };

    [
        target.join(profile).join(&file),
        target.join(profile).join("deps").join(&file),
    ]
    .into_iter()
    .find(|p| p.exists())
}

#[test]
fn test_dynamic_reload_registers_again() {
    let Some(path) = hello_world_library() else {
        eprintln!("hello-world cdylib not built; skipping");
        return;
    };

    let recorder = Arc::new(RegistrationRecorder::new(true));
    let mut bridge = ModuleBridge::new(PluginLoader::default());
    let table = || CallbackTable::new(recorder.clone(), Arc::new(ServerVariables::new()));

    let first = bridge.load_plugin(&path, table()).unwrap();
    assert_eq!(recorder.recorded().len(), 1);
    bridge.unload_plugin(first).unwrap();
    bridge.unload_plugin(first).unwrap();

    let second = bridge.load_plugin(&path, table()).unwrap();
    assert_ne!(first, second);
    assert_eq!(recorder.recorded().len(), 2);

    let (factory, _) = recorder.recorded()[1];
    let instance = bridge.create_module_instance(second, factory).unwrap();
    let sink = RecordingSink::new(HResult::S_OK);
    let verdict = bridge
        .dispatch_scoped(
            instance,
            ContextCallbacks::new(sink.clone()),
            RequestNotifications::BEGIN_REQUEST,
            false,
        )
        .unwrap();

    assert_eq!(verdict, NotificationVerdict::Continue);
    assert_eq!(sink.calls()[0].1, "Hello World!");
    bridge.unload_plugin(second).unwrap();
}

#[test]
fn test_missing_entry_symbol_is_entry_point_missing() {
    let Some(path) = hello_world_library() else {
        eprintln!("hello-world cdylib not built; skipping");
        return;
    };

    let recorder = Arc::new(RegistrationRecorder::new(true));
    let mut bridge = ModuleBridge::new(PluginLoader::new(1, "NoSuchEntry"));
    let table = CallbackTable::new(recorder.clone(), Arc::new(ServerVariables::new()));

    let err = bridge.load_plugin(&path, table).unwrap_err();

    assert_eq!(err.kind, ErrorKind::EntryPointMissing);
    assert!(err.message.contains("NoSuchEntry"));
    assert!(recorder.recorded().is_empty());
    assert!(bridge.plugin_ids().is_empty());
}
