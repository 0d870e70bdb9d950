//! The C ABI surface driven the way a managed host drives it.

use std::ffi::{CStr, c_void};
use std::sync::atomic::{AtomicU32, Ordering};

use modbridge_plugin::ffi::abi::{NativeHttpContextCallbacks, NativeModuleCallbacks};
use modbridge_plugin::ffi::exports::{
    CallEvent, CreateHttpContext, CreateModule, DeleteHttpContext, NativeModule, RemoveModule,
    UnloadNativeIISModule,
};
use modbridge_plugin::prelude::*;
use modbridge_sdk::abi::{IHttpModuleFactory, Pcstr, Pcwstr};

static REGISTERED_MASK: AtomicU32 = AtomicU32::new(0);

unsafe extern "system" fn record_registration(
    _factory: *mut IHttpModuleFactory,
    request_notifications: u32,
    _post_request_notifications: u32,
) -> HResult {
    REGISTERED_MASK.store(request_notifications, Ordering::SeqCst);
    HResult::S_OK
}

unsafe extern "system" fn collect_variable(user_data: *mut c_void, name: Pcstr, value: Pcwstr) -> HResult {
    let seen = unsafe { &mut *user_data.cast::<Vec<(String, String)>>() };
    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
    let value = unsafe { WideCStr::from_ptr(value) }
        .map(|v| v.to_string_lossy())
        .unwrap_or_default();
    seen.push((name, value));
    HResult::S_OK
}

fn load_hello_world() -> *mut NativeModule {
    let table = NativeModuleCallbacks {
        set_request_notifications: Some(record_registration),
    }
    .to_table();
    let mut bridge = ModuleBridge::new(PluginLoader::default());
    let plugin = unsafe { bridge.load_static_plugin("hello-world", plugin_hello_world::ENTRY, table) }
        .expect("Failed to load hello-world");
    NativeModule::new(bridge, plugin).into_raw()
}

#[test]
fn test_managed_host_request_cycle() {
    let module = load_hello_world();
    assert_eq!(
        REGISTERED_MASK.load(Ordering::SeqCst),
        RequestNotifications::BEGIN_REQUEST.bits()
    );

    let mut seen: Vec<(String, String)> = Vec::new();
    let callbacks = NativeHttpContextCallbacks {
        set_server_variable: Some(collect_variable),
        user_data: std::ptr::from_mut(&mut seen).cast(),
    };

    unsafe {
        let instance = CreateModule(module, std::ptr::null_mut());
        assert!(!instance.is_null());
        let context = CreateHttpContext(module, &callbacks);
        assert!(!context.is_null());

        let verdict = CallEvent(
            module,
            instance,
            context,
            RequestNotifications::BEGIN_REQUEST.bits(),
            0,
        );
        assert_eq!(verdict, NotificationVerdict::Continue.raw());

        let verdict = CallEvent(module, instance, context, RequestNotifications::END_REQUEST.bits(), 0);
        assert_eq!(verdict, NotificationVerdict::Continue.raw());

        DeleteHttpContext(module, context);
        assert_eq!(RemoveModule(module, std::ptr::null_mut()), HResult::S_OK);
        UnloadNativeIISModule(module);
    }

    assert_eq!(
        seen,
        vec![("FromNativeModule".to_string(), "Hello World!".to_string())]
    );
}

#[test]
fn test_context_without_callbacks_discards_variables() {
    let module = load_hello_world();

    unsafe {
        let instance = CreateModule(module, std::ptr::null_mut());
        let context = CreateHttpContext(module, std::ptr::null());
        assert_eq!(
            CallEvent(module, instance, context, RequestNotifications::BEGIN_REQUEST.bits(), 0),
            NotificationVerdict::Continue.raw()
        );
        UnloadNativeIISModule(module);
    }
}
