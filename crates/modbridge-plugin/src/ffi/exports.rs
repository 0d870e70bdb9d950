//! Exported entry points for a managed host.
//!
//! Each export is a thin adapter over [`ModuleBridge`]. Failures are logged
//! and reported as null pointers, `E_FAIL` or a `-1` verdict. Null handles
//! are ignored.

#![allow(non_snake_case)]

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::error;

use modbridge_core::types::{ContextId, InstanceId, PluginId};
use modbridge_core::{AppError, AppResult};
use modbridge_sdk::abi::{Bool, CHttpModule, Dword, IHttpContext, IHttpModuleFactory, Pcwstr};
use modbridge_sdk::notification::{RawNotificationStatus, RequestNotifications};
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::wide_units;

use super::abi::{NativeHttpContextCallbacks, NativeModuleCallbacks};
use super::safety::guard_value;
use crate::bridge::ModuleBridge;
use crate::callbacks::FactoryRef;
use crate::loader::PluginLoader;

/// Verdict returned by `CallEvent` when dispatch fails.
pub const CALL_EVENT_FAILED: RawNotificationStatus = -1;

/// One loaded module and the objects created for it, behind an opaque pointer.
#[derive(Debug)]
pub struct NativeModule {
    bridge: ModuleBridge,
    plugin: PluginId,
    modules: HashMap<usize, InstanceId>,
    contexts: HashMap<usize, ContextId>,
}

impl NativeModule {
    /// Wraps a bridge holding exactly one plugin.
    pub fn new(bridge: ModuleBridge, plugin: PluginId) -> Self {
        Self {
            bridge,
            plugin,
            modules: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    fn resolve_factory(&self, factory: *mut IHttpModuleFactory) -> AppResult<FactoryRef> {
        if !factory.is_null() {
            return Ok(FactoryRef::from_raw(factory));
        }
        self.bridge
            .plugin(self.plugin)?
            .accepted_registrations()
            .next()
            .map(|r| r.factory)
            .ok_or_else(|| AppError::not_found("Module registered no factory"))
    }

    fn create_module(&mut self, factory: *mut IHttpModuleFactory) -> AppResult<*mut CHttpModule> {
        let factory = self.resolve_factory(factory)?;
        let instance = self.bridge.create_module_instance(self.plugin, factory)?;
        let module = self.bridge.module_ptr(instance)?;
        self.modules.insert(module as usize, instance);
        Ok(module)
    }

    fn remove_module(&mut self, factory: *mut IHttpModuleFactory) -> AppResult<()> {
        let factory = self.resolve_factory(factory)?;
        self.bridge.terminate_module_instance(factory)?;
        self.modules
            .retain(|_, instance| self.bridge.module_ptr(*instance).is_ok());
        Ok(())
    }

    fn create_context(&mut self, callbacks: NativeHttpContextCallbacks) -> AppResult<*mut IHttpContext> {
        let context = self.bridge.create_execution_context(callbacks.to_context());
        let raw = self.bridge.context_ptr(context)?;
        self.contexts.insert(raw as usize, context);
        Ok(raw)
    }

    fn delete_context(&mut self, context: *mut IHttpContext) -> AppResult<()> {
        let id = self
            .contexts
            .remove(&(context as usize))
            .ok_or_else(|| AppError::not_found("Unknown context pointer"))?;
        self.bridge.delete_execution_context(id)
    }

    fn call_event(
        &self,
        module: *mut CHttpModule,
        context: *mut IHttpContext,
        notification: Dword,
        is_post: bool,
    ) -> AppResult<RawNotificationStatus> {
        let instance = self
            .modules
            .get(&(module as usize))
            .ok_or_else(|| AppError::not_found("Unknown module pointer"))?;
        let context = self
            .contexts
            .get(&(context as usize))
            .ok_or_else(|| AppError::not_found("Unknown context pointer"))?;
        let verdict = self.bridge.dispatch(
            *instance,
            *context,
            RequestNotifications(notification),
            is_post,
        )?;
        Ok(verdict.raw())
    }

    /// Moves the module behind an opaque pointer.
    pub fn into_raw(self) -> *mut NativeModule {
        Box::into_raw(Box::new(self))
    }
}

fn wide_path(units: &[u16]) -> PathBuf {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_wide(units))
    }
    #[cfg(not(windows))]
    {
        PathBuf::from(String::from_utf16_lossy(units))
    }
}

/// # Safety
/// A non-null `module` must come from `LoadNativeIISModule` and not yet be unloaded.
unsafe fn native<'a>(module: *mut NativeModule) -> Option<&'a mut NativeModule> {
    unsafe { module.as_mut() }
}

/// Loads the module at `path` (UTF-16) and runs its registration.
///
/// Returns null on failure.
///
/// # Safety
/// `path` must be a nul-terminated UTF-16 string; `callbacks` may be null.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn LoadNativeIISModule(
    path: Pcwstr,
    callbacks: *const NativeModuleCallbacks,
) -> *mut NativeModule {
    guard_value("LoadNativeIISModule", std::ptr::null_mut(), || {
        let Some(units) = (unsafe { wide_units(path) }) else {
            error!("LoadNativeIISModule called with a null path");
            return std::ptr::null_mut();
        };
        let path = wide_path(units);
        let callbacks = unsafe { callbacks.as_ref() }
            .copied()
            .unwrap_or(NativeModuleCallbacks {
                set_request_notifications: None,
            });

        let mut bridge = ModuleBridge::new(PluginLoader::default());
        match bridge.load_plugin(&path, callbacks.to_table()) {
            Ok(plugin) => NativeModule::new(bridge, plugin).into_raw(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "LoadNativeIISModule failed");
                std::ptr::null_mut()
            }
        }
    })
}

/// Tears down everything created for `module` and releases its library.
///
/// # Safety
/// `module` must be null or come from `LoadNativeIISModule`; it is invalid afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn UnloadNativeIISModule(module: *mut NativeModule) {
    if module.is_null() {
        return;
    }
    let module = unsafe { Box::from_raw(module) };
    guard_value("UnloadNativeIISModule", (), move || drop(module));
}

/// Creates a module instance. A null `factory` selects the first registered one.
///
/// # Safety
/// `module` must be null or a live handle from `LoadNativeIISModule`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn CreateModule(
    module: *mut NativeModule,
    factory: *mut IHttpModuleFactory,
) -> *mut CHttpModule {
    let Some(native) = (unsafe { native(module) }) else {
        return std::ptr::null_mut();
    };
    guard_value("CreateModule", std::ptr::null_mut(), || {
        native.create_module(factory).unwrap_or_else(|e| {
            error!(error = %e, "CreateModule failed");
            std::ptr::null_mut()
        })
    })
}

/// Terminates `factory` (null selects the first registered one).
///
/// # Safety
/// `module` must be null or a live handle from `LoadNativeIISModule`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn RemoveModule(
    module: *mut NativeModule,
    factory: *mut IHttpModuleFactory,
) -> HResult {
    let Some(native) = (unsafe { native(module) }) else {
        return HResult::S_OK;
    };
    guard_value("RemoveModule", HResult::E_FAIL, || match native.remove_module(factory) {
        Ok(()) => HResult::S_OK,
        Err(e) => {
            error!(error = %e, "RemoveModule failed");
            HResult::E_FAIL
        }
    })
}

/// Creates an execution context bound to `callbacks`.
///
/// # Safety
/// `module` must be null or a live handle; `callbacks` may be null.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn CreateHttpContext(
    module: *mut NativeModule,
    callbacks: *const NativeHttpContextCallbacks,
) -> *mut IHttpContext {
    let Some(native) = (unsafe { native(module) }) else {
        return std::ptr::null_mut();
    };
    let callbacks = unsafe { callbacks.as_ref() }
        .copied()
        .unwrap_or(NativeHttpContextCallbacks {
            set_server_variable: None,
            user_data: std::ptr::null_mut(),
        });
    guard_value("CreateHttpContext", std::ptr::null_mut(), || {
        native.create_context(callbacks).unwrap_or_else(|e| {
            error!(error = %e, "CreateHttpContext failed");
            std::ptr::null_mut()
        })
    })
}

/// Destroys an execution context.
///
/// # Safety
/// `module` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn DeleteHttpContext(module: *mut NativeModule, context: *mut IHttpContext) {
    let Some(native) = (unsafe { native(module) }) else {
        return;
    };
    guard_value("DeleteHttpContext", (), || {
        if let Err(e) = native.delete_context(context) {
            error!(error = %e, "DeleteHttpContext failed");
        }
    })
}

/// Dispatches a notification. Returns the module's verdict, or
/// [`CALL_EVENT_FAILED`] if dispatch failed.
///
/// # Safety
/// `module` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn CallEvent(
    module: *mut NativeModule,
    instance: *mut CHttpModule,
    context: *mut IHttpContext,
    notification: Dword,
    is_post_notification: Bool,
) -> RawNotificationStatus {
    let Some(native) = (unsafe { native(module) }) else {
        return CALL_EVENT_FAILED;
    };
    guard_value("CallEvent", CALL_EVENT_FAILED, || {
        native
            .call_event(instance, context, notification, is_post_notification != 0)
            .unwrap_or_else(|e| {
                error!(error = %e, "CallEvent failed");
                CALL_EVENT_FAILED
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, ModuleBehavior};
    use modbridge_sdk::abi::{Pcstr, Pcwstr};
    use modbridge_sdk::strings::{narrow_bytes, to_wide, wide_units};
    use std::ffi::c_void;

    unsafe extern "system" fn count_variable(user_data: *mut c_void, name: Pcstr, value: Pcwstr) -> HResult {
        let seen = unsafe { &mut *user_data.cast::<Vec<(Vec<u8>, Vec<u16>)>>() };
        let name = unsafe { narrow_bytes(name) }.unwrap_or_default().to_vec();
        let value = unsafe { wide_units(value) }.unwrap_or_default().to_vec();
        seen.push((name, value));
        HResult(0x0000_0002)
    }

    fn load(fixture: &testing::Fixture) -> *mut NativeModule {
        fixture.activate();
        let mut bridge = ModuleBridge::new(PluginLoader::default());
        let table = NativeModuleCallbacks {
            set_request_notifications: None,
        }
        .to_table();
        let plugin = unsafe { bridge.load_static_plugin("native", fixture.entry, table) }.unwrap();
        NativeModule::new(bridge, plugin).into_raw()
    }

    #[test]
    fn test_exports_drive_a_full_request() {
        let fixture = testing::fixture(ModuleBehavior::SetServerVariable);
        let module = load(&fixture);
        let mut seen: Vec<(Vec<u8>, Vec<u16>)> = Vec::new();
        let callbacks = NativeHttpContextCallbacks {
            set_server_variable: Some(count_variable),
            user_data: std::ptr::from_mut(&mut seen).cast(),
        };

        unsafe {
            let instance = CreateModule(module, std::ptr::null_mut());
            assert!(!instance.is_null());
            let context = CreateHttpContext(module, &callbacks);
            assert!(!context.is_null());

            let verdict = CallEvent(module, instance, context, RequestNotifications::BEGIN_REQUEST.bits(), 0);
            assert_eq!(verdict, 0);
            assert_eq!(
                CallEvent(module, instance, context, RequestNotifications::BEGIN_REQUEST.bits(), 1),
                0
            );

            DeleteHttpContext(module, context);
            assert_eq!(RemoveModule(module, std::ptr::null_mut()), HResult::S_OK);
            UnloadNativeIISModule(module);
        }

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, b"X");
        assert_eq!(seen[0].1, vec![u16::from(b'Y')]);
        assert_eq!(fixture.stats().last_set_status(), HResult(0x0000_0002));
        assert_eq!(fixture.stats().begin_requests(), 1);
        assert_eq!(fixture.stats().terminations(), 1);
    }

    #[test]
    fn test_failures_are_reported_not_raised() {
        let fixture = testing::fixture(ModuleBehavior::CallsGetRequest);
        let module = load(&fixture);

        unsafe {
            let instance = CreateModule(module, std::ptr::null_mut());
            let context = CreateHttpContext(module, std::ptr::null());
            assert_eq!(
                CallEvent(module, instance, context, RequestNotifications::BEGIN_REQUEST.bits(), 0),
                CALL_EVENT_FAILED
            );
            assert_eq!(
                CallEvent(module, std::ptr::null_mut(), context, 1, 0),
                CALL_EVENT_FAILED
            );
            assert_eq!(RemoveModule(module, std::ptr::null_mut()), HResult::S_OK);
            assert_eq!(RemoveModule(module, std::ptr::null_mut()), HResult::E_FAIL);
            UnloadNativeIISModule(module);
        }
    }

    #[test]
    fn test_null_handles_are_ignored() {
        let missing = to_wide("/nonexistent/libnothing.so");
        unsafe {
            assert!(LoadNativeIISModule(missing.as_ptr(), std::ptr::null()).is_null());
            assert!(LoadNativeIISModule(std::ptr::null(), std::ptr::null()).is_null());
            UnloadNativeIISModule(std::ptr::null_mut());
            assert!(CreateModule(std::ptr::null_mut(), std::ptr::null_mut()).is_null());
            assert!(CreateHttpContext(std::ptr::null_mut(), std::ptr::null()).is_null());
            DeleteHttpContext(std::ptr::null_mut(), std::ptr::null_mut());
            assert_eq!(
                CallEvent(std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut(), 1, 0),
                CALL_EVENT_FAILED
            );
        }
    }
}
