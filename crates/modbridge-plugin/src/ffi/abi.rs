//! C ABI seen by a managed host.
//!
//! The host passes plain function pointers; these adapters turn them into
//! the bridge's callback traits.

use std::ffi::{CStr, c_void};
use std::sync::Arc;

use modbridge_sdk::abi::{Dword, IHttpModuleFactory, Pcstr, Pcwstr};
use modbridge_sdk::notification::NotificationSubscription;
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::WideCStr;

use crate::callbacks::{
    CallbackTable, ContextCallbacks, FactoryRef, RegistrationCallback, ServerVariableCallback,
};

/// Host callback for `SetRequestNotifications`.
pub type SetRequestNotificationsFn = unsafe extern "system" fn(
    factory: *mut IHttpModuleFactory,
    request_notifications: Dword,
    post_request_notifications: Dword,
) -> HResult;

/// Host callback for `SetServerVariable`. `user_data` is the pointer the
/// host supplied with the context.
pub type SetServerVariableFn =
    unsafe extern "system" fn(user_data: *mut c_void, name: Pcstr, value: Pcwstr) -> HResult;

/// Callbacks supplied to `LoadNativeIISModule`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeModuleCallbacks {
    /// Null accepts every registration.
    pub set_request_notifications: Option<SetRequestNotificationsFn>,
}

/// Callbacks supplied to `CreateHttpContext`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeHttpContextCallbacks {
    /// Null discards server variables.
    pub set_server_variable: Option<SetServerVariableFn>,
    /// Passed back verbatim as the first argument of every callback.
    pub user_data: *mut c_void,
}

impl NativeModuleCallbacks {
    /// Builds the bridge callback table. Contexts created without their own
    /// callbacks discard server variables.
    pub fn to_table(self) -> CallbackTable {
        CallbackTable::new(
            Arc::new(NativeRegistrationSink {
                callback: self.set_request_notifications,
            }),
            Arc::new(NativeServerVariableSink::discard()),
        )
    }
}

impl NativeHttpContextCallbacks {
    /// Builds the context callback table.
    pub fn to_context(self) -> ContextCallbacks {
        ContextCallbacks::new(Arc::new(NativeServerVariableSink {
            callback: self.set_server_variable,
            user_data: self.user_data,
        }))
    }
}

struct NativeRegistrationSink {
    callback: Option<SetRequestNotificationsFn>,
}

impl RegistrationCallback for NativeRegistrationSink {
    fn on_set_request_notifications(
        &self,
        factory: FactoryRef,
        subscription: NotificationSubscription,
    ) -> HResult {
        match self.callback {
            Some(callback) => unsafe {
                callback(
                    factory.as_ptr(),
                    subscription.request_mask().bits(),
                    subscription.post_request_mask().bits(),
                )
            },
            None => HResult::S_OK,
        }
    }
}

struct NativeServerVariableSink {
    callback: Option<SetServerVariableFn>,
    user_data: *mut c_void,
}

// SAFETY: `user_data` is opaque to the bridge and only handed back to the
// host on the thread that is driving the dispatch.
unsafe impl Send for NativeServerVariableSink {}
unsafe impl Sync for NativeServerVariableSink {}

impl NativeServerVariableSink {
    fn discard() -> Self {
        Self {
            callback: None,
            user_data: std::ptr::null_mut(),
        }
    }
}

impl ServerVariableCallback for NativeServerVariableSink {
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        match self.callback {
            Some(callback) => unsafe { callback(self.user_data, name.as_ptr(), value.as_ptr()) },
            None => HResult::S_OK,
        }
    }
}
