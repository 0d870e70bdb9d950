//! Host callback table.
//!
//! These are the only points where control and data cross from the
//! emulation back into the host. The table is supplied by the caller,
//! immutable once built, and never stored beyond the lifetime of the object
//! it was bound to.

use std::ffi::CStr;
use std::sync::Arc;

use modbridge_sdk::abi::IHttpModuleFactory;
use modbridge_sdk::notification::NotificationSubscription;
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::WideCStr;

/// Opaque reference to a module factory handed over during registration.
///
/// The bridge never dereferences it outside the instance manager, which
/// runs on the caller's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactoryRef(*mut IHttpModuleFactory);

// SAFETY: a FactoryRef is an address; every call through it happens
// synchronously on the thread that drives the bridge.
unsafe impl Send for FactoryRef {}
unsafe impl Sync for FactoryRef {}

impl FactoryRef {
    /// Wraps a raw factory pointer, which may be null.
    pub fn from_raw(ptr: *mut IHttpModuleFactory) -> Self {
        Self(ptr)
    }

    /// The raw factory pointer.
    pub fn as_ptr(self) -> *mut IHttpModuleFactory {
        self.0
    }

    /// Whether the module passed a null factory.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Address of the factory, for logging.
    pub fn address(self) -> usize {
        self.0 as usize
    }
}

/// Receives `SetRequestNotifications` calls made by a module during registration.
pub trait RegistrationCallback: Send + Sync {
    /// Called once per `SetRequestNotifications`. The returned status is
    /// handed back to the module unchanged.
    fn on_set_request_notifications(
        &self,
        factory: FactoryRef,
        subscription: NotificationSubscription,
    ) -> HResult;
}

/// Receives `SetServerVariable` calls made by a module during a dispatch.
pub trait ServerVariableCallback: Send + Sync {
    /// Called once per `SetServerVariable`. `name` and `value` are passed
    /// through exactly as the module supplied them; a null pointer arrives
    /// as an empty string. The returned status is handed back unchanged.
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult;
}

impl<F> RegistrationCallback for F
where
    F: Fn(FactoryRef, NotificationSubscription) -> HResult + Send + Sync,
{
    fn on_set_request_notifications(
        &self,
        factory: FactoryRef,
        subscription: NotificationSubscription,
    ) -> HResult {
        self(factory, subscription)
    }
}

impl<F> ServerVariableCallback for F
where
    F: Fn(&CStr, WideCStr<'_>) -> HResult + Send + Sync,
{
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        self(name, value)
    }
}

/// Callbacks bound to an execution context at creation time.
#[derive(Clone)]
pub struct ContextCallbacks {
    /// Target of `SetServerVariable`.
    pub on_set_server_variable: Arc<dyn ServerVariableCallback>,
}

impl ContextCallbacks {
    /// Builds a context table from a server-variable sink.
    pub fn new(on_set_server_variable: Arc<dyn ServerVariableCallback>) -> Self {
        Self {
            on_set_server_variable,
        }
    }
}

impl std::fmt::Debug for ContextCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCallbacks")
            .field("on_set_server_variable", &"<callback>")
            .finish()
    }
}

/// The full table a host supplies when loading a plugin.
#[derive(Clone)]
pub struct CallbackTable {
    /// Target of `SetRequestNotifications`.
    pub on_set_request_notifications: Arc<dyn RegistrationCallback>,
    /// Default callbacks for contexts created on behalf of this plugin.
    pub context: ContextCallbacks,
}

impl CallbackTable {
    /// Builds a callback table.
    pub fn new(
        on_set_request_notifications: Arc<dyn RegistrationCallback>,
        on_set_server_variable: Arc<dyn ServerVariableCallback>,
    ) -> Self {
        Self {
            on_set_request_notifications,
            context: ContextCallbacks::new(on_set_server_variable),
        }
    }
}

impl std::fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTable")
            .field("on_set_request_notifications", &"<callback>")
            .field("context", &self.context)
            .finish()
    }
}
