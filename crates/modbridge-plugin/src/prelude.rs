//! Prelude for convenient imports.

pub use modbridge_core::types::{ContextId, InstanceId, PluginId};
pub use modbridge_core::{AppError, AppResult, ErrorKind};
pub use modbridge_sdk::notification::{
    NotificationSubscription, NotificationVerdict, RequestNotifications,
};
pub use modbridge_sdk::status::HResult;
pub use modbridge_sdk::strings::WideCStr;

pub use crate::bridge::ModuleBridge;
pub use crate::callbacks::{
    CallbackTable, ContextCallbacks, FactoryRef, RegistrationCallback, ServerVariableCallback,
};
pub use crate::loader::{PluginHandle, PluginLoader, PluginState};
pub use crate::manager::{ModuleHost, PluginSummary, RequestOutcome, ServerVariables};
pub use crate::registration::Registration;
