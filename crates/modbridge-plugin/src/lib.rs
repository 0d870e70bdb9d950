//! # modbridge-plugin
//!
//! Hosts precompiled native HTTP modules outside the web server. Provides:
//!
//! - Plugin loading via `libloading` and the registration handshake
//! - Emulated registration, allocator and execution-context interfaces
//! - Module instance lifecycle with one-shot factory termination
//! - Begin-request dispatch with pipeline verdicts
//! - An arena-handle facade, a host-side wrapper and a C ABI for managed hosts

pub mod allocator;
pub mod bridge;
pub mod callbacks;
pub mod context;
pub mod dispatcher;
pub mod factory;
pub mod ffi;
pub mod loader;
pub mod manager;
pub mod prelude;
pub mod registration;

#[cfg(test)]
mod testing;

pub use bridge::ModuleBridge;
pub use callbacks::{CallbackTable, ContextCallbacks, FactoryRef};
pub use loader::{PluginHandle, PluginLoader, PluginState};
pub use manager::{ModuleHost, RequestOutcome, ServerVariables};
pub use registration::Registration;
