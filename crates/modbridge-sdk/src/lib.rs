//! # modbridge-sdk
//!
//! The vendor native module interface as Rust types. Used by the bridge to
//! emulate the server side of the contract, and by modules written in Rust
//! to implement the module side.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modbridge_sdk::prelude::*;
//!
//! #[unsafe(no_mangle)]
//! pub unsafe extern "system" fn RegisterModule(
//!     _server_version: Dword,
//!     info: *mut IHttpModuleRegistrationInfo,
//!     _global: *mut std::ffi::c_void,
//! ) -> HResult {
//!     unsafe {
//!         IHttpModuleRegistrationInfo::set_request_notifications(
//!             info,
//!             my_factory(),
//!             RequestNotifications::BEGIN_REQUEST.bits(),
//!             0,
//!         )
//!     }
//! }
//! ```

pub mod abi;
pub mod notification;
pub mod status;
pub mod strings;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::abi::{
        Bool, CHttpModule, CHttpModuleVtbl, Dword, IHttpContext, IHttpContextVtbl,
        IHttpModuleFactory, IHttpModuleFactoryVtbl, IHttpModuleRegistrationInfo,
        IHttpModuleRegistrationInfoVtbl, IModuleAllocator, IModuleAllocatorVtbl, Pcstr, Pcwstr,
        REGISTER_MODULE_SYMBOL, RegisterModuleFn,
    };
    pub use crate::notification::{
        NotificationSubscription, NotificationVerdict, RQ_NOTIFICATION_CONTINUE,
        RQ_NOTIFICATION_FINISH_REQUEST, RQ_NOTIFICATION_PENDING, RawNotificationStatus,
        RequestNotifications,
    };
    pub use crate::status::HResult;
    pub use crate::strings::{WideCStr, to_narrow, to_wide};
}
