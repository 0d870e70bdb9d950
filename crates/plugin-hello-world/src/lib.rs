//! Reference native HTTP module.
//!
//! Registers for `BEGIN_REQUEST` in the main priority class and, on every
//! begin-request, sets the server variable `FromNativeModule` to
//! `Hello World!`. Built as a `cdylib` it exports `RegisterModule` like
//! any module compiled against the server headers; as an `rlib` the same
//! entry point can be registered in-process.

pub mod factory;
pub mod module;

use std::ffi::c_void;

use modbridge_sdk::abi::{Dword, IHttpModuleRegistrationInfo, RegisterModuleFn};
use modbridge_sdk::notification::RequestNotifications;
use modbridge_sdk::status::HResult;

pub use factory::HelloWorldFactory;
pub use module::{HelloWorldModule, SERVER_VARIABLE_NAME, SERVER_VARIABLE_VALUE};

/// Registration entry point.
///
/// # Safety
/// `module_info` must point to a live registration object.
#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub unsafe extern "system" fn RegisterModule(
    _server_version: Dword,
    module_info: *mut IHttpModuleRegistrationInfo,
    _global_info: *mut c_void,
) -> HResult {
    if module_info.is_null() {
        return HResult::E_FAIL;
    }

    let factory = HelloWorldFactory::create();
    let status = unsafe {
        IHttpModuleRegistrationInfo::set_request_notifications(
            module_info,
            factory,
            RequestNotifications::BEGIN_REQUEST.bits(),
            0,
        )
    };

    if status.is_failure() {
        // The server never took ownership.
        unsafe { HelloWorldFactory::destroy(factory) };
    }
    status
}

/// The entry point as a function pointer, for in-process registration.
pub const ENTRY: RegisterModuleFn = RegisterModule;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_registration_info_fails() {
        let status = unsafe { RegisterModule(12, std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(status, HResult::E_FAIL);
    }
}
