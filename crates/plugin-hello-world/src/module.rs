//! The module instance.

use std::ffi::{CStr, c_void};

use tracing::warn;

use modbridge_sdk::abi::{CHttpModule, CHttpModuleVtbl, IHttpContext};
use modbridge_sdk::notification::{RQ_NOTIFICATION_CONTINUE, RawNotificationStatus};

/// Name of the variable set on begin-request.
pub const SERVER_VARIABLE_NAME: &CStr = c"FromNativeModule";

/// Value of the variable set on begin-request.
pub const SERVER_VARIABLE_VALUE: &str = "Hello World!";

// "Hello World!" as nul-terminated UTF-16.
static VALUE_WIDE: [u16; 13] = [
    b'H' as u16, b'e' as u16, b'l' as u16, b'l' as u16, b'o' as u16, b' ' as u16,
    b'W' as u16, b'o' as u16, b'r' as u16, b'l' as u16, b'd' as u16, b'!' as u16, 0,
];

static MODULE_VTBL: CHttpModuleVtbl = CHttpModuleVtbl::with_begin_request(on_begin_request, dispose);

/// Overrides `OnBeginRequest`; every other notification continues.
#[repr(C)]
pub struct HelloWorldModule {
    base: CHttpModule,
}

impl HelloWorldModule {
    /// Allocates a module and returns its interface pointer.
    pub fn create() -> *mut CHttpModule {
        let module = Box::new(Self {
            base: CHttpModule { vtbl: &MODULE_VTBL },
        });
        Box::into_raw(module).cast()
    }
}

unsafe extern "system" fn on_begin_request(
    _this: *mut CHttpModule,
    context: *mut IHttpContext,
    _provider: *mut c_void,
) -> RawNotificationStatus {
    let status = unsafe {
        IHttpContext::set_server_variable(context, SERVER_VARIABLE_NAME.as_ptr(), VALUE_WIDE.as_ptr())
    };
    if status.is_failure() {
        warn!(status = %status, "SetServerVariable failed");
    }
    RQ_NOTIFICATION_CONTINUE
}

unsafe extern "system" fn dispose(this: *mut CHttpModule) {
    drop(unsafe { Box::from_raw(this.cast::<HelloWorldModule>()) });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_value_matches_text() {
        let units: Vec<u16> = SERVER_VARIABLE_VALUE.encode_utf16().chain([0]).collect();
        assert_eq!(units.as_slice(), &VALUE_WIDE);
    }
}
