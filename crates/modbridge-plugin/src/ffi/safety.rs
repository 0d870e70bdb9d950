//! FFI safety wrappers: keep Rust panics from unwinding into module code.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::error;

use modbridge_sdk::status::HResult;

/// Runs `f`, mapping a panic to `E_FAIL`.
pub fn guard_hresult(member: &'static str, f: impl FnOnce() -> HResult) -> HResult {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(hr) => hr,
        Err(_) => {
            error!(member = member, "Host callback panicked; returning E_FAIL");
            HResult::E_FAIL
        }
    }
}

/// Runs `f`, mapping a panic to `fallback`.
pub fn guard_value<T>(member: &'static str, fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!(member = member, "Bridge member panicked");
            fallback
        }
    }
}
