//! Status codes exchanged across the module boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit status code as returned by every fallible vendor interface member.
///
/// Negative values are failures. The type is `repr(transparent)` so it can
/// appear directly in `extern "system"` signatures.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HResult(pub i32);

/// Win32 `ERROR_NOT_ENOUGH_MEMORY`.
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;

/// Win32 `ERROR_NOT_SUPPORTED`.
pub const ERROR_NOT_SUPPORTED: u32 = 50;

impl HResult {
    /// `S_OK`.
    pub const S_OK: Self = Self(0);
    /// `E_NOTIMPL`.
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    /// `E_FAIL`.
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    /// `E_INVALIDARG`.
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    /// `E_OUTOFMEMORY`.
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    /// `HRESULT_FROM_WIN32(ERROR_NOT_ENOUGH_MEMORY)`.
    pub const NOT_ENOUGH_MEMORY: Self = Self::from_win32(ERROR_NOT_ENOUGH_MEMORY);
    /// `HRESULT_FROM_WIN32(ERROR_NOT_SUPPORTED)`.
    pub const NOT_SUPPORTED: Self = Self::from_win32(ERROR_NOT_SUPPORTED);

    /// Equivalent of the `HRESULT_FROM_WIN32` macro.
    pub const fn from_win32(code: u32) -> Self {
        if code as i32 <= 0 {
            Self(code as i32)
        } else {
            Self(((code & 0x0000_FFFF) | (7 << 16) | 0x8000_0000) as i32)
        }
    }

    /// Whether this code signals success (`SUCCEEDED`).
    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Whether this code signals failure (`FAILED`).
    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Whether this code is one of the allocation-failure codes a module
    /// factory may report.
    pub fn is_out_of_memory(self) -> bool {
        self == Self::E_OUTOFMEMORY || self == Self::NOT_ENOUGH_MEMORY
    }

    /// The raw value.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HResult({:#010X})", self.0 as u32)
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010X}", self.0 as u32)
    }
}

impl From<i32> for HResult {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl From<HResult> for i32 {
    fn from(hr: HResult) -> Self {
        hr.0
    }
}
