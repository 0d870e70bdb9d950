//! Conversions between Rust strings and the ABI's nul-terminated strings.

use std::ffi::{CStr, CString};

use crate::abi::{Pcstr, Pcwstr};

/// Borrows the bytes of a nul-terminated narrow string, without the terminator.
///
/// Returns `None` if the pointer is null.
///
/// # Safety
/// A non-null `ptr` must point to a nul-terminated string that outlives `'a`.
pub unsafe fn narrow_bytes<'a>(ptr: Pcstr) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_bytes())
}

/// Borrows the code units of a nul-terminated UTF-16 string, without the terminator.
///
/// Returns `None` if the pointer is null.
///
/// # Safety
/// A non-null `ptr` must point to a nul-terminated UTF-16 string that outlives `'a`.
pub unsafe fn wide_units<'a>(ptr: Pcwstr) -> Option<&'a [u16]> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0usize;
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

/// A borrowed, nul-terminated UTF-16 string.
///
/// The terminator is part of the borrow, so [`WideCStr::as_ptr`] can be
/// handed back across the boundary unchanged.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WideCStr<'a>(&'a [u16]);

static EMPTY_WIDE: [u16; 1] = [0];

impl<'a> WideCStr<'a> {
    /// Borrows a nul-terminated UTF-16 string. Returns `None` for null.
    ///
    /// # Safety
    /// A non-null `ptr` must point to a nul-terminated UTF-16 string that outlives `'a`.
    pub unsafe fn from_ptr(ptr: Pcwstr) -> Option<Self> {
        let units = unsafe { wide_units(ptr) }?;
        Some(Self(unsafe { std::slice::from_raw_parts(ptr, units.len() + 1) }))
    }

    /// Wraps a slice whose last element is the terminator.
    ///
    /// Returns `None` if the slice is not nul-terminated.
    pub fn from_units_with_nul(units: &'a [u16]) -> Option<Self> {
        match units.last() {
            Some(0) => Some(Self(units)),
            _ => None,
        }
    }

    /// The empty string.
    pub fn empty() -> WideCStr<'static> {
        WideCStr(&EMPTY_WIDE)
    }

    /// Code units without the terminator.
    pub fn as_units(&self) -> &'a [u16] {
        &self.0[..self.0.len() - 1]
    }

    /// Pointer to the nul-terminated string.
    pub fn as_ptr(&self) -> Pcwstr {
        self.0.as_ptr()
    }

    /// Decodes the string, replacing invalid sequences.
    pub fn to_string_lossy(&self) -> String {
        wide_to_string_lossy(self.as_units())
    }
}

impl std::fmt::Debug for WideCStr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

/// Encodes `s` as nul-terminated UTF-16.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Encodes `s` as a nul-terminated narrow string.
///
/// Returns `None` if the string contains interior nul bytes.
pub fn to_narrow(s: &str) -> Option<CString> {
    CString::new(s).ok()
}

/// Decodes UTF-16 code units, replacing invalid sequences.
pub fn wide_to_string_lossy(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}
