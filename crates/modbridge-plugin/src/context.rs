//! Request context emulator.
//!
//! An `IHttpContext` whose only working member is `SetServerVariable`,
//! which rejects null arguments with `E_INVALIDARG`.
//! `IndicateCompletion` and `DisableNotifications` succeed silently.
//! Every other member records a fault, logs it, and returns null, zero or
//! `E_NOTIMPL`; the dispatcher turns that fault into a `NotImplemented`
//! error once the handler returns.

use std::cell::Cell;
use std::ffi::{CStr, c_void};

use tracing::{debug, error, trace, warn};

use modbridge_core::types::ContextId;
use modbridge_sdk::abi::{Bool, CHttpModule, Dword, IHttpContext, IHttpContextVtbl, Pcstr, Pcwstr};
use modbridge_sdk::notification::RawNotificationStatus;
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::WideCStr;

use crate::callbacks::ContextCallbacks;
use crate::ffi::safety::guard_hresult;

/// Emulated execution context bound to one set of host callbacks.
#[repr(C)]
pub struct ExecutionContext {
    base: IHttpContext,
    id: ContextId,
    callbacks: ContextCallbacks,
    fault: Cell<Option<&'static str>>,
}

impl ExecutionContext {
    /// Creates a context. Boxed so the interface pointer is stable.
    pub fn new(callbacks: ContextCallbacks) -> Box<Self> {
        let context = Box::new(Self {
            base: IHttpContext {
                vtbl: &CONTEXT_VTBL,
            },
            id: ContextId::new(),
            callbacks,
            fault: Cell::new(None),
        });
        trace!(context = %context.id, "Execution context created");
        context
    }

    /// Arena handle of this context.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Pointer to pass to a module handler.
    pub fn as_raw(&self) -> *mut IHttpContext {
        std::ptr::from_ref(&self.base).cast_mut()
    }

    /// First unimplemented member invoked since the last reset.
    pub fn fault(&self) -> Option<&'static str> {
        self.fault.get()
    }

    /// Returns and clears the recorded fault.
    pub fn take_fault(&self) -> Option<&'static str> {
        self.fault.take()
    }

    fn record_fault(&self, member: &'static str) {
        error!(
            context = %self.id,
            member = member,
            "Module invoked an unimplemented context member"
        );
        if self.fault.get().is_none() {
            self.fault.set(Some(member));
        }
    }

    fn set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        let status = guard_hresult("SetServerVariable", || {
            self.callbacks
                .on_set_server_variable
                .on_set_server_variable(name, value)
        });
        debug!(
            context = %self.id,
            name = %name.to_string_lossy(),
            status = %status,
            "SetServerVariable forwarded"
        );
        status
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("fault", &self.fault.get())
            .finish()
    }
}

/// # Safety
/// `this` must be the `base` of a live [`ExecutionContext`].
unsafe fn context<'a>(this: *mut IHttpContext) -> &'a ExecutionContext {
    unsafe { &*this.cast_const().cast::<ExecutionContext>() }
}

/// Defines a context member that records a fault and returns `$fallback`.
macro_rules! not_implemented {
    ($fn_name:ident, $member:literal, ($($arg:ident: $ty:ty),*) -> $ret:ty = $fallback:expr) => {
        unsafe extern "system" fn $fn_name(this: *mut IHttpContext $(, $arg: $ty)*) -> $ret {
            $(let _ = $arg;)*
            unsafe { context(this) }.record_fault($member);
            $fallback
        }
    };
}

const NULL: *mut c_void = std::ptr::null_mut();

not_implemented!(get_site, "GetSite", () -> *mut c_void = NULL);
not_implemented!(get_application, "GetApplication", () -> *mut c_void = NULL);
not_implemented!(get_connection, "GetConnection", () -> *mut c_void = NULL);
not_implemented!(get_request, "GetRequest", () -> *mut c_void = NULL);
not_implemented!(get_response, "GetResponse", () -> *mut c_void = NULL);
not_implemented!(get_response_headers_sent, "GetResponseHeadersSent", () -> Bool = 0);
not_implemented!(get_user, "GetUser", () -> *mut c_void = NULL);
not_implemented!(get_module_context_container, "GetModuleContextContainer", () -> *mut c_void = NULL);
not_implemented!(post_completion, "PostCompletion", (cb_bytes: Dword) -> HResult = HResult::E_NOTIMPL);
not_implemented!(
    get_next_notification,
    "GetNextNotification",
    (
        status: RawNotificationStatus,
        notification: *mut Dword,
        is_post_notification: *mut Bool,
        module_info: *mut *mut CHttpModule,
        request_output: *mut *mut c_void
    ) -> Bool = 0
);
not_implemented!(
    get_is_last_notification,
    "GetIsLastNotification",
    (status: RawNotificationStatus) -> Bool = 0
);
not_implemented!(
    execute_request,
    "ExecuteRequest",
    (
        is_async: Bool,
        child: *mut IHttpContext,
        execute_flags: Dword,
        user: *mut c_void,
        completion_expected: *mut Bool
    ) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(get_execute_flags, "GetExecuteFlags", () -> Dword = 0);
not_implemented!(
    get_server_variable_narrow,
    "GetServerVariable",
    (name: Pcstr, value: *mut Pcstr, value_length: *mut Dword) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(
    get_server_variable_wide,
    "GetServerVariable",
    (name: Pcstr, value: *mut Pcwstr, value_length: *mut Dword) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(
    allocate_request_memory,
    "AllocateRequestMemory",
    (cb_allocation: Dword) -> *mut c_void = NULL
);
not_implemented!(get_url_info, "GetUrlInfo", () -> *mut c_void = NULL);
not_implemented!(get_metadata, "GetMetadata", () -> *mut c_void = NULL);
not_implemented!(get_physical_path, "GetPhysicalPath", (length: *mut Dword) -> Pcwstr = std::ptr::null());
not_implemented!(get_script_name, "GetScriptName", (length: *mut Dword) -> Pcwstr = std::ptr::null());
not_implemented!(
    get_script_translated,
    "GetScriptTranslated",
    (length: *mut Dword) -> Pcwstr = std::ptr::null()
);
not_implemented!(get_script_map, "GetScriptMap", () -> *mut c_void = NULL);
not_implemented!(set_request_handled, "SetRequestHandled", () -> () = ());
not_implemented!(get_file_info, "GetFileInfo", () -> *mut c_void = NULL);
not_implemented!(
    map_path,
    "MapPath",
    (url: Pcwstr, physical_path: *mut u16, physical_path_length: *mut Dword) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(
    notify_custom_notification,
    "NotifyCustomNotification",
    (custom_output: *mut c_void, completion_expected: *mut Bool) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(
    get_parent_context,
    "GetParentContext",
    () -> *mut IHttpContext = std::ptr::null_mut()
);
not_implemented!(
    get_root_context,
    "GetRootContext",
    () -> *mut IHttpContext = std::ptr::null_mut()
);
not_implemented!(
    clone_context,
    "CloneContext",
    (clone_flags: Dword, cloned: *mut *mut IHttpContext) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(release_cloned_context, "ReleaseClonedContext", () -> HResult = HResult::E_NOTIMPL);
not_implemented!(
    get_current_execution_stats,
    "GetCurrentExecutionStats",
    (
        notification: *mut Dword,
        notification_start_tick_count: *mut Dword,
        module: *mut Pcwstr,
        module_start_tick_count: *mut Dword,
        async_notification: *mut Dword,
        async_notification_start_tick_count: *mut Dword
    ) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(get_trace_context, "GetTraceContext", () -> *mut c_void = NULL);
not_implemented!(
    get_server_var_changes,
    "GetServerVarChanges",
    (
        old_change_number: Dword,
        new_change_number: *mut Dword,
        variable_snapshot: *mut Dword,
        variable_name_snapshot: *mut *mut Pcstr,
        variable_value_snapshot: *mut *mut Pcwstr,
        diffed_variables: *mut Dword,
        diffed_variable_indices: *mut *mut Dword
    ) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(cancel_io, "CancelIo", () -> HResult = HResult::E_NOTIMPL);
not_implemented!(
    map_handler,
    "MapHandler",
    (
        site_id: Dword,
        site_name: Pcwstr,
        url: Pcwstr,
        verb: Pcstr,
        script_map: *mut *mut c_void,
        ignore_wildcard_mappings: Bool
    ) -> HResult = HResult::E_NOTIMPL
);
not_implemented!(
    get_extended_interface,
    "GetExtendedInterface",
    (version: Dword, interface: *mut *mut c_void) -> HResult = HResult::E_NOTIMPL
);

unsafe extern "system" fn indicate_completion(this: *mut IHttpContext, status: RawNotificationStatus) {
    let context = unsafe { context(this) };
    trace!(context = %context.id, status = status, "IndicateCompletion ignored");
}

unsafe extern "system" fn disable_notifications(
    this: *mut IHttpContext,
    notifications: Dword,
    post_notifications: Dword,
) {
    let context = unsafe { context(this) };
    trace!(
        context = %context.id,
        notifications = notifications,
        post_notifications = post_notifications,
        "DisableNotifications ignored"
    );
}

unsafe extern "system" fn set_server_variable(
    this: *mut IHttpContext,
    name: Pcstr,
    value: Pcwstr,
) -> HResult {
    let context = unsafe { context(this) };
    // A null argument never reaches the host.
    let value = unsafe { WideCStr::from_ptr(value) };
    match (name.is_null(), value) {
        (false, Some(value)) => context.set_server_variable(unsafe { CStr::from_ptr(name) }, value),
        (name_is_null, _) => {
            warn!(
                context = %context.id,
                null_name = name_is_null,
                "SetServerVariable called with a null argument"
            );
            HResult::E_INVALIDARG
        }
    }
}

static CONTEXT_VTBL: IHttpContextVtbl = IHttpContextVtbl {
    get_site,
    get_application,
    get_connection,
    get_request,
    get_response,
    get_response_headers_sent,
    get_user,
    get_module_context_container,
    indicate_completion,
    post_completion,
    disable_notifications,
    get_next_notification,
    get_is_last_notification,
    execute_request,
    get_execute_flags,
    get_server_variable_narrow,
    get_server_variable_wide,
    set_server_variable,
    allocate_request_memory,
    get_url_info,
    get_metadata,
    get_physical_path,
    get_script_name,
    get_script_translated,
    get_script_map,
    set_request_handled,
    get_file_info,
    map_path,
    notify_custom_notification,
    get_parent_context,
    get_root_context,
    clone_context,
    release_cloned_context,
    get_current_execution_stats,
    get_trace_context,
    get_server_var_changes,
    cancel_io,
    map_handler,
    get_extended_interface,
};
