//! Binary layout of the vendor's native module interfaces.
//!
//! Each interface is a `repr(C)` struct whose only field is a pointer to a
//! table of `extern "system"` function pointers, in declaration order.
//! This matches how a 64-bit MSVC C++ compiler lays out a single-inheritance
//! abstract class, so a precompiled module can call into objects built here
//! and the bridge can call into objects the module built.
//!
//! Wide strings are UTF-16 on every platform.

use std::ffi::{c_char, c_void};

use crate::notification::{RQ_NOTIFICATION_CONTINUE, RawNotificationStatus};
use crate::status::HResult;

/// `DWORD`.
pub type Dword = u32;
/// `BOOL`.
pub type Bool = i32;
/// `PCSTR`: nul-terminated narrow string.
pub type Pcstr = *const c_char;
/// `PCWSTR`: nul-terminated UTF-16 string.
pub type Pcwstr = *const u16;

/// Name of the registration entry point every module exports.
pub const REGISTER_MODULE_SYMBOL: &[u8] = b"RegisterModule\0";

/// Signature of the registration entry point.
///
/// `global_info` is the server interface; the emulation always passes null.
pub type RegisterModuleFn = unsafe extern "system" fn(
    server_version: Dword,
    module_info: *mut IHttpModuleRegistrationInfo,
    global_info: *mut c_void,
) -> HResult;

// ── Registration info ──────────────────────────────────────────────

/// `IHttpModuleRegistrationInfo`.
#[repr(C)]
pub struct IHttpModuleRegistrationInfo {
    /// Interface table.
    pub vtbl: *const IHttpModuleRegistrationInfoVtbl,
}

/// Member table of [`IHttpModuleRegistrationInfo`].
#[repr(C)]
pub struct IHttpModuleRegistrationInfoVtbl {
    /// `GetName`
    pub get_name: unsafe extern "system" fn(this: *const IHttpModuleRegistrationInfo) -> Pcwstr,
    /// `GetId`
    pub get_id: unsafe extern "system" fn(this: *const IHttpModuleRegistrationInfo) -> *mut c_void,
    /// `SetRequestNotifications`
    pub set_request_notifications: unsafe extern "system" fn(
        this: *mut IHttpModuleRegistrationInfo,
        factory: *mut IHttpModuleFactory,
        request_notifications: Dword,
        post_request_notifications: Dword,
    ) -> HResult,
    /// `SetGlobalNotifications`
    pub set_global_notifications: unsafe extern "system" fn(
        this: *mut IHttpModuleRegistrationInfo,
        global_module: *mut c_void,
        global_notifications: Dword,
    ) -> HResult,
    /// `SetPriorityForRequestNotification`
    pub set_priority_for_request_notification: unsafe extern "system" fn(
        this: *mut IHttpModuleRegistrationInfo,
        request_notification: Dword,
        priority: Pcwstr,
    ) -> HResult,
    /// `SetPriorityForGlobalNotification`
    pub set_priority_for_global_notification: unsafe extern "system" fn(
        this: *mut IHttpModuleRegistrationInfo,
        global_notification: Dword,
        priority: Pcwstr,
    ) -> HResult,
}

impl IHttpModuleRegistrationInfo {
    /// Calls `SetRequestNotifications` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live registration object.
    pub unsafe fn set_request_notifications(
        this: *mut Self,
        factory: *mut IHttpModuleFactory,
        request_notifications: Dword,
        post_request_notifications: Dword,
    ) -> HResult {
        unsafe {
            ((*(*this).vtbl).set_request_notifications)(
                this,
                factory,
                request_notifications,
                post_request_notifications,
            )
        }
    }

    /// Calls `SetGlobalNotifications` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live registration object.
    pub unsafe fn set_global_notifications(
        this: *mut Self,
        global_module: *mut c_void,
        global_notifications: Dword,
    ) -> HResult {
        unsafe { ((*(*this).vtbl).set_global_notifications)(this, global_module, global_notifications) }
    }
}

// ── Module factory / allocator ─────────────────────────────────────

/// `IHttpModuleFactory`, implemented by the module.
#[repr(C)]
pub struct IHttpModuleFactory {
    /// Interface table.
    pub vtbl: *const IHttpModuleFactoryVtbl,
}

/// Member table of [`IHttpModuleFactory`].
#[repr(C)]
pub struct IHttpModuleFactoryVtbl {
    /// `GetHttpModule`
    pub get_http_module: unsafe extern "system" fn(
        this: *mut IHttpModuleFactory,
        module: *mut *mut CHttpModule,
        allocator: *mut IModuleAllocator,
    ) -> HResult,
    /// `Terminate`
    pub terminate: unsafe extern "system" fn(this: *mut IHttpModuleFactory),
}

impl IHttpModuleFactory {
    /// Calls `GetHttpModule` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live factory and `module` must be writable.
    pub unsafe fn get_http_module(
        this: *mut Self,
        module: *mut *mut CHttpModule,
        allocator: *mut IModuleAllocator,
    ) -> HResult {
        unsafe { ((*(*this).vtbl).get_http_module)(this, module, allocator) }
    }

    /// Calls `Terminate` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live factory; it is invalid afterwards.
    pub unsafe fn terminate(this: *mut Self) {
        unsafe { ((*(*this).vtbl).terminate)(this) }
    }
}

/// `IModuleAllocator`, implemented by the host.
#[repr(C)]
pub struct IModuleAllocator {
    /// Interface table.
    pub vtbl: *const IModuleAllocatorVtbl,
}

/// Member table of [`IModuleAllocator`].
#[repr(C)]
pub struct IModuleAllocatorVtbl {
    /// `AllocateMemory`
    pub allocate_memory:
        unsafe extern "system" fn(this: *mut IModuleAllocator, cb_allocation: Dword) -> *mut c_void,
}

impl IModuleAllocator {
    /// Calls `AllocateMemory` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live allocator.
    pub unsafe fn allocate_memory(this: *mut Self, cb_allocation: Dword) -> *mut c_void {
        unsafe { ((*(*this).vtbl).allocate_memory)(this, cb_allocation) }
    }
}

// ── Module ─────────────────────────────────────────────────────────

/// `CHttpModule`, implemented by the module.
#[repr(C)]
pub struct CHttpModule {
    /// Interface table.
    pub vtbl: *const CHttpModuleVtbl,
}

/// Handler for a request notification.
pub type RequestNotificationFn = unsafe extern "system" fn(
    this: *mut CHttpModule,
    context: *mut IHttpContext,
    provider: *mut c_void,
) -> RawNotificationStatus;

/// Member table of [`CHttpModule`].
///
/// Slots after the paired request handlers exist for layout only.
#[repr(C)]
pub struct CHttpModuleVtbl {
    pub on_begin_request: RequestNotificationFn,
    pub on_post_begin_request: RequestNotificationFn,
    pub on_authenticate_request: RequestNotificationFn,
    pub on_post_authenticate_request: RequestNotificationFn,
    pub on_authorize_request: RequestNotificationFn,
    pub on_post_authorize_request: RequestNotificationFn,
    pub on_resolve_request_cache: RequestNotificationFn,
    pub on_post_resolve_request_cache: RequestNotificationFn,
    pub on_map_request_handler: RequestNotificationFn,
    pub on_post_map_request_handler: RequestNotificationFn,
    pub on_acquire_request_state: RequestNotificationFn,
    pub on_post_acquire_request_state: RequestNotificationFn,
    pub on_pre_execute_request_handler: RequestNotificationFn,
    pub on_post_pre_execute_request_handler: RequestNotificationFn,
    pub on_execute_request_handler: RequestNotificationFn,
    pub on_post_execute_request_handler: RequestNotificationFn,
    pub on_release_request_state: RequestNotificationFn,
    pub on_post_release_request_state: RequestNotificationFn,
    pub on_update_request_cache: RequestNotificationFn,
    pub on_post_update_request_cache: RequestNotificationFn,
    pub on_log_request: RequestNotificationFn,
    pub on_post_log_request: RequestNotificationFn,
    pub on_end_request: RequestNotificationFn,
    pub on_post_end_request: RequestNotificationFn,
    pub on_send_response: RequestNotificationFn,
    pub on_read_entity: RequestNotificationFn,
    pub on_map_path: RequestNotificationFn,
    pub on_custom_request_notification: RequestNotificationFn,
    pub on_async_completion: unsafe extern "system" fn(
        this: *mut CHttpModule,
        context: *mut IHttpContext,
        notification: Dword,
        is_post_notification: Bool,
        provider: *mut c_void,
        completion_info: *mut c_void,
    ) -> RawNotificationStatus,
    pub dispose: unsafe extern "system" fn(this: *mut CHttpModule),
}

/// Base-class behaviour for handlers a module does not override.
pub unsafe extern "system" fn continue_notification(
    _this: *mut CHttpModule,
    _context: *mut IHttpContext,
    _provider: *mut c_void,
) -> RawNotificationStatus {
    RQ_NOTIFICATION_CONTINUE
}

unsafe extern "system" fn continue_async_completion(
    _this: *mut CHttpModule,
    _context: *mut IHttpContext,
    _notification: Dword,
    _is_post_notification: Bool,
    _provider: *mut c_void,
    _completion_info: *mut c_void,
) -> RawNotificationStatus {
    RQ_NOTIFICATION_CONTINUE
}

impl CHttpModuleVtbl {
    /// A table that overrides only `OnBeginRequest` and `Dispose`.
    pub const fn with_begin_request(
        on_begin_request: RequestNotificationFn,
        dispose: unsafe extern "system" fn(this: *mut CHttpModule),
    ) -> Self {
        let c = continue_notification as RequestNotificationFn;
        Self {
            on_begin_request,
            on_post_begin_request: c,
            on_authenticate_request: c,
            on_post_authenticate_request: c,
            on_authorize_request: c,
            on_post_authorize_request: c,
            on_resolve_request_cache: c,
            on_post_resolve_request_cache: c,
            on_map_request_handler: c,
            on_post_map_request_handler: c,
            on_acquire_request_state: c,
            on_post_acquire_request_state: c,
            on_pre_execute_request_handler: c,
            on_post_pre_execute_request_handler: c,
            on_execute_request_handler: c,
            on_post_execute_request_handler: c,
            on_release_request_state: c,
            on_post_release_request_state: c,
            on_update_request_cache: c,
            on_post_update_request_cache: c,
            on_log_request: c,
            on_post_log_request: c,
            on_end_request: c,
            on_post_end_request: c,
            on_send_response: c,
            on_read_entity: c,
            on_map_path: c,
            on_custom_request_notification: c,
            on_async_completion: continue_async_completion,
            dispose,
        }
    }
}

impl CHttpModule {
    /// Calls `OnBeginRequest` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live module and `context` to a live context.
    pub unsafe fn on_begin_request(
        this: *mut Self,
        context: *mut IHttpContext,
        provider: *mut c_void,
    ) -> RawNotificationStatus {
        unsafe { ((*(*this).vtbl).on_begin_request)(this, context, provider) }
    }

    /// Calls `Dispose` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live module; it is invalid afterwards.
    pub unsafe fn dispose(this: *mut Self) {
        unsafe { ((*(*this).vtbl).dispose)(this) }
    }
}

// ── Execution context ──────────────────────────────────────────────

/// `IHttpContext`, implemented by the host.
#[repr(C)]
pub struct IHttpContext {
    /// Interface table.
    pub vtbl: *const IHttpContextVtbl,
}

type Getter = unsafe extern "system" fn(this: *mut IHttpContext) -> *mut c_void;
type StrGetter = unsafe extern "system" fn(this: *mut IHttpContext, length: *mut Dword) -> Pcwstr;

/// Member table of [`IHttpContext`].
///
/// MSVC groups overloads and emits them in reverse declaration order, so
/// the narrow `GetServerVariable` precedes the wide one.
#[repr(C)]
pub struct IHttpContextVtbl {
    pub get_site: Getter,
    pub get_application: Getter,
    pub get_connection: Getter,
    pub get_request: Getter,
    pub get_response: Getter,
    pub get_response_headers_sent: unsafe extern "system" fn(this: *mut IHttpContext) -> Bool,
    pub get_user: Getter,
    pub get_module_context_container: Getter,
    pub indicate_completion:
        unsafe extern "system" fn(this: *mut IHttpContext, status: RawNotificationStatus),
    pub post_completion: unsafe extern "system" fn(this: *mut IHttpContext, cb_bytes: Dword) -> HResult,
    pub disable_notifications: unsafe extern "system" fn(
        this: *mut IHttpContext,
        notifications: Dword,
        post_notifications: Dword,
    ),
    pub get_next_notification: unsafe extern "system" fn(
        this: *mut IHttpContext,
        status: RawNotificationStatus,
        notification: *mut Dword,
        is_post_notification: *mut Bool,
        module_info: *mut *mut CHttpModule,
        request_output: *mut *mut c_void,
    ) -> Bool,
    pub get_is_last_notification:
        unsafe extern "system" fn(this: *mut IHttpContext, status: RawNotificationStatus) -> Bool,
    pub execute_request: unsafe extern "system" fn(
        this: *mut IHttpContext,
        is_async: Bool,
        child: *mut IHttpContext,
        execute_flags: Dword,
        user: *mut c_void,
        completion_expected: *mut Bool,
    ) -> HResult,
    pub get_execute_flags: unsafe extern "system" fn(this: *mut IHttpContext) -> Dword,
    pub get_server_variable_narrow: unsafe extern "system" fn(
        this: *mut IHttpContext,
        name: Pcstr,
        value: *mut Pcstr,
        value_length: *mut Dword,
    ) -> HResult,
    pub get_server_variable_wide: unsafe extern "system" fn(
        this: *mut IHttpContext,
        name: Pcstr,
        value: *mut Pcwstr,
        value_length: *mut Dword,
    ) -> HResult,
    pub set_server_variable:
        unsafe extern "system" fn(this: *mut IHttpContext, name: Pcstr, value: Pcwstr) -> HResult,
    pub allocate_request_memory:
        unsafe extern "system" fn(this: *mut IHttpContext, cb_allocation: Dword) -> *mut c_void,
    pub get_url_info: Getter,
    pub get_metadata: Getter,
    pub get_physical_path: StrGetter,
    pub get_script_name: StrGetter,
    pub get_script_translated: StrGetter,
    pub get_script_map: Getter,
    pub set_request_handled: unsafe extern "system" fn(this: *mut IHttpContext),
    pub get_file_info: Getter,
    pub map_path: unsafe extern "system" fn(
        this: *mut IHttpContext,
        url: Pcwstr,
        physical_path: *mut u16,
        physical_path_length: *mut Dword,
    ) -> HResult,
    pub notify_custom_notification: unsafe extern "system" fn(
        this: *mut IHttpContext,
        custom_output: *mut c_void,
        completion_expected: *mut Bool,
    ) -> HResult,
    pub get_parent_context: unsafe extern "system" fn(this: *mut IHttpContext) -> *mut IHttpContext,
    pub get_root_context: unsafe extern "system" fn(this: *mut IHttpContext) -> *mut IHttpContext,
    pub clone_context: unsafe extern "system" fn(
        this: *mut IHttpContext,
        clone_flags: Dword,
        cloned: *mut *mut IHttpContext,
    ) -> HResult,
    pub release_cloned_context: unsafe extern "system" fn(this: *mut IHttpContext) -> HResult,
    pub get_current_execution_stats: unsafe extern "system" fn(
        this: *mut IHttpContext,
        notification: *mut Dword,
        notification_start_tick_count: *mut Dword,
        module: *mut Pcwstr,
        module_start_tick_count: *mut Dword,
        async_notification: *mut Dword,
        async_notification_start_tick_count: *mut Dword,
    ) -> HResult,
    pub get_trace_context: Getter,
    pub get_server_var_changes: unsafe extern "system" fn(
        this: *mut IHttpContext,
        old_change_number: Dword,
        new_change_number: *mut Dword,
        variable_snapshot: *mut Dword,
        variable_name_snapshot: *mut *mut Pcstr,
        variable_value_snapshot: *mut *mut Pcwstr,
        diffed_variables: *mut Dword,
        diffed_variable_indices: *mut *mut Dword,
    ) -> HResult,
    pub cancel_io: unsafe extern "system" fn(this: *mut IHttpContext) -> HResult,
    pub map_handler: unsafe extern "system" fn(
        this: *mut IHttpContext,
        site_id: Dword,
        site_name: Pcwstr,
        url: Pcwstr,
        verb: Pcstr,
        script_map: *mut *mut c_void,
        ignore_wildcard_mappings: Bool,
    ) -> HResult,
    pub get_extended_interface: unsafe extern "system" fn(
        this: *mut IHttpContext,
        version: Dword,
        interface: *mut *mut c_void,
    ) -> HResult,
}

impl IHttpContext {
    /// Calls `SetServerVariable` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live context; `name` and `value` must be
    /// nul-terminated.
    pub unsafe fn set_server_variable(this: *mut Self, name: Pcstr, value: Pcwstr) -> HResult {
        unsafe { ((*(*this).vtbl).set_server_variable)(this, name, value) }
    }

    /// Calls the wide `GetServerVariable` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live context and the out-pointers must be writable.
    pub unsafe fn get_server_variable(
        this: *mut Self,
        name: Pcstr,
        value: *mut Pcwstr,
        value_length: *mut Dword,
    ) -> HResult {
        unsafe { ((*(*this).vtbl).get_server_variable_wide)(this, name, value, value_length) }
    }

    /// Calls `GetRequest` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live context.
    pub unsafe fn get_request(this: *mut Self) -> *mut c_void {
        unsafe { ((*(*this).vtbl).get_request)(this) }
    }

    /// Calls `IndicateCompletion` through the interface table.
    ///
    /// # Safety
    /// `this` must point to a live context.
    pub unsafe fn indicate_completion(this: *mut Self, status: RawNotificationStatus) {
        unsafe { ((*(*this).vtbl).indicate_completion)(this, status) }
    }
}
