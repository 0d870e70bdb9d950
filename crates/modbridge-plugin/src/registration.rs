//! Registration emulator.
//!
//! Stand-in for the server's module registration object. Only
//! `SetRequestNotifications` does real work: it captures the factory and
//! masks and forwards them to the host. Global notifications and explicit
//! priorities are rejected with `NOT_SUPPORTED`.

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::Arc;

use tracing::{debug, warn};

use modbridge_sdk::abi::{
    Dword, IHttpModuleFactory, IHttpModuleRegistrationInfo, IHttpModuleRegistrationInfoVtbl,
    Pcwstr, RegisterModuleFn,
};
use modbridge_sdk::notification::{NotificationSubscription, RequestNotifications};
use modbridge_sdk::status::HResult;

use crate::callbacks::{FactoryRef, RegistrationCallback};
use crate::ffi::safety::guard_hresult;

/// One `SetRequestNotifications` call as observed by the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Factory the module handed over.
    pub factory: FactoryRef,
    /// Masks the module asked for.
    pub subscription: NotificationSubscription,
    /// Status the host returned to the module.
    pub status: HResult,
}

impl Registration {
    /// Whether the host accepted this registration.
    pub fn is_accepted(&self) -> bool {
        self.status.is_success()
    }
}

/// What an entry-point call produced.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// Status returned by the entry point.
    pub status: HResult,
    /// Every `SetRequestNotifications` call, in call order.
    pub registrations: Vec<Registration>,
    /// Names of unsupported members the module invoked, in call order.
    pub unsupported_calls: Vec<&'static str>,
}

static EMPTY_NAME: [u16; 1] = [0];

static REGISTRATION_VTBL: IHttpModuleRegistrationInfoVtbl = IHttpModuleRegistrationInfoVtbl {
    get_name,
    get_id,
    set_request_notifications,
    set_global_notifications,
    set_priority_for_request_notification,
    set_priority_for_global_notification,
};

/// The emulated registration object handed to a module's entry point.
///
/// Lives on the loader's stack for the duration of one entry-point call;
/// the module must not retain the pointer.
#[repr(C)]
pub struct RegistrationEmulator {
    base: IHttpModuleRegistrationInfo,
    callbacks: Arc<dyn RegistrationCallback>,
    captured: RefCell<Vec<Registration>>,
    unsupported: RefCell<Vec<&'static str>>,
}

impl RegistrationEmulator {
    /// Creates an emulator bound to the host's registration callback.
    pub fn new(callbacks: Arc<dyn RegistrationCallback>) -> Self {
        Self {
            base: IHttpModuleRegistrationInfo {
                vtbl: &REGISTRATION_VTBL,
            },
            callbacks,
            captured: RefCell::new(Vec::new()),
            unsupported: RefCell::new(Vec::new()),
        }
    }

    /// Pointer to pass to the module.
    pub fn as_raw(&mut self) -> *mut IHttpModuleRegistrationInfo {
        &mut self.base
    }

    /// Invokes `entry` with this emulator and collects what it registered.
    ///
    /// # Safety
    /// `entry` must be a conforming registration entry point. The emulator
    /// must not move while the call is in progress.
    pub unsafe fn register(mut self, entry: RegisterModuleFn, server_version: u32) -> RegistrationOutcome {
        debug!(server_version = server_version, "Invoking module entry point");
        let status = unsafe { entry(server_version, self.as_raw(), std::ptr::null_mut()) };
        RegistrationOutcome {
            status,
            registrations: self.captured.into_inner(),
            unsupported_calls: self.unsupported.into_inner(),
        }
    }

    fn record(&self, factory: FactoryRef, subscription: NotificationSubscription) -> HResult {
        let status = guard_hresult("SetRequestNotifications", || {
            self.callbacks
                .on_set_request_notifications(factory, subscription)
        });

        if status.is_success() {
            debug!(
                factory = factory.address(),
                request_mask = %subscription.request_mask(),
                post_request_mask = %subscription.post_request_mask(),
                "Registration captured"
            );
        } else {
            warn!(
                factory = factory.address(),
                status = %status,
                "Host rejected registration"
            );
        }

        self.captured.borrow_mut().push(Registration {
            factory,
            subscription,
            status,
        });
        status
    }

    fn reject(&self, member: &'static str) -> HResult {
        warn!(member = member, "Module invoked unsupported registration member");
        self.unsupported.borrow_mut().push(member);
        HResult::NOT_SUPPORTED
    }
}

/// # Safety
/// `this` must be the `base` of a live [`RegistrationEmulator`].
unsafe fn emulator<'a>(this: *const IHttpModuleRegistrationInfo) -> &'a RegistrationEmulator {
    unsafe { &*this.cast::<RegistrationEmulator>() }
}

unsafe extern "system" fn get_name(_this: *const IHttpModuleRegistrationInfo) -> Pcwstr {
    EMPTY_NAME.as_ptr()
}

unsafe extern "system" fn get_id(_this: *const IHttpModuleRegistrationInfo) -> *mut c_void {
    std::ptr::null_mut()
}

unsafe extern "system" fn set_request_notifications(
    this: *mut IHttpModuleRegistrationInfo,
    factory: *mut IHttpModuleFactory,
    request_notifications: Dword,
    post_request_notifications: Dword,
) -> HResult {
    let emulator = unsafe { emulator(this) };
    emulator.record(
        FactoryRef::from_raw(factory),
        NotificationSubscription::new(
            RequestNotifications(request_notifications),
            RequestNotifications(post_request_notifications),
        ),
    )
}

unsafe extern "system" fn set_global_notifications(
    this: *mut IHttpModuleRegistrationInfo,
    _global_module: *mut c_void,
    _global_notifications: Dword,
) -> HResult {
    unsafe { emulator(this) }.reject("SetGlobalNotifications")
}

unsafe extern "system" fn set_priority_for_request_notification(
    this: *mut IHttpModuleRegistrationInfo,
    _request_notification: Dword,
    _priority: Pcwstr,
) -> HResult {
    unsafe { emulator(this) }.reject("SetPriorityForRequestNotification")
}

unsafe extern "system" fn set_priority_for_global_notification(
    this: *mut IHttpModuleRegistrationInfo,
    _global_notification: Dword,
    _priority: Pcwstr,
) -> HResult {
    unsafe { emulator(this) }.reject("SetPriorityForGlobalNotification")
}
