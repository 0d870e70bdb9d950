//! In-process native modules for exercising the bridge.
//!
//! Each fixture owns one factory built from the same `extern "system"`
//! tables a compiled module would export. The fixture's entry point picks up
//! the most recently created (or activated) fixture on the current thread.

use std::cell::Cell;
use std::ffi::{CStr, c_void};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use modbridge_sdk::abi::{
    CHttpModule, CHttpModuleVtbl, Dword, IHttpContext, IHttpModuleFactory, IHttpModuleFactoryVtbl,
    IHttpModuleRegistrationInfo, IModuleAllocator, RegisterModuleFn,
};
use modbridge_sdk::notification::{
    NotificationSubscription, RQ_NOTIFICATION_CONTINUE, RawNotificationStatus,
    RequestNotifications,
};
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::WideCStr;

use crate::callbacks::{
    CallbackTable, ContextCallbacks, FactoryRef, RegistrationCallback, ServerVariableCallback,
};

/// What a test module does at each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleBehavior {
    /// Registers for begin-request, sets `X = Y`, returns `CONTINUE`.
    SetServerVariable,
    /// Registers for begin-request and returns the given raw verdict.
    Verdict(RawNotificationStatus),
    /// Calls `GetRequest` from begin-request.
    CallsGetRequest,
    /// Factory reports `HRESULT_FROM_WIN32(ERROR_NOT_ENOUGH_MEMORY)`.
    FactoryOutOfMemory,
    /// Factory reports `E_FAIL`.
    FactoryFails,
    /// Registers a null factory.
    NullFactory,
    /// Registers, then returns `E_FAIL` from the entry point.
    RejectRegistration,
    /// Calls `SetGlobalNotifications` before registering.
    GlobalThenRequest,
    /// Registers, then returns `S_OK` whatever the host answered.
    IgnoresRegistrationStatus,
}

/// Counters shared by a factory and the modules it created.
#[derive(Debug, Default)]
pub struct FactoryStats {
    pub modules_created: AtomicUsize,
    pub modules_disposed: AtomicUsize,
    pub begin_request_calls: AtomicUsize,
    pub terminate_calls: AtomicUsize,
    pub allocator_returned_memory: AtomicBool,
    pub get_request_was_null: AtomicBool,
    pub last_set_status: AtomicI32,
}

impl FactoryStats {
    pub fn created(&self) -> usize {
        self.modules_created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.modules_disposed.load(Ordering::SeqCst)
    }

    pub fn begin_requests(&self) -> usize {
        self.begin_request_calls.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    pub fn last_set_status(&self) -> HResult {
        HResult(self.last_set_status.load(Ordering::SeqCst))
    }
}

#[repr(C)]
struct TestFactory {
    base: IHttpModuleFactory,
    behavior: ModuleBehavior,
    stats: Arc<FactoryStats>,
}

#[repr(C)]
struct TestModule {
    base: CHttpModule,
    behavior: ModuleBehavior,
    stats: Arc<FactoryStats>,
}

static FACTORY_VTBL: IHttpModuleFactoryVtbl = IHttpModuleFactoryVtbl {
    get_http_module: factory_get_http_module,
    terminate: factory_terminate,
};

static MODULE_VTBL: CHttpModuleVtbl =
    CHttpModuleVtbl::with_begin_request(module_on_begin_request, module_dispose);

static WIDE_Y: [u16; 2] = [b'Y' as u16, 0];

thread_local! {
    static CURRENT: Cell<*mut IHttpModuleFactory> = const { Cell::new(std::ptr::null_mut()) };
}

/// A test module: its entry point and the factory it registers.
///
/// Terminating the factory only counts the call, so the stats stay readable
/// until the fixture is dropped. Keep the fixture alive longer than any
/// bridge that loaded it.
pub struct Fixture {
    pub entry: RegisterModuleFn,
    factory: Box<TestFactory>,
}

impl Fixture {
    pub fn factory(&self) -> FactoryRef {
        FactoryRef::from_raw(std::ptr::from_ref(&self.factory.base).cast_mut())
    }

    pub fn stats(&self) -> &FactoryStats {
        &self.factory.stats
    }

    /// Points the entry point back at this fixture.
    pub fn activate(&self) {
        CURRENT.with(|current| current.set(self.factory().as_ptr()));
    }
}

pub fn fixture(behavior: ModuleBehavior) -> Fixture {
    let fixture = Fixture {
        entry: register_test_module,
        factory: Box::new(TestFactory {
            base: IHttpModuleFactory {
                vtbl: &FACTORY_VTBL,
            },
            behavior,
            stats: Arc::new(FactoryStats::default()),
        }),
    };
    fixture.activate();
    fixture
}

unsafe extern "system" fn register_test_module(
    _server_version: Dword,
    module_info: *mut IHttpModuleRegistrationInfo,
    _global_info: *mut c_void,
) -> HResult {
    let factory = CURRENT.with(Cell::get);
    if factory.is_null() {
        return HResult::E_FAIL;
    }
    let behavior = unsafe { (*factory.cast::<TestFactory>()).behavior };

    if behavior == ModuleBehavior::GlobalThenRequest {
        // Result deliberately ignored, as a tolerant module would.
        let _ = unsafe {
            IHttpModuleRegistrationInfo::set_global_notifications(
                module_info,
                std::ptr::null_mut(),
                1,
            )
        };
    }

    let registered = if behavior == ModuleBehavior::NullFactory {
        std::ptr::null_mut()
    } else {
        factory
    };
    let status = unsafe {
        IHttpModuleRegistrationInfo::set_request_notifications(
            module_info,
            registered,
            RequestNotifications::BEGIN_REQUEST.bits(),
            0,
        )
    };

    match behavior {
        ModuleBehavior::RejectRegistration => HResult::E_FAIL,
        ModuleBehavior::IgnoresRegistrationStatus => HResult::S_OK,
        _ => status,
    }
}

unsafe extern "system" fn factory_get_http_module(
    this: *mut IHttpModuleFactory,
    module: *mut *mut CHttpModule,
    allocator: *mut IModuleAllocator,
) -> HResult {
    let factory = unsafe { &*this.cast::<TestFactory>() };
    match factory.behavior {
        ModuleBehavior::FactoryOutOfMemory => return HResult::NOT_ENOUGH_MEMORY,
        ModuleBehavior::FactoryFails => return HResult::E_FAIL,
        _ => {}
    }

    if !allocator.is_null() {
        let scratch = unsafe { IModuleAllocator::allocate_memory(allocator, 64) };
        factory
            .stats
            .allocator_returned_memory
            .store(!scratch.is_null(), Ordering::SeqCst);
    }

    let instance = Box::new(TestModule {
        base: CHttpModule { vtbl: &MODULE_VTBL },
        behavior: factory.behavior,
        stats: factory.stats.clone(),
    });
    unsafe { *module = Box::into_raw(instance).cast() };
    factory.stats.modules_created.fetch_add(1, Ordering::SeqCst);
    HResult::S_OK
}

unsafe extern "system" fn factory_terminate(this: *mut IHttpModuleFactory) {
    let factory = unsafe { &*this.cast::<TestFactory>() };
    factory.stats.terminate_calls.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "system" fn module_on_begin_request(
    this: *mut CHttpModule,
    context: *mut IHttpContext,
    _provider: *mut c_void,
) -> RawNotificationStatus {
    let module = unsafe { &*this.cast::<TestModule>() };
    module.stats.begin_request_calls.fetch_add(1, Ordering::SeqCst);

    match module.behavior {
        ModuleBehavior::SetServerVariable => {
            let status =
                unsafe { IHttpContext::set_server_variable(context, c"X".as_ptr(), WIDE_Y.as_ptr()) };
            module
                .stats
                .last_set_status
                .store(status.raw(), Ordering::SeqCst);
            RQ_NOTIFICATION_CONTINUE
        }
        ModuleBehavior::Verdict(raw) => raw,
        ModuleBehavior::CallsGetRequest => {
            let request = unsafe { IHttpContext::get_request(context) };
            module
                .stats
                .get_request_was_null
                .store(request.is_null(), Ordering::SeqCst);
            RQ_NOTIFICATION_CONTINUE
        }
        _ => RQ_NOTIFICATION_CONTINUE,
    }
}

unsafe extern "system" fn module_dispose(this: *mut CHttpModule) {
    let module = unsafe { Box::from_raw(this.cast::<TestModule>()) };
    module.stats.modules_disposed.fetch_add(1, Ordering::SeqCst);
}

struct RegistrationSink {
    status: HResult,
    calls: Mutex<Vec<(FactoryRef, NotificationSubscription)>>,
}

impl RegistrationCallback for RegistrationSink {
    fn on_set_request_notifications(
        &self,
        factory: FactoryRef,
        subscription: NotificationSubscription,
    ) -> HResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((factory, subscription));
        self.status
    }
}

struct VariableSink {
    status: HResult,
    calls: Mutex<Vec<(String, String)>>,
}

impl ServerVariableCallback for VariableSink {
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string_lossy().into_owned(), value.to_string_lossy()));
        self.status
    }
}

/// A host callback table that records every call.
pub struct HostRecorder {
    pub table: CallbackTable,
    registrations: Arc<RegistrationSink>,
    variables: Arc<VariableSink>,
}

impl HostRecorder {
    pub fn recorded_registrations(&self) -> Vec<(FactoryRef, NotificationSubscription)> {
        self.registrations
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn recorded_variables(&self) -> Vec<(String, String)> {
        self.variables
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn context(&self) -> ContextCallbacks {
        self.table.context.clone()
    }
}

/// A recorder whose callbacks succeed.
pub fn callbacks() -> HostRecorder {
    callbacks_returning(HResult::S_OK, HResult::S_OK)
}

/// A recorder whose callbacks return the given statuses.
pub fn callbacks_returning(registration: HResult, variable: HResult) -> HostRecorder {
    let registrations = Arc::new(RegistrationSink {
        status: registration,
        calls: Mutex::new(Vec::new()),
    });
    let variables = Arc::new(VariableSink {
        status: variable,
        calls: Mutex::new(Vec::new()),
    });
    HostRecorder {
        table: CallbackTable::new(registrations.clone(), variables.clone()),
        registrations,
        variables,
    }
}
