//! Module factory.

use tracing::debug;

use modbridge_sdk::abi::{CHttpModule, IHttpModuleFactory, IHttpModuleFactoryVtbl, IModuleAllocator};
use modbridge_sdk::status::HResult;

use crate::module::HelloWorldModule;

static FACTORY_VTBL: IHttpModuleFactoryVtbl = IHttpModuleFactoryVtbl {
    get_http_module,
    terminate,
};

/// Creates one [`HelloWorldModule`] per call and frees itself on `Terminate`.
#[repr(C)]
pub struct HelloWorldFactory {
    base: IHttpModuleFactory,
}

impl HelloWorldFactory {
    /// Allocates a factory and returns its interface pointer.
    pub fn create() -> *mut IHttpModuleFactory {
        let factory = Box::new(Self {
            base: IHttpModuleFactory {
                vtbl: &FACTORY_VTBL,
            },
        });
        Box::into_raw(factory).cast()
    }

    /// Frees a factory returned by [`HelloWorldFactory::create`].
    ///
    /// # Safety
    /// `factory` must come from [`HelloWorldFactory::create`] and not be used afterwards.
    pub unsafe fn destroy(factory: *mut IHttpModuleFactory) {
        drop(unsafe { Box::from_raw(factory.cast::<Self>()) });
    }
}

unsafe extern "system" fn get_http_module(
    _this: *mut IHttpModuleFactory,
    module: *mut *mut CHttpModule,
    _allocator: *mut IModuleAllocator,
) -> HResult {
    if module.is_null() {
        return HResult::E_FAIL;
    }
    unsafe { *module = HelloWorldModule::create() };
    debug!("HelloWorld module created");
    HResult::S_OK
}

unsafe extern "system" fn terminate(this: *mut IHttpModuleFactory) {
    unsafe { HelloWorldFactory::destroy(this) };
}
