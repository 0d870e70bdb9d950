//! Factory/instance manager.
//!
//! Owns every module instance a factory produced, from `GetHttpModule`
//! until the factory is terminated. Each factory carries a one-shot
//! terminated flag.

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

use tracing::{debug, info, warn};

use modbridge_core::types::InstanceId;
use modbridge_core::{AppError, AppResult};
use modbridge_sdk::abi::{CHttpModule, IHttpModuleFactory};

use crate::allocator::ModuleAllocator;
use crate::callbacks::FactoryRef;

/// A module object constructed by a factory.
#[derive(Debug)]
pub struct ModuleInstance {
    id: InstanceId,
    module: NonNull<CHttpModule>,
    factory: FactoryRef,
}

impl ModuleInstance {
    /// Arena handle of this instance.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Factory that produced this instance.
    pub fn factory(&self) -> FactoryRef {
        self.factory
    }

    /// Raw module pointer, for dispatch.
    pub fn as_raw(&self) -> *mut CHttpModule {
        self.module.as_ptr()
    }
}

#[derive(Debug)]
enum FactoryState {
    Active { instances: Vec<InstanceId> },
    Terminated,
}

/// Creates and terminates module instances.
#[derive(Debug, Default)]
pub struct InstanceManager {
    factories: HashMap<FactoryRef, FactoryState>,
    instances: HashMap<InstanceId, ModuleInstance>,
    retired: HashSet<InstanceId>,
}

impl InstanceManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks `factory` for a new module instance.
    ///
    /// `factory` must come from a registration of a module that is still
    /// loaded.
    pub fn create(&mut self, factory: FactoryRef, allocator: &ModuleAllocator) -> AppResult<InstanceId> {
        if factory.is_null() {
            return Err(AppError::factory("Module registered a null factory"));
        }
        if matches!(self.factories.get(&factory), Some(FactoryState::Terminated)) {
            return Err(AppError::invalid_state(format!(
                "Factory {:#x} has already been terminated",
                factory.address()
            )));
        }

        let mut module: *mut CHttpModule = std::ptr::null_mut();
        let status =
            unsafe { IHttpModuleFactory::get_http_module(factory.as_ptr(), &mut module, allocator.as_raw()) };

        if status.is_out_of_memory() {
            warn!(factory = factory.address(), status = %status, "Factory out of memory");
            return Err(AppError::out_of_memory(format!(
                "Factory {:#x} could not allocate a module",
                factory.address()
            ))
            .with_status(status.raw()));
        }
        if status.is_failure() {
            warn!(factory = factory.address(), status = %status, "Factory failed");
            return Err(AppError::factory(format!(
                "Factory {:#x} returned {status}",
                factory.address()
            ))
            .with_status(status.raw()));
        }
        let module = NonNull::new(module).ok_or_else(|| {
            AppError::factory(format!(
                "Factory {:#x} reported success without a module",
                factory.address()
            ))
        })?;

        let id = InstanceId::new();
        self.instances.insert(
            id,
            ModuleInstance {
                id,
                module,
                factory,
            },
        );
        match self
            .factories
            .entry(factory)
            .or_insert_with(|| FactoryState::Active {
                instances: Vec::new(),
            }) {
            FactoryState::Active { instances } => instances.push(id),
            FactoryState::Terminated => {}
        }

        info!(instance = %id, factory = factory.address(), "Module instance created");
        Ok(id)
    }

    /// Resolves an instance handle.
    pub fn get(&self, id: InstanceId) -> AppResult<&ModuleInstance> {
        if let Some(instance) = self.instances.get(&id) {
            return Ok(instance);
        }
        if self.retired.contains(&id) {
            return Err(AppError::invalid_state(format!(
                "Instance {id} belongs to a terminated factory"
            )));
        }
        Err(AppError::not_found(format!("Instance {id} not found")))
    }

    /// Disposes the factory's instances and calls its `Terminate` member.
    ///
    /// A factory that never produced an instance is left alone. Terminating
    /// the same factory twice is an error.
    pub fn terminate(&mut self, factory: FactoryRef) -> AppResult<()> {
        let instances = match self.factories.get_mut(&factory) {
            None => {
                debug!(
                    factory = factory.address(),
                    "Factory never produced an instance; nothing to terminate"
                );
                return Ok(());
            }
            Some(FactoryState::Terminated) => {
                return Err(AppError::invalid_state(format!(
                    "Factory {:#x} has already been terminated",
                    factory.address()
                )));
            }
            Some(state) => match std::mem::replace(state, FactoryState::Terminated) {
                FactoryState::Active { instances } => instances,
                FactoryState::Terminated => Vec::new(),
            },
        };

        for id in instances.iter().rev() {
            if let Some(instance) = self.instances.remove(id) {
                unsafe { CHttpModule::dispose(instance.as_raw()) };
                debug!(instance = %id, "Module instance disposed");
            }
            self.retired.insert(*id);
        }

        unsafe { IHttpModuleFactory::terminate(factory.as_ptr()) };
        info!(
            factory = factory.address(),
            instances = instances.len(),
            "Factory terminated"
        );
        Ok(())
    }

    /// Terminates every factory that is still active.
    pub fn terminate_all(&mut self) {
        let active: Vec<FactoryRef> = self
            .factories
            .iter()
            .filter(|(_, state)| matches!(state, FactoryState::Active { .. }))
            .map(|(factory, _)| *factory)
            .collect();
        for factory in active {
            if let Err(e) = self.terminate(factory) {
                warn!(factory = factory.address(), error = %e, "Factory teardown failed");
            }
        }
    }

    /// Drops all state kept for `factory`. Called once its library is gone,
    /// since the address may be reused by a later load.
    pub fn forget(&mut self, factory: FactoryRef) {
        self.factories.remove(&factory);
    }

    /// Whether `factory` has been terminated.
    pub fn is_terminated(&self, factory: FactoryRef) -> bool {
        matches!(self.factories.get(&factory), Some(FactoryState::Terminated))
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
