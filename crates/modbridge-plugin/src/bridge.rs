//! Arena-handle facade over the loader, instance manager, context emulator
//! and dispatcher.
//!
//! Every object that crosses the boundary is owned here and referred to by
//! a typed identifier. Teardown runs in reverse creation order: contexts,
//! then instances and factories, then libraries.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use modbridge_core::config::plugin::PluginConfig;
use modbridge_core::types::{ContextId, InstanceId, PluginId};
use modbridge_core::{AppError, AppResult};
use modbridge_sdk::abi::{CHttpModule, IHttpContext, RegisterModuleFn};
use modbridge_sdk::notification::{
    NotificationSubscription, NotificationVerdict, RequestNotifications,
};

use crate::allocator::ModuleAllocator;
use crate::callbacks::{CallbackTable, ContextCallbacks, FactoryRef};
use crate::context::ExecutionContext;
use crate::dispatcher;
use crate::factory::InstanceManager;
use crate::loader::{PluginHandle, PluginLoader};
use crate::registration::Registration;

struct LoadedPlugin {
    handle: PluginHandle,
    allocator: Option<Box<ModuleAllocator>>,
}

/// Owns loaded plugins, module instances and execution contexts.
pub struct ModuleBridge {
    loader: PluginLoader,
    plugins: HashMap<PluginId, LoadedPlugin>,
    load_order: Vec<PluginId>,
    factory_owner: HashMap<FactoryRef, PluginId>,
    instances: InstanceManager,
    contexts: HashMap<ContextId, Box<ExecutionContext>>,
}

impl ModuleBridge {
    /// Creates an empty bridge that loads through `loader`.
    pub fn new(loader: PluginLoader) -> Self {
        Self {
            loader,
            plugins: HashMap::new(),
            load_order: Vec::new(),
            factory_owner: HashMap::new(),
            instances: InstanceManager::new(),
            contexts: HashMap::new(),
        }
    }

    /// Creates a bridge from the `[plugins]` configuration section.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(PluginLoader::from_config(config))
    }

    /// The loader used for new plugins.
    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Loads the module at `path`, registering it with `callbacks`.
    pub fn load_plugin(&mut self, path: &Path, callbacks: CallbackTable) -> AppResult<PluginId> {
        let handle = self.loader.load(path, callbacks)?;
        Ok(self.adopt(handle))
    }

    /// Registers a module linked into this process.
    ///
    /// # Safety
    /// `entry` must be a conforming registration entry point.
    pub unsafe fn load_static_plugin(
        &mut self,
        name: &str,
        entry: RegisterModuleFn,
        callbacks: CallbackTable,
    ) -> AppResult<PluginId> {
        let handle = unsafe { self.loader.load_static(name, entry, callbacks) }?;
        Ok(self.adopt(handle))
    }

    fn adopt(&mut self, handle: PluginHandle) -> PluginId {
        let id = PluginId::new();
        for registration in handle.accepted_registrations() {
            self.factory_owner.insert(registration.factory, id);
        }
        debug!(plugin = %id, name = %handle.name(), "Plugin adopted");
        self.plugins.insert(
            id,
            LoadedPlugin {
                handle,
                allocator: Some(ModuleAllocator::new()),
            },
        );
        self.load_order.push(id);
        id
    }

    /// Terminates the plugin's factories and releases its library.
    ///
    /// Unloading an already-unloaded plugin is a no-op.
    pub fn unload_plugin(&mut self, plugin: PluginId) -> AppResult<()> {
        let loaded = self
            .plugins
            .get_mut(&plugin)
            .ok_or_else(|| AppError::not_found(format!("Plugin {plugin} not found")))?;
        if !loaded.handle.is_loaded() {
            debug!(plugin = %plugin, "Plugin already unloaded");
            return Ok(());
        }

        let factories: Vec<FactoryRef> = loaded
            .handle
            .accepted_registrations()
            .map(|r| r.factory)
            .collect();
        for factory in factories.iter().rev() {
            if !self.instances.is_terminated(*factory) {
                if let Err(e) = self.instances.terminate(*factory) {
                    warn!(plugin = %plugin, error = %e, "Factory teardown failed");
                }
            }
            self.instances.forget(*factory);
        }
        self.factory_owner.retain(|_, owner| *owner != plugin);

        loaded.allocator = None;
        loaded.handle.unload();
        info!(plugin = %plugin, name = %loaded.handle.name(), "Plugin unloaded");
        Ok(())
    }

    /// Creates a module instance through one of `plugin`'s factories.
    pub fn create_module_instance(
        &mut self,
        plugin: PluginId,
        factory: FactoryRef,
    ) -> AppResult<InstanceId> {
        let loaded = self
            .plugins
            .get(&plugin)
            .ok_or_else(|| AppError::not_found(format!("Plugin {plugin} not found")))?;
        loaded.handle.ensure_loaded()?;

        if self.factory_owner.get(&factory) != Some(&plugin) {
            return Err(AppError::not_found(format!(
                "Factory {:#x} was not registered by plugin {plugin}",
                factory.address()
            )));
        }
        let allocator = loaded
            .allocator
            .as_deref()
            .ok_or_else(|| AppError::invalid_state(format!("Plugin {plugin} has no allocator")))?;

        self.instances.create(factory, allocator)
    }

    /// Terminates `factory` and every instance it produced.
    pub fn terminate_module_instance(&mut self, factory: FactoryRef) -> AppResult<()> {
        let plugin = *self.factory_owner.get(&factory).ok_or_else(|| {
            AppError::not_found(format!("Factory {:#x} is not registered", factory.address()))
        })?;
        self.plugin(plugin)?.ensure_loaded()?;
        self.instances.terminate(factory)
    }

    /// Creates an execution context bound to `callbacks`.
    pub fn create_execution_context(&mut self, callbacks: ContextCallbacks) -> ContextId {
        let context = ExecutionContext::new(callbacks);
        let id = context.id();
        self.contexts.insert(id, context);
        debug!(context = %id, "Execution context created");
        id
    }

    /// Destroys an execution context.
    pub fn delete_execution_context(&mut self, context: ContextId) -> AppResult<()> {
        self.contexts
            .remove(&context)
            .map(|_| debug!(context = %context, "Execution context deleted"))
            .ok_or_else(|| AppError::not_found(format!("Context {context} not found")))
    }

    /// Dispatches a notification to `instance` through `context`.
    pub fn dispatch(
        &self,
        instance: InstanceId,
        context: ContextId,
        notification: RequestNotifications,
        is_post: bool,
    ) -> AppResult<NotificationVerdict> {
        let module = self.instances.get(instance)?;
        if let Some(plugin) = self.factory_owner.get(&module.factory()) {
            self.plugin(*plugin)?.ensure_loaded()?;
        }
        let context = self
            .contexts
            .get(&context)
            .ok_or_else(|| AppError::not_found(format!("Context {context} not found")))?;

        dispatcher::dispatch(module, context, notification, is_post)
    }

    /// Creates a context, dispatches through it and deletes it.
    pub fn dispatch_scoped(
        &mut self,
        instance: InstanceId,
        callbacks: ContextCallbacks,
        notification: RequestNotifications,
        is_post: bool,
    ) -> AppResult<NotificationVerdict> {
        let context = self.create_execution_context(callbacks);
        let result = self.dispatch(instance, context, notification, is_post);
        self.delete_execution_context(context)?;
        result
    }

    /// The plugin behind a handle.
    pub fn plugin(&self, plugin: PluginId) -> AppResult<&PluginHandle> {
        self.plugins
            .get(&plugin)
            .map(|loaded| &loaded.handle)
            .ok_or_else(|| AppError::not_found(format!("Plugin {plugin} not found")))
    }

    /// Every `SetRequestNotifications` call the plugin made.
    pub fn registrations(&self, plugin: PluginId) -> AppResult<&[Registration]> {
        Ok(self.plugin(plugin)?.registrations())
    }

    /// Subscription of the plugin's first accepted registration.
    pub fn subscription(&self, plugin: PluginId) -> AppResult<Option<NotificationSubscription>> {
        Ok(self.plugin(plugin)?.subscription())
    }

    /// Plugin handles in load order, unloaded ones included.
    pub fn plugin_ids(&self) -> &[PluginId] {
        &self.load_order
    }

    /// Raw module pointer behind an instance handle.
    pub fn module_ptr(&self, instance: InstanceId) -> AppResult<*mut CHttpModule> {
        Ok(self.instances.get(instance)?.as_raw())
    }

    /// Raw context pointer behind a context handle.
    pub fn context_ptr(&self, context: ContextId) -> AppResult<*mut IHttpContext> {
        self.contexts
            .get(&context)
            .map(|c| c.as_raw())
            .ok_or_else(|| AppError::not_found(format!("Context {context} not found")))
    }

    /// Number of live module instances.
    pub fn instance_count(&self) -> usize {
        self.instances.instance_count()
    }

    /// Number of live execution contexts.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Tears everything down in reverse creation order.
    pub fn shutdown(&mut self) {
        if !self.contexts.is_empty() {
            debug!(contexts = self.contexts.len(), "Dropping live execution contexts");
            self.contexts.clear();
        }
        let order: Vec<PluginId> = self.load_order.iter().rev().copied().collect();
        for plugin in order {
            if let Err(e) = self.unload_plugin(plugin) {
                warn!(plugin = %plugin, error = %e, "Plugin teardown failed");
            }
        }
        self.instances.terminate_all();
    }
}

impl Drop for ModuleBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ModuleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBridge")
            .field("loader", &self.loader)
            .field("plugins", &self.plugins.len())
            .field("instances", &self.instances.instance_count())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}
