//! Host-side module wrapper.
//!
//! Plays the part of the managed host: records registrations, creates one
//! instance per accepted registration, and runs simulated requests whose
//! server variables land in a per-request map.

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};

use modbridge_core::config::AppConfig;
use modbridge_core::config::plugin::PluginConfig;
use modbridge_core::types::{InstanceId, PluginId};
use modbridge_core::AppResult;
use modbridge_sdk::abi::RegisterModuleFn;
use modbridge_sdk::notification::{
    NotificationSubscription, NotificationVerdict, RequestNotifications,
};
use modbridge_sdk::status::HResult;
use modbridge_sdk::strings::WideCStr;

use crate::bridge::ModuleBridge;
use crate::callbacks::{
    CallbackTable, ContextCallbacks, FactoryRef, RegistrationCallback, ServerVariableCallback,
};
use crate::loader::PluginState;

/// Records `SetRequestNotifications` calls and accepts or rejects them.
#[derive(Debug)]
pub struct RegistrationRecorder {
    accept: bool,
    calls: Mutex<Vec<(FactoryRef, NotificationSubscription)>>,
}

impl RegistrationRecorder {
    /// Creates a recorder that answers `S_OK` if `accept`, `E_FAIL` otherwise.
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call seen so far.
    pub fn recorded(&self) -> Vec<(FactoryRef, NotificationSubscription)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RegistrationCallback for RegistrationRecorder {
    fn on_set_request_notifications(
        &self,
        factory: FactoryRef,
        subscription: NotificationSubscription,
    ) -> HResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((factory, subscription));
        if self.accept {
            HResult::S_OK
        } else {
            HResult::E_FAIL
        }
    }
}

/// Server variables written during one request.
#[derive(Debug, Default)]
pub struct ServerVariables {
    values: Mutex<BTreeMap<String, String>>,
}

impl ServerVariables {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Copy of every variable.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ServerVariableCallback for ServerVariables {
    fn on_set_server_variable(&self, name: &CStr, value: WideCStr<'_>) -> HResult {
        let name = name.to_string_lossy().into_owned();
        let value = value.to_string_lossy();
        debug!(name = %name, value = %value, "Server variable set");
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, value);
        HResult::S_OK
    }
}

/// One module's verdict for a request.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleVerdict {
    pub plugin: String,
    pub instance: InstanceId,
    pub verdict: NotificationVerdict,
}

/// Result of one simulated request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub verdicts: Vec<ModuleVerdict>,
    pub server_variables: BTreeMap<String, String>,
}

/// Display form of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSummary {
    pub factory: String,
    pub request_notifications: Vec<String>,
    pub post_request_notifications: Vec<String>,
    pub status: String,
    pub accepted: bool,
}

/// Display form of a loaded plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub id: PluginId,
    pub name: String,
    pub path: Option<PathBuf>,
    pub state: PluginState,
    pub registrations: Vec<RegistrationSummary>,
    pub unsupported_calls: Vec<String>,
    pub registration_errors: Vec<String>,
}

#[derive(Debug)]
struct HostedInstance {
    plugin: PluginId,
    instance: InstanceId,
    factory: FactoryRef,
    subscription: NotificationSubscription,
}

/// Loads modules, instantiates them and runs simulated requests.
#[derive(Debug)]
pub struct ModuleHost {
    bridge: ModuleBridge,
    recorder: Arc<RegistrationRecorder>,
    plugin_config: PluginConfig,
    plugins: Vec<PluginId>,
    instances: Vec<HostedInstance>,
}

impl ModuleHost {
    /// Creates a host from configuration.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            bridge: ModuleBridge::from_config(&config.plugins),
            recorder: Arc::new(RegistrationRecorder::new(config.host.accept_registrations)),
            plugin_config: config.plugins.clone(),
            plugins: Vec::new(),
            instances: Vec::new(),
        }
    }

    fn callbacks(&self) -> CallbackTable {
        CallbackTable::new(self.recorder.clone(), Arc::new(ServerVariables::new()))
    }

    /// Loads a module. Relative paths resolve against the plugin directory.
    pub fn load(&mut self, path: &Path) -> AppResult<PluginId> {
        let resolved = self.plugin_config.resolve(path);
        let callbacks = self.callbacks();
        let id = self.bridge.load_plugin(&resolved, callbacks)?;
        self.adopt(id)
    }

    /// Registers a module linked into this process.
    ///
    /// # Safety
    /// `entry` must be a conforming registration entry point.
    pub unsafe fn load_static(&mut self, name: &str, entry: RegisterModuleFn) -> AppResult<PluginId> {
        let callbacks = self.callbacks();
        let id = unsafe { self.bridge.load_static_plugin(name, entry, callbacks) }?;
        self.adopt(id)
    }

    fn adopt(&mut self, id: PluginId) -> AppResult<PluginId> {
        for err in self.bridge.plugin(id)?.registration_errors() {
            warn!(plugin = %id, kind = %err.kind, error = %err, "Registration incomplete");
        }
        self.plugins.push(id);
        Ok(id)
    }

    /// Creates one instance per accepted registration not yet instantiated.
    /// Returns the number of instances created.
    pub fn init(&mut self) -> AppResult<usize> {
        let mut created = 0;
        for plugin in self.plugins.clone() {
            let handle = self.bridge.plugin(plugin)?;
            if !handle.is_loaded() {
                continue;
            }
            let pending: Vec<(FactoryRef, NotificationSubscription)> = handle
                .accepted_registrations()
                .filter(|r| !self.instances.iter().any(|i| i.factory == r.factory))
                .map(|r| (r.factory, r.subscription))
                .collect();

            for (factory, subscription) in pending {
                let instance = self.bridge.create_module_instance(plugin, factory)?;
                self.instances.push(HostedInstance {
                    plugin,
                    instance,
                    factory,
                    subscription,
                });
                created += 1;
            }
        }
        info!(instances = created, "Module host initialised");
        Ok(created)
    }

    /// Runs one simulated request.
    ///
    /// Begin-request goes to every instance subscribed to it in the main
    /// mask, in load order. A `FINISH_REQUEST` verdict ends the request.
    pub fn begin_request(&mut self) -> AppResult<RequestOutcome> {
        let variables = Arc::new(ServerVariables::new());
        let context = ContextCallbacks::new(variables.clone());
        let mut verdicts = Vec::new();

        let targets: Vec<(PluginId, InstanceId)> = self
            .instances
            .iter()
            .filter(|i| i.subscription.wants(RequestNotifications::BEGIN_REQUEST, false))
            .map(|i| (i.plugin, i.instance))
            .collect();

        for (plugin, instance) in targets {
            let verdict = self.bridge.dispatch_scoped(
                instance,
                context.clone(),
                RequestNotifications::BEGIN_REQUEST,
                false,
            )?;
            let name = self.bridge.plugin(plugin)?.name().to_string();
            verdicts.push(ModuleVerdict {
                plugin: name,
                instance,
                verdict,
            });
            if verdict == NotificationVerdict::FinishRequest {
                debug!(plugin = %plugin, "Request finished early");
                break;
            }
        }

        Ok(RequestOutcome {
            verdicts,
            server_variables: variables.snapshot(),
        })
    }

    /// Terminates all factories and unloads all modules. Idempotent.
    pub fn shutdown(&mut self) {
        for hosted in self.instances.drain(..).rev() {
            if let Err(e) = self.bridge.terminate_module_instance(hosted.factory) {
                warn!(factory = hosted.factory.address(), error = %e, "Terminate failed");
            }
        }
        for plugin in self.plugins.iter().rev() {
            if let Err(e) = self.bridge.unload_plugin(*plugin) {
                warn!(plugin = %plugin, error = %e, "Unload failed");
            }
        }
    }

    /// Registrations observed by the host callback, in call order.
    pub fn recorded_registrations(&self) -> Vec<(FactoryRef, NotificationSubscription)> {
        self.recorder.recorded()
    }

    /// Number of live module instances.
    pub fn instance_count(&self) -> usize {
        self.bridge.instance_count()
    }

    /// Summaries of every plugin loaded so far.
    pub fn plugins(&self) -> AppResult<Vec<PluginSummary>> {
        self.plugins
            .iter()
            .map(|id| {
                let handle = self.bridge.plugin(*id)?;
                Ok(PluginSummary {
                    id: *id,
                    name: handle.name().to_string(),
                    path: handle.path().map(Path::to_path_buf),
                    state: handle.state(),
                    registrations: handle
                        .registrations()
                        .iter()
                        .map(|r| RegistrationSummary {
                            factory: format!("{:#x}", r.factory.address()),
                            request_notifications: r.subscription.request_mask().names(),
                            post_request_notifications: r.subscription.post_request_mask().names(),
                            status: r.status.to_string(),
                            accepted: r.is_accepted(),
                        })
                        .collect(),
                    unsupported_calls: handle
                        .unsupported_calls()
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    registration_errors: handle
                        .registration_errors()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                })
            })
            .collect()
    }
}

impl Drop for ModuleHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
