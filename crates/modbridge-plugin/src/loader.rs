//! Plugin loader.
//!
//! Opens a native module with `libloading`, resolves its registration entry
//! point and runs the registration handshake. A [`PluginHandle`] only
//! escapes when the handshake succeeded.

use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, info, warn};

use modbridge_core::config::plugin::{DEFAULT_ABI_VERSION, DEFAULT_ENTRY_SYMBOL, PluginConfig};
use modbridge_core::{AppError, AppResult, ErrorKind};
use modbridge_sdk::abi::RegisterModuleFn;
use modbridge_sdk::notification::NotificationSubscription;
use modbridge_sdk::status::HResult;

use crate::callbacks::{CallbackTable, ContextCallbacks};
use crate::registration::{Registration, RegistrationEmulator};

/// Lifecycle state of a [`PluginHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Library resident, registration captured.
    Loaded,
    /// Library released. The handle must not be used to register or dispatch.
    Unloaded,
}

/// Loads native modules and runs their registration entry point.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    abi_version: u32,
    entry_symbol: Vec<u8>,
}

impl PluginLoader {
    /// Creates a loader passing `abi_version` and resolving `entry_symbol`.
    pub fn new(abi_version: u32, entry_symbol: &str) -> Self {
        let mut symbol = entry_symbol.as_bytes().to_vec();
        symbol.push(0);
        Self {
            abi_version,
            entry_symbol: symbol,
        }
    }

    /// Creates a loader from the `[plugins]` configuration section.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(config.abi_version, &config.entry_symbol)
    }

    /// Version constant passed to every entry point.
    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    /// Name of the resolved entry point, without the terminator.
    pub fn entry_symbol(&self) -> &str {
        let bytes = &self.entry_symbol[..self.entry_symbol.len() - 1];
        std::str::from_utf8(bytes).unwrap_or(DEFAULT_ENTRY_SYMBOL)
    }

    /// Opens the library at `path` and registers the module it contains.
    ///
    /// Fails with `LibraryNotFound`, `EntryPointMissing` or
    /// `RegistrationRejected`. On any failure the library is released before
    /// returning.
    pub fn load(&self, path: &Path, callbacks: CallbackTable) -> AppResult<PluginHandle> {
        // SAFETY: loading a module runs its initialisers. Only trusted
        // modules should be configured.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            AppError::with_source(
                ErrorKind::LibraryNotFound,
                format!("Failed to open module '{}': {e}", path.display()),
                e,
            )
        })?;

        debug!(path = %path.display(), "Module library opened");

        let entry = unsafe { library.get::<RegisterModuleFn>(self.entry_symbol.as_slice()) }
            .map(|symbol| *symbol)
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::EntryPointMissing,
                    format!(
                        "Module '{}' does not export '{}': {e}",
                        path.display(),
                        self.entry_symbol()
                    ),
                    e,
                )
            })?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // `entry` points into `library`, which the handle keeps alive.
        let handle = unsafe {
            self.register(name, Some(path.to_path_buf()), Some(library), entry, callbacks)
        }?;

        info!(
            plugin = %handle.name(),
            path = %path.display(),
            registrations = handle.registrations().len(),
            "Module loaded"
        );
        Ok(handle)
    }

    /// Registers a module whose entry point is linked into this process.
    ///
    /// # Safety
    /// `entry` must be a conforming registration entry point.
    pub unsafe fn load_static(
        &self,
        name: &str,
        entry: RegisterModuleFn,
        callbacks: CallbackTable,
    ) -> AppResult<PluginHandle> {
        let handle = unsafe { self.register(name.to_string(), None, None, entry, callbacks) }?;
        info!(
            plugin = %handle.name(),
            registrations = handle.registrations().len(),
            "Static module registered"
        );
        Ok(handle)
    }

    unsafe fn register(
        &self,
        name: String,
        path: Option<PathBuf>,
        library: Option<Library>,
        entry: RegisterModuleFn,
        callbacks: CallbackTable,
    ) -> AppResult<PluginHandle> {
        let emulator = RegistrationEmulator::new(callbacks.on_set_request_notifications.clone());
        let outcome = unsafe { emulator.register(entry, self.abi_version) };

        // Only `S_OK` completes a load; informational codes such as
        // `S_FALSE` are rejected too.
        if outcome.status != HResult::S_OK {
            drop(library);
            warn!(
                plugin = %name,
                status = %outcome.status,
                "Module rejected registration; library released"
            );
            return Err(AppError::registration_rejected(format!(
                "Module '{name}' entry point returned {}",
                outcome.status
            ))
            .with_status(outcome.status.raw()));
        }

        Ok(PluginHandle {
            name,
            path,
            library,
            state: PluginState::Loaded,
            registrations: outcome.registrations,
            unsupported_calls: outcome.unsupported_calls,
            callbacks,
        })
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new(DEFAULT_ABI_VERSION, DEFAULT_ENTRY_SYMBOL)
    }
}

/// Exclusive owner of a loaded module library and what it registered.
pub struct PluginHandle {
    name: String,
    path: Option<PathBuf>,
    library: Option<Library>,
    state: PluginState,
    registrations: Vec<Registration>,
    unsupported_calls: Vec<&'static str>,
    callbacks: CallbackTable,
}

impl PluginHandle {
    /// Display name (file stem, or the static name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the library was opened from; `None` for static modules.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Whether the library is still resident.
    pub fn is_loaded(&self) -> bool {
        self.state == PluginState::Loaded
    }

    /// Fails with `InvalidState` once the handle has been unloaded.
    pub fn ensure_loaded(&self) -> AppResult<()> {
        match self.state {
            PluginState::Loaded => Ok(()),
            PluginState::Unloaded => Err(AppError::invalid_state(format!(
                "Module '{}' has been unloaded",
                self.name
            ))),
        }
    }

    /// Every `SetRequestNotifications` call, accepted or not.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Registrations the host accepted.
    pub fn accepted_registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(|r| r.is_accepted())
    }

    /// Subscription of the first accepted registration.
    pub fn subscription(&self) -> Option<NotificationSubscription> {
        self.accepted_registrations().next().map(|r| r.subscription)
    }

    /// Unsupported registration members the module invoked.
    pub fn unsupported_calls(&self) -> &[&'static str] {
        &self.unsupported_calls
    }

    /// Registration-time failures that did not stop the load: members the
    /// module called that the emulation does not support, and registrations
    /// the host callback rejected. Each carries the status the module saw.
    pub fn registration_errors(&self) -> Vec<AppError> {
        let unsupported = self.unsupported_calls.iter().map(|member| {
            AppError::not_supported(format!("Module '{}' called {member}", self.name))
                .with_status(HResult::NOT_SUPPORTED.raw())
        });
        let rejected = self.registrations.iter().filter(|r| !r.is_accepted()).map(|r| {
            AppError::host_callback(format!(
                "Host rejected SetRequestNotifications from module '{}' for factory {:#x}",
                self.name,
                r.factory.address()
            ))
            .with_status(r.status.raw())
        });
        unsupported.chain(rejected).collect()
    }

    /// Callback table the module was loaded with.
    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Context callbacks bound to this module's contexts by default.
    pub fn context_callbacks(&self) -> &ContextCallbacks {
        &self.callbacks.context
    }

    /// Releases the library. Idempotent.
    pub fn unload(&mut self) {
        if self.state == PluginState::Unloaded {
            debug!(plugin = %self.name, "Module already unloaded");
            return;
        }

        self.state = PluginState::Unloaded;
        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                warn!(plugin = %self.name, error = %e, "Closing module library failed");
            }
        }
        info!(plugin = %self.name, "Module unloaded");
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.unload();
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("registrations", &self.registrations.len())
            .finish()
    }
}
