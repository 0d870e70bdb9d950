//! Native module loading configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Server version the emulation reports to a module's entry point.
pub const DEFAULT_ABI_VERSION: u32 = 12;

/// Symbol every native module must export.
pub const DEFAULT_ENTRY_SYMBOL: &str = "RegisterModule";

/// Plugin loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Directory that relative module paths are resolved against.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Module library files to load on startup.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Version constant passed to the entry point.
    #[serde(default = "default_abi_version")]
    pub abi_version: u32,
    /// Name of the registration entry point.
    #[serde(default = "default_entry_symbol")]
    pub entry_symbol: String,
}

impl PluginConfig {
    /// Resolve a module path: absolute paths and relative paths that exist
    /// from the working directory are kept, others are joined onto
    /// [`PluginConfig::directory`].
    pub fn resolve(&self, module: impl AsRef<Path>) -> PathBuf {
        let module = module.as_ref();
        if module.is_absolute() || module.exists() {
            module.to_path_buf()
        } else {
            Path::new(&self.directory).join(module)
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            modules: Vec::new(),
            abi_version: default_abi_version(),
            entry_symbol: default_entry_symbol(),
        }
    }
}

fn default_plugin_directory() -> String {
    "./modules".to_string()
}

fn default_abi_version() -> u32 {
    DEFAULT_ABI_VERSION
}

fn default_entry_symbol() -> String {
    DEFAULT_ENTRY_SYMBOL.to_string()
}
