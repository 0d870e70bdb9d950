//! Shared test helpers for integration tests.

use modbridge_core::config::AppConfig;
use modbridge_plugin::prelude::*;

/// Test host with the bundled hello-world module loaded
pub struct TestHost {
    /// The host under test
    pub host: ModuleHost,
    /// Handle of the hello-world module
    pub plugin: PluginId,
}

impl TestHost {
    /// Create a host accepting registrations and load hello-world into it
    pub fn new() -> Self {
        Self::with_config(&AppConfig::default())
    }

    /// Create a host from `config` and load hello-world into it
    pub fn with_config(config: &AppConfig) -> Self {
        let mut host = ModuleHost::new(config);
        let plugin = unsafe { host.load_static("hello-world", plugin_hello_world::ENTRY) }
            .expect("Failed to load hello-world");
        Self { host, plugin }
    }
}

/// Configuration with registrations rejected by the host
pub fn rejecting_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.host.accept_registrations = false;
    config
}
