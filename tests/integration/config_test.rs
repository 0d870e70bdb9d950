//! Configuration layering as the host binary sees it.

use std::io::Write;

use modbridge_core::config::AppConfig;
use modbridge_plugin::prelude::*;

#[test]
fn test_shipped_default_config_loads() {
    let config = AppConfig::load("config/default.toml", "integration-test").unwrap();

    assert_eq!(config.plugins.modules, vec!["builtin:hello-world".to_string()]);
    assert_eq!(config.plugins.abi_version, 12);
    assert_eq!(config.plugins.entry_symbol, "RegisterModule");
    assert_eq!(config.host.request_count, 1);
    assert!(config.host.accept_registrations);
}

#[test]
fn test_configured_entry_symbol_reaches_loader() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        "[plugins]\nabi_version = 10\nentry_symbol = \"RegisterModuleEx\"\n\n[host]\naccept_registrations = false"
    )
    .unwrap();

    let config = AppConfig::load(&file.path().to_string_lossy(), "integration-test").unwrap();
    let bridge = ModuleBridge::from_config(&config.plugins);

    assert_eq!(bridge.loader().abi_version(), 10);
    assert_eq!(bridge.loader().entry_symbol(), "RegisterModuleEx");
    assert!(!config.host.accept_registrations);
}
