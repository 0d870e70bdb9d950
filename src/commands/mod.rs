//! CLI command definitions and dispatch.

pub mod inspect;
pub mod run;

use std::path::Path;

use clap::{Parser, Subcommand};

use modbridge_core::config::AppConfig;
use modbridge_core::{AppError, AppResult};
use modbridge_plugin::ModuleHost;
use modbridge_plugin::prelude::PluginId;

use crate::output::OutputFormat;

/// Module name that selects the bundled hello-world module instead of a file.
pub const BUILTIN_HELLO_WORLD: &str = "builtin:hello-world";

/// ModBridge: host for native HTTP modules
#[derive(Debug, Parser)]
#[command(name = "modbridge-host", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a module and list its registrations
    Inspect(inspect::InspectArgs),
    /// Load modules and simulate requests against them
    Run(run::RunArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.command {
            Commands::Inspect(args) => inspect::execute(args, config, self.format),
            Commands::Run(args) => run::execute(args, config, self.format),
        }
    }
}

/// Helper: load a module by path, or the bundled module by name
pub fn load_module(host: &mut ModuleHost, module: &str) -> AppResult<PluginId> {
    if module == BUILTIN_HELLO_WORLD {
        // The bundled entry point is a conforming registration entry point.
        unsafe { host.load_static(module, plugin_hello_world::ENTRY) }
    } else {
        host.load(Path::new(module))
    }
}

/// Helper: modules named on the command line, or the configured list
pub fn modules_to_load(explicit: &[String], config: &AppConfig) -> AppResult<Vec<String>> {
    let modules = if explicit.is_empty() {
        config.plugins.modules.clone()
    } else {
        explicit.to_vec()
    };
    if modules.is_empty() {
        return Err(AppError::configuration(
            "No modules given and none configured under [plugins].modules",
        ));
    }
    Ok(modules)
}
