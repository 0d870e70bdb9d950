//! `inspect`: load a module, print what it registered, unload it.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use modbridge_core::AppResult;
use modbridge_core::config::AppConfig;
use modbridge_plugin::ModuleHost;
use modbridge_plugin::prelude::PluginSummary;

use crate::output::{self, OutputFormat};

/// Arguments for `inspect`
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Module library path, or `builtin:hello-world`
    pub module: String,
}

/// Table row for one registration
#[derive(Debug, Serialize, Tabled)]
pub struct RegistrationRow {
    #[tabled(rename = "Factory")]
    pub factory: String,
    #[tabled(rename = "Notifications")]
    pub notifications: String,
    #[tabled(rename = "Post-notifications")]
    pub post_notifications: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

impl RegistrationRow {
    /// Flatten a plugin summary into one row per registration
    pub fn from_summary(summary: &PluginSummary) -> Vec<Self> {
        summary
            .registrations
            .iter()
            .map(|r| Self {
                factory: r.factory.clone(),
                notifications: join_or_dash(&r.request_notifications),
                post_notifications: join_or_dash(&r.post_request_notifications),
                status: r.status.clone(),
            })
            .collect()
    }
}

fn join_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(" | ")
    }
}

/// Execute `inspect`
pub fn execute(args: &InspectArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let mut host = ModuleHost::new(config);
    super::load_module(&mut host, &args.module)?;
    let summaries = host.plugins()?;
    host.shutdown();

    let rows: Vec<RegistrationRow> = summaries.iter().flat_map(RegistrationRow::from_summary).collect();
    if format == OutputFormat::Table {
        for summary in &summaries {
            output::print_success(&format!("Loaded '{}'", summary.name));
            output::print_kv("Plugin", &summary.id.to_string());
            if let Some(path) = &summary.path {
                output::print_kv("Path", &path.display().to_string());
            }
            for error in &summary.registration_errors {
                output::print_warning(error);
            }
        }
    }
    output::print_list(&rows, &summaries, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbridge_plugin::prelude::PluginState;
    use modbridge_plugin::manager::RegistrationSummary;

    #[test]
    fn test_rows_join_notification_names() {
        let summary = PluginSummary {
            id: Default::default(),
            name: "m".to_string(),
            path: None,
            state: PluginState::Loaded,
            registrations: vec![RegistrationSummary {
                factory: "0x10".to_string(),
                request_notifications: vec!["BEGIN_REQUEST".to_string(), "END_REQUEST".to_string()],
                post_request_notifications: Vec::new(),
                status: "S_OK".to_string(),
                accepted: true,
            }],
            unsupported_calls: Vec::new(),
            registration_errors: Vec::new(),
        };

        let rows = RegistrationRow::from_summary(&summary);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].notifications, "BEGIN_REQUEST | END_REQUEST");
        assert_eq!(rows[0].post_notifications, "-");
    }
}
