//! `run`: load modules, instantiate them and simulate requests.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use modbridge_core::AppResult;
use modbridge_core::config::AppConfig;
use modbridge_plugin::ModuleHost;
use modbridge_plugin::prelude::RequestOutcome;

use crate::output::{self, OutputFormat};

/// Arguments for `run`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Module library paths, or `builtin:hello-world`. Defaults to `[plugins].modules`.
    pub modules: Vec<String>,

    /// Number of requests to simulate (overrides `[host].request_count`)
    #[arg(short = 'n', long)]
    pub requests: Option<u32>,
}

/// Table row for one module's handling of one request
#[derive(Debug, Serialize, Tabled)]
pub struct RequestRow {
    #[tabled(rename = "Request")]
    pub request: u32,
    #[tabled(rename = "Module")]
    pub module: String,
    #[tabled(rename = "Verdict")]
    pub verdict: String,
    #[tabled(rename = "Server variables")]
    pub server_variables: String,
}

/// One simulated request in JSON output
#[derive(Debug, Serialize)]
pub struct RequestReport {
    pub request: u32,
    #[serde(flatten)]
    pub outcome: RequestOutcome,
}

impl RequestRow {
    /// One row per verdict; variables are shown on the request's first row
    pub fn from_outcome(request: u32, outcome: &RequestOutcome) -> Vec<Self> {
        let variables = outcome
            .server_variables
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        outcome
            .verdicts
            .iter()
            .enumerate()
            .map(|(i, v)| Self {
                request,
                module: v.plugin.clone(),
                verdict: v.verdict.to_string(),
                server_variables: if i == 0 { variables.clone() } else { String::new() },
            })
            .collect()
    }
}

/// Execute `run`
pub fn execute(args: &RunArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let modules = super::modules_to_load(&args.modules, config)?;
    let requests = args.requests.unwrap_or(config.host.request_count);

    let mut host = ModuleHost::new(config);
    for module in &modules {
        super::load_module(&mut host, module)?;
    }
    let instances = host.init()?;
    info!(modules = modules.len(), instances, requests, "Simulating requests");

    let mut reports = Vec::with_capacity(requests as usize);
    for request in 1..=requests {
        let outcome = host.begin_request()?;
        reports.push(RequestReport { request, outcome });
    }
    host.shutdown();

    if format == OutputFormat::Table {
        output::print_success(&format!(
            "{} module(s), {} instance(s), {} request(s)",
            modules.len(),
            instances,
            requests
        ));
    }
    let rows: Vec<RequestRow> = reports
        .iter()
        .flat_map(|r| RequestRow::from_outcome(r.request, &r.outcome))
        .collect();
    output::print_list(&rows, &reports, format);
    Ok(())
}
