//! Simulated host settings.

use serde::{Deserialize, Serialize};

/// Behaviour of the host side of the callback table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Number of requests `run` simulates.
    #[serde(default = "default_request_count")]
    pub request_count: u32,
    /// Whether `SetRequestNotifications` calls are accepted.
    #[serde(default = "default_true")]
    pub accept_registrations: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_count: default_request_count(),
            accept_registrations: true,
        }
    }
}

fn default_request_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
