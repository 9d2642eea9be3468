use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::utils::{get_env_or_default, parse_duration, split_list};

const PROXY_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Agent-wide settings applied to every job this agent runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Inactivity timeout for a running build.
    pub timeout: Duration,
    pub platform: String,
    /// Namespace prefixed to unqualified plugin images.
    pub namespace: String,
    /// Local mode only: plugin name patterns that stay enabled.
    pub disable: Vec<String>,
    /// Image patterns that run privileged.
    pub escalate: Vec<String>,
    /// Image patterns allowed to receive netrc credentials. Empty means all.
    pub netrc: Vec<String>,
    /// Host path bind-mounted into every step for local runs.
    pub local: Option<String>,
    /// Force pull of plugin images.
    pub pull: bool,
    /// Capacity of the log line channel.
    pub buffer: usize,
    pub workspace_base: String,
    /// Proxy variables captured from the agent environment.
    pub proxy: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15 * 60),
            platform: "linux/amd64".to_string(),
            namespace: "plugins".to_string(),
            disable: Vec::new(),
            escalate: [
                "plugins/docker",
                "plugins/docker:*",
                "plugins/gcr",
                "plugins/gcr:*",
                "plugins/ecr",
                "plugins/ecr:*",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            netrc: Vec::new(),
            local: None,
            pull: false,
            buffer: crate::ci::pipeline::DEFAULT_BUFFER,
            workspace_base: "/drone".to_string(),
            proxy: HashMap::new(),
        }
    }
}

impl AgentConfig {
    /// Loads the configuration from the process environment.
    pub fn init() -> Result<AgentConfig> {
        let defaults = AgentConfig::default();

        let timeout = match std::env::var("DRONE_TIMEOUT") {
            Ok(raw) => parse_duration(&raw).ok_or_else(|| {
                AppError::ConfigError(format!("DRONE_TIMEOUT must be a duration, got '{}'", raw))
            })?,
            Err(_) => defaults.timeout,
        };

        let buffer = match std::env::var("DRONE_LOG_BUFFER") {
            Ok(raw) => raw.parse::<usize>().map_err(|_| {
                AppError::ConfigError(format!("DRONE_LOG_BUFFER must be a number, got '{}'", raw))
            })?,
            Err(_) => defaults.buffer,
        };
        if buffer == 0 {
            return Err(AppError::ConfigError(
                "DRONE_LOG_BUFFER must be greater than 0".to_string(),
            ));
        }

        let pull = match std::env::var("DRONE_PLUGIN_PULL") {
            Ok(raw) => raw.parse::<bool>().map_err(|_| {
                AppError::ConfigError(format!("DRONE_PLUGIN_PULL must be true or false, got '{}'", raw))
            })?,
            Err(_) => defaults.pull,
        };

        let escalate = match std::env::var("DRONE_PLUGIN_PRIVILEGED") {
            Ok(raw) => split_list(&raw),
            Err(_) => defaults.escalate,
        };

        let local = std::env::var("DRONE_LOCAL").ok().filter(|s| !s.is_empty());

        Ok(AgentConfig {
            timeout,
            platform: get_env_or_default("DRONE_PLATFORM", &defaults.platform),
            namespace: get_env_or_default("DRONE_PLUGIN_NAMESPACE", &defaults.namespace),
            disable: split_list(&get_env_or_default("DRONE_PLUGIN_DISABLE", "")),
            escalate,
            netrc: split_list(&get_env_or_default("DRONE_NETRC_PLUGIN", "")),
            local,
            pull,
            buffer,
            workspace_base: get_env_or_default("DRONE_WORKSPACE_BASE", &defaults.workspace_base),
            proxy: Self::proxy_from_env(),
        })
    }

    fn proxy_from_env() -> HashMap<String, String> {
        PROXY_VARS
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v))
            })
            .collect()
    }
}
