use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};

use super::constraint::Constraints;

/// Name of the step that checks out the source.
pub const CLONE_STEP: &str = "clone";

/// A compiled execution plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub workspace: Workspace,
    pub pipeline: Vec<Step>,
    pub services: Vec<Step>,
}

impl Config {
    /// Services followed by pipeline steps.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.services.iter().chain(self.pipeline.iter())
    }

    pub fn all_steps_mut(&mut self) -> impl Iterator<Item = &mut Step> {
        self.services.iter_mut().chain(self.pipeline.iter_mut())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub base: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub email: String,
    pub token: String,
}

impl AuthConfig {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty() && self.token.is_empty()
    }
}

/// One container specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub image: String,
    pub pull: bool,
    pub privileged: bool,
    pub commands: Vec<String>,
    /// Plugin parameters.
    pub vargs: BTreeMap<String, Value>,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    pub environment: HashMap<String, String>,
    pub working_dir: String,
    pub volumes: Vec<String>,
    pub volumes_from: Vec<String>,
    pub network: String,
    pub labels: HashMap<String, String>,
    pub auth_config: AuthConfig,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub devices: Vec<String>,
    pub extra_hosts: Vec<String>,
    pub shm_size: i64,
    pub oom_kill_disable: bool,
    pub constraints: Constraints,
    pub detached: bool,
    pub disabled: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// A plugin is driven by parameters rather than shell commands.
    pub fn is_plugin(&self) -> bool {
        !self.vargs.is_empty() || self.commands.is_empty()
    }

    pub fn is_clone(&self) -> bool {
        self.name == CLONE_STEP
    }
}
