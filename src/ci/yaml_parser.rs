//! Pipeline YAML parser
//!
//! Turns a raw pipeline definition into an uncompiled [`Config`]. Pipeline and
//! service steps are ordered maps keyed by step name; keys a container does not
//! recognise are collected as plugin parameters.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::config::{AuthConfig, Config, Step, Workspace, CLONE_STEP};
use super::constraint::Constraints;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PipelineDef {
    workspace: Workspace,
    clone: Option<Mapping>,
    pipeline: Option<Mapping>,
    services: Option<Mapping>,
}

#[derive(Debug, Deserialize, Default)]
struct StepDef {
    #[serde(default)]
    image: String,
    #[serde(default)]
    pull: bool,
    #[serde(default)]
    privileged: bool,
    #[serde(default)]
    commands: StringOrList,
    #[serde(default)]
    entrypoint: StringOrList,
    #[serde(default)]
    command: StringOrList,
    #[serde(default)]
    environment: EnvironmentDef,
    #[serde(default)]
    volumes: Vec<String>,
    #[serde(default)]
    volumes_from: Vec<String>,
    #[serde(default)]
    network_mode: String,
    #[serde(default)]
    labels: EnvironmentDef,
    #[serde(default)]
    dns: StringOrList,
    #[serde(default)]
    dns_search: StringOrList,
    #[serde(default)]
    devices: Vec<String>,
    #[serde(default)]
    extra_hosts: Vec<String>,
    #[serde(default)]
    shm_size: i64,
    #[serde(default)]
    oom_kill_disable: bool,
    #[serde(default)]
    detach: bool,
    #[serde(default)]
    auth_config: AuthConfig,
    #[serde(default)]
    when: Constraints,
    #[serde(flatten)]
    vargs: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum StringOrList {
    #[default]
    Empty,
    Single(String),
    List(Vec<String>),
}

impl From<StringOrList> for Vec<String> {
    fn from(value: StringOrList) -> Self {
        match value {
            StringOrList::Empty => Vec::new(),
            StringOrList::Single(s) => vec![s],
            StringOrList::List(list) => list,
        }
    }
}

/// `environment` is either a map or a list of `KEY=VALUE` strings.
#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum EnvironmentDef {
    #[default]
    Empty,
    Map(HashMap<String, Value>),
    List(Vec<String>),
}

impl From<EnvironmentDef> for HashMap<String, String> {
    fn from(value: EnvironmentDef) -> Self {
        match value {
            EnvironmentDef::Empty => HashMap::new(),
            EnvironmentDef::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, super::constraint::scalar_to_string(&v)))
                .collect(),
            EnvironmentDef::List(list) => list
                .into_iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (entry, String::new()),
                })
                .collect(),
        }
    }
}

impl StepDef {
    fn into_step(self, name: String) -> Step {
        Step {
            id: String::new(),
            name,
            image: self.image,
            pull: self.pull,
            privileged: self.privileged,
            commands: self.commands.into(),
            vargs: self.vargs,
            entrypoint: self.entrypoint.into(),
            command: self.command.into(),
            environment: self.environment.into(),
            working_dir: String::new(),
            volumes: self.volumes,
            volumes_from: self.volumes_from,
            network: self.network_mode,
            labels: self.labels.into(),
            auth_config: self.auth_config,
            dns: self.dns.into(),
            dns_search: self.dns_search.into(),
            devices: self.devices,
            extra_hosts: self.extra_hosts,
            shm_size: self.shm_size,
            oom_kill_disable: self.oom_kill_disable,
            constraints: self.when,
            // only the compiler detaches containers
            detached: false,
            disabled: false,
        }
    }
}

/// Parses a pipeline definition.
pub fn parse(raw: &str) -> Result<Config> {
    let def: PipelineDef = if raw.trim().is_empty() {
        PipelineDef::default()
    } else {
        serde_yaml::from_str(raw)?
    };

    let mut pipeline = Vec::new();
    if let Some(clone) = def.clone {
        // only the first clone entry is used
        if let Some((_, value)) = clone.into_iter().next() {
            pipeline.push(parse_step(CLONE_STEP.to_string(), value)?);
        }
    }
    pipeline.extend(parse_steps(def.pipeline)?);
    let services = parse_steps(def.services)?;

    debug!(
        "📄 Parsed pipeline with {} steps and {} services",
        pipeline.len(),
        services.len()
    );

    Ok(Config {
        workspace: def.workspace,
        pipeline,
        services,
    })
}

fn parse_steps(mapping: Option<Mapping>) -> Result<Vec<Step>> {
    let Some(mapping) = mapping else {
        return Ok(Vec::new());
    };

    let mut steps = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::YamlError(format!("step name must be a string, got {:?}", key)))?;
        if steps.iter().any(|s: &Step| s.name == name) {
            return Err(AppError::YamlError(format!("duplicate step name '{}'", name)));
        }
        steps.push(parse_step(name, value)?);
    }
    Ok(steps)
}

fn parse_step(name: String, value: Value) -> Result<Step> {
    let def: StepDef = if value.is_null() {
        StepDef::default()
    } else {
        serde_yaml::from_value(value)
            .map_err(|e| AppError::YamlError(format!("step '{}': {}", name, e)))?
    };
    if def.detach {
        return Err(AppError::YamlError(format!(
            "step '{}': detach is reserved for agent managed containers",
            name
        )));
    }
    Ok(def.into_step(name))
}

/// Substitutes `${KEY}` references to known build variables in the raw
/// definition. `$${KEY}` yields a literal `${KEY}`; unknown keys are left as is.
pub fn expand(raw: &str, envs: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(idx) = rest.find("${") {
        let escaped = idx > 0 && rest.as_bytes()[idx - 1] == b'$';
        let Some(end) = rest[idx + 2..].find('}') else {
            break;
        };
        let key = &rest[idx + 2..idx + 2 + end];
        let token_end = idx + 2 + end + 1;

        if escaped {
            out.push_str(&rest[..idx - 1]);
            out.push_str(&rest[idx..token_end]);
        } else if let Some(value) = envs.get(key) {
            out.push_str(&rest[..idx]);
            out.push_str(value);
        } else {
            out.push_str(&rest[..token_end]);
        }
        rest = &rest[token_end..];
    }

    out.push_str(rest);
    out
}
