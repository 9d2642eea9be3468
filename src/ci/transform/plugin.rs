use serde_yaml::Value;

use super::Transform;
use crate::ci::config::{Config, Step};
use crate::error::Result;
use crate::utils::glob_match;

/// Passes plugin parameters as `PLUGIN_*` environment variables.
pub struct PluginParams;

impl Transform for PluginParams {
    fn name(&self) -> &'static str {
        "plugin_params"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            for (key, value) in &step.vargs {
                step.environment.insert(param_name(key), param_value(value)?);
            }
        }
        Ok(())
    }
}

fn param_name(key: &str) -> String {
    format!("PLUGIN_{}", key.to_uppercase())
}

fn param_value(value: &Value) -> Result<String> {
    if let Some(scalar) = scalar(value) {
        return Ok(scalar);
    }
    if let Value::Sequence(items) = value {
        let scalars: Option<Vec<String>> = items.iter().map(scalar).collect();
        if let Some(scalars) = scalars {
            return Ok(scalars.join(","));
        }
    }
    Ok(serde_json::to_string(value)?)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Disables plugin steps for local runs unless their name is allowlisted.
pub struct PluginDisable {
    allowed: Vec<String>,
}

impl PluginDisable {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    fn keeps(&self, step: &Step) -> bool {
        self.allowed
            .iter()
            .any(|pattern| glob_match(pattern, &step.name))
    }
}

impl Transform for PluginDisable {
    fn name(&self) -> &'static str {
        "plugin_disable"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            if !step.is_plugin() || step.detached {
                continue;
            }
            step.disabled = !self.keeps(step);
        }
        Ok(())
    }
}

/// Bind-mounts extra volumes into every container.
pub struct ImageVolume {
    volumes: Vec<String>,
}

impl ImageVolume {
    pub fn new(volumes: Vec<String>) -> Self {
        Self { volumes }
    }
}

impl Transform for ImageVolume {
    fn name(&self) -> &'static str {
        "image_volume"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.all_steps_mut() {
            step.volumes.extend(self.volumes.iter().cloned());
        }
        Ok(())
    }
}
