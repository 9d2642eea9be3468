use std::sync::Arc;

use super::Transform;
use crate::ci::config::Config;
use crate::error::Result;

const STATUS_SUCCESS: &str = "success";
const STATUS_FAILURE: &str = "failure";
const EVENT_PULL: &str = "pull_request";

/// Fills in the constraints a step gets when the author set none.
pub struct DefaultFilter;

impl Transform for DefaultFilter {
    fn name(&self) -> &'static str {
        "default_filter"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            if step.constraints.status.is_empty() {
                step.constraints.status.include = vec![STATUS_SUCCESS.to_string()];
            }
            if step.constraints.event.is_empty() && step.is_plugin() && !step.is_clone() {
                step.constraints.event.exclude = vec![EVENT_PULL.to_string()];
            }
        }
        Ok(())
    }
}

/// Rewrites step constraints given the status of the previous build on the
/// same branch.
pub trait ChangePolicy: Send + Sync {
    fn apply(&self, config: &mut Config, previous_status: &str);
}

/// Resolves `status: changed` into the status that differs from the previous
/// build: `success` after a failure, `failure` after a success, both when the
/// previous build ended any other way.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusChangePolicy;

impl ChangePolicy for StatusChangePolicy {
    fn apply(&self, config: &mut Config, previous_status: &str) {
        let wanted: &[&str] = match previous_status {
            STATUS_FAILURE => &[STATUS_SUCCESS],
            STATUS_SUCCESS => &[STATUS_FAILURE],
            _ => &[STATUS_SUCCESS, STATUS_FAILURE],
        };

        for step in config.pipeline.iter_mut() {
            let include = &step.constraints.status.include;
            if !include.iter().any(|s| is_change_keyword(s)) {
                continue;
            }

            let mut resolved: Vec<String> = include
                .iter()
                .filter(|s| !is_change_keyword(s))
                .cloned()
                .collect();
            for status in wanted {
                if !resolved.iter().any(|s| s == status) {
                    resolved.push(status.to_string());
                }
            }
            step.constraints.status.include = resolved;
        }
    }
}

fn is_change_keyword(status: &str) -> bool {
    matches!(status, "change" | "changed" | "changes")
}

/// Applies a [`ChangePolicy`] against the previous build's status.
pub struct ChangeFilter {
    previous_status: String,
    policy: Arc<dyn ChangePolicy>,
}

impl ChangeFilter {
    pub fn new(previous_status: impl Into<String>, policy: Arc<dyn ChangePolicy>) -> Self {
        Self {
            previous_status: previous_status.into(),
            policy,
        }
    }
}

impl Transform for ChangeFilter {
    fn name(&self) -> &'static str {
        "change_filter"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        self.policy.apply(config, &self.previous_status);
        Ok(())
    }
}
