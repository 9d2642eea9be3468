use super::Transform;
use crate::ci::config::{Config, Step};
use crate::error::Result;
use crate::models::Secret;

const REGISTRY_USERNAME: &str = "REGISTRY_USERNAME";
const REGISTRY_PASSWORD: &str = "REGISTRY_PASSWORD";
const REGISTRY_EMAIL: &str = "REGISTRY_EMAIL";

/// Injects secrets into the steps whose image and event they are scoped to.
///
/// Registry credentials are routed to the step's auth config instead of its
/// environment.
pub struct ImageSecrets {
    secrets: Vec<Secret>,
    event: String,
}

impl ImageSecrets {
    pub fn new(secrets: Vec<Secret>, event: impl Into<String>) -> Self {
        Self {
            secrets,
            event: event.into(),
        }
    }

    fn inject(&self, step: &mut Step) {
        for secret in &self.secrets {
            if !secret.matches(&step.image, &self.event) {
                continue;
            }

            match secret.name.to_uppercase().as_str() {
                REGISTRY_USERNAME => step.auth_config.username = secret.value.clone(),
                REGISTRY_PASSWORD => step.auth_config.password = secret.value.clone(),
                REGISTRY_EMAIL => step.auth_config.email = secret.value.clone(),
                _ => {
                    step.environment
                        .insert(secret.name.to_uppercase(), secret.value.clone());
                }
            }
        }
    }
}

impl Transform for ImageSecrets {
    fn name(&self) -> &'static str {
        "image_secrets"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.all_steps_mut() {
            self.inject(step);
        }
        Ok(())
    }
}
