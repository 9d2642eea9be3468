use uuid::Uuid;

use super::Transform;
use crate::ci::config::Config;
use crate::error::Result;

/// Assigns every step a container id derived from one random token per build.
pub struct Identifier {
    token: String,
}

impl Identifier {
    pub fn new() -> Self {
        Self::with_token(format!("drone_{}", Uuid::new_v4().simple()))
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for Identifier {
    fn name(&self) -> &'static str {
        "identifier"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        // services first, pipeline steps continue the numbering
        for (i, step) in config.all_steps_mut().enumerate() {
            step.id = format!("{}_{}", self.token, i);
        }
        Ok(())
    }
}
