use super::Transform;
use crate::ci::config::{Config, Step};
use crate::error::Result;

pub const AMBASSADOR: &str = "ambassador";

/// Emulates a pod: a sleeping ambassador container owns the network namespace
/// and workspace volumes, and every other container joins it.
pub struct Pod {
    id: String,
    image: String,
}

impl Pod {
    pub fn new(token: &str, platform: &str) -> Self {
        Self {
            id: format!("drone_ambassador_{}", token),
            image: ambassador_image(platform).to_string(),
        }
    }

    fn ambassador(&self, config: &Config) -> Step {
        let mut step = Step::new(AMBASSADOR, self.image.clone());
        step.id = self.id.clone();
        step.detached = true;
        step.entrypoint = vec!["/bin/sleep".to_string()];
        step.command = vec!["86400".to_string()];
        step.volumes = vec![
            config.workspace.path.clone(),
            config.workspace.base.clone(),
        ];
        step
    }
}

fn ambassador_image(platform: &str) -> &'static str {
    match platform {
        "linux/arm" => "arm32v6/busybox:latest",
        "linux/arm64" => "arm64v8/busybox:latest",
        _ => "busybox:latest",
    }
}

impl Transform for Pod {
    fn name(&self) -> &'static str {
        "pod"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        let ambassador = self.ambassador(config);

        for step in config.all_steps_mut() {
            step.volumes_from.push(self.id.clone());
            if step.network.is_empty() {
                step.network = format!("container:{}", self.id);
            }
        }

        config.services.insert(0, ambassador);
        Ok(())
    }
}
