use super::Transform;
use crate::ci::config::{Config, Step, CLONE_STEP};
use crate::error::Result;

/// Makes sure the pipeline checks out the source before anything else runs.
pub struct CloneStep {
    image: String,
}

impl CloneStep {
    /// Picks the default clone plugin for the repository's SCM kind.
    pub fn new(kind: &str) -> Self {
        let image = match kind {
            "hg" => "plugins/hg:latest",
            _ => "plugins/git:latest",
        };
        Self {
            image: image.to_string(),
        }
    }
}

impl Transform for CloneStep {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(step) = config.pipeline.iter_mut().find(|s| s.is_clone()) {
            if step.image.is_empty() {
                step.image = self.image.clone();
            }
            return Ok(());
        }

        config.pipeline.insert(0, Step::new(CLONE_STEP, self.image.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_step_prepended() {
        let mut config = Config {
            pipeline: vec![Step::new("build", "golang")],
            ..Default::default()
        };
        CloneStep::new("git").apply(&mut config).unwrap();

        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0].name, "clone");
        assert_eq!(config.pipeline[0].image, "plugins/git:latest");
    }

    #[test]
    fn test_clone_image_by_scm_kind() {
        let mut config = Config::default();
        CloneStep::new("hg").apply(&mut config).unwrap();
        assert_eq!(config.pipeline[0].image, "plugins/hg:latest");
    }

    #[test]
    fn test_existing_clone_step_kept() {
        let mut config = Config {
            pipeline: vec![Step::new("clone", "custom/git"), Step::new("build", "golang")],
            ..Default::default()
        };
        let pass = CloneStep::new("git");
        pass.apply(&mut config).unwrap();
        pass.apply(&mut config).unwrap();

        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0].image, "custom/git");
    }

    #[test]
    fn test_existing_clone_step_without_image() {
        let mut config = Config {
            pipeline: vec![Step::new("clone", "")],
            ..Default::default()
        };
        CloneStep::new("git").apply(&mut config).unwrap();
        assert_eq!(config.pipeline[0].image, "plugins/git:latest");
    }
}
