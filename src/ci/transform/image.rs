use super::Transform;
use crate::ci::config::Config;
use crate::error::{AppError, Result};
use crate::utils::glob_match;

/// Forces a fresh pull of plugin images.
pub struct ImagePull {
    force: bool,
}

impl ImagePull {
    pub fn new(force: bool) -> Self {
        Self { force }
    }
}

impl Transform for ImagePull {
    fn name(&self) -> &'static str {
        "image_pull"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            if step.is_plugin() {
                step.pull |= self.force;
            }
        }
        Ok(())
    }
}

/// Adds `:latest` to images without a tag or digest.
pub struct ImageTag;

impl Transform for ImageTag {
    fn name(&self) -> &'static str {
        "image_tag"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.all_steps_mut() {
            step.image = tag_image(&step.image);
        }
        Ok(())
    }
}

/// `image` with an explicit tag, defaulting to `latest`.
pub fn tag_image(image: &str) -> String {
    if image.is_empty() || image.contains('@') {
        return image.to_string();
    }
    let name = image.rsplit('/').next().unwrap_or(image);
    if name.contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Docker image names may not contain underscores.
pub struct ImageName;

impl Transform for ImageName {
    fn name(&self) -> &'static str {
        "image_name"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            step.image = step.image.replace('_', "-");
        }
        Ok(())
    }
}

/// Prefixes bare plugin images with the default plugin namespace.
pub struct ImageNamespace {
    namespace: String,
}

impl ImageNamespace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Transform for ImageNamespace {
    fn name(&self) -> &'static str {
        "image_namespace"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if self.namespace.is_empty() {
            return Ok(());
        }
        for step in config.pipeline.iter_mut() {
            if step.image.contains('/') || step.vargs.is_empty() {
                continue;
            }
            step.image = format!("{}/{}", self.namespace.trim_end_matches('/'), step.image);
        }
        Ok(())
    }
}

/// Runs trusted plugins in privileged mode.
pub struct ImageEscalate {
    patterns: Vec<String>,
}

impl ImageEscalate {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl Transform for ImageEscalate {
    fn name(&self) -> &'static str {
        "image_escalate"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter_mut() {
            let escalate = self
                .patterns
                .iter()
                .any(|pattern| glob_match(pattern, &step.image));
            if !escalate {
                continue;
            }
            if !step.commands.is_empty() {
                return Err(AppError::ValidationError(format!(
                    "Custom commands disabled for the {} plugin",
                    step.image
                )));
            }
            step.privileged = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::config::Step;
    use serde_yaml::Value;

    fn pipeline(steps: Vec<Step>) -> Config {
        Config {
            pipeline: steps,
            ..Default::default()
        }
    }

    fn plugin(name: &str, image: &str) -> Step {
        let mut step = Step::new(name, image);
        step.vargs.insert("repo".to_string(), Value::String("octocat/hello".to_string()));
        step
    }

    #[test]
    fn test_tag_image() {
        assert_eq!(tag_image("golang"), "golang:latest");
        assert_eq!(tag_image("golang:1.5"), "golang:1.5");
        assert_eq!(tag_image(&tag_image("golang:1.5")), "golang:1.5");
        assert_eq!(tag_image("localhost:5000/golang"), "localhost:5000/golang:latest");
        assert_eq!(tag_image("localhost:5000/golang:1.5"), "localhost:5000/golang:1.5");
        assert_eq!(tag_image("golang@sha256:abcd"), "golang@sha256:abcd");
    }

    #[test]
    fn test_image_tag_covers_services() {
        let mut config = pipeline(vec![Step::new("build", "golang")]);
        config.services.push(Step::new("database", "mysql"));
        ImageTag.apply(&mut config).unwrap();

        assert_eq!(config.pipeline[0].image, "golang:latest");
        assert_eq!(config.services[0].image, "mysql:latest");
    }

    #[test]
    fn test_image_pull_plugins_only() {
        let mut build = Step::new("build", "golang");
        build.commands.push("go build".to_string());
        let mut config = pipeline(vec![build, plugin("publish", "plugins/docker")]);
        ImagePull::new(true).apply(&mut config).unwrap();

        assert!(!config.pipeline[0].pull);
        assert!(config.pipeline[1].pull);
    }

    #[test]
    fn test_image_pull_keeps_user_setting() {
        let mut step = plugin("publish", "plugins/docker");
        step.pull = true;
        let mut config = pipeline(vec![step]);
        ImagePull::new(false).apply(&mut config).unwrap();
        assert!(config.pipeline[0].pull);
    }

    #[test]
    fn test_image_name_replaces_underscores() {
        let mut config = pipeline(vec![Step::new("build", "my_org/my_image:1.0")]);
        ImageName.apply(&mut config).unwrap();
        assert_eq!(config.pipeline[0].image, "my-org/my-image:1.0");
    }

    #[test]
    fn test_image_namespace() {
        let mut build = Step::new("build", "golang");
        build.commands.push("go build".to_string());
        let mut config = pipeline(vec![
            build,
            plugin("publish", "docker"),
            plugin("notify", "octocat/slack"),
        ]);
        ImageNamespace::new("plugins").apply(&mut config).unwrap();

        assert_eq!(config.pipeline[0].image, "golang");
        assert_eq!(config.pipeline[1].image, "plugins/docker");
        assert_eq!(config.pipeline[2].image, "octocat/slack");
    }

    #[test]
    fn test_image_escalate() {
        let patterns = vec!["plugins/docker:*".to_string()];
        let mut config = pipeline(vec![
            plugin("publish", "plugins/docker:latest"),
            plugin("clone", "plugins/git:latest"),
        ]);
        ImageEscalate::new(patterns).apply(&mut config).unwrap();

        assert!(config.pipeline[0].privileged);
        assert!(!config.pipeline[1].privileged);
    }

    #[test]
    fn test_image_escalate_rejects_commands() {
        let mut step = Step::new("publish", "plugins/docker:latest");
        step.commands.push("docker ps".to_string());
        let mut config = pipeline(vec![step]);

        let err = ImageEscalate::new(vec!["plugins/docker:*".to_string()])
            .apply(&mut config)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(err.to_string().contains("plugins/docker:latest"));
    }
}
