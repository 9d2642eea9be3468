use super::Transform;
use crate::ci::config::Config;
use crate::error::Result;
use crate::utils::{clean_path, join_path};

/// Resolves the workspace and points every pipeline step at it.
pub struct WorkspaceTransform {
    base: String,
    path: String,
}

impl WorkspaceTransform {
    /// `base` and `path` are used when the definition leaves them unset.
    pub fn new(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
        }
    }
}

impl Transform for WorkspaceTransform {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        let workspace = &mut config.workspace;
        if workspace.base.is_empty() {
            workspace.base = self.base.clone();
        }
        if workspace.path.is_empty() {
            workspace.path = self.path.clone();
        }

        workspace.base = clean_path(&format!("/{}", workspace.base));
        workspace.path = join_path(&workspace.base, &workspace.path);

        for step in config.pipeline.iter_mut() {
            step.working_dir = config.workspace.path.clone();
        }
        Ok(())
    }
}
