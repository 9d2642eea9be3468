//! Pipeline compiler
//!
//! Expands and parses the raw definition, then runs the transform passes in
//! their fixed order to produce a sandboxed execution plan.

use std::sync::Arc;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::config::Config;
use super::transform::environ::build_environment;
use super::transform::{
    ChangeFilter, ChangePolicy, Check, CloneStep, CommandTransform, DefaultFilter, Environ,
    Identifier, ImageEscalate, ImageName, ImageNamespace, ImagePull, ImageSecrets, ImageTag,
    ImageVolume, PluginDisable, PluginParams, Pod, StatusChangePolicy, Transform,
    WorkspaceTransform,
};
use super::yaml_parser;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::models::{Secret, Work};

pub struct Compiler {
    config: AgentConfig,
    change_policy: Arc<dyn ChangePolicy>,
}

impl Compiler {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            change_policy: Arc::new(StatusChangePolicy),
        }
    }

    /// Replaces the policy used to resolve `status: changed` constraints.
    pub fn with_change_policy(mut self, policy: Arc<dyn ChangePolicy>) -> Self {
        self.change_policy = policy;
        self
    }

    pub fn compile(&self, raw: &str, work: &Work) -> Result<Config> {
        info!(
            "🔧 Compiling pipeline for {} build #{} job #{}",
            work.repo.full_name, work.build.number, work.job.number
        );

        let envs = build_environment(work, &self.config.platform);
        let expanded = yaml_parser::expand(raw, &envs);
        let mut config = yaml_parser::parse(&expanded)?;

        let token = Uuid::new_v4().simple().to_string();

        run_passes(&mut config, self.prepare(work, &token))?;

        if let Some(local) = &self.config.local {
            let volume = format!("{}:{}", local, config.workspace.path);
            let local_passes: Vec<Box<dyn Transform>> = vec![
                Box::new(PluginDisable::new(self.config.disable.clone())),
                Box::new(ImageVolume::new(vec![volume])),
            ];
            run_passes(&mut config, local_passes)?;
        }

        let pod: Vec<Box<dyn Transform>> = vec![Box::new(Pod::new(&token, &self.config.platform))];
        run_passes(&mut config, pod)?;

        info!(
            "✅ Compiled {} steps and {} services",
            config.pipeline.len(),
            config.services.len()
        );
        Ok(config)
    }

    fn prepare(&self, work: &Work, token: &str) -> Vec<Box<dyn Transform>> {
        let mut passes: Vec<Box<dyn Transform>> = vec![
            Box::new(CloneStep::new(&work.repo.kind)),
            Box::new(Environ::from_work(
                work,
                &self.config.platform,
                &self.config.proxy,
            )),
            Box::new(DefaultFilter),
        ];

        if let Some(last) = &work.build_last {
            passes.push(Box::new(ChangeFilter::new(
                last.status.clone(),
                Arc::clone(&self.change_policy),
            )));
        }

        let compile: Vec<Box<dyn Transform>> = vec![
            Box::new(ImageSecrets::new(
                self.secrets(work),
                work.build.event.as_str(),
            )),
            Box::new(Identifier::with_token(format!("drone_{}", token))),
            Box::new(WorkspaceTransform::new(
                self.config.workspace_base.clone(),
                source_path(&work.repo.link),
            )),
            Box::new(Check::new(work.repo.is_trusted)),
            Box::new(CommandTransform),
            Box::new(ImagePull::new(self.config.pull)),
            Box::new(ImageTag),
            Box::new(ImageName),
            Box::new(ImageNamespace::new(self.config.namespace.clone())),
            Box::new(ImageEscalate::new(self.config.escalate.clone())),
            Box::new(PluginParams),
        ];
        passes.extend(compile);

        passes
    }

    /// Secrets available to this job. User secrets require a verified
    /// definition; netrc credentials are only handed out for private repos.
    fn secrets(&self, work: &Work) -> Vec<Secret> {
        let mut secrets = Vec::new();
        if work.verified {
            secrets.extend(work.secrets.iter().cloned());
        } else if !work.secrets.is_empty() {
            debug!("🔒 Definition not verified, withholding {} secret(s)", work.secrets.len());
        }

        if work.repo.is_private {
            let images = if self.config.netrc.is_empty() {
                vec!["*".to_string()]
            } else {
                self.config.netrc.clone()
            };
            let netrc = &work.netrc;
            for (name, value) in [
                ("DRONE_NETRC_USERNAME", &netrc.login),
                ("DRONE_NETRC_PASSWORD", &netrc.password),
                ("DRONE_NETRC_MACHINE", &netrc.machine),
            ] {
                secrets.push(Secret {
                    images: images.clone(),
                    ..Secret::new(name, value.clone())
                });
            }
        }
        secrets
    }
}

fn run_passes(config: &mut Config, passes: Vec<Box<dyn Transform>>) -> Result<()> {
    for pass in passes {
        pass.apply(config)?;
        debug!("🔧 Applied {} pass", pass.name());
    }
    Ok(())
}

/// `src/<host>/<path>` for the repository link.
fn source_path(link: &str) -> String {
    match Url::parse(link) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            let path = url.path().trim_matches('/');
            let path = path.strip_suffix(".git").unwrap_or(path);
            ["src", host, path]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("/")
        }
        Err(_) => "src".to_string(),
    }
}
