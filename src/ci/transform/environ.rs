use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::Transform;
use crate::ci::config::Config;
use crate::error::Result;
use crate::models::{BuildEvent, Work};

/// Injects build metadata into every step's environment.
pub struct Environ {
    envs: HashMap<String, String>,
}

impl Environ {
    pub fn new(envs: HashMap<String, String>) -> Self {
        Self { envs }
    }

    /// Build metadata for `work` plus the given proxy variables.
    pub fn from_work(work: &Work, platform: &str, proxy: &HashMap<String, String>) -> Self {
        let mut envs = build_environment(work, platform);
        envs.extend(proxy.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::new(envs)
    }
}

impl Transform for Environ {
    fn name(&self) -> &'static str {
        "environ"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.all_steps_mut() {
            for (key, value) in &self.envs {
                if value.is_empty() {
                    continue;
                }
                step.environment.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

fn pull_request_number(git_ref: &str) -> String {
    static PULL: OnceLock<Regex> = OnceLock::new();
    let re = PULL.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
    re.find(git_ref)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// The variables every step sees for a given job.
pub fn build_environment(work: &Work, platform: &str) -> HashMap<String, String> {
    let repo = &work.repo;
    let build = &work.build;
    let job = &work.job;

    let mut envs: HashMap<String, String> = [
        ("CI", "drone".to_string()),
        ("DRONE", "true".to_string()),
        ("DRONE_ARCH", platform.to_string()),
        ("DRONE_REPO", repo.full_name.clone()),
        ("DRONE_REPO_SCM", repo.kind.clone()),
        ("DRONE_REPO_OWNER", repo.owner.clone()),
        ("DRONE_REPO_NAME", repo.name.clone()),
        ("DRONE_REPO_LINK", repo.link.clone()),
        ("DRONE_REPO_AVATAR", repo.avatar.clone()),
        ("DRONE_REPO_BRANCH", repo.branch.clone()),
        ("DRONE_REPO_PRIVATE", repo.is_private.to_string()),
        ("DRONE_REPO_TRUSTED", repo.is_trusted.to_string()),
        ("DRONE_REMOTE_URL", repo.clone.clone()),
        ("DRONE_COMMIT_SHA", build.commit.clone()),
        ("DRONE_COMMIT_REF", build.git_ref.clone()),
        ("DRONE_COMMIT_REFSPEC", build.refspec.clone()),
        ("DRONE_COMMIT_BRANCH", build.branch.clone()),
        ("DRONE_COMMIT_LINK", build.link.clone()),
        ("DRONE_COMMIT_MESSAGE", build.message.clone()),
        ("DRONE_COMMIT_AUTHOR", build.author.clone()),
        ("DRONE_COMMIT_AUTHOR_EMAIL", build.email.clone()),
        ("DRONE_COMMIT_AUTHOR_AVATAR", build.avatar.clone()),
        ("DRONE_BUILD_NUMBER", build.number.to_string()),
        ("DRONE_BUILD_EVENT", build.event.to_string()),
        ("DRONE_BUILD_STATUS", build.status.clone()),
        (
            "DRONE_BUILD_LINK",
            format!("{}/{}/{}", work.system.link, repo.full_name, build.number),
        ),
        ("DRONE_BUILD_CREATED", build.created.to_string()),
        ("DRONE_BUILD_STARTED", build.started.to_string()),
        ("DRONE_BUILD_FINISHED", build.finished.to_string()),
        ("DRONE_JOB_NUMBER", job.number.to_string()),
        ("DRONE_JOB_STARTED", job.started.to_string()),
        ("DRONE_BRANCH", build.branch.clone()),
        ("DRONE_COMMIT", build.commit.clone()),
        ("DRONE_YAML_VERIFIED", work.verified.to_string()),
        ("DRONE_YAML_SIGNED", work.signed.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    match build.event {
        BuildEvent::Tag => {
            let tag = build.git_ref.trim_start_matches("refs/tags/").to_string();
            envs.insert("DRONE_TAG".to_string(), tag);
        }
        BuildEvent::PullRequest => {
            envs.insert("DRONE_PULL_REQUEST".to_string(), pull_request_number(&build.git_ref));
        }
        BuildEvent::Deployment => {
            envs.insert("DRONE_DEPLOY_TO".to_string(), build.deploy.clone());
        }
        BuildEvent::Push => {}
    }

    if let Some(last) = &work.build_last {
        envs.insert("DRONE_PREV_BUILD_STATUS".to_string(), last.status.clone());
        envs.insert("DRONE_PREV_BUILD_NUMBER".to_string(), last.number.to_string());
        envs.insert("DRONE_PREV_COMMIT_SHA".to_string(), last.commit.clone());
    }

    for (key, value) in &job.environment {
        envs.insert(key.clone(), value.clone());
    }

    envs
}
