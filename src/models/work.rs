use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::secret::Secret;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failure,
    Killed,
    Error,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Killed => "killed",
            JobStatus::Error => "error",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Classifies a finished job by its exit code.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            128 | 130 | 137 => JobStatus::Killed,
            0 => JobStatus::Success,
            _ => JobStatus::Failure,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildEvent {
    #[default]
    Push,
    PullRequest,
    Tag,
    Deployment,
}

impl BuildEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildEvent::Push => "push",
            BuildEvent::PullRequest => "pull_request",
            BuildEvent::Tag => "tag",
            BuildEvent::Deployment => "deployment",
        }
    }
}

impl fmt::Display for BuildEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository the job belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    /// SCM kind, `git` or `hg`.
    pub kind: String,
    pub link: String,
    pub clone: String,
    pub branch: String,
    pub avatar: String,
    pub is_private: bool,
    pub is_trusted: bool,
    /// Total build time limit in minutes. Zero falls back to one hour.
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Build {
    pub number: i64,
    pub event: BuildEvent,
    pub status: String,
    /// Deploy target for deployment events.
    pub deploy: String,
    pub commit: String,
    pub branch: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub refspec: String,
    pub link: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub avatar: String,
    pub created: i64,
    pub started: i64,
    pub finished: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Job {
    pub id: i64,
    pub number: i64,
    /// Matrix axis values for this job.
    pub environment: HashMap<String, String>,
    pub status: JobStatus,
    pub exit_code: i32,
    pub error: String,
    pub started: i64,
    pub finished: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Netrc {
    pub machine: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct System {
    pub link: String,
}

/// One scheduled job as handed over by the queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Work {
    pub repo: Repo,
    pub build: Build,
    pub job: Job,
    pub secrets: Vec<Secret>,
    pub netrc: Netrc,
    pub verified: bool,
    pub signed: bool,
    pub build_last: Option<Build>,
    pub system: System,
    /// Raw pipeline definition.
    pub yaml: String,
}
