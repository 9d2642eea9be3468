use rustci_agent::models::{Build, BuildEvent, Secret, Work};

/// Builder for work items used across the integration tests.
pub struct WorkBuilder {
    work: Work,
}

impl WorkBuilder {
    pub fn new() -> Self {
        let mut work = Work::default();
        work.repo.owner = "octocat".to_string();
        work.repo.name = "hello-world".to_string();
        work.repo.full_name = "octocat/hello-world".to_string();
        work.repo.kind = "git".to_string();
        work.repo.link = "https://github.com/octocat/hello-world".to_string();
        work.repo.clone = "https://github.com/octocat/hello-world.git".to_string();
        work.repo.branch = "master".to_string();
        work.build.number = 1;
        work.build.commit = "762941318ee16e59dabbacb1b4049eec22f0d303".to_string();
        work.build.branch = "master".to_string();
        work.build.git_ref = "refs/heads/master".to_string();
        work.job.number = 1;
        work.netrc.machine = "github.com".to_string();
        work.netrc.login = "octocat".to_string();
        work.netrc.password = "x-oauth-basic".to_string();
        Self { work }
    }

    pub fn yaml(mut self, yaml: &str) -> Self {
        self.work.yaml = yaml.to_string();
        self
    }

    pub fn trusted(mut self) -> Self {
        self.work.repo.is_trusted = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.work.repo.is_private = true;
        self
    }

    pub fn verified(mut self) -> Self {
        self.work.verified = true;
        self
    }

    pub fn event(mut self, event: BuildEvent) -> Self {
        self.work.build.event = event;
        if event == BuildEvent::PullRequest {
            self.work.build.git_ref = "refs/pull/42/head".to_string();
        }
        self
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.work.build.branch = branch.to_string();
        self
    }

    pub fn timeout_minutes(mut self, minutes: u64) -> Self {
        self.work.repo.timeout = minutes;
        self
    }

    pub fn secret(mut self, secret: Secret) -> Self {
        self.work.secrets.push(secret);
        self
    }

    pub fn last_status(mut self, status: &str) -> Self {
        self.work.build_last = Some(Build {
            number: 0,
            status: status.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> Work {
        self.work
    }
}
