mod common;

use common::*;
use rustci_agent::ci::Compiler;
use rustci_agent::models::{BuildEvent, JobStatus, Secret};
use rustci_agent::{AgentConfig, AppError};

const PIPELINE: &str = r#"
pipeline:
  build:
    image: golang:1.5
    commands:
      - go build
      - go test
  publish:
    image: docker
    repo: octocat/hello-world
    tags: [latest]
  notify:
    image: slack
    channel: dev
    when:
      status: [changed]

services:
  database:
    image: mysql
"#;

fn compile(work: &rustci_agent::Work) -> rustci_agent::Result<rustci_agent::ci::Config> {
    Compiler::new(AgentConfig::default()).compile(&work.yaml, work)
}

#[test]
fn test_private_verified_repo_receives_netrc_secrets() {
    let work = WorkBuilder::new()
        .yaml(PIPELINE)
        .private()
        .verified()
        .build();
    let config = compile(&work).unwrap();

    let clone = config.pipeline.iter().find(|s| s.is_clone()).unwrap();
    assert_eq!(clone.environment["DRONE_NETRC_USERNAME"], "octocat");
    assert_eq!(clone.environment["DRONE_NETRC_PASSWORD"], "x-oauth-basic");
    assert_eq!(clone.environment["DRONE_NETRC_MACHINE"], "github.com");

    // netrc secrets default to every image and every event
    let build = config.pipeline.iter().find(|s| s.name == "build").unwrap();
    assert!(build.environment.contains_key("DRONE_NETRC_MACHINE"));
}

#[test]
fn test_public_repo_gets_no_netrc() {
    let work = WorkBuilder::new().yaml(PIPELINE).verified().build();
    let config = compile(&work).unwrap();

    for step in config.all_steps() {
        assert!(!step.environment.contains_key("DRONE_NETRC_PASSWORD"));
    }
}

#[test]
fn test_netrc_scoped_to_configured_images() {
    let work = WorkBuilder::new().yaml(PIPELINE).private().build();
    let agent = AgentConfig {
        netrc: vec!["plugins/git".to_string()],
        ..AgentConfig::default()
    };
    let config = Compiler::new(agent).compile(&work.yaml, &work).unwrap();

    let clone = config.pipeline.iter().find(|s| s.is_clone()).unwrap();
    assert!(clone.environment.contains_key("DRONE_NETRC_PASSWORD"));
    let build = config.pipeline.iter().find(|s| s.name == "build").unwrap();
    assert!(!build.environment.contains_key("DRONE_NETRC_PASSWORD"));
}

#[test]
fn test_user_secrets_require_verification() {
    let token = Secret::new("DOCKER_PASSWORD", "hunter2");

    let unverified = WorkBuilder::new()
        .yaml(PIPELINE)
        .secret(token.clone())
        .build();
    let config = compile(&unverified).unwrap();
    assert!(config
        .all_steps()
        .all(|s| !s.environment.contains_key("DOCKER_PASSWORD")));

    let verified = WorkBuilder::new().yaml(PIPELINE).secret(token).verified().build();
    let config = compile(&verified).unwrap();
    let publish = config.pipeline.iter().find(|s| s.name == "publish").unwrap();
    assert_eq!(publish.environment["DOCKER_PASSWORD"], "hunter2");
}

#[test]
fn test_pull_request_skips_plugins_by_default() {
    let work = WorkBuilder::new()
        .yaml(PIPELINE)
        .event(BuildEvent::PullRequest)
        .build();
    let config = compile(&work).unwrap();

    let runs = |name: &str| {
        let step = config.pipeline.iter().find(|s| s.name == name).unwrap();
        step.constraints.matches(
            "linux/amd64",
            "",
            "pull_request",
            "master",
            JobStatus::Success.as_str(),
            &work.job.environment,
        )
    };

    assert!(runs("clone"));
    assert!(runs("build"));
    assert!(!runs("publish"));

    let publish = config.pipeline.iter().find(|s| s.name == "publish").unwrap();
    assert!(publish.constraints.matches(
        "linux/amd64",
        "",
        "push",
        "master",
        "success",
        &work.job.environment
    ));
}

#[test]
fn test_working_dir_matches_absolute_workspace() {
    let work = WorkBuilder::new().yaml(PIPELINE).build();
    let config = compile(&work).unwrap();

    assert!(config.workspace.path.starts_with('/'));
    assert_eq!(config.workspace.path, "/drone/src/github.com/octocat/hello-world");
    for step in &config.pipeline {
        assert_eq!(step.working_dir, config.workspace.path);
    }
}

#[test]
fn test_plan_layout() {
    let work = WorkBuilder::new().yaml(PIPELINE).build();
    let config = compile(&work).unwrap();

    let services: Vec<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(services, vec!["ambassador", "database"]);
    let steps: Vec<&str> = config.pipeline.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(steps, vec!["clone", "build", "publish", "notify"]);

    let ids: std::collections::HashSet<&str> = config.all_steps().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), 6);

    let publish = &config.pipeline[2];
    assert_eq!(publish.image, "plugins/docker:latest");
    assert!(publish.privileged);
    assert_eq!(publish.environment["PLUGIN_REPO"], "octocat/hello-world");
    assert!(publish.entrypoint.is_empty());

    let database = &config.services[1];
    assert_eq!(database.image, "mysql:latest");
    assert_eq!(database.environment["DRONE_REPO"], "octocat/hello-world");
}

#[test]
fn test_change_filter_uses_previous_build() {
    let work = WorkBuilder::new().yaml(PIPELINE).last_status("failure").build();
    let config = compile(&work).unwrap();
    let notify = config.pipeline.iter().find(|s| s.name == "notify").unwrap();
    assert_eq!(notify.constraints.status.include, vec!["success"]);

    let first = WorkBuilder::new().yaml(PIPELINE).build();
    let config = compile(&first).unwrap();
    let notify = config.pipeline.iter().find(|s| s.name == "notify").unwrap();
    assert_eq!(notify.constraints.status.include, vec!["changed"]);
}

#[test]
fn test_escalated_plugin_with_commands_fails() {
    let work = WorkBuilder::new()
        .trusted()
        .yaml("pipeline:\n  publish:\n    image: plugins/docker\n    commands: [docker ps]\n")
        .build();
    let err = compile(&work).unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
    assert!(err.to_string().contains("Custom commands disabled"));
}

#[test]
fn test_user_entrypoint_rejected() {
    let work = WorkBuilder::new()
        .trusted()
        .yaml("pipeline:\n  build:\n    image: golang\n    entrypoint: [/bin/bash]\n")
        .build();
    let err = compile(&work).unwrap_err();
    assert!(err.to_string().contains("Cannot set plugin Entrypoint"));
}

#[test]
fn test_invalid_yaml_reported() {
    let work = WorkBuilder::new().yaml("pipeline: [").build();
    assert!(matches!(compile(&work).unwrap_err(), AppError::YamlError(_)));
}

#[test]
fn test_user_detach_cannot_bypass_entrypoint_check() {
    let work = WorkBuilder::new()
        .yaml(
            r#"
pipeline:
  pwn:
    image: plugins/docker
    detach: true
    entrypoint: [/bin/sh, -c]
    command: ["id; mount"]
"#,
        )
        .build();
    let err = compile(&work).unwrap_err();

    assert!(matches!(err, AppError::YamlError(_)));
    assert!(err.to_string().contains("detach"));
}
