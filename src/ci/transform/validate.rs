use super::Transform;
use crate::ci::config::{Config, Step};
use crate::error::{AppError, Result};

/// Rejects definitions that reach outside the sandbox.
///
/// Plugin control flow is reserved to the compiler, and untrusted repositories
/// may not touch host-level container options.
pub struct Check {
    trusted: bool,
}

impl Check {
    pub fn new(trusted: bool) -> Self {
        Self { trusted }
    }
}

impl Transform for Check {
    fn name(&self) -> &'static str {
        "check"
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        for step in config.pipeline.iter() {
            check_entrypoint(step)?;
        }

        if self.trusted {
            return Ok(());
        }
        for step in config.all_steps() {
            check_trusted(step)?;
        }
        Ok(())
    }
}

fn check_entrypoint(step: &Step) -> Result<()> {
    if step.detached {
        return Ok(());
    }
    if !step.entrypoint.is_empty() {
        return Err(invalid(step, "Cannot set plugin Entrypoint"));
    }
    if !step.command.is_empty() {
        return Err(invalid(step, "Cannot set plugin Command"));
    }
    Ok(())
}

fn check_trusted(step: &Step) -> Result<()> {
    let denied = [
        (step.privileged, "Insufficient privileges to use privileged mode"),
        (step.shm_size != 0, "Insufficient privileges to override shm_size"),
        (!step.dns.is_empty(), "Insufficient privileges to use custom dns"),
        (!step.dns_search.is_empty(), "Insufficient privileges to use custom dns_search"),
        (!step.devices.is_empty(), "Insufficient privileges to use devices"),
        (!step.extra_hosts.is_empty(), "Insufficient privileges to use extra_hosts"),
        (!step.network.is_empty(), "Insufficient privileges to override the network"),
        (step.oom_kill_disable, "Insufficient privileges to disable oom_kill"),
        (!step.volumes.is_empty(), "Insufficient privileges to use volumes"),
        (!step.volumes_from.is_empty(), "Insufficient privileges to use volumes_from"),
    ];

    match denied.iter().find(|(violated, _)| *violated) {
        Some((_, message)) => Err(invalid(step, message)),
        None => Ok(()),
    }
}

fn invalid(step: &Step, message: &str) -> AppError {
    AppError::ValidationError(format!("{}: {}", step.name, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(step: Step) -> Config {
        Config {
            pipeline: vec![step],
            ..Default::default()
        }
    }

    fn rejection(trusted: bool, step: Step) -> Option<String> {
        Check::new(trusted)
            .apply(&mut config_with(step))
            .err()
            .map(|e| e.to_string())
    }

    #[test]
    fn test_entrypoint_and_command_rejected() {
        let mut step = Step::new("build", "golang");
        step.entrypoint = vec!["/bin/bash".to_string()];
        let msg = rejection(true, step).unwrap();
        assert!(msg.contains("Cannot set plugin Entrypoint"));

        let mut step = Step::new("build", "golang");
        step.command = vec!["make".to_string()];
        let msg = rejection(true, step).unwrap();
        assert!(msg.contains("Cannot set plugin Command"));
    }

    #[test]
    fn test_detached_step_may_set_entrypoint() {
        let mut step = Step::new("ambassador", "busybox");
        step.detached = true;
        step.entrypoint = vec!["/bin/sleep".to_string()];
        assert!(rejection(true, step).is_none());
    }

    fn case(needle: &'static str, mutate: fn(&mut Step)) -> (&'static str, fn(&mut Step)) {
        (needle, mutate)
    }

    #[test]
    fn test_untrusted_options_rejected_with_distinct_messages() {
        let cases = vec![
            case("privileged mode", |s| s.privileged = true),
            case("shm_size", |s| s.shm_size = 1024),
            case("custom dns", |s| s.dns = vec!["8.8.8.8".to_string()]),
            case("dns_search", |s| s.dns_search = vec!["example.com".to_string()]),
            case("devices", |s| s.devices = vec!["/dev/fuse".to_string()]),
            case("extra_hosts", |s| s.extra_hosts = vec!["db:10.0.0.1".to_string()]),
            case("the network", |s| s.network = "host".to_string()),
            case("oom_kill", |s| s.oom_kill_disable = true),
            case("use volumes", |s| s.volumes = vec!["/etc:/etc".to_string()]),
            case("volumes_from", |s| s.volumes_from = vec!["other".to_string()]),
        ];

        let mut messages = Vec::new();
        for (needle, mutate) in cases {
            let mut step = Step::new("build", "golang");
            mutate(&mut step);

            let msg = rejection(false, step.clone()).unwrap();
            assert!(msg.contains(needle), "{} not in {}", needle, msg);
            assert!(rejection(true, step).is_none());
            messages.push(msg);
        }

        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 10);
    }

    #[test]
    fn test_untrusted_services_checked() {
        let mut service = Step::new("database", "mysql");
        service.privileged = true;
        let mut config = Config {
            services: vec![service],
            ..Default::default()
        };
        assert!(Check::new(false).apply(&mut config).is_err());
    }
}
