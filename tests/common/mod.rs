#![allow(dead_code)]

// Shared fixtures for the integration tests
pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;

use std::time::Duration;

use rustci_agent::AgentConfig;

/// Agent configuration with a short inactivity timeout.
pub fn test_config() -> AgentConfig {
    AgentConfig {
        timeout: Duration::from_secs(30),
        ..AgentConfig::default()
    }
}
