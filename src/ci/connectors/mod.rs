//! Container engines
//!
//! The pipeline driver only talks to the [`Engine`] trait. Docker is the
//! bundled implementation; tests and other runtimes plug in their own.

pub mod docker;
pub mod traits;

pub use docker::DockerEngine;
pub use traits::{ContainerState, Engine, LogStream};
