//! Docker engine module
//!
//! Runs pipeline containers through the local Docker daemon.

pub mod connector;

pub use connector::DockerEngine;
