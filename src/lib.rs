//! RustCI agent
//!
//! Compiles pipeline definitions into sandboxed container plans and drives
//! them step by step against a container engine.

pub mod ci;
pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use ci::{Agent, Compiler, Engine, JobSink, Line, LogSink, Pipeline};
pub use config::AgentConfig;
pub use error::{AppError, Result};
pub use models::{Secret, Work};
