pub mod compiler;
pub mod config;
pub mod connectors;
pub mod constraint;
pub mod executor;
pub mod pipeline;
pub mod secrets;
pub mod transform;
pub mod yaml_parser;

pub use compiler::Compiler;
pub use config::{Config, Step, Workspace};
pub use connectors::{ContainerState, DockerEngine, Engine, LogStream};
pub use constraint::{Constraint, ConstraintMap, Constraints};
pub use executor::{Agent, JobSink, LogSink};
pub use pipeline::{Event, Line, Pipeline, PipelineState};
pub use secrets::SecretReplacer;
