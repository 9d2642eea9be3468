//! Compiler passes
//!
//! Each pass rewrites a partially compiled [`Config`] in place. Passes are
//! independent of one another; the [`Compiler`](crate::ci::compiler::Compiler)
//! decides their order.

use crate::ci::config::Config;
use crate::error::Result;

pub mod clone;
pub mod command;
pub mod environ;
pub mod filter;
pub mod identifier;
pub mod image;
pub mod plugin;
pub mod pod;
pub mod secret;
pub mod validate;
pub mod workspace;

pub use clone::CloneStep;
pub use command::CommandTransform;
pub use environ::Environ;
pub use filter::{ChangeFilter, ChangePolicy, DefaultFilter, StatusChangePolicy};
pub use identifier::Identifier;
pub use image::{ImageEscalate, ImageName, ImageNamespace, ImagePull, ImageTag};
pub use plugin::{ImageVolume, PluginDisable, PluginParams};
pub use pod::Pod;
pub use secret::ImageSecrets;
pub use validate::Check;
pub use workspace::WorkspaceTransform;

/// A single compiler pass.
pub trait Transform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, config: &mut Config) -> Result<()>;
}
