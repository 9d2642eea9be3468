use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("YAML error: {0}")]
    YamlError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("{name} : exit code {code}")]
    ExitError { name: String, code: i32 },

    #[error("{name} : received oom kill")]
    OomKilled { name: String },

    #[error("termination request received, build cancelled")]
    Cancelled,

    #[error("maximum time limit exceeded, build cancelled")]
    TimeoutExceeded,

    #[error("terminal inactive for {timeout:?}, build cancelled")]
    Inactive { timeout: Duration },

    #[error("pipeline terminated")]
    Terminated,

    #[error("IO error: {0}")]
    IoError(String),
}

impl AppError {
    /// Process exit code carried by the error, if the failure came from a
    /// container that exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            AppError::ExitError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ConfigError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::YamlError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
