// ================================================================
// File: figurine-common/src/error.rs
// ================================================================

use thiserror::Error;

use crate::models::joint::JointId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Motion controller is already running")]
    AlreadyRunning,

    #[error("Joint '{0}' did not attach within the configured timeout")]
    AttachmentTimeout(JointId),

    /// A single failed command to a joint. The tick loop logs these and carries on.
    #[error("Driver error on joint '{joint}': {message}")]
    Driver { joint: JointId, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error at '{path}': {message}")]
    Config { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Motion controller task is no longer running")]
    ControllerGone,
}

impl Error {
    pub fn driver(joint: JointId, message: impl Into<String>) -> Self {
        Error::Driver {
            joint,
            message: message.into(),
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for Error {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        Error::Config {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        }
    }
}
