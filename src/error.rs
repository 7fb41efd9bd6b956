// src/error.rs
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::rcon::RconError;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Server '{0}' not found.")]
    NotFound(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Properties(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("Command failed with exit code {code}: {} {arg}", .script.display())]
    CommandExecution {
        script: PathBuf,
        arg: String,
        code: i32,
        stderr: String,
    },

    #[error("Command timed out after {timeout:?}: {} {arg}", .script.display())]
    CommandTimeout {
        script: PathBuf,
        arg: String,
        timeout: Duration,
        stderr: String,
    },

    #[error("Failed to connect to RCON on '{name}': {source}")]
    RconConnection {
        name: String,
        #[source]
        source: RconError,
    },
}

impl FleetError {
    /// Whether the Display text can be shown to an end user as-is. Script
    /// failures carry stderr and host paths, so they are for operators only.
    pub fn is_user_safe(&self) -> bool {
        !matches!(
            self,
            Self::CommandExecution { .. } | Self::CommandTimeout { .. }
        )
    }

    pub fn user_message(&self) -> String {
        if self.is_user_safe() {
            self.to_string()
        } else {
            "The server script failed to execute. Check the logs for details.".to_string()
        }
    }

    /// Captured stderr of a failed or timed out lifecycle script.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandExecution { stderr, .. } | Self::CommandTimeout { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

pub type Result<T, E = FleetError> = std::result::Result<T, E>;
