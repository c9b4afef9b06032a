use thiserror::Error;

use crate::conflict::ConflictReport;

#[derive(Debug, Error)]
pub enum TuyauError {
    // Variable errors
    #[error("Variable '{variable}' has no default value and was read before being written")]
    NoDefault { variable: String },

    // Step errors
    #[error("Step failed: {step}: {message}")]
    StepFailed { step: String, message: String },

    #[error("Step panicked: {step}: {message}")]
    StepPanicked { step: String, message: String },

    // Node errors
    #[error("One or more conditions are not met for node '{node}': {}", failed.join(", "))]
    ConditionFailed { node: String, failed: Vec<String> },

    #[error("Condition panicked on node '{node}': {message}")]
    ConditionPanicked { node: String, message: String },

    // Build errors
    #[error("The following node is part of a cycle, which is not allowed: {node}")]
    Cycle { node: String },

    #[error("Input/output conflict between parallel nodes:\n{0}")]
    IoConflict(ConflictReport),

    #[error("Node not found in pipeline: {0}")]
    UnknownNode(String),

    #[error("Pipeline was already executed; nodes cannot be reset")]
    AlreadyExecuted,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TuyauError {
    /// Shorthand for a step failure with a formatted message.
    pub fn step(step: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error is raised while assembling a graph rather than while running it.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. } | Self::IoConflict(_) | Self::UnknownNode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TuyauError>;
