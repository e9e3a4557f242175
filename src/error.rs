use crate::llm::BackendError;
use crate::simulation::EngineError;
use thiserror::Error;

/// Failure of the language-model parsing path. Never reaches callers of
/// `ExerciseParser::parse`, which falls back to rule-based parsing instead.
#[derive(Error, Debug)]
pub enum ParseFailure {
    #[error("Could not extract JSON from model response")]
    NoJsonFound,

    #[error("Failed to parse model response as JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Language model backend failed: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to load exercise: {0}")]
    LoadFailure(String),

    #[error("Error running simulation: {0}")]
    SimulationFailure(#[source] EngineError),

    #[error("No exercise loaded")]
    NoActiveSession,

    #[error("Failed to save results to {path}: {reason}")]
    SaveFailure { path: String, reason: String },
}
