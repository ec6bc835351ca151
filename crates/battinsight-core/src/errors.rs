use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM credential is not configured")]
    MissingCredential,
    #[error("LLM request failed: {0}")]
    Upstream(String),
    #[error("LLM request exceeded {0:?}")]
    Timeout(Duration),
    #[error("LLM returned an empty response")]
    EmptyResponse,
    #[error("LLM response is not SQL: {0}")]
    NotSql(String),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The engine refused the statement (unknown column, type error, ...).
    #[error("statement rejected: {0}")]
    Rejected(String),
    #[error("statement exceeded {0:?}")]
    Timeout(Duration),
    #[error("storage failure: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Terminal outcome of a pipeline run that did not produce rows.
///
/// Only `Invalid` carries text meant for the client verbatim; every other
/// variant maps to a fixed message through [`PipelineError::public_message`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("query contains disallowed operations")]
    Disallowed,
    #[error("generation failed: {0}")]
    Generation(#[source] GenerationError),
    #[error("invalid sql ({code}): {reason}")]
    Invalid { code: String, reason: String },
    #[error("execution failed: {0}")]
    Execution(#[source] ExecutionError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::BadRequest(_)
            | PipelineError::Disallowed
            | PipelineError::Invalid { .. } => 400,
            PipelineError::Generation(GenerationError::MissingCredential) => 503,
            PipelineError::Generation(_) => 400,
            PipelineError::Execution(ExecutionError::Rejected(_)) => 400,
            PipelineError::Execution(_) | PipelineError::Internal(_) => 500,
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            PipelineError::BadRequest(msg) => msg.clone(),
            PipelineError::Disallowed => "Query contains disallowed operations".to_string(),
            PipelineError::Generation(GenerationError::MissingCredential) => {
                "AI query service is not configured".to_string()
            }
            PipelineError::Generation(_) => "Failed to generate SQL query".to_string(),
            PipelineError::Invalid { reason, .. } => reason.clone(),
            PipelineError::Execution(ExecutionError::Rejected(_)) => {
                "Failed to execute query".to_string()
            }
            PipelineError::Execution(_) | PipelineError::Internal(_) => {
                "Failed to process query".to_string()
            }
        }
    }
}
