//! Pipeline failure kinds.
//!
//! Every operation reports failure through this closed enum with named
//! fields rather than a dynamic payload. Per-target failures inside a
//! manifest update report are data, not errors (see `manifest`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A service or environment is absent from the workflow configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pull request resolved to a different environment than requested.
    #[error("environment mismatch: {0}")]
    EnvironmentMismatch(String),

    /// One or more safety checks failed; every violation is reported.
    #[error("deployment blocked by safety checks: {}", reasons.join("; "))]
    SafetyViolation { reasons: Vec<String> },

    /// Deployment information could not be derived from a pull request.
    #[error("failed to extract deployment info: {0}")]
    Extraction(String),

    /// No matching target, label, or manifest file.
    #[error("{0}")]
    NotFound(String),

    /// The version-control gateway reported an error.
    #[error("vcs error: {0}")]
    Vcs(String),

    /// Failure writing to the injected output sink.
    #[error("output error: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Fold an unclassified gateway error into the vcs failure shape,
    /// preserving the underlying message.
    pub fn vcs(err: anyhow::Error) -> Self {
        PipelineError::Vcs(format!("{err:#}"))
    }

    /// Fold a sink write error into the output failure shape.
    pub fn output(err: anyhow::Error) -> Self {
        PipelineError::Output(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
