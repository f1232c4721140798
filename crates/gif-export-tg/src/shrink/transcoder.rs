use super::ParameterSet;
use async_trait::async_trait;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Everything the transcoder needs to produce a single attempt's output
#[derive(Debug, Clone, Copy)]
pub struct TranscodeJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub params: ParameterSet,
}

/// External tool that re-encodes the input with the given parameters.
///
/// Implementations must not leave any processes running once the returned
/// future is dropped. The re-encoder relies on that to enforce timeouts
/// and cancellation.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, job: &TranscodeJob<'_>) -> Result<(), TranscodeError>;
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to spawn the transcoder `{program}`")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("The transcoder failed with status {status}:\n{stderr}")]
    Status { status: ExitStatus, stderr: String },

    #[error("The transcoder rejected the input as malformed or unreadable:\n{stderr}")]
    InvalidInput { stderr: String },

    #[error("The transcoder reported success, but didn't produce the output file")]
    MissingOutput { source: std::io::Error },

    #[error("The transcoder didn't finish in {timeout:.2?}")]
    TimedOut { timeout: Duration },
}

impl TranscodeError {
    /// Fatal errors mean that no other parameter set would succeed either,
    /// so there is no point in trying the rest of the schedule.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}
