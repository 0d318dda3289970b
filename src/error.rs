//! Error types for probes against the host, the container runtime and remote services

use std::{fmt, time::Duration};

/// Result type alias for a single probe
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors a single external call can end in.
///
/// These never abort a cycle. Samplers turn them into zeroed or unhealthy values
/// where they happen.
#[derive(Debug)]
pub enum ProbeError {
    /// The call did not finish within its bound
    Timeout { target: String, after: Duration },

    /// Non-zero exit, unexpected HTTP status, refused connection
    Failure(String),

    /// The process could not be started at all
    Spawn(std::io::Error),

    /// Output was produced but could not be understood
    Parse(String),
}

impl ProbeError {
    pub fn timeout(target: impl ToString, after: Duration) -> Self {
        ProbeError::Timeout {
            target: target.to_string(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout { target, after } => {
                write!(f, "{} timed out after {}ms", target, after.as_millis())
            }
            ProbeError::Failure(msg) => write!(f, "{}", msg),
            ProbeError::Spawn(err) => write!(f, "failed to start process: {}", err),
            ProbeError::Parse(msg) => write!(f, "unexpected output: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        ProbeError::Spawn(err)
    }
}

impl From<bollard::errors::Error> for ProbeError {
    fn from(err: bollard::errors::Error) -> Self {
        ProbeError::Failure(format!("docker engine: {err}"))
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Parse(err.to_string())
    }
}
