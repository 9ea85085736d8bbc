//! Lifecycle errors. Only failures that leave no usable instance end up here;
//! import and stop failures are logged instead.

use std::time::Duration;

use crate::docker::RuntimeError;

#[derive(thiserror::Error, Debug)]
pub enum DevServiceError {
    #[error("Microcks dev service '{service}' failed to start: {source}")]
    StartFailed {
        service: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Microcks dev service '{service}' did not start within {timeout:?}")]
    StartTimeout { service: String, timeout: Duration },

    #[error("Microcks dev service '{service}' does not publish its {protocol} port")]
    MissingPort { service: String, protocol: &'static str },
}

impl DevServiceError {
    pub(crate) fn from_runtime(service: &str, err: RuntimeError) -> Self {
        match err {
            RuntimeError::Timeout { timeout } => Self::StartTimeout {
                service: service.to_string(),
                timeout,
            },
            other => Self::StartFailed {
                service: service.to_string(),
                source: other,
            },
        }
    }

    /// Machine readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::StartFailed { .. } => "START_FAILED",
            Self::StartTimeout { .. } => "START_TIMEOUT",
            Self::MissingPort { .. } => "MISSING_PORT",
        }
    }
}
