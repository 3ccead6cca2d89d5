use reqwest::StatusCode;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API request failed with {}: {}", status_code, message)]
    Api {
        status_code: StatusCode,
        message: String,
    },

    #[error("Invalid endpoint `{}`", endpoint)]
    BadEndpoint { endpoint: url::Url },

    #[error("Bad token: {}", token)]
    BadToken { token: String },

    #[error("Expected <dataset>.<table>, got: {}", reference)]
    BadTableReference { reference: String },

    #[error("Could not parse JSON response.")]
    BadJsonResponse(#[source] reqwest::Error),

    #[error("Failed to initialise the HTTP client")]
    BuildHttpClient(#[source] reqwest::Error),

    #[error("HTTP request error: {}", message)]
    ReqwestError {
        message: String,
        source: reqwest::Error,
    },

    #[error("Operation `{}` failed: {}", name, message)]
    OperationFailed { name: String, message: String },

    #[error("Timed out after {:?} waiting for operation `{}`", timeout, name)]
    PollTimeout { name: String, timeout: Duration },

    #[error("Cancelled while waiting for operation `{}`", name)]
    PollCancelled { name: String },
}

impl Error {
    /// Whether this error is scoped to a single catalog entity rather than
    /// being fatal for the whole run (credential or network failures).
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::OperationFailed { .. }
                | Error::PollTimeout { .. }
                | Error::BadTableReference { .. }
        )
    }
}
