pub mod data_asset;
pub mod data_product;
pub mod operation;

use crate::error::Error;
use reqwest::StatusCode;
use serde::Deserialize;

/// Standard error envelope returned by the catalog API on non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Build an `Error::Api` from a non-success response body, falling back to
/// the raw body when it does not match the error envelope.
pub(crate) fn api_error(status_code: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|response| {
            let ErrorBody { message, status } = response.error;
            match (message, status) {
                (Some(message), Some(status)) => Some(format!("{status}: {message}")),
                (Some(message), None) => Some(message),
                (None, Some(status)) => Some(status),
                (None, None) => None,
            }
        })
        .unwrap_or_else(|| body.trim().to_owned());
    Error::Api {
        status_code,
        message,
    }
}
