//! Error types for the platform gateway, notification channels and the
//! AgentBook pundit.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single call to the Baozi REST API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// Network failure or timeout.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    /// The response body was not the JSON shape we expect.
    #[error("failed to decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Failure to deliver one alert through a notification channel.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{channel} request failed: {source}")]
    Transport {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{channel} send failed ({status}): {body}")]
    Rejected {
        channel: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("invalid webhook header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Failure to publish one pundit post or comment.
#[derive(Error, Debug)]
pub enum PunditError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("invalid comment header {name}: {reason}")]
    Header { name: &'static str, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}
