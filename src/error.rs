use reqwest::{Method, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenQAError {
    /// The caller violated a precondition; no request was sent.
    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The server could not be reached, even after retrying.
    #[error("Connection failed: {0}")]
    Connection(#[source] reqwest::Error),

    /// The server answered with a non-success status, even after retrying.
    #[error("Request failed: {method} {url} returned {status}")]
    Request {
        method: Method,
        url: String,
        status: StatusCode,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Expected a response body from {url}, got none")]
    EmptyResponse { url: String },

    #[error("Clone chain loops back to job {0}")]
    CloneCycle(u64),

    #[error("Waited too long! Unfinished jobs: {unfinished:?}")]
    WaitTimeout { unfinished: Vec<u64> },
}

impl OpenQAError {
    /// Whether the retry loop may try the request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Request { .. })
    }
}

pub type Result<T> = std::result::Result<T, OpenQAError>;
