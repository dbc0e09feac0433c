//! Error types for the Webex notifier.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::WebexMessage;

/// Failure while building the effective configuration.
///
/// Always raised before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required setting was empty after merging every source.
    #[error("{key} must be specified via CLI, environment or .env")]
    MissingRequired { key: &'static str },
    /// A setting was present but could not be accepted.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Coarse classification of a [`SendError`], for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    InvalidInput,
    AttachmentUnreadable,
    NetworkError,
    Timeout,
    ApiError,
}

/// Failure of a single `send` call.
///
/// Variants raised after the first request carry `unit_index` (the failed
/// request's position in the plan) and `completed` (records of the requests
/// that succeeded before it).
#[derive(Debug, Error)]
pub enum SendError {
    /// Neither a message nor an attachment was supplied.
    #[error("either a message or at least one attachment must be provided")]
    InvalidInput,
    /// An attachment path is missing, not a regular file, or cannot be opened.
    #[error("attachment {} is unreadable: {reason}", path.display())]
    AttachmentUnreadable {
        path: PathBuf,
        reason: String,
        unit_index: Option<usize>,
        completed: Vec<WebexMessage>,
    },
    /// Connection, DNS, TLS or body transfer failure.
    #[error("network error on request {unit_index}: {message}")]
    Network {
        unit_index: usize,
        message: String,
        completed: Vec<WebexMessage>,
    },
    /// The request did not complete within the configured timeout.
    #[error("request {unit_index} timed out")]
    Timeout {
        unit_index: usize,
        completed: Vec<WebexMessage>,
    },
    /// Webex answered with a non-success status.
    #[error("webex api error {status} on request {unit_index}: {body}")]
    Api {
        unit_index: usize,
        status: StatusCode,
        body: String,
        completed: Vec<WebexMessage>,
    },
    /// Webex answered with a success status but the body was not a JSON object.
    #[error("failed to parse webex response for request {unit_index}: {reason}")]
    MalformedResponse {
        unit_index: usize,
        status: StatusCode,
        body: String,
        reason: String,
        completed: Vec<WebexMessage>,
    },
}

impl SendError {
    pub fn kind(&self) -> SendErrorKind {
        match self {
            Self::InvalidInput => SendErrorKind::InvalidInput,
            Self::AttachmentUnreadable { .. } => SendErrorKind::AttachmentUnreadable,
            Self::Network { .. } => SendErrorKind::NetworkError,
            Self::Timeout { .. } => SendErrorKind::Timeout,
            Self::Api { .. } | Self::MalformedResponse { .. } => SendErrorKind::ApiError,
        }
    }

    /// Plan position of the request that failed, if any request was attempted.
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            Self::InvalidInput => None,
            Self::AttachmentUnreadable { unit_index, .. } => *unit_index,
            Self::Network { unit_index, .. }
            | Self::Timeout { unit_index, .. }
            | Self::Api { unit_index, .. }
            | Self::MalformedResponse { unit_index, .. } => Some(*unit_index),
        }
    }

    /// Records of the requests that succeeded before the failure.
    pub fn completed(&self) -> &[WebexMessage] {
        match self {
            Self::InvalidInput => &[],
            Self::AttachmentUnreadable { completed, .. }
            | Self::Network { completed, .. }
            | Self::Timeout { completed, .. }
            | Self::Api { completed, .. }
            | Self::MalformedResponse { completed, .. } => completed,
        }
    }

    /// HTTP status returned by Webex, when a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Raw response body returned by Webex, when a response was received.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Api { body, .. } | Self::MalformedResponse { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True when no request reached Webex successfully.
    pub fn nothing_sent(&self) -> bool {
        self.completed().is_empty()
    }
}

#[derive(Debug, Error)]
/// Error type for client setup and helper operations.
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A send or attachment operation failed.
    #[error(transparent)]
    Send(#[from] SendError),
    /// Underlying HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Fetching a remote file failed.
    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
