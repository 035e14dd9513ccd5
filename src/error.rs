//! Error taxonomy for fetching, parsing, persisting and configuring.
//!
//! The pipeline reacts differently to each class:
//!
//! - [`FetchError`]: degrade to the next tier or skip the sub-source.
//! - [`ParseError`]: skip the single malformed item and keep the batch.
//! - [`PersistenceError`]: abort the run; the previous file is untouched
//!   because the atomic swap never happened.
//! - [`ConfigError`]: refuse to start.

use std::path::PathBuf;
use thiserror::Error;

/// Network or status failure while talking to an upstream source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed payload from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("every tier failed or came back empty for {target}")]
    Exhausted { target: String },
}

impl FetchError {
    /// True for HTTP 429 responses.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Status { status: 429, .. })
    }
}

/// A single item or document could not be understood.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("xml: {0}")]
    Xml(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid identifier `{0}`")]
    InvalidId(String),

    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("no content container found")]
    NoContent,
}

/// Failure reading or atomically replacing a persisted file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection() {
        let e = FetchError::Status {
            url: "https://example.com".into(),
            status: 429,
        };
        assert!(e.is_rate_limited());

        let e = FetchError::Status {
            url: "https://example.com".into(),
            status: 503,
        };
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn persistence_error_names_the_path() {
        let e = PersistenceError::io(
            "/tmp/x/posts.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = e.to_string();
        assert!(msg.contains("/tmp/x/posts.json"));
        assert!(msg.contains("denied"));
    }
}
