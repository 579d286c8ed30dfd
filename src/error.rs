#![allow(non_shorthand_field_patterns)]
#![doc = "Error handling primitives shared across the stats card crate."]
// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The derive emitted by [`masterror::Error`] expands pattern matches that
//! trigger the `non_shorthand_field_patterns` lint. The lint is disabled for
//! the module to keep the generated implementations warning-free.
//!
//! Variants are grouped by who can recover from them. Configuration, template
//! and file system failures abort the run. Data-source failures
//! ([`Error::is_data_source`]) may be absorbed by the cache or fallback
//! values, and only [`Error::Transient`] is ever retried.

use std::path::{Path, PathBuf};

use crate::retry::Retryable;

/// Unified error type returned by every stage of a card refresh.
#[derive(Debug, masterror::Error)]
pub enum Error {
    /// A required setting is missing or malformed.
    #[error("invalid configuration: {message}")]
    Config {
        /// Human readable description of the configuration problem.
        message: String
    },
    /// Wraps YAML decoding errors from the card document.
    #[error("failed to parse card configuration: {source}")]
    ConfigParse {
        /// Source decoding error from serde_yaml.
        source: serde_yaml::Error
    },
    /// The credential was rejected by GitHub.
    #[error("authentication failed: {message}")]
    Unauthorized {
        /// Message reported by the API.
        message: String
    },
    /// A user, repository or template file does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String
    },
    /// GitHub reported that the request quota is exhausted.
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        /// Message reported by the API.
        message: String
    },
    /// Network level failure that is worth retrying.
    #[error("transient network failure: {message}")]
    Transient {
        /// Description of the failure.
        message: String
    },
    /// Any other failure reported by, or while talking to, GitHub.
    #[error("service error: {message}")]
    Service {
        /// Human readable message describing the service error.
        message: String
    },
    /// Wraps I/O errors on the template, backup or cache files.
    #[error("I/O failure at {path:?}: {source}")]
    Io {
        /// Location of the file being processed.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error
    },
    /// Wraps JSON encoding and decoding errors.
    #[error("failed to serialize data: {source}")]
    Serialize {
        /// Underlying serialization error.
        source: serde_json::Error
    }
}

impl Error {
    /// Constructs a configuration error from the provided displayable value.
    pub fn config<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Config {
            message: message.into()
        }
    }

    /// Constructs a service error from the provided displayable value.
    pub fn service<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Service {
            message: message.into()
        }
    }

    /// Constructs a retryable network error.
    pub fn transient<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Transient {
            message: message.into()
        }
    }

    /// Constructs a not-found error describing the missing resource.
    pub fn not_found<M>(what: M) -> Self
    where
        M: Into<String>
    {
        Self::NotFound {
            what: what.into()
        }
    }

    /// Returns `true` when the error originated from the GitHub data source.
    ///
    /// Only these errors may be replaced by cached or fallback statistics.
    pub fn is_data_source(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::NotFound { .. }
                | Self::RateLimited { .. }
                | Self::Transient { .. }
                | Self::Service { .. }
        )
    }

    /// Formats the error for diagnostics without the variant name.
    pub fn to_display_string(&self) -> String {
        format!("{self}")
    }
}

impl Retryable for Error {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::ConfigParse {
            source
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize {
            source
        }
    }
}

impl From<octocrab::Error> for Error {
    fn from(error: octocrab::Error) -> Self {
        match error {
            octocrab::Error::GitHub {
                source, ..
            } => classify_status(source.status_code.as_u16(), &source.message),
            octocrab::Error::Serde {
                source, ..
            } => Self::service(format!("unexpected response shape: {source}")),
            octocrab::Error::Json {
                source, ..
            } => Self::service(format!("unexpected response shape: {source}")),
            other => Self::transient(other.to_string())
        }
    }
}

/// Maps an HTTP status reported by GitHub onto the error taxonomy.
///
/// GitHub signals primary rate limits with `403` and secondary ones with
/// `429`; both carry "rate limit" in the message body.
pub fn classify_status(status: u16, message: &str) -> Error {
    let lowered = message.to_ascii_lowercase();
    match status {
        401 => Error::Unauthorized {
            message: message.to_owned()
        },
        404 => Error::not_found(message.to_owned()),
        403 | 429 if lowered.contains("rate limit") => Error::RateLimited {
            message: message.to_owned()
        },
        429 => Error::RateLimited {
            message: message.to_owned()
        },
        500..=599 => Error::transient(format!("HTTP {status}: {message}")),
        _ => Error::service(format!("HTTP {status}: {message}"))
    }
}

/// Creates an [`Error::Io`] variant capturing the failing path and source.
///
/// # Parameters
///
/// * `path` - Location of the file that triggered the error.
/// * `source` - I/O error reported by the operating system.
pub fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source
    }
}
