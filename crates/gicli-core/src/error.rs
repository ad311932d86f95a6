// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the orchestration kernel.
//!
//! Each variant maps to one failure policy: fatal at startup, fatal to the
//! current job, or logged-and-continue. The policy is applied by the caller;
//! the variant only identifies the kind.

use thiserror::Error;

/// Result type using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failures raised by the orchestration kernel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The configuration document failed validation.
    #[error("configuration invalid: {}", issues.join("; "))]
    ConfigurationInvalid { issues: Vec<String> },

    /// One or more dependency references do not name a job.
    #[error("unresolved dependency references: {}", references.join(", "))]
    DependencyMissing { references: Vec<String> },

    /// The dependency graph reachable from the target contains a cycle.
    #[error("dependency cycle detected at job '{job_id}'")]
    DependencyCycle { job_id: String },

    /// The targeted job does not exist in any origin.
    #[error("job '{job_id}' not found in any origin")]
    JobNotFound { job_id: String },

    /// A job is already executing under the same origin/job key.
    #[error("job '{key}' is already running")]
    JobAlreadyRunning { key: String },

    /// A request failed after exhausting its retry policy, or with a
    /// non-retryable status.
    #[error("HTTP {code} {reason}", code = .status.map_or_else(|| "transport".to_string(), |s| s.to_string()))]
    HttpTransport { status: Option<u16>, reason: String },

    /// The login response did not yield a token at the declared path.
    #[error("token extraction failed for auth job '{job_id}': {reason}")]
    AuthTokenExtraction { job_id: String, reason: String },

    /// A sink could not deliver the response payload.
    #[error("sink failure: {reason}")]
    SinkFailure { reason: String },

    /// The database sink could not open a connection.
    #[error("database connection failed: {reason}")]
    DatabaseConnection { reason: String },

    /// A database statement failed.
    #[error("database error during '{operation}': {details}")]
    Database { operation: String, details: String },

    /// ENC-string encryption or decryption failed.
    #[error("crypto error: {reason}")]
    Crypto { reason: String },

    /// The run was cancelled before the next job started.
    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether a transport error should trigger the executor's single
    /// silent re-authentication.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            CoreError::HttpTransport { status, reason } => {
                *status == Some(401) || reason.contains("HTTP 401")
            }
            _ => false,
        }
    }
}
