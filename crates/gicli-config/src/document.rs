// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! serde types for the group configuration document.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "group": "erp-sync",
//!   "origins": [
//!     { "name": "erp", "base_url": "https://erp.example.com",
//!       "connection_string": "ENC:...",
//!       "job": [ { "id": "login", "type": "auth", ... } ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A named collection of origins loaded from a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier, unique per document.
    pub group: String,

    /// Remote services this group integrates with.
    #[serde(default)]
    pub origins: Vec<Origin>,
}

impl Group {
    /// Find a job by id across all origins, returning the owning origin too.
    pub fn find_job(&self, job_id: &str) -> Option<(&Origin, &Job)> {
        self.origins.iter().find_map(|origin| {
            origin
                .jobs
                .iter()
                .find(|job| job.id == job_id)
                .map(|job| (origin, job))
        })
    }
}

/// A configured remote service: base URL, optional default database
/// connection for downstream sinks, and an ordered list of jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    pub name: String,

    pub base_url: String,

    /// Default connection string for database sinks; a job-level
    /// `output.connection_string` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Jobs declared for this origin. Job ids are unique within an origin.
    #[serde(rename = "job", default)]
    pub jobs: Vec<Job>,
}

impl Origin {
    pub fn job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    /// The auth job that issues tokens for the given session name, if any.
    pub fn auth_job_for_session(&self, session_name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| {
            job.job_type == JobType::Auth && job.session_name.as_deref() == Some(session_name)
        })
    }
}

/// What a job does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Issue a login request and store the resulting token.
    Auth,
    /// Issue a REST call and optionally route the response to a sink.
    #[default]
    Request,
}

/// Deployment mode a job is declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Production,
    Test,
}

/// Expected response body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
    Text,
}

/// Retry behaviour for the HTTP request of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt. Zero means exactly one
    /// attempt.
    #[serde(default)]
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 0,
            delay: default_retry_delay(),
        }
    }
}

fn default_retry_delay() -> u64 {
    1000
}

/// How the issued token is attached to dependent requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOptions {
    /// Authorization scheme, e.g. "Bearer" (default) or "Token".
    #[serde(rename = "type", default = "default_auth_scheme")]
    pub scheme: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        AuthOptions {
            scheme: default_auth_scheme(),
        }
    }
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

/// A declarative unit of work: a login (`auth`) or a REST call (`request`),
/// optionally routed to a sink, with declared prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier, unique within its origin.
    pub id: String,

    #[serde(rename = "type", default)]
    pub job_type: JobType,

    #[serde(default)]
    pub mode: JobMode,

    /// HTTP verb for the request.
    #[serde(default = "default_method")]
    pub method: String,

    /// Path appended to the origin's `base_url`.
    #[serde(default)]
    pub path: String,

    /// Request headers; values may contain placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,

    /// Query parameters; values may contain placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Request body; may contain placeholders at any depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Per-attempt timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,

    /// Ids of jobs in the same origin that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// For auth jobs: where the issued token is stored. For request jobs:
    /// which stored token to attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// Dotted path into the login response locating the token string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_identifier: Option<String>,

    /// Dotted path into the login response locating the token lifetime in
    /// seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiration_identifier: Option<String>,

    /// Static token lifetime fallback, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiration_time: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthOptions>,

    #[serde(default)]
    pub response_format: ResponseFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Job {
    /// Authorization scheme for token injection, defaulting to "Bearer".
    pub fn auth_scheme(&self) -> &str {
        self.auth.as_ref().map(|a| a.scheme.as_str()).unwrap_or("Bearer")
    }
}

/// Sink destination kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    File,
    Database,
}

/// Where a request job's response is routed after success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(rename = "type")]
    pub kind: OutputKind,

    // --- file sink ---
    /// Target directory for the file sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Templated file name; `$JOBID` and `$TS` are expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Explicit serialization format, or "auto" to infer from Content-Type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default)]
    pub overwrite: bool,

    // --- database sink ---
    /// Driver selector; only "mssql" is supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Dotted path into the response locating the array of rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,

    /// Explicit response-field → column projection. Empty means "use the
    /// record's own fields".
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    #[serde(default)]
    pub clear_before_insert: bool,

    /// Overrides the origin-level connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_group_document() {
        let doc = json!({
            "group": "demo",
            "origins": [{
                "name": "api",
                "base_url": "https://api.example.com",
                "job": [
                    { "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                      "session_name": "SESSION_API", "token_identifier": "access_token" },
                    { "id": "fetch", "path": "/data", "dependencies": ["login"],
                      "session_name": "SESSION_API" }
                ]
            }]
        });

        let group: Group = serde_json::from_value(doc).unwrap();
        assert_eq!(group.group, "demo");
        assert_eq!(group.origins.len(), 1);

        let origin = &group.origins[0];
        assert_eq!(origin.jobs.len(), 2);
        assert_eq!(origin.jobs[0].job_type, JobType::Auth);
        assert_eq!(origin.jobs[1].job_type, JobType::Request);
        assert_eq!(origin.jobs[1].method, "GET");
        assert_eq!(origin.jobs[1].dependencies, vec!["login".to_string()]);
        assert_eq!(origin.jobs[1].response_format, ResponseFormat::Json);
    }

    #[test]
    fn parses_database_output() {
        let doc = json!({
            "enabled": true,
            "type": "database",
            "table": "customers",
            "data_path": "data.items",
            "clear_before_insert": true
        });

        let output: Output = serde_json::from_value(doc).unwrap();
        assert_eq!(output.kind, OutputKind::Database);
        assert_eq!(output.table.as_deref(), Some("customers"));
        assert!(output.clear_before_insert);
        assert!(output.columns.is_empty());
        assert!(!output.overwrite);
    }

    #[test]
    fn output_enabled_defaults_to_true() {
        let output: Output =
            serde_json::from_value(json!({ "type": "file", "path": "./out" })).unwrap();
        assert!(output.enabled);
    }

    #[test]
    fn find_job_scans_all_origins() {
        let group: Group = serde_json::from_value(json!({
            "group": "g",
            "origins": [
                { "name": "a", "base_url": "http://a", "job": [{ "id": "one" }] },
                { "name": "b", "base_url": "http://b", "job": [{ "id": "two" }] }
            ]
        }))
        .unwrap();

        let (origin, job) = group.find_job("two").unwrap();
        assert_eq!(origin.name, "b");
        assert_eq!(job.id, "two");
        assert!(group.find_job("missing").is_none());
    }

    #[test]
    fn auth_scheme_defaults_to_bearer() {
        let job: Job = serde_json::from_value(json!({ "id": "j" })).unwrap();
        assert_eq!(job.auth_scheme(), "Bearer");

        let job: Job =
            serde_json::from_value(json!({ "id": "j", "auth": { "type": "Token" } })).unwrap();
        assert_eq!(job.auth_scheme(), "Token");
    }
}
