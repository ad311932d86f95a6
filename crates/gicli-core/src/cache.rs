// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-invocation result cache.
//!
//! Keyed by job id and scoped to a single orchestrator run. Template-path
//! placeholders (`{{jobId.field}}`) resolve against the `data` of entries
//! stored here; downstream jobs always observe their prerequisites' entries
//! because execution is strictly sequential.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Outcome of one executed job.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobResult {
    Auth {
        authenticated: bool,
        timestamp: DateTime<Utc>,
    },
    Request {
        data: Value,
        headers: HashMap<String, String>,
        status: u16,
        timestamp: DateTime<Utc>,
    },
}

impl JobResult {
    /// Response payload, for template-path navigation. Auth entries carry
    /// none.
    pub fn data(&self) -> Option<&Value> {
        match self {
            JobResult::Auth { .. } => None,
            JobResult::Request { data, .. } => Some(data),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            JobResult::Auth { .. } => None,
            JobResult::Request { status, .. } => Some(*status),
        }
    }

    /// JSON rendering used for the session-store mirror.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Map of already-executed job results, scoped to one run.
#[derive(Debug, Default)]
pub struct InvocationCache {
    entries: Mutex<HashMap<String, JobResult>>,
}

impl InvocationCache {
    pub fn new() -> Self {
        InvocationCache::default()
    }

    pub fn insert(&self, job_id: &str, result: JobResult) {
        self.entries
            .lock()
            .expect("invocation cache lock poisoned")
            .insert(job_id.to_string(), result);
    }

    pub fn get(&self, job_id: &str) -> Option<JobResult> {
        self.entries
            .lock()
            .expect("invocation cache lock poisoned")
            .get(job_id)
            .cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries
            .lock()
            .expect("invocation cache lock poisoned")
            .contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_entries_expose_data_and_status() {
        let cache = InvocationCache::new();
        cache.insert(
            "fetch",
            JobResult::Request {
                data: json!({ "items": [1, 2] }),
                headers: HashMap::new(),
                status: 200,
                timestamp: Utc::now(),
            },
        );

        let entry = cache.get("fetch").unwrap();
        assert_eq!(entry.data(), Some(&json!({ "items": [1, 2] })));
        assert_eq!(entry.status(), Some(200));
        assert!(cache.contains("fetch"));
        assert!(!cache.contains("other"));
    }

    #[test]
    fn auth_entries_have_no_data() {
        let entry = JobResult::Auth {
            authenticated: true,
            timestamp: Utc::now(),
        };
        assert!(entry.data().is_none());
        assert!(entry.status().is_none());

        let value = entry.to_value();
        assert_eq!(value["authenticated"], json!(true));
    }

    #[test]
    fn to_value_serializes_request_fields() {
        let entry = JobResult::Request {
            data: json!([1]),
            headers: HashMap::from([("x-req".to_string(), "1".to_string())]),
            status: 201,
            timestamp: Utc::now(),
        };
        let value = entry.to_value();
        assert_eq!(value["status"], json!(201));
        assert_eq!(value["data"], json!([1]));
        assert_eq!(value["headers"]["x-req"], json!("1"));
    }
}
