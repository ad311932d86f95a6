// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Top-level run loop.
//!
//! Loads a validated group, resolves the execution order for the targeted
//! job, and walks it sequentially through the executor. The first hard
//! failure stops the run; downstream jobs are not attempted. A cooperative
//! cancellation token is honoured between jobs.

use std::sync::Arc;

use gicli_config::{Group, validate_group};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::cache::{InvocationCache, JobResult};
use crate::crypto::SecretBox;
use crate::error::CoreError;
use crate::executor::{ExecutionOverrides, JobExecutor};
use crate::http::HttpClient;
use crate::resolver::resolve_order;
use crate::session::SessionStore;

/// Options for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Id of the job to execute, with its transitive prerequisites.
    pub target_job: String,
    /// Replaces the target job's payload wholesale before substitution.
    pub payload_override: Option<Value>,
    /// Replaces the target job's params wholesale before substitution.
    pub params_override: Option<Value>,
    /// Checked between jobs; a cancelled run returns `CoreError::Cancelled`.
    pub cancellation: CancellationToken,
}

impl RunOptions {
    pub fn new(target_job: impl Into<String>) -> Self {
        RunOptions {
            target_job: target_job.into(),
            payload_override: None,
            params_override: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub group: String,
    pub origin: String,
    pub target_job: String,
    /// Job ids in execution order.
    pub executed: Vec<String>,
    /// The target job's published result.
    pub target_result: Option<JobResult>,
}

/// Owns the shared components and drives runs to completion.
pub struct Orchestrator {
    session: Arc<SessionStore>,
    http: Arc<HttpClient>,
    auth: Arc<Authenticator>,
    secrets: Option<Arc<SecretBox>>,
}

impl Orchestrator {
    pub fn new(secrets: Option<SecretBox>) -> Self {
        let session = Arc::new(SessionStore::new());
        let http = Arc::new(HttpClient::new());
        let auth = Arc::new(Authenticator::new(session.clone(), http.clone()));
        Orchestrator {
            session,
            http,
            auth,
            secrets: secrets.map(Arc::new),
        }
    }

    /// The shared session store, e.g. for wiring the background sweep.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Execute the target job and its prerequisites from `group`.
    pub async fn run(&self, group: &Group, options: &RunOptions) -> Result<RunReport, CoreError> {
        let issues = validate_group(group);
        if !issues.is_empty() {
            return Err(CoreError::ConfigurationInvalid {
                issues: issues.iter().map(ToString::to_string).collect(),
            });
        }

        let (origin, _job) =
            group
                .find_job(&options.target_job)
                .ok_or_else(|| CoreError::JobNotFound {
                    job_id: options.target_job.clone(),
                })?;

        let order = resolve_order(&origin.jobs, Some(&options.target_job))?;
        tracing::info!(
            group = group.group,
            origin = origin.name,
            target = options.target_job,
            jobs = order.len(),
            "resolved execution order"
        );

        // The invocation cache lives for exactly one run.
        let cache = Arc::new(InvocationCache::new());
        let executor = JobExecutor::new(
            self.session.clone(),
            self.http.clone(),
            self.auth.clone(),
            cache.clone(),
            self.secrets.clone(),
        );

        let overrides = ExecutionOverrides {
            payload: options.payload_override.clone(),
            params: options.params_override.clone(),
        };

        let mut executed = Vec::with_capacity(order.len());
        for (position, job_id) in order.iter().enumerate() {
            if options.cancellation.is_cancelled() {
                tracing::warn!(job = job_id, "run cancelled before next job");
                return Err(CoreError::Cancelled);
            }

            let job = origin
                .job(job_id)
                .expect("resolved order references a declared job");

            tracing::info!(
                step = position + 1,
                of = order.len(),
                job = job_id,
                mode = ?job.mode,
                "executing job"
            );

            let job_overrides =
                (*job_id == options.target_job).then_some(&overrides);
            executor
                .execute_job(origin, job, &group.origins, job_overrides)
                .await?;
            executed.push(job_id.clone());
        }

        let target_result = cache.get(&options.target_job);
        tracing::info!(
            group = group.group,
            target = options.target_job,
            executed = executed.len(),
            "run completed"
        );

        Ok(RunReport {
            group: group.group.clone(),
            origin: origin.name.clone(),
            target_job: options.target_job.clone(),
            executed,
            target_result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(doc: serde_json::Value) -> Group {
        serde_json::from_value(doc).unwrap()
    }

    #[tokio::test]
    async fn unknown_target_job_fails() {
        let orchestrator = Orchestrator::new(None);
        let group = group(json!({
            "group": "g",
            "origins": [{ "name": "a", "base_url": "http://localhost", "job": [{ "id": "x" }] }]
        }));

        let error = orchestrator
            .run(&group, &RunOptions::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(error, CoreError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_document_fails_before_any_request() {
        let orchestrator = Orchestrator::new(None);
        let group = group(json!({
            "group": "g",
            "origins": [{
                "name": "a",
                "base_url": "http://localhost",
                "job": [{ "id": "x", "dependencies": ["ghost"] }]
            }]
        }));

        let error = orchestrator
            .run(&group, &RunOptions::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(error, CoreError::ConfigurationInvalid { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_first_job() {
        let orchestrator = Orchestrator::new(None);
        let group = group(json!({
            "group": "g",
            "origins": [{ "name": "a", "base_url": "http://localhost", "job": [{ "id": "x" }] }]
        }));

        let mut options = RunOptions::new("x");
        options.cancellation = CancellationToken::new();
        options.cancellation.cancel();

        let error = orchestrator.run(&group, &options).await.unwrap_err();
        assert!(matches!(error, CoreError::Cancelled));
    }
}
