// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-job execution state machine.
//!
//! States: prepare → auth-check → request → maybe-reauth → sink → done,
//! with terminal failure at any state. The 401 replay lives here as a
//! single transition: when the request fails with an expired session and
//! the job names one, the linked auth job is force-refreshed and the
//! request replays exactly once. A second 401 fails the job.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use gicli_config::{Job, JobType, Origin};

use crate::auth::{Authenticator, header_map};
use crate::cache::{InvocationCache, JobResult};
use crate::crypto::SecretBox;
use crate::error::CoreError;
use crate::http::{HttpClient, HttpResponse, RequestOptions, append_query, join_url, normalize_data};
use crate::session::SessionStore;
use crate::sink;
use crate::substitute::Substitutor;

/// TTL of the `job_result_<id>` session mirror.
const RESULT_MIRROR_TTL_SECONDS: u64 = 3600;

/// Externally supplied replacements applied before substitution.
#[derive(Debug, Default, Clone)]
pub struct ExecutionOverrides {
    /// Replaces the job's `payload` wholesale.
    pub payload: Option<Value>,
    /// Replaces the job's `params` wholesale.
    pub params: Option<Value>,
}

pub struct JobExecutor {
    session: Arc<SessionStore>,
    http: Arc<HttpClient>,
    auth: Arc<Authenticator>,
    cache: Arc<InvocationCache>,
    secrets: Option<Arc<SecretBox>>,
    /// origin_jobId keys currently executing; refuses concurrent re-entry.
    running: Mutex<HashSet<String>>,
}

impl JobExecutor {
    pub fn new(
        session: Arc<SessionStore>,
        http: Arc<HttpClient>,
        auth: Arc<Authenticator>,
        cache: Arc<InvocationCache>,
        secrets: Option<Arc<SecretBox>>,
    ) -> Self {
        JobExecutor {
            session,
            http,
            auth,
            cache,
            secrets,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Execute one job and publish its result to the invocation cache.
    pub async fn execute_job(
        &self,
        origin: &Origin,
        job: &Job,
        all_origins: &[Origin],
        overrides: Option<&ExecutionOverrides>,
    ) -> Result<JobResult, CoreError> {
        let key = format!("{}_{}", origin.name, job.id);
        {
            let mut running = self.running.lock().expect("executor lock poisoned");
            if !running.insert(key.clone()) {
                return Err(CoreError::JobAlreadyRunning { key });
            }
        }

        let result = self.run_states(origin, job, all_origins, overrides).await;

        self.running
            .lock()
            .expect("executor lock poisoned")
            .remove(&key);

        match &result {
            Ok(_) => tracing::info!(origin = origin.name, job = job.id, "job completed"),
            Err(error) => {
                tracing::error!(origin = origin.name, job = job.id, %error, "job failed");
            }
        }
        result
    }

    async fn run_states(
        &self,
        origin: &Origin,
        job: &Job,
        all_origins: &[Origin],
        overrides: Option<&ExecutionOverrides>,
    ) -> Result<JobResult, CoreError> {
        let subst = Substitutor::new(&self.session, &self.cache, self.secrets.as_deref());

        // --- prepare: overlay override files, then deep-substitute ---
        let mut prepared = job.clone();
        if let Some(overrides) = overrides {
            if let Some(payload) = &overrides.payload {
                prepared.payload = Some(payload.clone());
            }
            if let Some(params) = &overrides.params {
                prepared.params = Some(params.clone());
            }
        }
        // --- auth-check ---
        if prepared.job_type == JobType::Auth {
            self.auth.authenticate(origin, &prepared, &subst).await?;
            // Auth jobs have no sink; their result goes straight to done.
            let outcome = JobResult::Auth {
                authenticated: true,
                timestamp: Utc::now(),
            };
            self.publish(&prepared.id, &outcome);
            return Ok(outcome);
        }

        let path = subst.apply_str(&prepared.path);
        let headers = prepared.headers.as_ref().map(|h| subst.apply_value(h));
        let params = prepared.params.as_ref().map(|p| subst.apply_value(p));
        let payload = prepared.payload.as_ref().map(|p| subst.apply_value(p));

        let auth_source = prepared
            .session_name
            .as_deref()
            .and_then(|name| find_auth_job(origin, all_origins, name));

        if let Some(session_name) = prepared.session_name.as_deref() {
            match auth_source {
                Some((auth_origin, auth_job)) => {
                    self.auth.refresh(auth_origin, auth_job, &subst).await?;
                }
                None => tracing::warn!(
                    session = session_name,
                    job = prepared.id,
                    "no auth job declares this session name; relying on a stored token"
                ),
            }
        }

        // --- request, with a single silent replay on an expired session ---
        let url = append_query(
            &join_url(&origin.base_url, &path),
            &string_map(params.as_ref()),
        );

        let response = match self.send(origin, &prepared, &url, headers.as_ref(), payload.as_ref()).await
        {
            Ok(response) => response,
            Err(error) if error.is_auth_expired() && auth_source.is_some() => {
                let (auth_origin, auth_job) =
                    auth_source.expect("auth source checked above");
                tracing::info!(
                    job = prepared.id,
                    "session expired (401), re-authenticating and replaying once"
                );
                self.auth.force_refresh(auth_origin, auth_job, &subst).await?;
                self.send(origin, &prepared, &url, headers.as_ref(), payload.as_ref())
                    .await?
            }
            Err(error) => return Err(error),
        };

        let data = normalize_data(prepared.response_format, &response)?;

        // --- sink: warn on failure, except a dead database connection ---
        if let Some(output) = &prepared.output
            && output.enabled
        {
            let dispatched = sink::dispatch(
                origin,
                &prepared.id,
                output,
                &data,
                response.content_type(),
                &subst,
            )
            .await;
            match dispatched {
                Ok(_) => {}
                Err(error @ CoreError::DatabaseConnection { .. }) => return Err(error),
                Err(error) => {
                    tracing::warn!(job = prepared.id, %error, "sink failed; job result is kept");
                }
            }
        }

        // --- done ---
        let outcome = JobResult::Request {
            data,
            headers: response.headers,
            status: response.status,
            timestamp: Utc::now(),
        };
        self.publish(&prepared.id, &outcome);
        Ok(outcome)
    }

    /// Build and issue the HTTP request. Reads the current token on every
    /// call so a replay picks up the refreshed session.
    async fn send(
        &self,
        origin: &Origin,
        job: &Job,
        url: &str,
        headers: Option<&Value>,
        payload: Option<&Value>,
    ) -> Result<HttpResponse, CoreError> {
        let mut header_values = header_map(headers.cloned());
        if let Some(token) = self.auth.token_for(&origin.name) {
            header_values
                .entry("Authorization".to_string())
                .or_insert_with(|| format!("{} {}", job.auth_scheme(), token));
        }

        let retry = job.retry_policy.unwrap_or_default();
        let options = RequestOptions {
            headers: header_values,
            body: payload.cloned(),
            timeout_ms: job.timeout.unwrap_or(30_000),
            retries: retry.max_attempts,
            retry_delay_ms: retry.delay,
        };

        self.http.request(&job.method, url, &options).await
    }

    /// Publish to the invocation cache and mirror into the session store.
    fn publish(&self, job_id: &str, outcome: &JobResult) {
        self.cache.insert(job_id, outcome.clone());
        self.session.set(
            &format!("job_result_{job_id}"),
            outcome.to_value(),
            Some(RESULT_MIRROR_TTL_SECONDS),
        );
    }
}

/// Locate the auth job issuing tokens for a session name: the current
/// origin is scanned first, then the full set of origins.
fn find_auth_job<'a>(
    origin: &'a Origin,
    all_origins: &'a [Origin],
    session_name: &str,
) -> Option<(&'a Origin, &'a Job)> {
    if let Some(job) = origin.auth_job_for_session(session_name) {
        return Some((origin, job));
    }
    all_origins.iter().find_map(|candidate| {
        candidate
            .auth_job_for_session(session_name)
            .map(|job| (candidate, job))
    })
}

/// Flatten a substituted params object into string pairs for the query.
fn string_map(params: Option<&Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(Value::Object(entries)) = params {
        for (name, value) in entries {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            map.insert(name.clone(), rendered);
        }
    }
    map
}
