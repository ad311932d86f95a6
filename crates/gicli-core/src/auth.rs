// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authentication lifecycle: issue login requests, extract tokens, and
//! keep them in the session store until they expire.
//!
//! Each origin has at most one current session name, recorded on the last
//! successful authentication. Request jobs attach the stored token through
//! `token_for`; a 401 replay goes through `force_refresh`, which drops the
//! stored token before logging in again.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gicli_config::{Job, Origin, lookup_path};

use crate::error::CoreError;
use crate::http::{HttpClient, RequestOptions, join_url, normalize_data};
use crate::session::SessionStore;
use crate::substitute::Substitutor;

/// Default token lifetime when the login response does not carry one.
const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

pub struct Authenticator {
    session: Arc<SessionStore>,
    http: Arc<HttpClient>,
    /// origin name → session name of the last successful authentication
    current_sessions: Mutex<HashMap<String, String>>,
}

impl Authenticator {
    pub fn new(session: Arc<SessionStore>, http: Arc<HttpClient>) -> Self {
        Authenticator {
            session,
            http,
            current_sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session key used when an auth job does not declare one.
    pub fn default_session_name(origin_name: &str) -> String {
        let normalized: String = origin_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("SESSION_{normalized}_TOKEN")
    }

    /// Run the login request of `auth_job` and store the issued token.
    pub async fn authenticate(
        &self,
        origin: &Origin,
        auth_job: &Job,
        subst: &Substitutor<'_>,
    ) -> Result<(), CoreError> {
        let session_name = auth_job
            .session_name
            .clone()
            .unwrap_or_else(|| Self::default_session_name(&origin.name));

        let headers = header_map(auth_job.headers.as_ref().map(|h| subst.apply_value(h)));
        let payload = auth_job.payload.as_ref().map(|p| subst.apply_value(p));

        let url = join_url(&origin.base_url, &subst.apply_str(&auth_job.path));
        let retry = auth_job.retry_policy.unwrap_or_default();
        let options = RequestOptions {
            headers,
            body: payload,
            timeout_ms: auth_job.timeout.unwrap_or(30_000),
            retries: retry.max_attempts,
            retry_delay_ms: retry.delay,
        };

        tracing::debug!(origin = origin.name, job = auth_job.id, "issuing login request");
        let response = self.http.request(&auth_job.method, &url, &options).await?;
        let data = normalize_data(auth_job.response_format, &response)?;

        let token_path = auth_job.token_identifier.as_deref().unwrap_or_default();
        let token = lookup_path(&data, token_path)
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::AuthTokenExtraction {
                job_id: auth_job.id.clone(),
                reason: format!("no string at path '{token_path}' in the login response"),
            })?
            .to_string();

        let ttl = auth_job
            .token_expiration_identifier
            .as_deref()
            .and_then(|path| lookup_path(&data, path))
            .and_then(numeric_seconds)
            .or(auth_job.token_expiration_time)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECONDS);

        self.session
            .set(&session_name, Value::String(token), Some(ttl));
        self.current_sessions
            .lock()
            .expect("authenticator lock poisoned")
            .insert(origin.name.clone(), session_name.clone());

        tracing::info!(
            origin = origin.name,
            session = session_name,
            ttl_seconds = ttl,
            "authentication succeeded"
        );
        Ok(())
    }

    /// No-op when a valid token is already stored; otherwise authenticate.
    pub async fn refresh(
        &self,
        origin: &Origin,
        auth_job: &Job,
        subst: &Substitutor<'_>,
    ) -> Result<(), CoreError> {
        let session_name = auth_job
            .session_name
            .clone()
            .unwrap_or_else(|| Self::default_session_name(&origin.name));

        if self.session.has(&session_name) {
            self.current_sessions
                .lock()
                .expect("authenticator lock poisoned")
                .insert(origin.name.clone(), session_name);
            return Ok(());
        }

        self.authenticate(origin, auth_job, subst).await
    }

    /// Invalidate the stored token and log in again. Used by the 401 replay.
    pub async fn force_refresh(
        &self,
        origin: &Origin,
        auth_job: &Job,
        subst: &Substitutor<'_>,
    ) -> Result<(), CoreError> {
        let session_name = auth_job
            .session_name
            .clone()
            .unwrap_or_else(|| Self::default_session_name(&origin.name));
        self.session.delete(&session_name);
        self.authenticate(origin, auth_job, subst).await
    }

    /// Current token for an origin, if one is stored and unexpired.
    pub fn token_for(&self, origin_name: &str) -> Option<String> {
        let session_name = self
            .current_sessions
            .lock()
            .expect("authenticator lock poisoned")
            .get(origin_name)
            .cloned()?;
        self.session.get_str(&session_name)
    }

    /// Drop the stored token for an origin.
    pub fn logout(&self, origin_name: &str) {
        let session_name = self
            .current_sessions
            .lock()
            .expect("authenticator lock poisoned")
            .remove(origin_name);
        if let Some(session_name) = session_name {
            self.session.delete(&session_name);
        }
    }
}

/// Flatten a substituted headers object into string pairs.
pub(crate) fn header_map(headers: Option<Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(Value::Object(entries)) = headers {
        for (name, value) in entries {
            let rendered = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            map.insert(name, rendered);
        }
    }
    map
}

/// Interpret a JSON value as a lifetime in seconds: numbers directly,
/// numeric strings parsed.
fn numeric_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InvocationCache;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn origin_with_login(server_uri: &str, login: serde_json::Value) -> Origin {
        serde_json::from_value(json!({
            "name": "erp",
            "base_url": server_uri,
            "job": [login]
        }))
        .unwrap()
    }

    fn components() -> (Arc<SessionStore>, Arc<HttpClient>, InvocationCache) {
        (
            Arc::new(SessionStore::new()),
            Arc::new(HttpClient::new()),
            InvocationCache::new(),
        )
    }

    #[tokio::test]
    async fn authenticate_stores_token_under_session_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "T", "expires_in": 60
            })))
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "SESSION_ERP", "token_identifier": "access_token",
                "token_expiration_identifier": "expires_in"
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.authenticate(&origin, &origin.jobs[0], &subst).await.unwrap();

        assert_eq!(session.get_str("SESSION_ERP"), Some("T".to_string()));
        assert_eq!(auth.token_for("erp"), Some("T".to_string()));
    }

    #[tokio::test]
    async fn login_payload_is_substituted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_string_contains("\"user\":\"operator\""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "T" })),
            )
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        session.set("SESSION_USER", json!("operator"), None);
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "access_token",
                "payload": { "user": "$SESSION_USER" }
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.authenticate(&origin, &origin.jobs[0], &subst).await.unwrap();
        assert_eq!(session.get_str("S"), Some("T".to_string()));
    }

    #[tokio::test]
    async fn numeric_string_expiry_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "T", "ttl": "120"
            })))
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "token",
                "token_expiration_identifier": "ttl"
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.authenticate(&origin, &origin.jobs[0], &subst).await.unwrap();
        assert!(session.has("S"));
    }

    #[tokio::test]
    async fn missing_token_path_is_an_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nope": 1 })))
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "access_token"
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        let error = auth
            .authenticate(&origin, &origin.jobs[0], &subst)
            .await
            .unwrap_err();
        assert!(matches!(error, CoreError::AuthTokenExtraction { .. }));
        assert!(!session.has("S"));
    }

    #[tokio::test]
    async fn refresh_is_a_noop_while_the_token_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "T" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "access_token",
                "token_expiration_time": 3600
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.refresh(&origin, &origin.jobs[0], &subst).await.unwrap();
        auth.refresh(&origin, &origin.jobs[0], &subst).await.unwrap();
    }

    #[tokio::test]
    async fn force_refresh_drops_the_old_token_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "NEW" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        session.set("S", json!("OLD"), None);
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "access_token"
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.force_refresh(&origin, &origin.jobs[0], &subst).await.unwrap();
        assert_eq!(session.get_str("S"), Some("NEW".to_string()));
    }

    #[tokio::test]
    async fn logout_removes_the_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "T" })),
            )
            .mount(&server)
            .await;

        let (session, http, cache) = components();
        let origin = origin_with_login(
            &server.uri(),
            json!({
                "id": "login", "type": "auth", "method": "POST", "path": "/auth",
                "session_name": "S", "token_identifier": "access_token"
            }),
        );
        let auth = Authenticator::new(session.clone(), http);
        let subst = Substitutor::new(&session, &cache, None);

        auth.authenticate(&origin, &origin.jobs[0], &subst).await.unwrap();
        auth.logout("erp");
        assert!(!session.has("S"));
        assert_eq!(auth.token_for("erp"), None);
    }

    #[test]
    fn default_session_name_is_uppercased() {
        assert_eq!(
            Authenticator::default_session_name("my-erp"),
            "SESSION_MY_ERP_TOKEN"
        );
    }

    #[test]
    fn numeric_seconds_accepts_numbers_and_strings() {
        assert_eq!(numeric_seconds(&json!(60)), Some(60));
        assert_eq!(numeric_seconds(&json!(60.5)), Some(60));
        assert_eq!(numeric_seconds(&json!("90")), Some(90));
        assert_eq!(numeric_seconds(&json!(" 90 ")), Some(90));
        assert_eq!(numeric_seconds(&json!("ninety")), None);
        assert_eq!(numeric_seconds(&json!(null)), None);
        assert_eq!(numeric_seconds(&json!(true)), None);
    }
}
