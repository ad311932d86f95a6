// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client: single request with timeout, fixed-delay retry, and
//! content-type-driven response parsing.
//!
//! Retry policy: `retries + 1` attempts in total. Transport errors, 408 and
//! 5xx responses are retried; every other 4xx fails immediately. A non-2xx
//! status after the final attempt surfaces as `CoreError::HttpTransport`
//! carrying the status and reason.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CoreError;

/// Options for a single logical request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub headers: HashMap<String, String>,
    /// `Value::String` is sent as-is; objects and arrays are JSON-encoded.
    pub body: Option<Value>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            headers: HashMap::new(),
            body: None,
            timeout_ms: 30_000,
            retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

/// Parsed response body, by Content-Type.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Render the body as a JSON value for caching, sinks and template
    /// paths. Binary bodies become base64 strings.
    pub fn as_value(&self) -> Value {
        use base64::{Engine as _, engine::general_purpose};
        match self {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Text(text) => Value::String(text.clone()),
            ResponseBody::Binary(bytes) => Value::String(general_purpose::STANDARD.encode(bytes)),
        }
    }

    /// The body as text, for format-specific reparsing (XML).
    pub fn as_text(&self) -> String {
        match self {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
            ResponseBody::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Response headers with lowercased names.
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
    pub url: String,
}

impl HttpResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

enum AttemptError {
    Retryable(CoreError),
    Fatal(CoreError),
}

impl AttemptError {
    fn into_inner(self) -> CoreError {
        match self {
            AttemptError::Retryable(error) | AttemptError::Fatal(error) => error,
        }
    }
}

/// Issues requests. Cheap to clone; holds one reqwest connection pool.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        HttpClient::default()
    }

    /// Issue a request, retrying per the options.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, CoreError> {
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            CoreError::HttpTransport {
                status: None,
                reason: format!("invalid HTTP method '{method}'"),
            }
        })?;

        let attempts = options.retries.saturating_add(1);
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(options.retry_delay_ms)).await;
                tracing::debug!(attempt, attempts, url, "retrying request");
            }

            match self.attempt(&method, url, options).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(retryable) => last_error = Some(retryable),
            }
        }

        Err(last_error
            .map(AttemptError::into_inner)
            .unwrap_or(CoreError::HttpTransport {
                status: None,
                reason: "request was never attempted".to_string(),
            }))
    }

    async fn attempt(
        &self,
        method: &reqwest::Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, AttemptError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(Duration::from_millis(options.timeout_ms));

        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        // GET and HEAD carry no body regardless of input.
        let body_allowed = *method != reqwest::Method::GET && *method != reqwest::Method::HEAD;
        if body_allowed && let Some(body) = &options.body {
            request = match body {
                Value::Null => request,
                Value::String(text) => request.body(text.clone()),
                other => {
                    let encoded = serde_json::to_string(other).map_err(|e| {
                        AttemptError::Fatal(CoreError::HttpTransport {
                            status: None,
                            reason: format!("failed to encode request body: {e}"),
                        })
                    })?;
                    if !has_content_type(&options.headers) {
                        request = request.header("Content-Type", "application/json");
                    }
                    request.body(encoded)
                }
            };
        }

        let response = request.send().await.map_err(|e| {
            AttemptError::Retryable(CoreError::HttpTransport {
                status: None,
                reason: if e.is_timeout() {
                    format!("request to {url} timed out")
                } else {
                    format!("request to {url} failed: {e}")
                },
            })
        })?;

        let status = response.status();
        let status_code = status.as_u16();
        let status_text = status.canonical_reason().unwrap_or("").to_string();

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.to_string(), text.to_string());
            }
        }

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let reason = if body_text.is_empty() {
                status_text
            } else {
                format!("{status_text}: {}", truncate(&body_text, 200))
            };
            let error = CoreError::HttpTransport {
                status: Some(status_code),
                reason,
            };
            // Retry on 408 and 5xx; never on any other 4xx.
            return if status_code == 408 || status.is_server_error() {
                Err(AttemptError::Retryable(error))
            } else {
                Err(AttemptError::Fatal(error))
            };
        }

        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_default()
            .to_lowercase();

        let body = if content_type.starts_with("application/json") {
            let text = response.text().await.map_err(|e| {
                AttemptError::Retryable(CoreError::HttpTransport {
                    status: Some(status_code),
                    reason: format!("failed to read response body: {e}"),
                })
            })?;
            match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(text),
            }
        } else if content_type.starts_with("text/") {
            let text = response.text().await.map_err(|e| {
                AttemptError::Retryable(CoreError::HttpTransport {
                    status: Some(status_code),
                    reason: format!("failed to read response body: {e}"),
                })
            })?;
            ResponseBody::Text(text)
        } else {
            let bytes = response.bytes().await.map_err(|e| {
                AttemptError::Retryable(CoreError::HttpTransport {
                    status: Some(status_code),
                    reason: format!("failed to read response body: {e}"),
                })
            })?;
            ResponseBody::Binary(bytes.to_vec())
        };

        Ok(HttpResponse {
            status: status_code,
            status_text,
            headers,
            body,
            url: url.to_string(),
        })
    }
}

fn has_content_type(headers: &HashMap<String, String>) -> bool {
    headers.keys().any(|name| name.eq_ignore_ascii_case("content-type"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((position, _)) => &text[..position],
        None => text,
    }
}

/// Append query parameters to a URL, percent-encoding keys and values.
/// Pairs are emitted in sorted key order so built URLs are stable.
pub fn append_query(url: &str, params: &HashMap<String, String>) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let mut pairs: Vec<(&String, &String)> = params.iter().collect();
    pairs.sort();

    let mut built = String::with_capacity(url.len() + pairs.len() * 16);
    built.push_str(url);
    let mut separator = if url.contains('?') { '&' } else { '?' };
    for (key, value) in pairs {
        built.push(separator);
        separator = '&';
        percent_encode_into(&mut built, key);
        built.push('=');
        percent_encode_into(&mut built, value);
    }
    built
}

/// Percent-encode one component into the buffer. RFC 3986 unreserved
/// bytes pass through; everything else is escaped byte-wise.
fn percent_encode_into(built: &mut String, component: &str) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for byte in component.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                built.push(byte as char);
            }
            escaped => {
                built.push('%');
                built.push(HEX[(escaped >> 4) as usize] as char);
                built.push(HEX[(escaped & 0x0f) as usize] as char);
            }
        }
    }
}

/// Join a base URL and a path without doubling the separating slash. An
/// absolute path (full URL) wins over the base.
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Re-shape a response body per the job's declared response format.
pub fn normalize_data(
    format: gicli_config::ResponseFormat,
    response: &HttpResponse,
) -> Result<Value, CoreError> {
    match format {
        gicli_config::ResponseFormat::Json => Ok(response.body.as_value()),
        gicli_config::ResponseFormat::Text => Ok(Value::String(response.body.as_text())),
        gicli_config::ResponseFormat::Xml => crate::xml::xml_to_value(&response.body.as_text()),
    }
}
