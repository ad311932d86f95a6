// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Variable substitution over strings and nested structures.
//!
//! Placeholder families, applied per string in this order:
//! 1. `ENC:` prefix — decrypt, then continue on the plaintext
//! 2. `$ENV_NAME` — environment variable (`ENV_` prefix is part of the name)
//! 3. `$SESSION_NAME` — session store lookup
//! 4. `{{jobId.field[0].sub}}` — prior-job result navigation
//! 5. `$DATE` — today as `YYYY-MM-DD`
//!
//! An unresolvable placeholder is left literal and a warning is emitted;
//! substitution never fails a job on its own. A string with no placeholders
//! is returned unchanged, byte for byte.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::cache::InvocationCache;
use crate::crypto::SecretBox;
use crate::session::SessionStore;

static ENV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$ENV_[A-Z_][A-Z0-9_]*").expect("env placeholder regex"));
static SESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$SESSION_[A-Z_][A-Z0-9_]*").expect("session placeholder regex"));
static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^}]+\}\}").expect("template placeholder regex"));
static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$DATE").expect("date placeholder regex"));

/// Resolves placeholders against the environment, the session store, and
/// the invocation cache.
pub struct Substitutor<'a> {
    session: &'a SessionStore,
    cache: &'a InvocationCache,
    secrets: Option<&'a SecretBox>,
}

impl<'a> Substitutor<'a> {
    pub fn new(
        session: &'a SessionStore,
        cache: &'a InvocationCache,
        secrets: Option<&'a SecretBox>,
    ) -> Self {
        Substitutor {
            session,
            cache,
            secrets,
        }
    }

    /// Apply every placeholder family to one string.
    pub fn apply_str(&self, input: &str) -> String {
        let decrypted = self.decrypt_if_needed(input);

        let after_env = ENV_RE.replace_all(&decrypted, |caps: &regex::Captures<'_>| {
            let placeholder = &caps[0];
            let name = &placeholder[1..];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(variable = name, "environment variable not set, leaving placeholder");
                    placeholder.to_string()
                }
            }
        });

        let after_session = SESSION_RE.replace_all(&after_env, |caps: &regex::Captures<'_>| {
            let placeholder = &caps[0];
            let name = &placeholder[1..];
            match self.session.get(name) {
                Some(value) => value_to_string(&value),
                None => {
                    tracing::warn!(session = name, "session entry not found, leaving placeholder");
                    placeholder.to_string()
                }
            }
        });

        let after_template = TEMPLATE_RE.replace_all(&after_session, |caps: &regex::Captures<'_>| {
            let placeholder = &caps[0];
            let inner = &placeholder[2..placeholder.len() - 2];
            match self.resolve_template(inner) {
                Some(value) => value,
                None => {
                    tracing::warn!(path = inner, "template path not resolvable, leaving placeholder");
                    placeholder.to_string()
                }
            }
        });

        DATE_RE
            .replace_all(&after_template, |_: &regex::Captures<'_>| {
                chrono::Local::now().format("%Y-%m-%d").to_string()
            })
            .into_owned()
    }

    /// Apply substitution deeply: strings are rewritten, maps and arrays
    /// are walked, other scalars pass through untouched.
    pub fn apply_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.apply_str(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.apply_value(item)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.apply_value(item)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn decrypt_if_needed(&self, input: &str) -> String {
        if !SecretBox::is_encrypted(input) {
            return input.to_string();
        }
        match self.secrets {
            Some(secrets) => match secrets.decrypt(input) {
                Ok(plaintext) => plaintext,
                Err(error) => {
                    tracing::warn!(%error, "failed to decrypt ENC: value, leaving it untouched");
                    input.to_string()
                }
            },
            None => {
                tracing::warn!("ENC: value present but no encryption key is configured");
                input.to_string()
            }
        }
    }

    /// Resolve `jobId.path` against the invocation cache entry's data.
    fn resolve_template(&self, inner: &str) -> Option<String> {
        let (job_id, path) = match inner.split_once('.') {
            Some((job_id, path)) => (job_id, path),
            None => (inner, ""),
        };

        let entry = self.cache.get(job_id)?;
        let data = entry.data()?.clone();
        let resolved = gicli_config::lookup_path(&data, path)?;
        Some(value_to_string(resolved))
    }
}

/// Render a JSON value for interpolation into a string: strings verbatim,
/// everything else as compact JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
