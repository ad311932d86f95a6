// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The run command: locate the target job, execute it with its
//! prerequisites, and optionally export response page metadata.

use std::path::Path;

use anyhow::Context;
use gicli_core::{JobResult, Orchestrator, RunOptions, SecretBox, SessionStore};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::config::{load_groups, system_config_dir};

/// Fields exported by `--output-response-params`.
const RESPONSE_PARAM_FIELDS: [&str; 9] = [
    "currentPage",
    "totalPages",
    "pageSize",
    "totalCount",
    "hasPrevious",
    "hasNext",
    "succeeded",
    "errors",
    "message",
];

pub struct RunArgs<'a> {
    pub job: &'a str,
    pub production: bool,
    pub dir: &'a Path,
    pub file: Option<&'a Path>,
    pub payload_file: Option<&'a Path>,
    pub params_file: Option<&'a Path>,
    pub output_response_params: bool,
}

pub async fn execute(args: RunArgs<'_>) -> anyhow::Result<()> {
    let groups = discover_groups(&args)?;

    let (config_path, group) = groups
        .iter()
        .find(|(_, group)| group.find_job(args.job).is_some())
        .ok_or_else(|| anyhow::anyhow!("job '{}' not found in any configuration", args.job))?;
    tracing::info!(
        job = args.job,
        config = %config_path.display(),
        production = args.production,
        "target located"
    );

    let secrets = match std::env::var("ENV_ENCRYPTION_KEY") {
        Ok(key) if !key.is_empty() => Some(SecretBox::new(&key)?),
        _ => None,
    };

    let orchestrator = Orchestrator::new(secrets);
    SessionStore::spawn_sweeper(orchestrator.session());

    let cancellation = CancellationToken::new();
    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("termination signal received, stopping before the next job");
            signal_token.cancel();
        }
    });

    let mut options = RunOptions::new(args.job);
    options.payload_override = read_override(args.payload_file)?;
    options.params_override = read_override(args.params_file)?;
    options.cancellation = cancellation;

    let report = orchestrator.run(group, &options).await?;

    if args.output_response_params {
        write_response_params(report.target_result.as_ref())?;
    }

    println!(
        "job '{}' completed ({} job(s) executed)",
        report.target_job,
        report.executed.len()
    );
    Ok(())
}

fn discover_groups(
    args: &RunArgs<'_>,
) -> anyhow::Result<Vec<(std::path::PathBuf, gicli_config::Group)>> {
    if args.file.is_some() {
        return load_groups(args.dir, args.file);
    }
    if args.production {
        // Production installs read the validated copies; fall back to the
        // configuration root when nothing was imported yet.
        let system = system_config_dir();
        if let Ok(groups) = load_groups(&system, None) {
            return Ok(groups);
        }
    }
    load_groups(args.dir, None)
}

/// Read an override file as JSON, falling back to a raw string body.
fn read_override(path: Option<&Path>) -> anyhow::Result<Option<Value>> {
    let Some(path) = path else { return Ok(None) };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read override file '{}'", path.display()))?;
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(Some(Value::String(raw))),
    }
}

/// Export page metadata from the target response, with the bulky `data`
/// field redacted.
fn write_response_params(result: Option<&JobResult>) -> anyhow::Result<()> {
    let data = result.and_then(JobResult::data);

    let mut exported = serde_json::Map::new();
    for field in RESPONSE_PARAM_FIELDS {
        let value = data
            .and_then(|d| d.get(field))
            .cloned()
            .unwrap_or(Value::Null);
        exported.insert(field.to_string(), value);
    }
    exported.insert("data".to_string(), json!("[redacted]"));

    let path = Path::new("./output-response-params.js");
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(exported))?)?;
    tracing::info!(path = %path.display(), "response params written");
    Ok(())
}
