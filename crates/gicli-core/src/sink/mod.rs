// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sinks: destinations that receive a request job's response.
//!
//! Two variants exist as a closed set — a templated file target and a SQL
//! Server table. Sinks run only after a successful request; a sink failure
//! is warned about but does not fail the job, except a database connection
//! failure, which does.

pub mod database;
pub mod file;
pub mod infer;

use gicli_config::{Origin, Output, OutputKind};
use serde_json::Value;

use crate::error::CoreError;
use crate::substitute::Substitutor;

/// What a sink reports back after a dispatch.
#[derive(Debug, Default)]
pub struct SinkReport {
    /// Path written by the file variant.
    pub file_path: Option<std::path::PathBuf>,
    /// Rows inserted by the database variant.
    pub rows_inserted: usize,
    /// Rows that failed individually and were skipped.
    pub rows_failed: usize,
}

/// Dispatch a successful response to the configured sink variant.
pub async fn dispatch(
    origin: &Origin,
    job_id: &str,
    output: &Output,
    data: &Value,
    content_type: Option<&str>,
    subst: &Substitutor<'_>,
) -> Result<SinkReport, CoreError> {
    match output.kind {
        OutputKind::File => {
            let path = file::write_file_sink(job_id, output, data, content_type)?;
            tracing::info!(job = job_id, path = %path.display(), "file sink wrote response");
            Ok(SinkReport {
                file_path: Some(path),
                ..SinkReport::default()
            })
        }
        OutputKind::Database => {
            let summary = database::write_database_sink(origin, job_id, output, data, subst).await?;
            tracing::info!(
                job = job_id,
                table = output.table.as_deref().unwrap_or(""),
                inserted = summary.inserted,
                failed = summary.failed,
                "database sink finished"
            );
            Ok(SinkReport {
                file_path: None,
                rows_inserted: summary.inserted,
                rows_failed: summary.failed,
            })
        }
    }
}
