// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File sink: write a response payload to a templated path.
//!
//! `$JOBID` and `$TS` expand in the filename. The serialization format is
//! the explicit `format` when it is not "auto", otherwise inferred from the
//! response Content-Type. Writes are atomic: the payload lands in a
//! temporary sibling first and is renamed into place.

use gicli_config::Output;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Resolve the target path and write the payload.
pub fn write_file_sink(
    job_id: &str,
    output: &Output,
    data: &Value,
    content_type: Option<&str>,
) -> Result<PathBuf, CoreError> {
    let directory = output.path.as_deref().ok_or_else(|| CoreError::SinkFailure {
        reason: "file output has no target path".to_string(),
    })?;

    let format = resolve_format(output.format.as_deref(), content_type);
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    let filename = match output.filename.as_deref() {
        Some(template) => template
            .replace("$JOBID", job_id)
            .replace("$TS", &timestamp),
        None => format!("{job_id}_{timestamp}.{format}"),
    };

    let target = Path::new(directory).join(&filename);

    fs::create_dir_all(directory)?;

    if target.exists() && !output.overwrite {
        return Err(CoreError::SinkFailure {
            reason: format!("file already exists: {}", target.display()),
        });
    }

    let serialized = serialize(data, &format)?;

    // Temporary sibling in the same directory keeps the rename atomic.
    let temporary = target.with_file_name(format!(".{filename}.tmp"));
    fs::write(&temporary, serialized)?;
    fs::rename(&temporary, &target)?;

    Ok(target)
}

/// Explicit non-"auto" format wins; otherwise infer from Content-Type.
fn resolve_format(declared: Option<&str>, content_type: Option<&str>) -> String {
    if let Some(format) = declared
        && !format.eq_ignore_ascii_case("auto")
    {
        return format.to_lowercase();
    }

    let content_type = content_type.unwrap_or("").to_lowercase();
    if content_type.starts_with("application/json") {
        "json".to_string()
    } else if content_type.starts_with("application/xml") || content_type.starts_with("text/xml") {
        "xml".to_string()
    } else {
        "txt".to_string()
    }
}

fn serialize(data: &Value, format: &str) -> Result<String, CoreError> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(data)?),
        _ => match data {
            Value::String(text) => Ok(text.clone()),
            other => Ok(serde_json::to_string_pretty(other)?),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_output(dir: &TempDir, extra: serde_json::Value) -> Output {
        let mut base = json!({
            "type": "file",
            "path": dir.path().to_str().unwrap(),
        });
        base.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn writes_pretty_json() {
        let dir = TempDir::new().unwrap();
        let output = file_output(&dir, json!({ "filename": "out.json", "format": "json" }));

        let path =
            write_file_sink("job1", &output, &json!({ "a": [1, 2] }), None).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn expands_jobid_and_timestamp_placeholders() {
        let dir = TempDir::new().unwrap();
        let output = file_output(
            &dir,
            json!({ "filename": "$JOBID-$TS.json", "format": "json" }),
        );

        let path = write_file_sink("sync", &output, &json!(1), None).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sync-"));
        assert!(!name.contains("$TS"));
    }

    #[test]
    fn refuses_to_overwrite_when_disabled() {
        let dir = TempDir::new().unwrap();
        let output = file_output(&dir, json!({ "filename": "fixed.json", "format": "json" }));

        write_file_sink("j", &output, &json!(1), None).unwrap();
        let error = write_file_sink("j", &output, &json!(2), None).unwrap_err();
        assert!(matches!(error, CoreError::SinkFailure { .. }));
        assert!(error.to_string().contains("already exists"));
    }

    #[test]
    fn overwrites_when_enabled() {
        let dir = TempDir::new().unwrap();
        let output = file_output(
            &dir,
            json!({ "filename": "fixed.json", "format": "json", "overwrite": true }),
        );

        write_file_sink("j", &output, &json!(1), None).unwrap();
        let path = write_file_sink("j", &output, &json!(2), None).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "2");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("deep/nested");
        let output: Output = serde_json::from_value(json!({
            "type": "file",
            "path": nested.to_str().unwrap(),
            "filename": "out.txt",
            "format": "txt"
        }))
        .unwrap();

        let path = write_file_sink("j", &output, &json!("content"), None).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(path).unwrap(), "content");
    }

    #[test]
    fn auto_format_infers_from_content_type() {
        assert_eq!(resolve_format(Some("auto"), Some("application/json")), "json");
        assert_eq!(resolve_format(None, Some("application/json; charset=utf-8")), "json");
        assert_eq!(resolve_format(None, Some("application/xml")), "xml");
        assert_eq!(resolve_format(None, Some("text/xml")), "xml");
        assert_eq!(resolve_format(None, Some("text/plain")), "txt");
        assert_eq!(resolve_format(None, Some("application/octet-stream")), "txt");
        assert_eq!(resolve_format(None, None), "txt");
        // Explicit format always wins.
        assert_eq!(resolve_format(Some("xml"), Some("application/json")), "xml");
    }

    #[test]
    fn text_format_falls_back_to_pretty_json_for_structures() {
        let dir = TempDir::new().unwrap();
        let output = file_output(&dir, json!({ "filename": "out.txt", "format": "txt" }));

        let path = write_file_sink("j", &output, &json!({ "k": 1 }), None).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{\n  \"k\": 1\n}");
    }

    #[test]
    fn no_temporary_files_remain() {
        let dir = TempDir::new().unwrap();
        let output = file_output(&dir, json!({ "filename": "out.json", "format": "json" }));

        write_file_sink("j", &output, &json!(1), None).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
