// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration discovery, validation, and import.
//!
//! Groups are loaded either from a single `-f` file or from every `*.json`
//! under the configuration root. `import` validates first and only then
//! copies the documents to the system configuration directory, where
//! production runs pick them up.

use std::path::{Path, PathBuf};

use anyhow::Context;
use gicli_config::{Group, validate_group};

/// Load every group document from a file or a directory scan.
pub fn load_groups(dir: &Path, file: Option<&Path>) -> anyhow::Result<Vec<(PathBuf, Group)>> {
    let paths = match file {
        Some(file) => vec![file.to_path_buf()],
        None => {
            let mut found = Vec::new();
            let entries = std::fs::read_dir(dir)
                .with_context(|| format!("cannot read configuration root '{}'", dir.display()))?;
            for entry in entries {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    found.push(path);
                }
            }
            found.sort();
            found
        }
    };

    if paths.is_empty() {
        anyhow::bail!("no configuration files under '{}'", dir.display());
    }

    let mut groups = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let group: Group = serde_json::from_str(&raw)
            .with_context(|| format!("'{}' is not a valid group document", path.display()))?;
        groups.push((path, group));
    }
    Ok(groups)
}

/// Validate every discovered document, reporting all violations.
pub fn validate(dir: &Path, file: Option<&Path>) -> anyhow::Result<()> {
    let groups = load_groups(dir, file)?;
    let mut failed = false;

    for (path, group) in &groups {
        let issues = validate_group(group);
        if issues.is_empty() {
            tracing::info!(file = %path.display(), group = group.group, "configuration valid");
        } else {
            failed = true;
            for issue in &issues {
                tracing::error!(file = %path.display(), %issue, "configuration invalid");
                eprintln!("{}: {issue}", path.display());
            }
        }
    }

    if failed {
        anyhow::bail!("configuration validation failed");
    }
    println!("{} configuration file(s) valid", groups.len());
    Ok(())
}

/// Validate, then copy the documents to the system configuration directory.
pub fn import(dir: &Path, file: Option<&Path>) -> anyhow::Result<()> {
    validate(dir, file)?;

    let target = system_config_dir();
    std::fs::create_dir_all(&target)
        .with_context(|| format!("cannot create '{}'", target.display()))?;

    let groups = load_groups(dir, file)?;
    for (path, _group) in &groups {
        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("configuration path has no file name"))?;
        let destination = target.join(name);
        std::fs::copy(path, &destination)
            .with_context(|| format!("cannot copy to '{}'", destination.display()))?;
        tracing::info!(from = %path.display(), to = %destination.display(), "imported");
    }

    println!("imported {} file(s) to {}", groups.len(), target.display());
    Ok(())
}

/// Where validated production configurations live: `/etc/gicli` when
/// writable, else the per-user configuration directory.
pub fn system_config_dir() -> PathBuf {
    let system = PathBuf::from("/etc/gicli");
    let writable = std::fs::create_dir_all(&system).is_ok()
        && std::fs::metadata(&system).is_ok_and(|m| !m.permissions().readonly());
    if writable {
        return system;
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gicli")
}
