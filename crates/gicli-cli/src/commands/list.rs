// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `list` subcommand: origin names, or the job ids of one origin.

use std::path::Path;

use super::config::load_groups;

pub fn execute(
    dir: &Path,
    file: Option<&Path>,
    what: &str,
    origin: Option<&str>,
) -> anyhow::Result<()> {
    let groups = load_groups(dir, file)?;

    match what {
        "names" => {
            for (_, group) in &groups {
                for origin in &group.origins {
                    println!("{}", origin.name);
                }
            }
            Ok(())
        }
        "ids" => {
            let wanted = origin
                .ok_or_else(|| anyhow::anyhow!("list ids requires an origin name"))?;
            let found = groups
                .iter()
                .flat_map(|(_, group)| &group.origins)
                .find(|candidate| candidate.name == wanted)
                .ok_or_else(|| anyhow::anyhow!("origin '{wanted}' not found"))?;
            for job in &found.jobs {
                println!("{}", job.id);
            }
            Ok(())
        }
        other => anyhow::bail!("unknown list target '{other}' (expected 'names' or 'ids')"),
    }
}
