// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dependency resolution: topological ordering of the closure reachable
//! from a target job.
//!
//! Depth-first traversal with three vertex states; the output is the DFS
//! post-order, so every job appears after all of its prerequisites.
//! Independent jobs keep their declaration order. Dangling references are
//! collected across the whole job set before traversal so an operator sees
//! every bad reference at once.

use gicli_config::Job;
use std::collections::HashMap;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Visiting,
    Visited,
}

/// Compute the execution order for `target` and its transitive
/// prerequisites, or for the whole job list when no target is given.
pub fn resolve_order(jobs: &[Job], target: Option<&str>) -> Result<Vec<String>, CoreError> {
    let index: HashMap<&str, usize> = jobs
        .iter()
        .enumerate()
        .map(|(position, job)| (job.id.as_str(), position))
        .collect();

    // Collect every dangling reference before walking anything.
    let mut dangling = Vec::new();
    for job in jobs {
        for dependency in &job.dependencies {
            if !index.contains_key(dependency.as_str()) {
                dangling.push(format!("{} -> {}", job.id, dependency));
            }
        }
    }
    if !dangling.is_empty() {
        return Err(CoreError::DependencyMissing {
            references: dangling,
        });
    }

    let mut states = vec![VisitState::Unvisited; jobs.len()];
    let mut order = Vec::new();

    let roots: Vec<usize> = match target {
        Some(target_id) => {
            let position = *index
                .get(target_id)
                .ok_or_else(|| CoreError::JobNotFound {
                    job_id: target_id.to_string(),
                })?;
            vec![position]
        }
        None => (0..jobs.len()).collect(),
    };

    for root in roots {
        visit(jobs, &index, root, &mut states, &mut order)?;
    }

    Ok(order)
}

fn visit(
    jobs: &[Job],
    index: &HashMap<&str, usize>,
    position: usize,
    states: &mut [VisitState],
    order: &mut Vec<String>,
) -> Result<(), CoreError> {
    match states[position] {
        VisitState::Visited => return Ok(()),
        VisitState::Visiting => {
            return Err(CoreError::DependencyCycle {
                job_id: jobs[position].id.clone(),
            });
        }
        VisitState::Unvisited => {}
    }

    states[position] = VisitState::Visiting;
    for dependency in &jobs[position].dependencies {
        let successor = index[dependency.as_str()];
        visit(jobs, index, successor, states, order)?;
    }
    states[position] = VisitState::Visited;
    order.push(jobs[position].id.clone());

    Ok(())
}
