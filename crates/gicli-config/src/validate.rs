// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Document-level validation.
//!
//! Validation collects every violation in one pass so an operator can fix a
//! document in a single round trip instead of replaying the runner per error.

use crate::document::{Group, JobType, OutputKind};
use std::collections::HashSet;
use std::fmt;

/// A single document violation, addressed by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the violation, e.g. `origins[0].job[2].dependencies`.
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a group document, returning every violation found.
///
/// An empty result means the document is runnable.
pub fn validate_group(group: &Group) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if group.group.trim().is_empty() {
        issues.push(ValidationIssue {
            field: "group".to_string(),
            message: "group name must not be empty".to_string(),
        });
    }

    if group.origins.is_empty() {
        issues.push(ValidationIssue {
            field: "origins".to_string(),
            message: "document declares no origins".to_string(),
        });
    }

    let mut origin_names = HashSet::new();
    for (origin_index, origin) in group.origins.iter().enumerate() {
        let origin_field = format!("origins[{origin_index}]");

        if origin.name.trim().is_empty() {
            issues.push(ValidationIssue {
                field: format!("{origin_field}.name"),
                message: "origin name must not be empty".to_string(),
            });
        } else if !origin_names.insert(origin.name.clone()) {
            issues.push(ValidationIssue {
                field: format!("{origin_field}.name"),
                message: format!("duplicate origin name '{}'", origin.name),
            });
        }

        if origin.base_url.trim().is_empty() {
            issues.push(ValidationIssue {
                field: format!("{origin_field}.base_url"),
                message: "base_url must not be empty".to_string(),
            });
        }

        let job_ids: HashSet<&str> = origin.jobs.iter().map(|job| job.id.as_str()).collect();
        let mut seen_ids = HashSet::new();

        for (job_index, job) in origin.jobs.iter().enumerate() {
            let job_field = format!("{origin_field}.job[{job_index}]");

            if job.id.trim().is_empty() {
                issues.push(ValidationIssue {
                    field: format!("{job_field}.id"),
                    message: "job id must not be empty".to_string(),
                });
            } else if !seen_ids.insert(job.id.as_str()) {
                issues.push(ValidationIssue {
                    field: format!("{job_field}.id"),
                    message: format!("duplicate job id '{}' within origin '{}'", job.id, origin.name),
                });
            }

            for dependency in &job.dependencies {
                if !job_ids.contains(dependency.as_str()) {
                    issues.push(ValidationIssue {
                        field: format!("{job_field}.dependencies"),
                        message: format!(
                            "dependency '{dependency}' does not name a job in origin '{}'",
                            origin.name
                        ),
                    });
                }
            }

            if job.job_type == JobType::Auth && job.token_identifier.is_none() {
                issues.push(ValidationIssue {
                    field: format!("{job_field}.token_identifier"),
                    message: "auth jobs must declare a token_identifier".to_string(),
                });
            }

            if let Some(output) = &job.output
                && output.enabled
            {
                match output.kind {
                    OutputKind::File => {
                        if output.path.is_none() {
                            issues.push(ValidationIssue {
                                field: format!("{job_field}.output.path"),
                                message: "file outputs require a target path".to_string(),
                            });
                        }
                    }
                    OutputKind::Database => {
                        if output.table.as_deref().unwrap_or("").trim().is_empty() {
                            issues.push(ValidationIssue {
                                field: format!("{job_field}.output.table"),
                                message: "database outputs require a table name".to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_from(doc: serde_json::Value) -> Group {
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn accepts_a_well_formed_document() {
        let group = group_from(json!({
            "group": "g",
            "origins": [{
                "name": "api",
                "base_url": "https://api.example.com",
                "job": [
                    { "id": "login", "type": "auth", "token_identifier": "access_token" },
                    { "id": "fetch", "dependencies": ["login"] }
                ]
            }]
        }));

        assert!(validate_group(&group).is_empty());
    }

    #[test]
    fn reports_duplicate_job_ids() {
        let group = group_from(json!({
            "group": "g",
            "origins": [{
                "name": "api",
                "base_url": "http://x",
                "job": [{ "id": "a" }, { "id": "a" }]
            }]
        }));

        let issues = validate_group(&group);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("duplicate job id 'a'"));
    }

    #[test]
    fn reports_dangling_dependencies() {
        let group = group_from(json!({
            "group": "g",
            "origins": [{
                "name": "api",
                "base_url": "http://x",
                "job": [{ "id": "a", "dependencies": ["ghost", "phantom"] }]
            }]
        }));

        let issues = validate_group(&group);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.message.contains("'ghost'")));
        assert!(issues.iter().any(|i| i.message.contains("'phantom'")));
    }

    #[test]
    fn reports_auth_job_without_token_identifier() {
        let group = group_from(json!({
            "group": "g",
            "origins": [{
                "name": "api",
                "base_url": "http://x",
                "job": [{ "id": "login", "type": "auth" }]
            }]
        }));

        let issues = validate_group(&group);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].field.ends_with("token_identifier"));
    }

    #[test]
    fn collects_violations_across_origins() {
        let group = group_from(json!({
            "group": "",
            "origins": [
                { "name": "a", "base_url": "", "job": [] },
                { "name": "a", "base_url": "http://x", "job": [] }
            ]
        }));

        let issues = validate_group(&group);
        // empty group name, empty base_url, duplicate origin name
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn disabled_outputs_are_not_validated() {
        let group = group_from(json!({
            "group": "g",
            "origins": [{
                "name": "api",
                "base_url": "http://x",
                "job": [{ "id": "a", "output": { "enabled": false, "type": "database" } }]
            }]
        }));

        assert!(validate_group(&group).is_empty());
    }
}
