// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `generate-config` subcommand: turn a Swagger 2.0 document into a group
//! configuration with one request job per operation.

use std::path::Path;

use anyhow::Context;
use serde_json::{Map, Value, json};

const METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "head", "options"];

pub fn execute(swagger_path: &Path, output_path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(swagger_path)
        .with_context(|| format!("cannot read '{}'", swagger_path.display()))?;
    let swagger: Value = serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not valid JSON", swagger_path.display()))?;

    let document = generate_group(&swagger)?;

    std::fs::write(output_path, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("cannot write '{}'", output_path.display()))?;
    println!("wrote {}", output_path.display());
    Ok(())
}

/// Build the group document from a parsed Swagger value.
pub fn generate_group(swagger: &Value) -> anyhow::Result<Value> {
    let host = swagger["host"].as_str().unwrap_or("localhost");
    let base_path = swagger["basePath"].as_str().unwrap_or("");
    let scheme = swagger["schemes"]
        .as_array()
        .and_then(|schemes| schemes.first())
        .and_then(Value::as_str)
        .unwrap_or("https");
    let title = swagger["info"]["title"].as_str().unwrap_or("generated");

    let paths = swagger["paths"]
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("swagger document has no paths"))?;

    let mut jobs = Vec::new();
    for (path, operations) in paths {
        let Some(operations) = operations.as_object() else {
            continue;
        };
        for method in METHODS {
            let Some(operation) = operations.get(method) else {
                continue;
            };

            let id = operation["operationId"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{method}_{}", slug(path)));

            let mut job = Map::new();
            job.insert("id".to_string(), json!(id));
            job.insert("type".to_string(), json!("request"));
            job.insert("method".to_string(), json!(method.to_uppercase()));
            job.insert("path".to_string(), json!(path));

            let query: Map<String, Value> = operation["parameters"]
                .as_array()
                .into_iter()
                .flatten()
                .filter(|parameter| parameter["in"].as_str() == Some("query"))
                .filter_map(|parameter| parameter["name"].as_str())
                .map(|name| (name.to_string(), json!("")))
                .collect();
            if !query.is_empty() {
                job.insert("params".to_string(), Value::Object(query));
            }

            jobs.push(Value::Object(job));
        }
    }

    if jobs.is_empty() {
        anyhow::bail!("swagger document declares no operations");
    }

    Ok(json!({
        "group": slug(title),
        "origins": [{
            "name": host,
            "base_url": format!("{scheme}://{host}{base_path}"),
            "job": jobs
        }]
    }))
}

fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_swagger() -> Value {
        json!({
            "swagger": "2.0",
            "info": { "title": "Pet Store" },
            "host": "petstore.example.com",
            "basePath": "/v2",
            "schemes": ["https"],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [
                            { "name": "limit", "in": "query" },
                            { "name": "body", "in": "body" }
                        ]
                    },
                    "post": { "operationId": "createPet" }
                },
                "/pets/{id}": {
                    "get": {}
                }
            }
        })
    }

    #[test]
    fn generates_a_job_per_operation() {
        let document = generate_group(&sample_swagger()).unwrap();
        assert_eq!(document["group"], json!("pet_store"));

        let origin = &document["origins"][0];
        assert_eq!(origin["name"], json!("petstore.example.com"));
        assert_eq!(origin["base_url"], json!("https://petstore.example.com/v2"));

        let jobs = origin["job"].as_array().unwrap();
        assert_eq!(jobs.len(), 3);

        let list = jobs.iter().find(|j| j["id"] == json!("listPets")).unwrap();
        assert_eq!(list["method"], json!("GET"));
        assert_eq!(list["params"], json!({ "limit": "" }));

        // Operations without an operationId get a synthesized one.
        assert!(jobs.iter().any(|j| j["id"] == json!("get_pets_id")));
    }

    #[test]
    fn generated_document_is_a_valid_group() {
        let document = generate_group(&sample_swagger()).unwrap();
        let group: gicli_config::Group = serde_json::from_value(document).unwrap();
        assert!(gicli_config::validate_group(&group).is_empty());
    }

    #[test]
    fn empty_documents_are_rejected() {
        assert!(generate_group(&json!({ "paths": {} })).is_err());
        assert!(generate_group(&json!({})).is_err());
    }
}
