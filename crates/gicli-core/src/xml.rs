// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! XML response parsing for jobs declaring `response_format = xml`.
//!
//! Converts an XML document into a JSON value so XML payloads participate
//! in `data_path` selection and template paths like JSON ones:
//! - attributes become `@name` keys
//! - repeated child elements collapse into arrays
//! - text-only elements become their text
//! - mixed content keeps its text under `#text`

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Parse an XML document into a JSON value keyed by the root element name.
pub fn xml_to_value(xml: &str) -> Result<Value, CoreError> {
    let document = roxmltree::Document::parse(xml).map_err(|e| CoreError::HttpTransport {
        status: None,
        reason: format!("failed to parse XML response: {e}"),
    })?;

    let root = document.root_element();
    let mut wrapper = Map::new();
    wrapper.insert(root.tag_name().name().to_string(), element_to_value(&root));
    Ok(Value::Object(wrapper))
}

fn element_to_value(node: &roxmltree::Node<'_, '_>) -> Value {
    let mut map = Map::new();

    for attribute in node.attributes() {
        map.insert(
            format!("@{}", attribute.name()),
            Value::String(attribute.value().to_string()),
        );
    }

    let mut text_content = String::new();
    for child in node.children() {
        match child.node_type() {
            roxmltree::NodeType::Element => {
                let name = child.tag_name().name().to_string();
                let value = element_to_value(&child);
                match map.remove(&name) {
                    Some(Value::Array(mut items)) => {
                        items.push(value);
                        map.insert(name, Value::Array(items));
                    }
                    Some(existing) => {
                        map.insert(name, Value::Array(vec![existing, value]));
                    }
                    None => {
                        map.insert(name, value);
                    }
                }
            }
            roxmltree::NodeType::Text => {
                if let Some(text) = child.text() {
                    text_content.push_str(text);
                }
            }
            _ => {}
        }
    }

    let trimmed = text_content.trim();
    if map.is_empty() {
        return Value::String(trimmed.to_string());
    }
    if !trimmed.is_empty() {
        map.insert("#text".to_string(), Value::String(trimmed.to_string()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_elements() {
        let value = xml_to_value("<user><name>Alice</name><age>30</age></user>").unwrap();
        assert_eq!(
            value,
            json!({ "user": { "name": "Alice", "age": "30" } })
        );
    }

    #[test]
    fn repeated_elements_become_arrays() {
        let value =
            xml_to_value("<list><item>a</item><item>b</item><item>c</item></list>").unwrap();
        assert_eq!(value, json!({ "list": { "item": ["a", "b", "c"] } }));
    }

    #[test]
    fn attributes_are_prefixed() {
        let value = xml_to_value(r#"<row id="7"><name>x</name></row>"#).unwrap();
        assert_eq!(value, json!({ "row": { "@id": "7", "name": "x" } }));
    }

    #[test]
    fn text_only_root_is_a_string() {
        let value = xml_to_value("<message>hello</message>").unwrap();
        assert_eq!(value, json!({ "message": "hello" }));
    }

    #[test]
    fn converted_values_support_path_lookup() {
        let value = xml_to_value(
            "<response><data><item><id>1</id></item><item><id>2</id></item></data></response>",
        )
        .unwrap();
        let found = gicli_config::lookup_path(&value, "response.data.item[1].id").unwrap();
        assert_eq!(found, &json!("2"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(xml_to_value("<open>").is_err());
    }
}
