// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dotted-path navigation over JSON values.
//!
//! Paths use `.`-separated object keys with optional bracketed array
//! indices, e.g. `data.items[0].token`. Lookups are total: an unresolvable
//! path yields `None`, never a panic.

use serde_json::Value;

/// One parsed path segment: an object key followed by zero or more array
/// indices.
#[derive(Debug, PartialEq, Eq)]
struct Segment<'a> {
    key: &'a str,
    indices: Vec<usize>,
}

fn parse_segment(raw: &str) -> Option<Segment<'_>> {
    let bracket = raw.find('[');
    let (key, rest) = match bracket {
        Some(pos) => (&raw[..pos], &raw[pos..]),
        None => (raw, ""),
    };

    let mut indices = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        let closing = remaining.find(']')?;
        if !remaining.starts_with('[') {
            return None;
        }
        let index: usize = remaining[1..closing].parse().ok()?;
        indices.push(index);
        remaining = &remaining[closing + 1..];
    }

    Some(Segment { key, indices })
}

/// Navigate `root` by a dotted path, returning the value at that location.
///
/// An empty path returns `root` itself. A leading empty key (e.g. `[0].x`)
/// indexes directly into the root value.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    let mut current = root;
    for raw in path.split('.') {
        let segment = parse_segment(raw)?;
        if !segment.key.is_empty() {
            current = current.as_object()?.get(segment.key)?;
        }
        for index in segment.indices {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

/// Coerce an object whose keys are the consecutive decimal integers
/// `"0".."n-1"` into an array in key order.
///
/// Some upstream APIs serialize arrays this way. Returns `None` for any
/// other shape, including objects with gaps or non-numeric keys.
pub fn coerce_indexed_object(value: &Value) -> Option<Vec<Value>> {
    let map = value.as_object()?;
    if map.is_empty() {
        return None;
    }

    let mut entries: Vec<(usize, &Value)> = Vec::with_capacity(map.len());
    for (key, item) in map {
        let index: usize = key.parse().ok()?;
        entries.push((index, item));
    }
    entries.sort_by_key(|(index, _)| *index);

    for (expected, (index, _)) in entries.iter().enumerate() {
        if *index != expected {
            return None;
        }
    }

    Some(entries.into_iter().map(|(_, item)| item.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_plain_keys() {
        let value = json!({ "user": { "name": "Alice" } });
        assert_eq!(lookup_path(&value, "user.name"), Some(&json!("Alice")));
    }

    #[test]
    fn resolves_bracketed_indices() {
        let value = json!({ "items": [{ "token": "Z" }, { "token": "Y" }] });
        assert_eq!(lookup_path(&value, "items[0].token"), Some(&json!("Z")));
        assert_eq!(lookup_path(&value, "items[1].token"), Some(&json!("Y")));
    }

    #[test]
    fn resolves_chained_indices() {
        let value = json!({ "grid": [[1, 2], [3, 4]] });
        assert_eq!(lookup_path(&value, "grid[1][0]"), Some(&json!(3)));
    }

    #[test]
    fn empty_path_returns_root() {
        let value = json!({ "a": 1 });
        assert_eq!(lookup_path(&value, ""), Some(&value));
    }

    #[test]
    fn unresolvable_paths_return_none() {
        let value = json!({ "a": [1] });
        assert_eq!(lookup_path(&value, "a[5]"), None);
        assert_eq!(lookup_path(&value, "b"), None);
        assert_eq!(lookup_path(&value, "a.b"), None);
        assert_eq!(lookup_path(&value, "a[x]"), None);
    }

    #[test]
    fn coerces_consecutive_integer_keys() {
        let value = json!({ "0": "a", "1": "b", "2": "c" });
        let array = coerce_indexed_object(&value).unwrap();
        assert_eq!(array, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn rejects_gapped_or_mixed_keys() {
        assert!(coerce_indexed_object(&json!({ "0": "a", "2": "b" })).is_none());
        assert!(coerce_indexed_object(&json!({ "0": "a", "x": "b" })).is_none());
        assert!(coerce_indexed_object(&json!({})).is_none());
        assert!(coerce_indexed_object(&json!([1, 2])).is_none());
    }
}
