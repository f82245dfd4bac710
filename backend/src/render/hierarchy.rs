//! Category hierarchy resolution for catalog templates.
//!
//! Given articles referencing leaf groups and the group tree, returns every
//! group id that has at least one article below it, so empty categories can
//! be left out of the output.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Upper bound on parent hops from a leaf, protects against cyclic data.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("'{0}' must be a list of records")]
    NotARecordList(&'static str),
}

/// Column names used to read the group tree and the articles.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HierarchyColumns {
    pub structure: String,
    pub group_id: String,
    pub parent_id: String,
    pub catalog_group_id: String,
}

impl Default for HierarchyColumns {
    fn default() -> Self {
        Self {
            structure: "CATALOG_STRUCTURE".to_string(),
            group_id: "GROUP_ID".to_string(),
            parent_id: "PARENT_ID".to_string(),
            catalog_group_id: "CATALOG_GROUP_ID".to_string(),
        }
    }
}

/// Canonical form of an id: `0`, `"0"` and `0.0` are the same group.
/// Null and blank ids are absent.
pub fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn records<'a>(value: &'a Value, name: &'static str) -> Result<Vec<&'a Map<String, Value>>, HierarchyError> {
    value
        .as_array()
        .ok_or(HierarchyError::NotARecordList(name))
        .map(|items| items.iter().filter_map(Value::as_object).collect())
}

fn structure_of<'a>(group: &'a Map<String, Value>, columns: &HierarchyColumns) -> &'a str {
    group
        .get(&columns.structure)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("")
}

/// Group ids (leaves and all their ancestors) that contain articles.
///
/// Articles reference groups through `catalog_group_id`, possibly several per
/// article joined by `delimiter`. Only referenced groups tagged `leaf` count.
/// From each leaf, parents are collected until the parent is `0`, the
/// current group is the `root`, the parent is blank or unknown, or a cycle
/// or [`MAX_DEPTH`] is hit.
///
/// Ids keep their original JSON type; the result is sorted by canonical id.
pub fn groups_with_articles(
    articles: &Value,
    groups: &Value,
    delimiter: &str,
    columns: &HierarchyColumns,
) -> Result<Vec<Value>, HierarchyError> {
    let articles = records(articles, "articles")?;
    let groups = records(groups, "groups")?;

    let mut by_id: HashMap<String, &Map<String, Value>> = HashMap::new();
    for group in &groups {
        if let Some(key) = group.get(&columns.group_id).and_then(id_key) {
            by_id.entry(key).or_insert(*group);
        }
    }

    let mut referenced: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for article in &articles {
        let Some(raw) = article.get(&columns.catalog_group_id) else {
            continue;
        };
        let joined = match raw {
            Value::String(s) => s.clone(),
            other => id_key(other).unwrap_or_default(),
        };
        let parts: Vec<&str> = if delimiter.is_empty() {
            vec![joined.as_str()]
        } else {
            joined.split(delimiter).collect()
        };
        for part in parts {
            let part = part.trim();
            if !part.is_empty() && seen.insert(part.to_string()) {
                referenced.push(part.to_string());
            }
        }
    }

    let mut found: BTreeMap<String, Value> = BTreeMap::new();
    for leaf_key in &referenced {
        let Some(leaf) = by_id.get(leaf_key) else {
            continue;
        };
        if structure_of(leaf, columns) != "leaf" {
            continue;
        }
        if let Some(id) = leaf.get(&columns.group_id) {
            found.entry(leaf_key.clone()).or_insert_with(|| id.clone());
        }

        let mut visited: HashSet<String> = HashSet::from([leaf_key.clone()]);
        let mut current = *leaf;
        for _ in 0..MAX_DEPTH {
            let Some(parent) = current.get(&columns.parent_id) else {
                break;
            };
            let Some(parent_key) = id_key(parent) else {
                break;
            };
            found
                .entry(parent_key.clone())
                .or_insert_with(|| parent.clone());

            if parent_key == "0" || structure_of(current, columns) == "root" {
                break;
            }
            if !visited.insert(parent_key.clone()) {
                break;
            }
            match by_id.get(&parent_key) {
                Some(next) => current = *next,
                None => break,
            }
        }
    }

    Ok(found.into_values().collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A small BMEcat-like tree:
    ///
    /// ```text
    /// 0 (root)
    /// ├── 1 (leaf)
    /// ├── 2 ── 201 ── 201201 (leaf)
    /// │    ├── 202, 203, 204 (leaves)
    /// ├── 3 ── 301, 302, 303 (leaves)
    /// └── 4 ── 401 (leaf, no article)
    /// ```
    pub(crate) fn fixture_groups() -> Value {
        let rows = [
            ("0", "", "root"),
            ("1", "0", "leaf"),
            ("2", "0", "node"),
            ("3", "0", "node"),
            ("4", "0", "node"),
            ("201", "2", "node"),
            ("201201", "201", "leaf"),
            ("202", "2", "leaf"),
            ("203", "2", "leaf"),
            ("204", "2", "leaf"),
            ("301", "3", "leaf"),
            ("302", "3", "leaf"),
            ("303", "3", "leaf"),
            ("401", "4", "leaf"),
        ];
        Value::Array(
            rows.iter()
                .map(|(id, parent, structure)| {
                    json!({"GROUP_ID": id, "PARENT_ID": parent, "CATALOG_STRUCTURE": structure})
                })
                .collect(),
        )
    }

    pub(crate) fn fixture_articles() -> Value {
        json!([
            {"SKU": "A1", "CATALOG_GROUP_ID": "1"},
            {"SKU": "A2", "CATALOG_GROUP_ID": "201201,202"},
            {"SKU": "A3", "CATALOG_GROUP_ID": "203"},
            {"SKU": "A4", "CATALOG_GROUP_ID": "301,302,303"},
            {"SKU": "A5", "CATALOG_GROUP_ID": "999"},
            {"SKU": "A6", "CATALOG_GROUP_ID": "2"},
        ])
    }

    fn keys(values: &[Value]) -> Vec<String> {
        values.iter().filter_map(id_key).collect()
    }

    #[test]
    fn test_fixture_groups_with_articles() {
        let result = groups_with_articles(
            &fixture_articles(),
            &fixture_groups(),
            ",",
            &HierarchyColumns::default(),
        )
        .unwrap();

        let mut got = keys(&result);
        got.sort();
        let mut expected: Vec<String> = ["0", "1", "2", "3", "201", "202", "203", "301", "302", "303", "201201"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_numeric_ids_keep_their_type() {
        let groups = json!([
            {"GROUP_ID": 0, "PARENT_ID": null, "CATALOG_STRUCTURE": "root"},
            {"GROUP_ID": 10, "PARENT_ID": 0, "CATALOG_STRUCTURE": "leaf"},
        ]);
        let articles = json!([{"CATALOG_GROUP_ID": "10"}]);
        let result =
            groups_with_articles(&articles, &groups, ",", &HierarchyColumns::default()).unwrap();

        assert_eq!(result, vec![json!(0), json!(10)]);
    }

    #[test]
    fn test_cycle_terminates() {
        let groups = json!([
            {"GROUP_ID": "a", "PARENT_ID": "b", "CATALOG_STRUCTURE": "leaf"},
            {"GROUP_ID": "b", "PARENT_ID": "c", "CATALOG_STRUCTURE": "node"},
            {"GROUP_ID": "c", "PARENT_ID": "b", "CATALOG_STRUCTURE": "node"},
        ]);
        let articles = json!([{"CATALOG_GROUP_ID": "a"}]);
        let result =
            groups_with_articles(&articles, &groups, ",", &HierarchyColumns::default()).unwrap();

        assert_eq!(keys(&result), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_custom_columns_and_delimiter() {
        let columns = HierarchyColumns {
            structure: "type".into(),
            group_id: "id".into(),
            parent_id: "parent".into(),
            catalog_group_id: "groups".into(),
        };
        let groups = json!([
            {"id": "r", "parent": "", "type": "root"},
            {"id": "x", "parent": "r", "type": "leaf"},
        ]);
        let articles = json!([{"groups": "x|nope"}]);
        let result = groups_with_articles(&articles, &groups, "|", &columns).unwrap();

        assert_eq!(keys(&result), vec!["r", "x"]);
    }

    #[test]
    fn test_rejects_non_lists() {
        let err = groups_with_articles(&json!({}), &json!([]), ",", &HierarchyColumns::default())
            .unwrap_err();
        assert!(err.to_string().contains("articles"));
    }
}
