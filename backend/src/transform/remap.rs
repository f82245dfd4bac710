//! Dataset renaming before rendering.

use std::collections::BTreeMap;

use crate::models::RenderContext;

/// Rename the datasets listed in `mapping`, keep the others.
///
/// No collision check: when a renamed dataset lands on an existing name, the
/// one iterated last wins.
pub fn remap_keys(context: RenderContext, mapping: &BTreeMap<String, String>) -> RenderContext {
    if mapping.is_empty() {
        return context;
    }
    context
        .into_iter()
        .map(|(key, value)| match mapping.get(&key) {
            Some(renamed) => (renamed.clone(), value),
            None => (key, value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remap_renames_listed_keys() {
        let mut ctx = RenderContext::new();
        ctx.insert("Sheet1_products".into(), json!([1]));
        ctx.insert("groups".into(), json!([2]));

        let mapping = BTreeMap::from([("Sheet1_products".to_string(), "articles".to_string())]);
        let out = remap_keys(ctx, &mapping);

        assert_eq!(out.get("articles"), Some(&json!([1])));
        assert_eq!(out.get("groups"), Some(&json!([2])));
        assert!(!out.contains_key("Sheet1_products"));
    }

    #[test]
    fn test_remap_collision_overwrites() {
        let mut ctx = RenderContext::new();
        ctx.insert("a".into(), json!("from a"));
        ctx.insert("b".into(), json!("from b"));

        let mapping = BTreeMap::from([("a".to_string(), "b".to_string())]);
        let out = remap_keys(ctx, &mapping);

        assert_eq!(out.len(), 1);
        assert!(out.contains_key("b"));
    }
}
