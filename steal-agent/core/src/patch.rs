//! Computes RFC 6902 JSON patches between two versions of an object.

use anyhow::{Context, Result};
use json_patch::Patch;
use serde::Serialize;

/// Returns the patch that transforms `original` into `modified`.
pub fn diff<T: Serialize>(original: &T, modified: &T) -> Result<Patch> {
    let original = serde_json::to_value(original).context("failed to serialize original object")?;
    let modified = serde_json::to_value(modified).context("failed to serialize modified object")?;
    Ok(json_patch::diff(&original, &modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn apply(doc: &Value, patch: &Patch) -> Value {
        let mut doc = doc.clone();
        json_patch::patch(&mut doc, &patch.0).expect("patch must apply");
        doc
    }

    fn ops(patch: &Patch) -> Vec<Value> {
        let mut ops = patch
            .0
            .iter()
            .map(|op| serde_json::to_value(op).unwrap())
            .collect::<Vec<_>>();
        ops.sort_by_key(|op| op["path"].as_str().unwrap_or_default().to_string());
        ops
    }

    #[test]
    fn identical_documents_produce_no_ops() {
        let doc = json!({ "metadata": { "name": "web" }, "spec": { "containers": [] } });
        let patch = diff(&doc, &doc).unwrap();
        assert!(patch.0.is_empty());
    }

    #[test]
    fn adds_missing_parent_whole() {
        let original = json!({ "metadata": { "name": "web" }, "spec": {} });
        let modified = json!({
            "metadata": { "name": "web", "labels": { "pod-stolen": "true" } },
            "spec": { "nodeSelector": { "node-id": "n1", "node-stolen": "true" } },
        });

        let patch = diff(&original, &modified).unwrap();
        assert_eq!(
            ops(&patch),
            vec![
                json!({ "op": "add", "path": "/metadata/labels", "value": { "pod-stolen": "true" } }),
                json!({
                    "op": "add",
                    "path": "/spec/nodeSelector",
                    "value": { "node-id": "n1", "node-stolen": "true" },
                }),
            ]
        );
        assert_eq!(apply(&original, &patch), modified);
    }

    #[test]
    fn inserts_into_existing_map() {
        let original = json!({ "metadata": { "labels": { "app": "web" } } });
        let modified = json!({ "metadata": { "labels": { "app": "web", "pod-stolen": "true" } } });

        let patch = diff(&original, &modified).unwrap();
        assert_eq!(
            ops(&patch),
            vec![json!({ "op": "add", "path": "/metadata/labels/pod-stolen", "value": "true" })]
        );
        assert_eq!(apply(&original, &patch), modified);
    }

    #[test]
    fn rewrites_existing_selector() {
        let original = json!({ "spec": { "nodeSelector": { "zone": "a", "node-id": "old" } } });
        let modified = json!({ "spec": { "nodeSelector": { "node-id": "new", "node-stolen": "true" } } });

        let patch = diff(&original, &modified).unwrap();
        assert_eq!(
            ops(&patch),
            vec![
                json!({ "op": "replace", "path": "/spec/nodeSelector/node-id", "value": "new" }),
                json!({ "op": "add", "path": "/spec/nodeSelector/node-stolen", "value": "true" }),
                json!({ "op": "remove", "path": "/spec/nodeSelector/zone" }),
            ]
        );
        assert_eq!(apply(&original, &patch), modified);
    }

    #[test]
    fn escapes_pointer_tokens() {
        let original = json!({ "metadata": { "labels": {} } });
        let modified = json!({ "metadata": { "labels": { "example.com/a~b": "x" } } });

        let patch = diff(&original, &modified).unwrap();
        assert_eq!(
            ops(&patch),
            vec![json!({ "op": "add", "path": "/metadata/labels/example.com~1a~0b", "value": "x" })]
        );
        assert_eq!(apply(&original, &patch), modified);
    }

    #[test]
    fn converges_on_arrays_and_scalars() {
        let original = json!({ "a": [1, 2, 3], "b": "x", "c": { "d": 1 } });
        let modified = json!({ "a": [3], "b": 7, "c": null });

        let patch = diff(&original, &modified).unwrap();
        assert_eq!(apply(&original, &patch), modified);
    }

    #[test]
    fn serialization_failures_are_errors() {
        use std::collections::BTreeMap;

        // JSON object keys must be strings.
        let original = BTreeMap::from([((1, 2), "a")]);
        let modified = BTreeMap::from([((3, 4), "b")]);
        let error = diff(&original, &modified).expect_err("tuple keys cannot be serialized");
        assert!(error.to_string().contains("serialize"), "{error}");
    }
}
