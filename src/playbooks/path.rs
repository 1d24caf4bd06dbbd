//! Dotted-path traversal over a JSON value, shared by precondition evaluation (§4.7)
//! and the deterministic playbook generator's fallback lookups (§4.9).

use serde_json::Value as JsonValue;

pub fn get_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(root, |node, segment| node.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn traverses_nested_objects() {
        let value = json!({"alert": {"details": {"features": {"vt_positives": 67}}}});
        assert_eq!(get_path(&value, "alert.details.features.vt_positives"), Some(&json!(67)));
    }

    #[test]
    fn missing_segment_yields_none() {
        let value = json!({"alert": {"severity": "high"}});
        assert_eq!(get_path(&value, "alert.score"), None);
    }
}
