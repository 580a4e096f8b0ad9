//! Conversions between flat path-keyed maps and nested JSON trees.
//!
//! The configuration API answers with a flat map of
//! `"Audio.Input.Microphone[1].Level" -> { "value": .. }` entries, while the
//! status API answers with a tree rooted at the top-level path segment.

use crate::path::segments;
use serde_json::{Map, Value};

/// Build a nested tree from a flat configuration map.
///
/// Each entry's `value` field becomes a leaf. List segments such as
/// `Microphone[1]` become arrays of objects carrying the index as `id`.
#[must_use]
pub fn to_tree(items: &Map<String, Value>) -> Value {
    let mut entries: Vec<(&String, &Value)> = items.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut tree = Map::new();
    for (key, item) in entries {
        let value = item.get("value").cloned().unwrap_or(Value::Null);
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        insert_branch(&mut tree, &parts, value);
    }

    Value::Object(tree)
}

fn insert_branch(node: &mut Map<String, Value>, parts: &[&str], value: Value) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };

    if let Some((name, index)) = parse_list_segment(head) {
        let entry = node
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        let Value::Array(list) = entry else {
            return;
        };

        let position = list
            .iter()
            .position(|item| item.get("id").and_then(Value::as_str) == Some(index))
            .unwrap_or_else(|| {
                let mut item = Map::new();
                item.insert("id".to_string(), Value::String(index.to_string()));
                list.push(Value::Object(item));
                list.len() - 1
            });

        if let Some(Value::Object(item)) = list.get_mut(position) {
            if rest.is_empty() {
                item.insert("value".to_string(), value);
            } else {
                insert_branch(item, rest, value);
            }
        }
    } else if rest.is_empty() {
        node.insert((*head).to_string(), value);
    } else {
        let child = node
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        if let Value::Object(child) = child {
            insert_branch(child, rest, value);
        }
    }
}

/// Split `Name[3]` into `("Name", "3")`.
fn parse_list_segment(segment: &str) -> Option<(&str, &str)> {
    let open = segment.find('[')?;
    let inner = segment.strip_suffix(']')?.get(open + 1..)?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&segment[..open], inner))
}

/// Descend into `tree` along `path`, skipping wildcard segments.
///
/// Returns `None` when a segment is absent.
#[must_use]
pub fn remove_path<'a>(path: &str, tree: &'a Value) -> Option<&'a Value> {
    segments(path)
        .iter()
        .filter(|segment| segment.as_str() != "*")
        .try_fold(tree, |node, segment| node.get(segment.as_str()))
}

/// Whether a JSON value is absent or an empty object/array.
#[must_use]
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn flat_config_becomes_tree() {
        let tree = to_tree(&items(json!({
            "Audio.DefaultVolume": { "value": 33 },
            "Audio.Ultrasound.MaxVolume": { "value": 70, "source": "default" }
        })));

        assert_eq!(
            tree,
            json!({ "Audio": { "DefaultVolume": 33, "Ultrasound": { "MaxVolume": 70 } } })
        );
    }

    #[test]
    fn list_segments_become_arrays() {
        let tree = to_tree(&items(json!({
            "Audio.Input.Microphone[1].Level": { "value": 5 },
            "Audio.Input.Microphone[1].Mode": { "value": "On" },
            "Audio.Input.Microphone[2].Level": { "value": 7 }
        })));

        assert_eq!(
            tree,
            json!({ "Audio": { "Input": { "Microphone": [
                { "id": "1", "Level": 5, "Mode": "On" },
                { "id": "2", "Level": 7 }
            ] } } })
        );
    }

    #[test]
    fn list_leaf_keeps_value() {
        let tree = to_tree(&items(json!({ "Video.Presets[3]": { "value": "Home" } })));
        assert_eq!(tree, json!({ "Video": { "Presets": [{ "id": "3", "value": "Home" }] } }));
    }

    #[test]
    fn remove_path_descends() {
        let tree = json!({ "Audio": { "Volume": 50, "Microphones": { "Mute": "Off" } } });

        assert_eq!(remove_path("Audio.Volume", &tree), Some(&json!(50)));
        assert_eq!(
            remove_path("Audio Microphones", &tree),
            Some(&json!({ "Mute": "Off" }))
        );
        assert_eq!(remove_path("Audio.*", &tree), tree.get("Audio"));
        assert_eq!(remove_path("Video.Input", &tree), None);
    }

    #[test]
    fn list_segment_parsing() {
        assert_eq!(parse_list_segment("Microphone[12]"), Some(("Microphone", "12")));
        assert_eq!(parse_list_segment("Microphone"), None);
        assert_eq!(parse_list_segment("Microphone[x]"), None);
        assert_eq!(parse_list_segment("Microphone[]"), None);
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(&json!(null)));
        assert!(is_empty(&json!({})));
        assert!(is_empty(&json!([])));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!({ "a": 1 })));
    }
}
