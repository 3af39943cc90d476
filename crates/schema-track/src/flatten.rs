//! Payload flattening.
//!
//! Collapses a nested JSON event into the flat dot-path form the rest of
//! the engine works on: `{"properties": {"label": "x"}}` becomes
//! `properties.label`, array elements get their zero-based index as a path
//! segment (`properties.testArray.0.id`). Empty objects and arrays
//! contribute no paths. A produced path has at most `max_depth` segments.

use eventshape_core::FlatEvent;
use serde_json::Value;

use crate::errors::TrackError;

/// Flatten one raw event payload.
///
/// The payload must be a JSON object. Exceeding `max_depth` nested
/// containers, or two leaves flattening to the same path, rejects the
/// whole event.
pub fn flatten_payload(
    payload: &Value,
    max_depth: usize,
) -> Result<FlatEvent, TrackError> {
    if !payload.is_object() {
        return Err(TrackError::NotAnObject);
    }

    let mut out = FlatEvent::new();
    flatten_into("", payload, 0, max_depth, &mut out)?;
    Ok(out)
}

/// Depth-first walk. `depth` counts the containers already entered; the
/// top-level object enters at zero.
fn flatten_into(
    prefix: &str,
    value: &Value,
    depth: usize,
    max_depth: usize,
    out: &mut FlatEvent,
) -> Result<(), TrackError> {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                return Ok(());
            }
            if depth >= max_depth {
                return Err(TrackError::DepthExceeded(max_depth));
            }
            for (key, child) in map {
                let path = join_path(prefix, key);
                flatten_into(&path, child, depth + 1, max_depth, out)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(());
            }
            if depth >= max_depth {
                return Err(TrackError::DepthExceeded(max_depth));
            }
            for (i, child) in items.iter().enumerate() {
                let path = format!("{prefix}.{i}");
                flatten_into(&path, child, depth + 1, max_depth, out)?;
            }
            Ok(())
        }
        leaf => {
            if out.insert(prefix.to_string(), leaf.clone()).is_some() {
                return Err(TrackError::PathCollision(prefix.to_string()));
            }
            Ok(())
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects_and_arrays() {
        let payload = json!({
            "event": "Demo Track",
            "properties": {
                "label": "Demo Label",
                "value": 5,
                "testMap": {"t1": "a", "t2": 4},
                "testArray": [
                    {"id": "elem1", "value": "e1"},
                    {"id": "elem2", "value": "e2"}
                ]
            }
        });

        let flat = flatten_payload(&payload, 10).unwrap();

        assert_eq!(flat["event"], json!("Demo Track"));
        assert_eq!(flat["properties.label"], json!("Demo Label"));
        assert_eq!(flat["properties.value"], json!(5));
        assert_eq!(flat["properties.testMap.t1"], json!("a"));
        assert_eq!(flat["properties.testMap.t2"], json!(4));
        assert_eq!(flat["properties.testArray.0.id"], json!("elem1"));
        assert_eq!(flat["properties.testArray.1.value"], json!("e2"));
        assert_eq!(flat.len(), 9);
    }

    #[test]
    fn empty_containers_contribute_no_paths() {
        let payload = json!({
            "event": "x",
            "empty_map": {},
            "empty_list": [],
            "nested": {"also_empty": {}}
        });

        let flat = flatten_payload(&payload, 10).unwrap();
        assert_eq!(flat.len(), 1);
        assert!(flat.contains_key("event"));
    }

    #[test]
    fn keeps_null_and_boolean_leaves() {
        let payload = json!({"a": null, "b": true});
        let flat = flatten_payload(&payload, 10).unwrap();
        assert_eq!(flat["a"], Value::Null);
        assert_eq!(flat["b"], json!(true));
    }

    #[test]
    fn rejects_non_object_payloads() {
        for payload in [json!([1, 2]), json!("event"), json!(5), json!(null)] {
            assert_eq!(
                flatten_payload(&payload, 10),
                Err(TrackError::NotAnObject)
            );
        }
    }

    #[test]
    fn rejects_payloads_nested_too_deep() {
        let payload = json!({"a": {"b": {"c": 1}}});

        assert!(flatten_payload(&payload, 10).is_ok());
        assert_eq!(
            flatten_payload(&payload, 2),
            Err(TrackError::DepthExceeded(2))
        );
    }

    #[test]
    fn deep_but_empty_containers_are_fine() {
        let payload = json!({"a": {"b": {}}});
        let flat = flatten_payload(&payload, 2).unwrap();
        assert!(flat.is_empty());
    }

    #[test]
    fn rejects_colliding_paths() {
        let payload = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(
            flatten_payload(&payload, 10),
            Err(TrackError::PathCollision("a.b".into()))
        );
    }
}
