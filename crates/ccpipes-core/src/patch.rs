// ── Patch application ──
//
// The controller describes every factory change as a jsondiffpatch delta.
// Deltas are applied to the JSON form of the snapshot, strictly in delivery
// order, and the result is decoded back into a typed `Factory` after each
// one. Anything the engine cannot apply exactly is an error: a half-applied
// snapshot is worse than a resync.

use ccpipes_api::{Factory, Patch};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{CoreError, PatchError};

/// Array delta marker: `{"_t": "a", ...}`.
const ARRAY_MARKER_KEY: &str = "_t";
const ARRAY_MARKER: &str = "a";

const OP_DELETE: u64 = 0;
const OP_TEXT_DIFF: u64 = 2;
const OP_MOVE: u64 = 3;

/// Apply `patches` to `factory` in order, returning the new snapshot.
///
/// An empty list returns an unchanged copy. On failure nothing is returned
/// and the error names the index of the offending patch.
pub fn apply_patches(factory: &Factory, patches: &[Patch]) -> Result<Factory, CoreError> {
    if patches.is_empty() {
        return Ok(factory.clone());
    }

    let mut doc = serde_json::to_value(factory)
        .map_err(|e| CoreError::Internal(format!("factory is not serializable: {e}")))?;
    let mut result = None;

    for (index, patch) in patches.iter().enumerate() {
        let decoded = apply_patch(&mut doc, patch)
            .and_then(|()| decode(&doc))
            .map_err(|source| CoreError::PatchApplication { index, source })?;
        result = Some(decoded);
    }

    result.ok_or_else(|| CoreError::Internal("no patch applied".into()))
}

/// Apply a single delta to a JSON document in place.
///
/// On error `doc` may be partially modified; callers that need atomicity
/// work on a copy (as [`apply_patches`] does).
pub fn apply_patch(doc: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    match classify(patch.as_value(), "")? {
        Delta::Add(value) | Delta::Replace(value) => {
            *doc = value.clone();
            Ok(())
        }
        Delta::Object(delta) => match doc {
            Value::Object(map) => apply_object(map, delta, ""),
            _ => Err(type_mismatch("", "an object")),
        },
        Delta::Array(delta) => match doc {
            Value::Array(items) => apply_array(items, delta, ""),
            _ => Err(type_mismatch("", "an array")),
        },
        Delta::Delete => Err(malformed("", "cannot delete the document root")),
        Delta::Move { .. } => Err(malformed("", "move outside of an array delta")),
        Delta::TextDiff => Err(text_diff("")),
    }
}

fn decode(doc: &Value) -> Result<Factory, PatchError> {
    Factory::deserialize(doc).map_err(|e| PatchError::Schema(e.to_string()))
}

// ── Delta classification ────────────────────────────────────────────

enum Delta<'a> {
    /// `[new]`
    Add(&'a Value),
    /// `[old, new]`
    Replace(&'a Value),
    /// `[old, 0, 0]`
    Delete,
    /// `["", to, 3]`, only valid under an `_i` key of an array delta.
    Move { to: usize },
    /// `[diff, 0, 2]`
    TextDiff,
    Object(&'a Map<String, Value>),
    Array(&'a Map<String, Value>),
}

fn classify<'a>(delta: &'a Value, path: &str) -> Result<Delta<'a>, PatchError> {
    match delta {
        Value::Array(parts) => match parts.as_slice() {
            [new] => Ok(Delta::Add(new)),
            [_, new] => Ok(Delta::Replace(new)),
            [_, arg, op] => match (arg.as_u64(), op.as_u64()) {
                (Some(0), Some(OP_DELETE)) => Ok(Delta::Delete),
                (Some(0), Some(OP_TEXT_DIFF)) => Ok(Delta::TextDiff),
                (Some(to), Some(OP_MOVE)) => Ok(Delta::Move {
                    to: to_index(to, path)?,
                }),
                _ => Err(malformed(path, "unknown three-element delta")),
            },
            _ => Err(malformed(
                path,
                &format!("delta array has {} elements", parts.len()),
            )),
        },
        Value::Object(map) => {
            if map.get(ARRAY_MARKER_KEY).and_then(Value::as_str) == Some(ARRAY_MARKER) {
                Ok(Delta::Array(map))
            } else {
                Ok(Delta::Object(map))
            }
        }
        _ => Err(malformed(path, "delta must be an array or an object")),
    }
}

// ── Objects ─────────────────────────────────────────────────────────

fn apply_object(
    target: &mut Map<String, Value>,
    delta: &Map<String, Value>,
    path: &str,
) -> Result<(), PatchError> {
    for (key, member) in delta {
        let member_path = child_path(path, key);
        match classify(member, &member_path)? {
            Delta::Add(value) => {
                target.insert(key.clone(), value.clone());
            }
            Delta::Replace(value) => {
                let slot = target
                    .get_mut(key)
                    .ok_or_else(|| missing(&member_path))?;
                *slot = value.clone();
            }
            Delta::Delete => {
                target.remove(key).ok_or_else(|| missing(&member_path))?;
            }
            Delta::Object(nested) => match target.get_mut(key) {
                Some(Value::Object(map)) => apply_object(map, nested, &member_path)?,
                Some(_) => return Err(type_mismatch(&member_path, "an object")),
                None => return Err(missing(&member_path)),
            },
            Delta::Array(nested) => match target.get_mut(key) {
                Some(Value::Array(items)) => apply_array(items, nested, &member_path)?,
                Some(_) => return Err(type_mismatch(&member_path, "an array")),
                None => return Err(missing(&member_path)),
            },
            Delta::Move { .. } => {
                return Err(malformed(&member_path, "move outside of an array delta"));
            }
            Delta::TextDiff => return Err(text_diff(&member_path)),
        }
    }
    Ok(())
}

// ── Arrays ──────────────────────────────────────────────────────────

/// Apply an array delta.
///
/// `_i` keys address the original array (removals and move sources), bare
/// numeric keys address the final array (insertions and modifications).
/// Removals run in descending index order, then insertions (including move
/// destinations) in ascending order, then modifications.
fn apply_array(
    items: &mut Vec<Value>,
    delta: &Map<String, Value>,
    path: &str,
) -> Result<(), PatchError> {
    let mut removals: Vec<(usize, Option<usize>)> = Vec::new();
    let mut insertions: Vec<(usize, &Value)> = Vec::new();
    let mut modifications: Vec<(usize, Delta<'_>)> = Vec::new();

    for (key, member) in delta {
        if key == ARRAY_MARKER_KEY {
            continue;
        }
        if let Some(original) = key.strip_prefix('_') {
            let index = parse_index(original, path)?;
            let member_path = child_path(path, key);
            match classify(member, &member_path)? {
                Delta::Delete => removals.push((index, None)),
                Delta::Move { to } => removals.push((index, Some(to))),
                _ => {
                    return Err(malformed(
                        &member_path,
                        "original-index entries must delete or move",
                    ));
                }
            }
        } else {
            let index = parse_index(key, path)?;
            let member_path = child_path(path, key);
            match classify(member, &member_path)? {
                Delta::Add(value) => insertions.push((index, value)),
                other => modifications.push((index, other)),
            }
        }
    }

    // Removals, highest original index first so lower indices stay valid.
    removals.sort_by(|a, b| b.0.cmp(&a.0));
    let mut moved: Vec<(usize, Value)> = Vec::new();
    for (index, move_to) in removals {
        if index >= items.len() {
            return Err(out_of_range(path, index, items.len()));
        }
        let value = items.remove(index);
        if let Some(to) = move_to {
            moved.push((to, value));
        }
    }

    // Insertions, lowest final index first.
    let mut placed: Vec<(usize, Value)> = insertions
        .into_iter()
        .map(|(index, value)| (index, value.clone()))
        .chain(moved)
        .collect();
    placed.sort_by_key(|(index, _)| *index);
    for (index, value) in placed {
        if index > items.len() {
            return Err(out_of_range(path, index, items.len()));
        }
        items.insert(index, value);
    }

    for (index, op) in modifications {
        let len = items.len();
        let element = items
            .get_mut(index)
            .ok_or_else(|| out_of_range(path, index, len))?;
        let element_path = child_path(path, &index.to_string());
        match op {
            Delta::Replace(value) => *element = value.clone(),
            Delta::Object(nested) => match element {
                Value::Object(map) => apply_object(map, nested, &element_path)?,
                _ => return Err(type_mismatch(&element_path, "an object")),
            },
            Delta::Array(nested) => match element {
                Value::Array(inner) => apply_array(inner, nested, &element_path)?,
                _ => return Err(type_mismatch(&element_path, "an array")),
            },
            Delta::TextDiff => return Err(text_diff(&element_path)),
            Delta::Add(_) | Delta::Delete | Delta::Move { .. } => {
                return Err(malformed(
                    &element_path,
                    "final-index entries must insert or modify",
                ));
            }
        }
    }

    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Extend a JSON pointer with one reference token (RFC 6901 escaping).
fn child_path(path: &str, key: &str) -> String {
    format!("{path}/{}", key.replace('~', "~0").replace('/', "~1"))
}

fn parse_index(raw: &str, path: &str) -> Result<usize, PatchError> {
    raw.parse()
        .map_err(|_| malformed(path, &format!("'{raw}' is not an array index")))
}

fn to_index(raw: u64, path: &str) -> Result<usize, PatchError> {
    usize::try_from(raw).map_err(|_| malformed(path, "array index does not fit in usize"))
}

fn missing(path: &str) -> PatchError {
    PatchError::MissingTarget {
        path: display_path(path),
    }
}

fn type_mismatch(path: &str, expected: &'static str) -> PatchError {
    PatchError::TypeMismatch {
        path: display_path(path),
        expected,
    }
}

fn out_of_range(path: &str, index: usize, len: usize) -> PatchError {
    PatchError::IndexOutOfRange {
        path: display_path(path),
        index,
        len,
    }
}

fn malformed(path: &str, reason: &str) -> PatchError {
    PatchError::Malformed {
        path: display_path(path),
        reason: reason.to_owned(),
    }
}

fn text_diff(path: &str) -> PatchError {
    PatchError::Unsupported {
        path: display_path(path),
        what: "text diffs",
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() { "/".into() } else { path.to_owned() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ccpipes_api::{GroupId, MachineId, PeriphId, PipeId, Slot};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn patch(value: Value) -> Patch {
        Patch::from(value)
    }

    fn doc_with_list(list: Value) -> Value {
        json!({ "list": list })
    }

    fn apply_to(mut doc: Value, delta: Value) -> Result<Value, PatchError> {
        apply_patch(&mut doc, &patch(delta))?;
        Ok(doc)
    }

    fn sample() -> Factory {
        serde_json::from_value(json!({
            "pipes": {},
            "machines": {
                "m1": { "id": "m1", "groups": ["g1"], "nickname": "Furnace" }
            },
            "groups": {
                "g1": { "id": "g1", "slots": [
                    { "periphId": "furnace_0", "slot": 0 },
                    { "periphId": "furnace_0", "slot": 1 }
                ] }
            },
            "missing": {},
            "available": { "chest_0": true }
        }))
        .unwrap()
    }

    // ── Objects ─────────────────────────────────────────────────────

    #[test]
    fn add_replace_and_delete_members() {
        let out = apply_to(
            json!({ "a": 1, "b": 2, "c": 3 }),
            json!({ "a": [1, 10], "b": [2, 0, 0], "d": [4] }),
        )
        .unwrap();
        assert_eq!(out, json!({ "a": 10, "c": 3, "d": 4 }));
    }

    #[test]
    fn add_overwrites_existing_member() {
        let out = apply_to(json!({ "a": 1 }), json!({ "a": [2] })).unwrap();
        assert_eq!(out, json!({ "a": 2 }));
    }

    #[test]
    fn replace_requires_existing_target() {
        let err = apply_to(json!({}), json!({ "a": [1, 2] })).unwrap_err();
        assert_eq!(err, PatchError::MissingTarget { path: "/a".into() });
    }

    #[test]
    fn delete_requires_existing_target() {
        let err = apply_to(json!({ "x": {} }), json!({ "x": { "gone": [1, 0, 0] } })).unwrap_err();
        assert_eq!(err, PatchError::MissingTarget { path: "/x/gone".into() });
    }

    #[test]
    fn nested_delta_into_scalar_is_a_type_mismatch() {
        let err = apply_to(json!({ "a": 5 }), json!({ "a": { "b": [1] } })).unwrap_err();
        assert_eq!(
            err,
            PatchError::TypeMismatch {
                path: "/a".into(),
                expected: "an object"
            }
        );
    }

    #[test]
    fn path_segments_are_escaped() {
        let err = apply_to(json!({}), json!({ "minecraft:chest/0~1": [1, 0, 0] })).unwrap_err();
        assert_eq!(
            err,
            PatchError::MissingTarget {
                path: "/minecraft:chest~10~01".into()
            }
        );
    }

    #[test]
    fn text_diffs_are_rejected() {
        let err = apply_to(json!({ "s": "abc" }), json!({ "s": ["@@ -1 +1 @@", 0, 2] })).unwrap_err();
        assert!(matches!(err, PatchError::Unsupported { .. }));
    }

    #[test]
    fn scalar_delta_is_malformed() {
        let err = apply_to(json!({ "a": 1 }), json!({ "a": 7 })).unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));
    }

    // ── Arrays ──────────────────────────────────────────────────────

    #[test]
    fn array_insert() {
        let out = apply_to(
            doc_with_list(json!(["a", "c"])),
            json!({ "list": { "_t": "a", "1": ["b"], "3": ["d"] } }),
        )
        .unwrap();
        assert_eq!(out, doc_with_list(json!(["a", "b", "c", "d"])));
    }

    #[test]
    fn array_delete_uses_original_indices() {
        let out = apply_to(
            doc_with_list(json!(["a", "b", "c", "d"])),
            json!({ "list": { "_t": "a", "_0": ["a", 0, 0], "_2": ["c", 0, 0] } }),
        )
        .unwrap();
        assert_eq!(out, doc_with_list(json!(["b", "d"])));
    }

    #[test]
    fn array_move() {
        // Move "a" from original index 0 to final index 2.
        let out = apply_to(
            doc_with_list(json!(["a", "b", "c"])),
            json!({ "list": { "_t": "a", "_0": ["", 2, 3] } }),
        )
        .unwrap();
        assert_eq!(out, doc_with_list(json!(["b", "c", "a"])));
    }

    #[test]
    fn array_modify_after_insert_uses_final_index() {
        let out = apply_to(
            doc_with_list(json!([{ "n": 1 }, { "n": 2 }])),
            json!({ "list": { "_t": "a", "0": [{ "n": 0 }], "2": { "n": [2, 20] } } }),
        )
        .unwrap();
        assert_eq!(out, doc_with_list(json!([{ "n": 0 }, { "n": 1 }, { "n": 20 }])));
    }

    #[test]
    fn array_replace_element() {
        let out = apply_to(
            doc_with_list(json!([1, 2, 3])),
            json!({ "list": { "_t": "a", "1": [2, 5] } }),
        )
        .unwrap();
        assert_eq!(out, doc_with_list(json!([1, 5, 3])));
    }

    #[test]
    fn array_delete_out_of_range() {
        let err = apply_to(
            doc_with_list(json!(["a"])),
            json!({ "list": { "_t": "a", "_3": ["x", 0, 0] } }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PatchError::IndexOutOfRange {
                path: "/list".into(),
                index: 3,
                len: 1
            }
        );
    }

    #[test]
    fn array_insert_past_end_is_out_of_range() {
        let err = apply_to(
            doc_with_list(json!([])),
            json!({ "list": { "_t": "a", "2": ["x"] } }),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::IndexOutOfRange { index: 2, len: 0, .. }));
    }

    #[test]
    fn array_delta_on_object_is_a_type_mismatch() {
        let err = apply_to(json!({ "list": {} }), json!({ "list": { "_t": "a" } })).unwrap_err();
        assert!(matches!(err, PatchError::TypeMismatch { expected: "an array", .. }));
    }

    #[test]
    fn non_numeric_array_key_is_malformed() {
        let err = apply_to(
            doc_with_list(json!([])),
            json!({ "list": { "_t": "a", "x": ["y"] } }),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));
    }

    // ── Factories ───────────────────────────────────────────────────

    #[test]
    fn empty_patch_list_is_identity() {
        let factory = sample();
        assert_eq!(apply_patches(&factory, &[]).unwrap(), factory);
    }

    #[test]
    fn apply_controller_style_patches() {
        let factory = sample();
        let patches = vec![
            // Split slot 1 into a new group g2.
            patch(json!({
                "groups": {
                    "g1": { "slots": { "_t": "a", "_1": [{ "periphId": "furnace_0", "slot": 1 }, 0, 0] } },
                    "g2": [{ "id": "g2", "slots": [{ "periphId": "furnace_0", "slot": 1 }], "nickname": "out" }]
                },
                "machines": { "m1": { "groups": { "_t": "a", "1": ["g2"] } } }
            })),
            // chest_0 gets claimed by a machine.
            patch(json!({ "available": { "chest_0": [true, 0, 0] } })),
        ];

        let next = apply_patches(&factory, &patches).unwrap();
        let m1 = next.machine(&MachineId::from("m1")).unwrap();
        assert_eq!(m1.groups, vec![GroupId::from("g1"), GroupId::from("g2")]);
        assert_eq!(
            next.group(&GroupId::from("g1")).unwrap().slots,
            vec![Slot::new("furnace_0", 0)]
        );
        assert_eq!(next.group(&GroupId::from("g2")).unwrap().name(), Some("out"));
        assert!(!next.is_available(&PeriphId::from("chest_0")));
    }

    #[test]
    fn patches_apply_in_delivery_order() {
        let factory = sample();
        let add = patch(json!({ "pipes": { "p1": [{ "id": "p1", "from": "g1", "to": "g1" }] } }));
        let rename = patch(json!({ "pipes": { "p1": { "nickname": ["loop"] } } }));

        let forward = apply_patches(&factory, &[add.clone(), rename.clone()]).unwrap();
        assert_eq!(
            forward.pipe(&PipeId::from("p1")).unwrap().nickname.as_deref(),
            Some("loop")
        );

        // Reversed, the rename has nothing to descend into.
        let err = apply_patches(&factory, &[rename, add]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PatchApplication {
                index: 0,
                source: PatchError::MissingTarget { .. }
            }
        ));
    }

    #[test]
    fn failure_reports_patch_index() {
        let factory = sample();
        let ok = patch(json!({ "missing": { "furnace_0": [true] } }));
        let bad = patch(json!({ "machines": { "m9": [{}, 0, 0] } }));

        let err = apply_patches(&factory, &[ok, bad]).unwrap_err();
        let CoreError::PatchApplication { index, source } = err else {
            panic!("expected PatchApplication, got {err:?}");
        };
        assert_eq!(index, 1);
        assert_eq!(source, PatchError::MissingTarget { path: "/machines/m9".into() });
    }

    #[test]
    fn schema_violation_is_rejected() {
        let factory = sample();
        let bad = patch(json!({ "machines": { "m1": { "groups": [["g1"], "not-a-list"] } } }));
        let err = apply_patches(&factory, &[bad]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PatchApplication {
                index: 0,
                source: PatchError::Schema(_)
            }
        ));
    }
}
