//! Structural helpers over `serde_json::Value`: flattening, path get/set and
//! empty-container pruning.
//!
//! Array positions are stable. A slot removed from an array is written back as
//! `null`, so sibling indices keep pointing at the same elements.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{AclError, Result};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Fails unless `value` is an object or an array.
///
/// # Errors
/// Returns `AclError::InvalidInput` for `null` and scalar values.
pub fn ensure_container(value: &Value) -> Result<()> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(()),
        Value::Null => Err(AclError::InvalidInput(
            "expected an object or an array, got null".to_owned(),
        )),
        other => Err(AclError::InvalidInput(format!(
            "expected an object or an array, got '{other}'"
        ))),
    }
}

/// Flattens `value` into a sorted map from dot path to the value at that path.
///
/// Every container gets an entry next to its descendants, so `{"a":{"b":1}}`
/// yields both `a` and `a.b`.
///
/// # Errors
/// Returns `AclError::InvalidInput` if `value` is not a container.
pub fn flatten(value: &Value) -> Result<BTreeMap<String, &Value>> {
    ensure_container(value)?;
    let mut out = BTreeMap::new();
    flatten_into("", value, &mut out);
    Ok(out)
}

fn flatten_into<'a>(prefix: &str, value: &'a Value, out: &mut BTreeMap<String, &'a Value>) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                let path = join(prefix, key);
                flatten_into(&path, child, out);
                out.insert(path, child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let path = join(prefix, &index.to_string());
                flatten_into(&path, child, out);
                out.insert(path, child);
            }
        }
        _ => {}
    }
}

/// Looks up the value at a dot path. Numeric segments index arrays.
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(PATH_SEPARATOR)
        .try_fold(value, |cursor, segment| match cursor {
            Value::Object(fields) => fields.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Writes `new_value` at a dot path, creating missing intermediate containers.
///
/// A missing intermediate becomes an array when the following segment is
/// numeric and an object otherwise. `None` removes the slot: the key is
/// dropped from an object, an array element becomes a `null` hole.
///
/// # Errors
/// Returns `AclError::InvalidInput` if `target` is not a container, if the
/// path runs through a scalar, if a non-numeric segment indexes an array, or
/// if an index lies too far past the end of its array.
pub fn set_by_path(target: &mut Value, path: &str, new_value: Option<Value>) -> Result<()> {
    ensure_container(target)?;
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(AclError::InvalidInput("empty path".to_owned()));
    };

    let mut cursor = target;
    for (position, segment) in parents.iter().enumerate() {
        let next_is_index = segments
            .get(position + 1)
            .is_some_and(|next| is_index(next));
        cursor = child_mut(cursor, segment, next_is_index, path)?;
    }

    match cursor {
        Value::Object(fields) => {
            match new_value {
                Some(v) => {
                    fields.insert((*last).to_owned(), v);
                }
                None => {
                    fields.remove(*last);
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            match new_value {
                Some(v) => {
                    grow_to(items, index, path)?;
                    items[index] = v;
                }
                None => {
                    if let Some(slot) = items.get_mut(index) {
                        *slot = Value::Null;
                    }
                }
            }
            Ok(())
        }
        _ => Err(through_scalar(path)),
    }
}

fn child_mut<'a>(
    cursor: &'a mut Value,
    segment: &str,
    next_is_index: bool,
    path: &str,
) -> Result<&'a mut Value> {
    let slot = match cursor {
        Value::Object(fields) => fields.entry(segment.to_owned()).or_insert(Value::Null),
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            grow_to(items, index, path)?;
            &mut items[index]
        }
        _ => return Err(through_scalar(path)),
    };
    if slot.is_null() {
        *slot = if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    if slot.is_object() || slot.is_array() {
        Ok(slot)
    } else {
        Err(through_scalar(path))
    }
}

/// Returns a copy of `value` without empty objects.
///
/// Containers that become empty once their empty children are gone are
/// dropped too. Arrays that were empty in the input are data and stay; an
/// array whose every element was pruned is dropped. Falsy scalars (`0`,
/// `false`, `""`, `null`) are kept.
///
/// # Errors
/// Returns `AclError::InvalidInput` if `value` is not a container.
pub fn prune_empty_containers(value: &Value) -> Result<Value> {
    ensure_container(value)?;
    Ok(redact(value, &|_| false))
}

/// Copies `value` leaving out every path `is_removed` accepts, then prunes
/// what became empty. The top-level container always survives.
#[must_use]
pub fn redact(value: &Value, is_removed: &dyn Fn(&str) -> bool) -> Value {
    prune_at(value, "", is_removed).unwrap_or_else(|| match value {
        Value::Array(_) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    })
}

fn prune_at(value: &Value, path: &str, is_removed: &dyn Fn(&str) -> bool) -> Option<Value> {
    if !path.is_empty() && is_removed(path) {
        return None;
    }
    match value {
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .iter()
                .filter_map(|(key, child)| {
                    prune_at(child, &join(path, key), is_removed).map(|v| (key.clone(), v))
                })
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        Value::Array(items) if items.is_empty() => Some(Value::Array(Vec::new())),
        Value::Array(items) => {
            let mut survived = false;
            let mut kept = Vec::with_capacity(items.len());
            for (index, child) in items.iter().enumerate() {
                match prune_at(child, &join(path, &index.to_string()), is_removed) {
                    Some(v) => {
                        survived = true;
                        kept.push(v);
                    }
                    None => kept.push(Value::Null),
                }
            }
            survived.then_some(Value::Array(kept))
        }
        leaf => Some(leaf.clone()),
    }
}

/// Parent of a dot path, `None` for a single segment.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once(PATH_SEPARATOR).map(|(parent, _)| parent)
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_owned()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{segment}")
    }
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn parse_index(segment: &str, path: &str) -> Result<usize> {
    if !is_index(segment) {
        return Err(AclError::InvalidInput(format!(
            "segment '{segment}' of '{path}' does not index an array"
        )));
    }
    segment.parse().map_err(|_| {
        AclError::InvalidInput(format!("segment '{segment}' of '{path}' is out of range"))
    })
}

/// Upper bound on the `null` slots a single write may add to an array.
const MAX_ARRAY_PADDING: usize = 1 << 16;

fn grow_to(items: &mut Vec<Value>, index: usize, path: &str) -> Result<()> {
    if index < items.len() {
        return Ok(());
    }
    let len = index
        .checked_add(1)
        .filter(|len| len - items.len() <= MAX_ARRAY_PADDING)
        .ok_or_else(|| {
            AclError::InvalidInput(format!(
                "index {index} of '{path}' is too far past the end of the array"
            ))
        })?;
    items.resize(len, Value::Null);
    Ok(())
}

fn through_scalar(path: &str) -> AclError {
    AclError::InvalidInput(format!("cannot write '{path}' through a scalar value"))
}
