//! Data tree navigation over `serde_json::Value`.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::keypath::{Keypath, Segment};

/// Read the value at `keypath`. `None` when any segment along the way is
/// missing. A trailing `length` on an array yields its length.
pub fn lookup(root: &Value, keypath: &Keypath) -> Option<Value> {
    let mut current = root;
    let segments = keypath.segments();

    for (i, segment) in segments.iter().enumerate() {
        current = match (current, segment) {
            (Value::Object(map), segment) => map.get(&segment.as_key())?,
            (Value::Array(items), Segment::Index(index)) => items.get(*index)?,
            (Value::Array(items), Segment::Key(key)) if key == "length" && i + 1 == segments.len() => {
                return Some(Value::from(items.len()));
            }
            (Value::String(s), Segment::Key(key)) if key == "length" && i + 1 == segments.len() => {
                return Some(Value::from(s.chars().count()));
            }
            _ => return None,
        };
    }

    Some(current.clone())
}

/// Write `value` at `keypath`, creating intermediate containers as needed.
/// Returns `false` when the stored value was already equal.
///
/// A named key under an array fails with [`Error::NotAnObject`] and leaves
/// the array untouched. Writing an array's `length` is handled by the
/// viewmodel as a splice and never reaches here.
pub fn assign(root: &mut Value, keypath: &Keypath, value: Value) -> Result<bool> {
    let Some((last, parents)) = keypath.segments().split_last() else {
        if *root == value {
            return Ok(false);
        }
        *root = value;
        return Ok(true);
    };

    let mut current = root;
    for (i, segment) in parents.iter().enumerate() {
        let next_is_index = matches!(keypath.segments()[i + 1], Segment::Index(_));
        current = child_or_create(current, segment, next_is_index, keypath)?;
    }

    match (current, last) {
        (Value::Array(items), Segment::Index(index)) => {
            if let Some(slot) = items.get_mut(*index) {
                if *slot == value {
                    return Ok(false);
                }
                *slot = value;
            } else {
                items.resize(*index, Value::Null);
                items.push(value);
            }
            Ok(true)
        }
        (Value::Array(_), Segment::Key(_)) => Err(Error::NotAnObject {
            keypath: keypath.clone(),
        }),
        (container, segment) => {
            let map = object_mut(container, keypath);
            let key = segment.as_key();
            if map.get(&key) == Some(&value) {
                return Ok(false);
            }
            map.insert(key, value);
            Ok(true)
        }
    }
}

/// Whether an array is stored at `keypath`.
pub fn is_array(root: &Value, keypath: &Keypath) -> bool {
    let mut current = root;
    for segment in keypath.segments() {
        let next = match (current, segment) {
            (Value::Object(map), segment) => map.get(&segment.as_key()),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return false,
        }
    }
    current.is_array()
}

/// The array at `keypath`, created empty if nothing is there yet. `None`
/// when something other than an array is stored there.
pub fn array_mut<'a>(root: &'a mut Value, keypath: &Keypath) -> Option<&'a mut Vec<Value>> {
    if lookup(root, keypath).is_none() && assign(root, keypath, Value::Array(Vec::new())).is_err() {
        return None;
    }

    let mut current = root;
    for segment in keypath.segments() {
        current = match (current, segment) {
            (Value::Object(map), segment) => map.get_mut(&segment.as_key())?,
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }

    match current {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Truthiness as templates see it.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Render a value as text; missing and null values render as nothing.
pub fn to_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn child_or_create<'a>(
    current: &'a mut Value,
    segment: &Segment,
    next_is_index: bool,
    keypath: &Keypath,
) -> Result<&'a mut Value> {
    let slot = match (current, segment) {
        (Value::Array(items), Segment::Index(index)) => {
            if *index >= items.len() {
                items.resize(*index + 1, Value::Null);
            }
            &mut items[*index]
        }
        (Value::Array(_), Segment::Key(_)) => {
            return Err(Error::NotAnObject {
                keypath: keypath.clone(),
            })
        }
        (container, segment) => object_mut(container, keypath)
            .entry(segment.as_key())
            .or_insert(Value::Null),
    };

    if !slot.is_object() && !slot.is_array() {
        *slot = if next_is_index {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }
    Ok(slot)
}

fn object_mut<'a>(current: &'a mut Value, keypath: &Keypath) -> &'a mut Map<String, Value> {
    match current {
        Value::Object(map) => map,
        other => {
            tracing::warn!(%keypath, "replacing scalar with an object while writing");
            *other = Value::Object(Map::new());
            object_mut(other, keypath)
        }
    }
}
