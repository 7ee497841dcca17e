//! Value resolution policies shared by transforms and reducers
//!
//! Both the top-level transform of a rule and any reducer reading a child
//! document resolve titles and dates through these functions, so the
//! policies exist exactly once.

use serde_json::Value;

/// Owner whose values win in [`best_value`].
pub const PREFERRED_OWNER: &str = "BROADCASTER";

/// Follow a dotted path (`"a.b.0.c"`) into a document.
///
/// Numeric segments index into arrays. Returns `None` when any segment is
/// missing.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Loose truthiness: `null`, `false`, `0`, and `""` are false; everything
/// else, including empty arrays and objects, is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn str_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Pick one value from a multi-valued field such as `titles`.
///
/// Preference order: the entry owned by [`PREFERRED_OWNER`] with a matching
/// `type`; else the first entry with a matching `type`; else the first
/// entry; else an empty string.
pub fn best_value(document: &Value, key: &str, value_type: &str) -> Value {
    let Some(field) = document.get(key).filter(|v| is_truthy(v)) else {
        return Value::String(String::new());
    };
    let candidates = entries(field);
    let type_matches = |entry: &Value| str_field(entry, "type") == Some(value_type);

    let chosen = candidates
        .iter()
        .copied()
        .find(|entry| type_matches(*entry) && str_field(*entry, "owner") == Some(PREFERRED_OWNER))
        .or_else(|| candidates.iter().copied().find(|entry| type_matches(*entry)))
        .or_else(|| candidates.first().copied());

    match chosen {
        Some(entry) => entry.get("value").cloned().unwrap_or(Value::Null),
        None => Value::String(String::new()),
    }
}

/// Resolve when a document was (or will be) published.
///
/// The first scheduled event's start, else `publishStart`, else
/// `creationDate`, else `null`.
pub fn publish_date(document: &Value) -> Value {
    if let Some(first) = document
        .get("scheduleEvents")
        .and_then(Value::as_array)
        .and_then(|events| events.first())
    {
        return first.get("start").cloned().unwrap_or(Value::Null);
    }
    ["publishStart", "creationDate"]
        .iter()
        .filter_map(|key| document.get(*key))
        .find(|v| is_truthy(v))
        .cloned()
        .unwrap_or(Value::Null)
}
