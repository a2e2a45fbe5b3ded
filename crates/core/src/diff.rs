//! Field-level diff between two configuration payloads.
//!
//! Nested objects are flattened into dotted paths
//! (`knowledge_base.settings.autoLearning`). Arrays are compared as unordered
//! multisets: each element present on only one side yields its own
//! `added` / `removed` entry under the array's path. A field that changes JSON
//! type is reported once as `changed`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::ConfigPayload;

/// The status of an item in a diff comparison.
///
/// - `Added`   -- present only in the new side.
/// - `Removed` -- present only in the old side.
/// - `Changed` -- present in both sides but with different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
}

impl DiffStatus {
    /// String representation for display and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
        }
    }

    /// The status seen from the opposite direction.
    pub fn inverted(&self) -> Self {
        match self {
            Self::Added => Self::Removed,
            Self::Removed => Self::Added,
            Self::Changed => Self::Changed,
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a payload diff.
///
/// An absent side is `None` and omitted from the JSON form, so it cannot be
/// confused with a field explicitly set to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub status: DiffStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl FieldDiff {
    fn added(field: String, value: &Value) -> Self {
        Self {
            field,
            status: DiffStatus::Added,
            old_value: None,
            new_value: Some(value.clone()),
        }
    }

    fn removed(field: String, value: &Value) -> Self {
        Self {
            field,
            status: DiffStatus::Removed,
            old_value: Some(value.clone()),
            new_value: None,
        }
    }

    fn changed(field: String, old: &Value, new: &Value) -> Self {
        Self {
            field,
            status: DiffStatus::Changed,
            old_value: Some(old.clone()),
            new_value: Some(new.clone()),
        }
    }

    /// The same entry seen with old and new exchanged.
    pub fn inverted(&self) -> Self {
        Self {
            field: self.field.clone(),
            status: self.status.inverted(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }
}

/// Compute the field-level difference from `old` to `new`.
///
/// Entries come out ordered by field path; identical payloads produce an
/// empty list.
pub fn diff_payloads(old: &ConfigPayload, new: &ConfigPayload) -> Vec<FieldDiff> {
    let mut out = Vec::new();
    diff_maps("", old.as_map(), new.as_map(), &mut out);
    out
}

fn diff_maps(prefix: &str, old: &Map<String, Value>, new: &Map<String, Value>, out: &mut Vec<FieldDiff>) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let path = join_path(prefix, key);
        match (old.get(key), new.get(key)) {
            (Some(o), Some(n)) => diff_values(path, o, n, out),
            (Some(o), None) => out.push(FieldDiff::removed(path, o)),
            (None, Some(n)) => out.push(FieldDiff::added(path, n)),
            (None, None) => {}
        }
    }
}

fn diff_values(path: String, old: &Value, new: &Value, out: &mut Vec<FieldDiff>) {
    match (old, new) {
        (Value::Object(o), Value::Object(n)) => diff_maps(&path, o, n, out),
        (Value::Array(o), Value::Array(n)) => diff_sets(path, o, n, out),
        (o, n) if o != n => out.push(FieldDiff::changed(path, o, n)),
        _ => {}
    }
}

/// Multiset comparison: order is ignored, multiplicity is not.
fn diff_sets(path: String, old: &[Value], new: &[Value], out: &mut Vec<FieldDiff>) {
    let mut counts: BTreeMap<String, (i64, &Value)> = BTreeMap::new();
    for value in old {
        counts.entry(canonical(value)).or_insert((0, value)).0 += 1;
    }
    for value in new {
        counts.entry(canonical(value)).or_insert((0, value)).0 -= 1;
    }

    let mut added = Vec::new();
    for (balance, value) in counts.values() {
        for _ in 0..*balance {
            out.push(FieldDiff::removed(path.clone(), value));
        }
        for _ in 0..(-*balance) {
            added.push(FieldDiff::added(path.clone(), value));
        }
    }
    out.extend(added);
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Key-order-independent string form of a JSON value, used to match array
/// elements across the two sides.
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let entries: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical(v))).collect();
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
