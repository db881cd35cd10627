// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{collections::BTreeMap, fmt};

/// A value observed in a local variable, array slot or node payload.
///
/// Serializes as `null`, a bare number, a bare boolean, a string, or
/// `{"ref": id}` for references into the step's heap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A null reference
    Null,
    /// A boolean primitive
    Bool(bool),
    /// Any integral primitive, widened
    Int(i64),
    /// Any floating primitive, widened
    Float(f64),
    /// A character (as a one-character string) or an empty node payload
    Text(String),
    /// A reference to a heap entry of the same step
    Ref {
        /// Heap entry id (`arr-*`, `node-*`, `list-*`, or `obj-*` when not materialized)
        #[serde(rename = "ref")]
        id: String,
    },
}

impl Value {
    /// Build a reference value.
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Ref { id: id.into() }
    }

    /// The referenced heap id, if this value is a reference.
    pub fn ref_id(&self) -> Option<&str> {
        match self {
            Self::Ref { id } => Some(id),
            _ => None,
        }
    }

    /// Whether this value is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Insertion-ordered mapping from local variable name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals {
    inner: Vec<(String, Value)>,
}

impl Locals {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding. A name that is already bound keeps its position and
    /// takes the new value; the previous value is returned.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.inner.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.inner.push((name, value));
                None
            }
        }
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate over bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Locals {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut locals = Self::new();
        for (name, value) in iter {
            locals.insert(name, value);
        }
        locals
    }
}

impl Serialize for Locals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.inner.len()))?;
        for (name, value) in &self.inner {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Locals {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LocalsVisitor;

        impl<'de> Visitor<'de> for LocalsVisitor {
            type Value = Locals;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of local variable names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Locals, A::Error> {
                let mut locals = Locals::new();
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    locals.insert(name, value);
                }
                Ok(locals)
            }
        }

        deserializer.deserialize_map(LocalsVisitor)
    }
}

/// One materialized object in a step's heap, tagged by structural kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeapEntry {
    /// An array with (possibly truncated) items
    Array {
        /// Entry id, `arr-<identity>`
        #[serde(rename = "ref")]
        id: String,
        /// Name of the local variable the array was first reached from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Element values
        items: Vec<Value>,
    },
    /// A linked record with a payload and optional successors
    Node {
        /// Entry id, `node-<identity>`
        #[serde(rename = "ref")]
        id: String,
        /// Payload; a reference payload serializes as the bare id
        #[serde(serialize_with = "serialize_node_value")]
        value: Value,
        /// Successor id via `next`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        /// Successor id via `left`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left: Option<String>,
        /// Successor id via `right`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<String>,
    },
    /// A singly-linked list view headed by a node
    List {
        /// Entry id, `list-<identity>`
        #[serde(rename = "ref")]
        id: String,
        /// Display name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Id of the head node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        head: Option<String>,
    },
}

impl HeapEntry {
    /// The entry's reference id.
    pub fn id(&self) -> &str {
        match self {
            Self::Array { id, .. } | Self::Node { id, .. } | Self::List { id, .. } => id,
        }
    }

    /// The entry's kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Array { .. } => "array",
            Self::Node { .. } => "node",
            Self::List { .. } => "list",
        }
    }
}

fn serialize_node_value<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Value::Ref { id } => serializer.serialize_str(id),
        other => other.serialize(serializer),
    }
}

/// Optional rendering hint attached to a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    /// Array entry to highlight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<String>,
    /// Named index markers into the highlighted array
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indices: BTreeMap<String, i64>,
    /// Heap entries to highlight
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
}

impl Focus {
    /// Whether the hint carries nothing.
    pub fn is_empty(&self) -> bool {
        self.array.is_none() && self.indices.is_empty() && self.refs.is_empty()
    }
}

/// State of the program at one line-granularity suspension point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Source line of the top frame
    pub line: i32,
    /// Visible locals of the top frame
    pub locals: Locals,
    /// Heap entries in materialization order
    pub heap: Vec<HeapEntry>,
    /// Optional rendering hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<Focus>,
}

impl StepRecord {
    /// Create a step record, dropping an empty focus hint.
    pub fn new(line: i32, locals: Locals, heap: Vec<HeapEntry>, focus: Option<Focus>) -> Self {
        let focus = focus.filter(|focus| !focus.is_empty());
        Self { line, locals, heap, focus }
    }
}

/// One traced input case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputCase {
    /// Case id
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Raw textual input, `null` when none was given
    pub value: Option<String>,
    /// Ordered step records
    pub trace: Vec<StepRecord>,
}

/// The response document for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFile {
    /// Document title
    pub title: String,
    /// Source language tag
    pub language: String,
    /// The snippet as submitted
    pub code: String,
    /// One entry per traced input case
    pub inputs: Vec<InputCase>,
}

/// Error document returned at the outer boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

impl ErrorResponse {
    /// Wrap any displayable error.
    pub fn new(error: impl fmt::Display) -> Self {
        Self { error: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_wire_forms() {
        assert_eq!(serde_json::to_value(Value::Null).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(Value::Bool(true)).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(Value::Int(-7)).unwrap(), json!(-7));
        assert_eq!(serde_json::to_value(Value::Float(1.5)).unwrap(), json!(1.5));
        assert_eq!(serde_json::to_value(Value::Text("x".into())).unwrap(), json!("x"));
        assert_eq!(serde_json::to_value(Value::reference("arr-3")).unwrap(), json!({"ref": "arr-3"}));
    }

    #[test]
    fn test_value_deserializes_each_shape() {
        let values: Vec<Value> =
            serde_json::from_value(json!([null, false, 3, 2.25, "c", {"ref": "node-1"}])).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(false),
                Value::Int(3),
                Value::Float(2.25),
                Value::Text("c".into()),
                Value::reference("node-1"),
            ]
        );
    }

    #[test]
    fn test_heap_entry_shapes() {
        let array = HeapEntry::Array {
            id: "arr-1".into(),
            name: Some("nums".into()),
            items: vec![Value::Int(1), Value::Null],
        };
        assert_eq!(
            serde_json::to_value(&array).unwrap(),
            json!({"kind": "array", "ref": "arr-1", "name": "nums", "items": [1, null]})
        );

        let node = HeapEntry::Node {
            id: "node-2".into(),
            value: Value::reference("obj-9"),
            next: Some("node-3".into()),
            left: None,
            right: None,
        };
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"kind": "node", "ref": "node-2", "value": "obj-9", "next": "node-3"})
        );

        let list = HeapEntry::List { id: "list-2".into(), name: Some("list".into()), head: None };
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!({"kind": "list", "ref": "list-2", "name": "list"})
        );
        assert_eq!(list.kind(), "list");
        assert_eq!(list.id(), "list-2");
    }

    #[test]
    fn test_locals_keep_insertion_order() {
        let mut locals = Locals::new();
        locals.insert("zeta", Value::Int(1));
        locals.insert("alpha", Value::Int(2));
        assert_eq!(locals.insert("zeta", Value::Int(3)), Some(Value::Int(1)));

        let text = serde_json::to_string(&locals).unwrap();
        assert_eq!(text, r#"{"zeta":3,"alpha":2}"#);

        let back: Locals = serde_json::from_str(r#"{"b":1,"a":{"ref":"arr-1"}}"#).unwrap();
        let names: Vec<&str> = back.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(back.get("a").and_then(Value::ref_id), Some("arr-1"));
    }

    #[test]
    fn test_step_record_omits_empty_focus() {
        let step = StepRecord::new(4, Locals::new(), vec![], Some(Focus::default()));
        assert!(step.focus.is_none());
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({"line": 4, "locals": {}, "heap": []})
        );

        let focus = Focus { refs: vec!["node-1".into()], ..Default::default() };
        let step = StepRecord::new(5, Locals::new(), vec![], Some(focus));
        assert_eq!(serde_json::to_value(&step).unwrap()["focus"], json!({"refs": ["node-1"]}));
    }

    #[test]
    fn test_trace_file_document() {
        let file = TraceFile {
            title: "Java Visualizer".into(),
            language: "Java".into(),
            code: "class A {}".into(),
            inputs: vec![InputCase {
                id: "input-1".into(),
                label: "Input 1".into(),
                value: None,
                trace: vec![],
            }],
        };
        assert_eq!(
            serde_json::to_value(&file).unwrap(),
            json!({
                "title": "Java Visualizer",
                "language": "Java",
                "code": "class A {}",
                "inputs": [{"id": "input-1", "label": "Input 1", "value": null, "trace": []}]
            })
        );
        assert_eq!(
            serde_json::to_value(ErrorResponse::new("boom")).unwrap(),
            json!({"error": "boom"})
        );
    }
}
