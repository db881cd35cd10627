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

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use tracing::trace;

use stepwise_common::{HeapEntry, Locals, StepRecord, Value};

use super::{NodeLayout, Shape, ShapeCache};
use crate::{
    host::{FrameSnapshot, HeapReader},
    jdwp::{JdwpError, JdwpValue, ObjectId},
    TraceLimits,
};

/// The heap of one step, in discovery order.
///
/// Entries are reserved before their contents are read so that a cycle back to
/// an object under construction resolves to its id instead of recursing.
#[derive(Debug, Default)]
struct HeapArena {
    slots: Vec<Option<HeapEntry>>,
    refs: HashMap<ObjectId, String>,
    materialized: usize,
}

impl HeapArena {
    fn lookup(&self, object: ObjectId) -> Option<&str> {
        self.refs.get(&object).map(String::as_str)
    }

    fn reserve(&mut self, object: ObjectId, ref_id: String) -> usize {
        self.refs.insert(object, ref_id);
        self.materialized += 1;
        self.reserve_companion()
    }

    fn reserve_companion(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    /// Remember an object that has an id but no entry.
    fn alias(&mut self, object: ObjectId, ref_id: String) {
        self.refs.insert(object, ref_id);
    }

    fn fill(&mut self, slot: usize, entry: HeapEntry) {
        self.slots[slot] = Some(entry);
    }

    fn materialized(&self) -> usize {
        self.materialized
    }

    fn finish(self) -> Vec<HeapEntry> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Builds [`StepRecord`]s from suspended frames
#[derive(Debug)]
pub struct HeapSnapshotBuilder {
    limits: TraceLimits,
    shapes: ShapeCache,
}

impl HeapSnapshotBuilder {
    /// Create a builder; the shape cache lives as long as the builder.
    pub fn new(limits: TraceLimits) -> Self {
        Self { limits, shapes: ShapeCache::new() }
    }

    /// Types classified so far.
    pub fn shapes(&self) -> &ShapeCache {
        &self.shapes
    }

    /// Capture `frame` and everything reachable from its locals.
    pub async fn capture<R>(&mut self, reader: &mut R, frame: &FrameSnapshot) -> Result<StepRecord, JdwpError>
    where
        R: HeapReader + ?Sized,
    {
        let mut arena = HeapArena::default();
        let mut locals = Locals::new();

        for (name, value) in &frame.locals {
            let mapped = self.map_value(reader, &mut arena, *value, Some(name.as_str()), 0).await?;
            locals.insert(name.clone(), mapped);
        }

        let heap = arena.finish();
        trace!(line = frame.line, locals = locals.len(), heap = heap.len(), "captured step");
        Ok(StepRecord::new(frame.line, locals, heap, None))
    }

    fn map_value<'a, R>(
        &'a mut self,
        reader: &'a mut R,
        arena: &'a mut HeapArena,
        value: JdwpValue,
        name_hint: Option<&'a str>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, JdwpError>>
    where
        R: HeapReader + ?Sized,
    {
        async move {
            let (value_tag, object) = match value {
                JdwpValue::Object { tag, id } if id != 0 => (tag, id),
                scalar => return Ok(scalar_value(scalar)),
            };

            if let Some(existing) = arena.lookup(object) {
                return Ok(Value::reference(existing));
            }

            match self.shapes.resolve(reader, value_tag, object).await? {
                Shape::Array => self.map_array(reader, arena, object, name_hint, depth).await,
                Shape::Node(layout) => {
                    if depth > self.limits.max_node_depth || arena.materialized() > self.limits.max_heap_objects {
                        trace!(object, depth, "eliding object past the heap ceiling");
                        return Ok(Value::reference(format!("obj-{object}")));
                    }
                    self.map_node(reader, arena, object, layout, depth).await
                }
                Shape::Opaque => {
                    let ref_id = format!("obj-{object}");
                    arena.alias(object, ref_id.clone());
                    Ok(Value::reference(ref_id))
                }
            }
        }
        .boxed()
    }

    async fn map_array<R>(
        &mut self,
        reader: &mut R,
        arena: &mut HeapArena,
        array: ObjectId,
        name_hint: Option<&str>,
        depth: usize,
    ) -> Result<Value, JdwpError>
    where
        R: HeapReader + ?Sized,
    {
        let ref_id = format!("arr-{array}");
        let slot = arena.reserve(array, ref_id.clone());

        let length = reader.array_length(array).await?;
        let count = usize::try_from(length).unwrap_or(0).min(self.limits.max_array_items);
        let elements = if count == 0 {
            Vec::new()
        } else {
            reader.array_values(array, 0, count as i32).await?
        };

        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(self.map_value(reader, arena, element, None, depth + 1).await?);
        }

        arena.fill(slot, HeapEntry::Array { id: ref_id.clone(), name: name_hint.map(String::from), items });
        Ok(Value::reference(ref_id))
    }

    async fn map_node<R>(
        &mut self,
        reader: &mut R,
        arena: &mut HeapArena,
        object: ObjectId,
        layout: NodeLayout,
        depth: usize,
    ) -> Result<Value, JdwpError>
    where
        R: HeapReader + ?Sized,
    {
        let ref_id = format!("node-{object}");
        let list_slot = layout.is_linked_list().then(|| arena.reserve_companion());
        let slot = arena.reserve(object, ref_id.clone());

        let field_ids = layout.field_ids();
        let mut fields: HashMap<_, _> = field_ids.iter().copied().zip(reader.field_values(object, &field_ids).await?).collect();
        let mut field = |id: Option<_>| id.and_then(|id| fields.remove(&id));

        let payload = field(layout.value);
        let next = field(layout.next);
        let left = field(layout.left);
        let right = field(layout.right);

        let value = match payload {
            Some(payload) => self.map_value(reader, arena, payload, None, depth + 1).await?,
            None => Value::Text(String::new()),
        };
        let next = self.successor(reader, arena, next, depth).await?;
        let left = self.successor(reader, arena, left, depth).await?;
        let right = self.successor(reader, arena, right, depth).await?;

        if let Some(list_slot) = list_slot {
            arena.fill(
                list_slot,
                HeapEntry::List { id: format!("list-{object}"), name: Some("list".into()), head: Some(ref_id.clone()) },
            );
        }
        arena.fill(slot, HeapEntry::Node { id: ref_id.clone(), value, next, left, right });
        Ok(Value::reference(ref_id))
    }

    async fn successor<R>(
        &mut self,
        reader: &mut R,
        arena: &mut HeapArena,
        link: Option<JdwpValue>,
        depth: usize,
    ) -> Result<Option<String>, JdwpError>
    where
        R: HeapReader + ?Sized,
    {
        let Some(link) = link else { return Ok(None) };
        let mapped = self.map_value(reader, arena, link, None, depth + 1).await?;
        Ok(mapped.ref_id().map(String::from))
    }
}

/// Map a non-reference value. Integral types widen to `Int`, floating types to
/// `Float`, and `char` becomes a one-character string.
fn scalar_value(value: JdwpValue) -> Value {
    match value {
        JdwpValue::Void | JdwpValue::Object { .. } => Value::Null,
        JdwpValue::Boolean(b) => Value::Bool(b),
        JdwpValue::Byte(v) => Value::Int(v.into()),
        JdwpValue::Short(v) => Value::Int(v.into()),
        JdwpValue::Int(v) => Value::Int(v.into()),
        JdwpValue::Long(v) => Value::Int(v),
        // Through the shortest decimal form, so 0.1f reads as 0.1 rather than 0.10000000149011612.
        JdwpValue::Float(v) => Value::Float(v.to_string().parse().unwrap_or(f64::from(v))),
        JdwpValue::Double(v) => Value::Float(v),
        JdwpValue::Char(c) => Value::Text(String::from_utf16_lossy(&[c])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jdwp::{tag, FieldId, FieldInfo, ReferenceTypeId},
        HeapReader,
    };
    use async_trait::async_trait;
    use stepwise_common::logging;
    use tracing::info;

    /// An in-memory heap: objects carry a type and named field values.
    #[derive(Default)]
    struct FakeHeap {
        types: HashMap<ReferenceTypeId, Vec<FieldInfo>>,
        objects: HashMap<ObjectId, (ReferenceTypeId, HashMap<FieldId, JdwpValue>)>,
        arrays: HashMap<ObjectId, Vec<JdwpValue>>,
        field_reads: usize,
    }

    impl FakeHeap {
        fn declare(&mut self, type_id: ReferenceTypeId, names: &[&str]) {
            let fields = names
                .iter()
                .enumerate()
                .map(|(i, name)| FieldInfo {
                    field_id: type_id * 100 + i as u64,
                    name: (*name).into(),
                    signature: "I".into(),
                    mod_bits: 0,
                })
                .collect();
            self.types.insert(type_id, fields);
        }

        fn object(&mut self, id: ObjectId, type_id: ReferenceTypeId, values: &[(&str, JdwpValue)]) {
            let fields = &self.types[&type_id];
            let values = values
                .iter()
                .map(|(name, value)| {
                    let field = fields.iter().find(|f| f.name == *name).map(|f| f.field_id).unwrap_or_default();
                    (field, *value)
                })
                .collect();
            self.objects.insert(id, (type_id, values));
        }
    }

    fn obj(id: ObjectId) -> JdwpValue {
        JdwpValue::Object { tag: tag::OBJECT, id }
    }

    fn arr(id: ObjectId) -> JdwpValue {
        JdwpValue::Object { tag: tag::ARRAY, id }
    }

    const NULL: JdwpValue = JdwpValue::Object { tag: tag::OBJECT, id: 0 };

    #[async_trait]
    impl HeapReader for FakeHeap {
        async fn reference_type(&mut self, object: ObjectId) -> Result<ReferenceTypeId, JdwpError> {
            self.objects.get(&object).map(|(t, _)| *t).ok_or(JdwpError::Protocol(format!("no object {object}")))
        }

        async fn instance_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
            Ok(self.types.get(&type_id).cloned().unwrap_or_default())
        }

        async fn field_values(&mut self, object: ObjectId, fields: &[FieldId]) -> Result<Vec<JdwpValue>, JdwpError> {
            self.field_reads += 1;
            let (_, values) = &self.objects[&object];
            Ok(fields.iter().map(|f| values.get(f).copied().unwrap_or(NULL)).collect())
        }

        async fn array_length(&mut self, array: ObjectId) -> Result<i32, JdwpError> {
            Ok(self.arrays[&array].len() as i32)
        }

        async fn array_values(&mut self, array: ObjectId, first: i32, length: i32) -> Result<Vec<JdwpValue>, JdwpError> {
            let items = &self.arrays[&array];
            Ok(items[first as usize..(first + length) as usize].to_vec())
        }
    }

    fn frame(locals: &[(&str, JdwpValue)]) -> FrameSnapshot {
        FrameSnapshot { line: 7, locals: locals.iter().map(|(n, v)| (n.to_string(), *v)).collect() }
    }

    #[tokio::test]
    async fn test_scalars_widen() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder
            .capture(
                &mut heap,
                &frame(&[
                    ("b", JdwpValue::Byte(-3)),
                    ("n", JdwpValue::Int(42)),
                    ("big", JdwpValue::Long(1 << 40)),
                    ("f", JdwpValue::Float(0.1)),
                    ("ok", JdwpValue::Boolean(true)),
                    ("c", JdwpValue::Char(u16::from(b'x'))),
                    ("s", NULL),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(step.line, 7);
        assert_eq!(step.locals.get("b"), Some(&Value::Int(-3)));
        assert_eq!(step.locals.get("n"), Some(&Value::Int(42)));
        assert_eq!(step.locals.get("big"), Some(&Value::Int(1 << 40)));
        assert_eq!(step.locals.get("f"), Some(&Value::Float(0.1)));
        assert_eq!(step.locals.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(step.locals.get("c"), Some(&Value::Text("x".into())));
        assert_eq!(step.locals.get("s"), Some(&Value::Null));
        assert!(step.heap.is_empty());
        assert!(step.focus.is_none());
    }

    #[tokio::test]
    async fn test_two_node_cycle_terminates() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(1, &["val", "next"]);
        heap.object(10, 1, &[("val", JdwpValue::Int(1)), ("next", obj(11))]);
        heap.object(11, 1, &[("val", JdwpValue::Int(2)), ("next", obj(10))]);

        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder.capture(&mut heap, &frame(&[("a", obj(10)), ("b", obj(11))])).await.unwrap();

        assert_eq!(step.locals.get("a"), Some(&Value::reference("node-10")));
        assert_eq!(step.locals.get("b"), Some(&Value::reference("node-11")));

        let nodes: Vec<_> = step.heap.iter().filter(|e| e.kind() == "node").collect();
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[0],
            &HeapEntry::Node {
                id: "node-10".into(),
                value: Value::Int(1),
                next: Some("node-11".into()),
                left: None,
                right: None
            }
        );
        assert_eq!(
            nodes[1],
            &HeapEntry::Node {
                id: "node-11".into(),
                value: Value::Int(2),
                next: Some("node-10".into()),
                left: None,
                right: None
            }
        );

        let mut ids: Vec<_> = step.heap.iter().map(HeapEntry::id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate heap entries: {:?}", step.heap);
        // Each object is read once even though both locals and both links reach it.
        assert_eq!(heap.field_reads, 2);
    }

    #[tokio::test]
    async fn test_linked_node_gets_list_view_first() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(1, &["value", "next"]);
        heap.object(20, 1, &[("value", JdwpValue::Int(5)), ("next", NULL)]);

        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder.capture(&mut heap, &frame(&[("head", obj(20))])).await.unwrap();

        assert_eq!(
            step.heap,
            vec![
                HeapEntry::List { id: "list-20".into(), name: Some("list".into()), head: Some("node-20".into()) },
                HeapEntry::Node { id: "node-20".into(), value: Value::Int(5), next: None, left: None, right: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_tree_without_next_has_no_list() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(2, &["val", "left", "right"]);
        heap.object(1, 2, &[("val", JdwpValue::Int(2)), ("left", obj(2)), ("right", obj(3))]);
        heap.object(2, 2, &[("val", JdwpValue::Int(1))]);
        heap.object(3, 2, &[("val", JdwpValue::Int(3))]);

        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder.capture(&mut heap, &frame(&[("root", obj(1))])).await.unwrap();

        let ids: Vec<_> = step.heap.iter().map(HeapEntry::id).collect();
        assert_eq!(ids, vec!["node-1", "node-2", "node-3"]);
        assert!(matches!(
            &step.heap[0],
            HeapEntry::Node { left: Some(l), right: Some(r), next: None, .. } if l == "node-2" && r == "node-3"
        ));
        // One type, classified once.
        assert_eq!(builder.shapes().len(), 1);
    }

    #[tokio::test]
    async fn test_arrays_are_named_truncated_and_shared() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.arrays.insert(5, (0..300).map(JdwpValue::Int).collect());
        heap.arrays.insert(6, vec![arr(5), NULL]);

        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder.capture(&mut heap, &frame(&[("nums", arr(5)), ("grid", arr(6)), ("alias", arr(5))])).await.unwrap();

        assert_eq!(step.locals.get("alias"), Some(&Value::reference("arr-5")));
        assert_eq!(step.heap.len(), 2);
        let HeapEntry::Array { id, name, items } = &step.heap[0] else { panic!("expected array") };
        assert_eq!(id, "arr-5");
        assert_eq!(name.as_deref(), Some("nums"));
        assert_eq!(items.len(), 200);
        assert_eq!(items[199], Value::Int(199));
        assert_eq!(
            step.heap[1],
            HeapEntry::Array { id: "arr-6".into(), name: Some("grid".into()), items: vec![Value::reference("arr-5"), Value::Null] }
        );
    }

    #[tokio::test]
    async fn test_opaque_objects_have_ids_but_no_entries() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(3, &["size", "elementData"]);
        heap.object(30, 3, &[]);

        let mut builder = HeapSnapshotBuilder::new(TraceLimits::default());
        let step = builder.capture(&mut heap, &frame(&[("xs", obj(30))])).await.unwrap();

        assert_eq!(step.locals.get("xs"), Some(&Value::reference("obj-30")));
        assert!(step.heap.is_empty());
    }

    #[tokio::test]
    async fn test_node_value_reference_and_depth_ceiling() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(1, &["val", "next"]);
        for id in 1..=10 {
            let next = if id < 10 { obj(id + 1) } else { NULL };
            heap.object(id, 1, &[("val", arr(100)), ("next", next)]);
        }
        heap.arrays.insert(100, vec![JdwpValue::Int(9)]);

        let limits = TraceLimits { max_node_depth: 3, ..TraceLimits::default() };
        let mut builder = HeapSnapshotBuilder::new(limits);
        let step = builder.capture(&mut heap, &frame(&[("head", obj(1))])).await.unwrap();

        let nodes: Vec<_> = step.heap.iter().filter(|e| e.kind() == "node").map(HeapEntry::id).collect();
        assert_eq!(nodes, vec!["node-1", "node-2", "node-3", "node-4"]);
        let last = step.heap.iter().find(|e| e.id() == "node-4").unwrap();
        assert!(matches!(last, HeapEntry::Node { next: Some(n), .. } if n == "obj-5"));

        let json = serde_json::to_value(&step.heap).unwrap();
        let first_node = json.as_array().unwrap().iter().find(|e| e["ref"] == "node-1").unwrap();
        assert_eq!(first_node["value"], "arr-100");
    }

    #[tokio::test]
    async fn test_object_ceiling() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let mut heap = FakeHeap::default();
        heap.declare(1, &["val"]);
        for id in 1..=5 {
            heap.object(id, 1, &[("val", JdwpValue::Int(id as i32))]);
        }

        let limits = TraceLimits { max_heap_objects: 3, ..TraceLimits::default() };
        let mut builder = HeapSnapshotBuilder::new(limits);
        let locals: Vec<(String, JdwpValue)> = (1..=5).map(|id| (format!("n{id}"), obj(id))).collect();
        let step = builder.capture(&mut heap, &FrameSnapshot { line: 1, locals }).await.unwrap();

        assert_eq!(step.heap.len(), 4);
        assert_eq!(step.locals.get("n4"), Some(&Value::reference("node-4")));
        assert_eq!(step.locals.get("n5"), Some(&Value::reference("obj-5")));
    }
}
