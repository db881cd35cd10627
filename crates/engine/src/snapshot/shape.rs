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

use std::collections::HashMap;

use crate::{
    host::HeapReader,
    jdwp::{tag, FieldId, FieldInfo, JdwpError, ObjectId, ReferenceTypeId},
};

/// Field names recognized as a node's payload, in priority order
pub const VALUE_FIELDS: &[&str] = &["value", "val"];

/// Field slots of a linked record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeLayout {
    /// Payload field
    pub value: Option<FieldId>,
    /// Singly-linked successor
    pub next: Option<FieldId>,
    /// Left child
    pub left: Option<FieldId>,
    /// Right child
    pub right: Option<FieldId>,
}

impl NodeLayout {
    /// Present fields in `value, next, left, right` order.
    pub fn field_ids(&self) -> Vec<FieldId> {
        [self.value, self.next, self.left, self.right].into_iter().flatten().collect()
    }

    /// Whether the layout carries a `next` link and so gets a list view.
    pub fn is_linked_list(&self) -> bool {
        self.next.is_some()
    }
}

/// Structural kind of a runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Any array type
    Array,
    /// A record with at least one of `value`/`val`/`next`/`left`/`right`
    Node(NodeLayout),
    /// Everything else; never materialized
    Opaque,
}

impl Shape {
    /// Classify a type from its instance fields.
    pub fn classify(fields: &[FieldInfo]) -> Self {
        let find = |name: &str| fields.iter().find(|f| f.name == name).map(|f| f.field_id);

        let layout = NodeLayout {
            value: VALUE_FIELDS.iter().find_map(|name| find(name)),
            next: find("next"),
            left: find("left"),
            right: find("right"),
        };

        if layout == NodeLayout::default() {
            Self::Opaque
        } else {
            Self::Node(layout)
        }
    }
}

/// Shapes resolved so far, by runtime type
#[derive(Debug, Default)]
pub struct ShapeCache {
    by_type: HashMap<ReferenceTypeId, Shape>,
}

impl ShapeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape of the object `id` carrying value tag `value_tag`.
    pub async fn resolve<R>(&mut self, reader: &mut R, value_tag: u8, id: ObjectId) -> Result<Shape, JdwpError>
    where
        R: HeapReader + ?Sized,
    {
        if value_tag == tag::ARRAY {
            return Ok(Shape::Array);
        }

        let type_id = reader.reference_type(id).await?;
        if let Some(shape) = self.by_type.get(&type_id) {
            return Ok(*shape);
        }

        let shape = Shape::classify(&reader.instance_fields(type_id).await?);
        self.by_type.insert(type_id, shape);
        Ok(shape)
    }

    /// Number of classified types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Whether nothing has been classified yet.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
