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

//! The debug-host seam.
//!
//! [`DebugSession`](crate::DebugSession) and
//! [`HeapSnapshotBuilder`](crate::HeapSnapshotBuilder) only talk to a running
//! program through these traits. [`JvmTarget`] implements them over JDWP; tests
//! implement them with scripted in-memory programs.

mod jvm;

pub use jvm::*;

use async_trait::async_trait;

use crate::jdwp::{
    EventSet, FieldId, FieldInfo, JdwpError, JdwpValue, ObjectId, ReferenceTypeId, RequestId,
    ThreadId,
};

/// Class patterns never stepped into
pub const STEP_EXCLUSIONS: &[&str] = &["java.*", "sun.*", "jdk.*"];

/// The top frame of a suspended thread
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Source line of the current location
    pub line: i32,
    /// Visible locals in slot order
    pub locals: Vec<(String, JdwpValue)>,
}

/// Read access to the heap of a suspended program
#[async_trait]
pub trait HeapReader: Send {
    /// Runtime type of an object.
    async fn reference_type(&mut self, object: ObjectId) -> Result<ReferenceTypeId, JdwpError>;

    /// Instance fields of a type, inherited ones included, most derived first.
    async fn instance_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError>;

    /// Current values of `fields` on `object`.
    async fn field_values(&mut self, object: ObjectId, fields: &[FieldId]) -> Result<Vec<JdwpValue>, JdwpError>;

    /// Length of an array.
    async fn array_length(&mut self, array: ObjectId) -> Result<i32, JdwpError>;

    /// `length` elements of an array starting at `first`.
    async fn array_values(&mut self, array: ObjectId, first: i32, length: i32) -> Result<Vec<JdwpValue>, JdwpError>;
}

/// A program running under step-level control
#[async_trait]
pub trait DebugTarget: HeapReader {
    /// Block until the next event set; `None` once the stream is exhausted.
    async fn next_event_set(&mut self) -> Result<Option<EventSet>, JdwpError>;

    /// Resume whatever the event set suspended.
    async fn resume(&mut self, events: &EventSet) -> Result<(), JdwpError>;

    /// Subscribe to method entry in classes matching `class_pattern`, suspending the event thread.
    async fn request_method_entry(&mut self, class_pattern: &str) -> Result<RequestId, JdwpError>;

    /// Subscribe to exceptions thrown from classes matching `class_pattern`, suspending the event thread.
    async fn request_exceptions(&mut self, class_pattern: &str) -> Result<RequestId, JdwpError>;

    /// Install a line-granularity step-into request on `thread`.
    async fn request_line_step(
        &mut self,
        thread: ThreadId,
        class_pattern: &str,
        exclusions: &[&str],
    ) -> Result<RequestId, JdwpError>;

    /// Remove a step request.
    async fn clear_step(&mut self, request: RequestId) -> Result<(), JdwpError>;

    /// Line and visible locals of the top frame; `None` if the thread has no frames.
    async fn top_frame(&mut self, thread: ThreadId) -> Result<Option<FrameSnapshot>, JdwpError>;

    /// Everything the program wrote to stderr so far, after a short drain.
    async fn error_output(&mut self) -> String;

    /// Tear down the connection and the process. Must be safe to call on any path.
    async fn dispose(&mut self);
}
