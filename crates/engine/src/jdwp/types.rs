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

/// An object id (0 is `null`)
pub type ObjectId = u64;
/// A thread id
pub type ThreadId = u64;
/// A reference type id
pub type ReferenceTypeId = u64;
/// A method id
pub type MethodId = u64;
/// A field id
pub type FieldId = u64;
/// A frame id
pub type FrameId = u64;
/// An event request id
pub type RequestId = i32;

/// Value tags
pub mod tag {
    /// Array object
    pub const ARRAY: u8 = b'[';
    /// byte
    pub const BYTE: u8 = b'B';
    /// char
    pub const CHAR: u8 = b'C';
    /// Plain object
    pub const OBJECT: u8 = b'L';
    /// float
    pub const FLOAT: u8 = b'F';
    /// double
    pub const DOUBLE: u8 = b'D';
    /// int
    pub const INT: u8 = b'I';
    /// long
    pub const LONG: u8 = b'J';
    /// short
    pub const SHORT: u8 = b'S';
    /// void
    pub const VOID: u8 = b'V';
    /// boolean
    pub const BOOLEAN: u8 = b'Z';
    /// java.lang.String
    pub const STRING: u8 = b's';
    /// java.lang.Thread
    pub const THREAD: u8 = b't';
    /// java.lang.ThreadGroup
    pub const THREAD_GROUP: u8 = b'g';
    /// java.lang.ClassLoader
    pub const CLASS_LOADER: u8 = b'l';
    /// java.lang.Class
    pub const CLASS_OBJECT: u8 = b'c';

    /// Whether values of this tag are primitives.
    pub fn is_primitive(tag: u8) -> bool {
        matches!(tag, BYTE | CHAR | FLOAT | DOUBLE | INT | LONG | SHORT | BOOLEAN)
    }
}

/// Modifier bit marking a static field
pub const ACC_STATIC: i32 = 0x0008;

/// Sizes of variable-width ids, as reported by `VirtualMachine.IDSizes`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSizes {
    /// fieldID size
    pub field: usize,
    /// methodID size
    pub method: usize,
    /// objectID size
    pub object: usize,
    /// referenceTypeID size
    pub reference_type: usize,
    /// frameID size
    pub frame: usize,
}

impl Default for IdSizes {
    fn default() -> Self {
        Self { field: 8, method: 8, object: 8, reference_type: 8, frame: 8 }
    }
}

/// An executable location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Type tag of the declaring type
    pub type_tag: u8,
    /// Declaring class
    pub class_id: ReferenceTypeId,
    /// Method
    pub method_id: MethodId,
    /// Code index within the method
    pub index: u64,
}

/// A value as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JdwpValue {
    /// No value
    Void,
    /// boolean
    Boolean(bool),
    /// byte
    Byte(i8),
    /// char (UTF-16 code unit)
    Char(u16),
    /// short
    Short(i16),
    /// int
    Int(i32),
    /// long
    Long(i64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// Any reference; `id == 0` is null
    Object {
        /// Tag describing the reference kind
        tag: u8,
        /// Object id
        id: ObjectId,
    },
}

impl JdwpValue {
    /// The object id of a non-null reference.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object { id, .. } if *id != 0 => Some(*id),
            _ => None,
        }
    }

    /// Whether this is a null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Object { id: 0, .. })
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field id
    pub field_id: FieldId,
    /// Field name
    pub name: String,
    /// JNI signature
    pub signature: String,
    /// Access flags
    pub mod_bits: i32,
}

impl FieldInfo {
    /// Whether the field is static.
    pub fn is_static(&self) -> bool {
        self.mod_bits & ACC_STATIC != 0
    }
}

/// One entry of a method's variable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    /// First code index where the variable is live
    pub code_index: u64,
    /// Variable name
    pub name: String,
    /// JNI signature
    pub signature: String,
    /// Number of code indices the variable is live for
    pub length: u32,
    /// Local slot
    pub slot: i32,
}

impl VariableInfo {
    /// Whether the variable is in scope at `index`.
    pub fn is_visible_at(&self, index: u64) -> bool {
        index >= self.code_index && index < self.code_index + u64::from(self.length)
    }

    /// Tag byte used to read the variable from a frame.
    pub fn value_tag(&self) -> u8 {
        self.signature.bytes().next().unwrap_or(tag::OBJECT)
    }
}

/// Mapping from code indices to source lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTable {
    /// First code index of the method
    pub start: i64,
    /// Last code index of the method
    pub end: i64,
    /// `(code index, line)` pairs
    pub lines: Vec<(u64, i32)>,
}

impl LineTable {
    /// Line of the closest entry at or before `index`.
    pub fn line_at(&self, index: u64) -> Option<i32> {
        self.lines
            .iter()
            .filter(|(code_index, _)| *code_index <= index)
            .max_by_key(|(code_index, _)| *code_index)
            .map(|(_, line)| *line)
    }
}

/// A frame of a suspended thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame id
    pub frame_id: FrameId,
    /// Current location
    pub location: Location,
}

/// Suspend policy of an event request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendPolicy {
    /// Suspend nothing
    None = 0,
    /// Suspend the thread the event occurred in
    EventThread = 1,
    /// Suspend the whole VM
    All = 2,
}

impl SuspendPolicy {
    /// Decode a wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::EventThread),
            2 => Some(Self::All),
            _ => None,
        }
    }
}

/// Step granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSize {
    /// Smallest possible step
    Min = 0,
    /// To the next line
    Line = 1,
}

/// Step depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDepth {
    /// Step into calls
    Into = 0,
    /// Step over calls
    Over = 1,
    /// Step out of the current frame
    Out = 2,
}

/// Filters attached to an event request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventModifier {
    /// Only events in this thread
    ThreadOnly {
        /// Thread id
        thread: ThreadId,
    },
    /// Only events in classes matching the pattern (`*` prefix or suffix wildcard)
    ClassMatch {
        /// Class name pattern
        pattern: String,
    },
    /// No events in classes matching the pattern
    ClassExclude {
        /// Class name pattern
        pattern: String,
    },
    /// Exception filter; `exception == 0` matches every exception
    ExceptionOnly {
        /// Exception type, or 0
        exception: ReferenceTypeId,
        /// Report caught exceptions
        caught: bool,
        /// Report uncaught exceptions
        uncaught: bool,
    },
    /// Step request parameters
    Step {
        /// Thread to step
        thread: ThreadId,
        /// Granularity
        size: StepSize,
        /// Depth
        depth: StepDepth,
    },
}

impl EventModifier {
    /// Modifier kind byte.
    pub fn kind(&self) -> u8 {
        match self {
            Self::ThreadOnly { .. } => 3,
            Self::ClassMatch { .. } => 5,
            Self::ClassExclude { .. } => 6,
            Self::ExceptionOnly { .. } => 8,
            Self::Step { .. } => 10,
        }
    }
}
