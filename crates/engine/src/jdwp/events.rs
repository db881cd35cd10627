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

//! Composite event decoding.

use super::{
    event_kind, JdwpError, Location, ObjectId, PacketReader, ReferenceTypeId, RequestId,
    SuspendPolicy, ThreadId,
};

/// A single event reported by the VM
#[derive(Debug, Clone, PartialEq)]
pub enum JdwpEvent {
    /// The VM finished initializing
    VmStart {
        /// Originating request (0 for automatic events)
        request_id: RequestId,
        /// Initial thread
        thread: ThreadId,
    },
    /// A step completed
    SingleStep {
        /// Originating request
        request_id: RequestId,
        /// Stepping thread
        thread: ThreadId,
        /// Where the thread stopped
        location: Location,
    },
    /// A breakpoint was hit
    Breakpoint {
        /// Originating request
        request_id: RequestId,
        /// Thread that hit it
        thread: ThreadId,
        /// Breakpoint location
        location: Location,
    },
    /// A method was entered
    MethodEntry {
        /// Originating request
        request_id: RequestId,
        /// Entering thread
        thread: ThreadId,
        /// First location of the method
        location: Location,
    },
    /// A method is about to return
    MethodExit {
        /// Originating request
        request_id: RequestId,
        /// Exiting thread
        thread: ThreadId,
        /// Location of the return
        location: Location,
    },
    /// An exception was thrown
    Exception {
        /// Originating request
        request_id: RequestId,
        /// Throwing thread
        thread: ThreadId,
        /// Throw location
        location: Location,
        /// The exception object
        exception: ObjectId,
        /// Catch location, `None` when uncaught
        catch_location: Option<Location>,
    },
    /// A thread started
    ThreadStart {
        /// Originating request
        request_id: RequestId,
        /// The new thread
        thread: ThreadId,
    },
    /// A thread ended
    ThreadDeath {
        /// Originating request
        request_id: RequestId,
        /// The finished thread
        thread: ThreadId,
    },
    /// A class was prepared
    ClassPrepare {
        /// Originating request
        request_id: RequestId,
        /// Preparing thread
        thread: ThreadId,
        /// Kind of the prepared type
        ref_type_tag: u8,
        /// Prepared type
        type_id: ReferenceTypeId,
        /// JNI signature
        signature: String,
        /// Class status bits
        status: i32,
    },
    /// The VM is terminating
    VmDeath {
        /// Originating request (0 for the automatic event)
        request_id: RequestId,
    },
    /// The connection closed; synthesized locally, never sent by the VM
    VmDisconnected,
}

impl JdwpEvent {
    /// The thread the event occurred in, if any.
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            Self::VmStart { thread, .. }
            | Self::SingleStep { thread, .. }
            | Self::Breakpoint { thread, .. }
            | Self::MethodEntry { thread, .. }
            | Self::MethodExit { thread, .. }
            | Self::Exception { thread, .. }
            | Self::ThreadStart { thread, .. }
            | Self::ThreadDeath { thread, .. }
            | Self::ClassPrepare { thread, .. } => Some(*thread),
            Self::VmDeath { .. } | Self::VmDisconnected => None,
        }
    }

    /// Whether the event ends the debuggee's life.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::VmDeath { .. } | Self::VmDisconnected)
    }
}

/// Events delivered together, sharing one suspend policy
#[derive(Debug, Clone, PartialEq)]
pub struct EventSet {
    /// What the VM suspended when it sent the set
    pub suspend_policy: SuspendPolicy,
    /// Events in the order the VM listed them
    pub events: Vec<JdwpEvent>,
}

impl EventSet {
    /// The set synthesized when the connection drops.
    pub fn disconnected() -> Self {
        Self { suspend_policy: SuspendPolicy::None, events: vec![JdwpEvent::VmDisconnected] }
    }

    /// The thread to resume under [`SuspendPolicy::EventThread`].
    pub fn thread(&self) -> Option<ThreadId> {
        self.events.iter().find_map(JdwpEvent::thread)
    }

    /// Decode an `Event.Composite` command payload.
    pub fn decode(reader: &mut PacketReader) -> Result<Self, JdwpError> {
        let policy = reader.u8()?;
        let suspend_policy = SuspendPolicy::from_u8(policy)
            .ok_or_else(|| JdwpError::Protocol(format!("unknown suspend policy {policy}")))?;
        let count = reader.count()?;

        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(decode_event(reader)?);
        }
        Ok(Self { suspend_policy, events })
    }
}

fn decode_event(reader: &mut PacketReader) -> Result<JdwpEvent, JdwpError> {
    let kind = reader.u8()?;
    let request_id = reader.i32()?;

    Ok(match kind {
        event_kind::VM_START => JdwpEvent::VmStart { request_id, thread: reader.object_id()? },
        event_kind::SINGLE_STEP => JdwpEvent::SingleStep {
            request_id,
            thread: reader.object_id()?,
            location: reader.location()?,
        },
        event_kind::BREAKPOINT => JdwpEvent::Breakpoint {
            request_id,
            thread: reader.object_id()?,
            location: reader.location()?,
        },
        event_kind::METHOD_ENTRY => JdwpEvent::MethodEntry {
            request_id,
            thread: reader.object_id()?,
            location: reader.location()?,
        },
        event_kind::METHOD_EXIT => JdwpEvent::MethodExit {
            request_id,
            thread: reader.object_id()?,
            location: reader.location()?,
        },
        event_kind::EXCEPTION => {
            let thread = reader.object_id()?;
            let location = reader.location()?;
            let exception = reader.value()?.object_id().unwrap_or_default();
            let catch_location = reader.location()?;
            JdwpEvent::Exception {
                request_id,
                thread,
                location,
                exception,
                catch_location: (catch_location.class_id != 0).then_some(catch_location),
            }
        }
        event_kind::THREAD_START => JdwpEvent::ThreadStart { request_id, thread: reader.object_id()? },
        event_kind::THREAD_DEATH => JdwpEvent::ThreadDeath { request_id, thread: reader.object_id()? },
        event_kind::CLASS_PREPARE => JdwpEvent::ClassPrepare {
            request_id,
            thread: reader.object_id()?,
            ref_type_tag: reader.u8()?,
            type_id: reader.reference_type_id()?,
            signature: reader.string()?,
            status: reader.i32()?,
        },
        event_kind::VM_DEATH => JdwpEvent::VmDeath { request_id },
        other => return Err(JdwpError::Protocol(format!("unsupported event kind {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdwp::{tag, IdSizes, JdwpValue, PacketWriter};

    fn location(index: u64) -> Location {
        Location { type_tag: 1, class_id: 10, method_id: 20, index }
    }

    #[test]
    fn test_decode_composite() {
        let mut writer = PacketWriter::new(IdSizes::default());
        writer.u8(1).i32(3);
        writer.u8(event_kind::METHOD_ENTRY).i32(5).object_id(1).location(&location(0));
        writer
            .u8(event_kind::EXCEPTION)
            .i32(6)
            .object_id(1)
            .location(&location(4))
            .value(&JdwpValue::Object { tag: tag::OBJECT, id: 99 })
            .location(&Location { type_tag: 0, class_id: 0, method_id: 0, index: 0 });
        writer.u8(event_kind::VM_DEATH).i32(0);

        let mut reader = PacketReader::new(writer.finish(), IdSizes::default());
        let set = EventSet::decode(&mut reader).unwrap();

        assert_eq!(set.suspend_policy, SuspendPolicy::EventThread);
        assert_eq!(set.thread(), Some(1));
        assert_eq!(
            set.events,
            vec![
                JdwpEvent::MethodEntry { request_id: 5, thread: 1, location: location(0) },
                JdwpEvent::Exception {
                    request_id: 6,
                    thread: 1,
                    location: location(4),
                    exception: 99,
                    catch_location: None,
                },
                JdwpEvent::VmDeath { request_id: 0 },
            ]
        );
        assert!(set.events[2].is_terminal());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_unknown_event_kind_is_rejected() {
        let mut writer = PacketWriter::new(IdSizes::default());
        writer.u8(0).i32(1).u8(200).i32(0);
        let mut reader = PacketReader::new(writer.finish(), IdSizes::default());
        assert!(matches!(EventSet::decode(&mut reader), Err(JdwpError::Protocol(_))));
    }
}
