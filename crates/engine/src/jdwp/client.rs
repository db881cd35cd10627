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

//! Connection handling and typed commands.

use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use super::{
    command, read_packet, EventModifier, EventSet, FieldId, FieldInfo, FrameId, FrameInfo, IdSizes,
    JdwpError, JdwpValue, LineTable, MethodId, ObjectId, PacketKind, PacketReader, PacketWriter,
    RawPacket, ReferenceTypeId, RequestId, SuspendPolicy, ThreadId, VariableInfo, HANDSHAKE,
};

/// Waiters keyed by packet id; `None` once the connection is gone
type PendingReplies = Arc<Mutex<Option<HashMap<u32, oneshot::Sender<RawPacket>>>>>;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Command side of a JDWP connection.
///
/// Commands may be issued concurrently; a background task routes each reply
/// to its caller and forwards event packets to the paired [`JdwpEvents`].
pub struct JdwpClient {
    writer: AsyncMutex<BoxedWriter>,
    pending: PendingReplies,
    next_id: AtomicU32,
    sizes: IdSizes,
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for JdwpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdwpClient").field("sizes", &self.sizes).finish_non_exhaustive()
    }
}

/// Event side of a JDWP connection
#[derive(Debug)]
pub struct JdwpEvents {
    rx: mpsc::UnboundedReceiver<Bytes>,
    sizes: IdSizes,
    closed: bool,
}

impl JdwpEvents {
    /// Wait for the next event set.
    ///
    /// When the connection closes a single [`EventSet::disconnected`] is
    /// yielded, then `None`.
    pub async fn next(&mut self) -> Result<Option<EventSet>, JdwpError> {
        match self.rx.recv().await {
            Some(data) => {
                let mut reader = PacketReader::new(data, self.sizes);
                EventSet::decode(&mut reader).map(Some)
            }
            None if !self.closed => {
                self.closed = true;
                Ok(Some(EventSet::disconnected()))
            }
            None => Ok(None),
        }
    }
}

impl JdwpClient {
    /// Perform the handshake over `stream` and query id sizes.
    pub async fn connect<S>(stream: S) -> Result<(Self, JdwpEvents), JdwpError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        write_half.write_all(HANDSHAKE).await?;
        write_half.flush().await?;
        let mut reply = [0u8; HANDSHAKE.len()];
        read_half
            .read_exact(&mut reply)
            .await
            .map_err(|e| JdwpError::Handshake(format!("no handshake from the VM: {e}")))?;
        if &reply != HANDSHAKE {
            return Err(JdwpError::Handshake(format!(
                "unexpected handshake {:?}",
                String::from_utf8_lossy(&reply)
            )));
        }

        let pending: PendingReplies = Arc::new(Mutex::new(Some(HashMap::new())));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(read_half, pending.clone(), event_tx));

        let mut client = Self {
            writer: AsyncMutex::new(Box::new(write_half)),
            pending,
            next_id: AtomicU32::new(1),
            sizes: IdSizes::default(),
            reader_task,
        };
        client.sizes = client.id_sizes().await?;
        debug!(sizes = ?client.sizes, "JDWP connection established");

        let events = JdwpEvents { rx: event_rx, sizes: client.sizes, closed: false };
        Ok((client, events))
    }

    fn payload(&self) -> PacketWriter {
        PacketWriter::new(self.sizes)
    }

    async fn send(&self, command_set: u8, command: u8, data: Bytes) -> Result<PacketReader, JdwpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().as_mut() {
            Some(waiters) => waiters.insert(id, tx),
            None => return Err(JdwpError::Disconnected),
        };

        trace!(id, command_set, command, "sending JDWP command");
        let packet = RawPacket::command(id, command_set, command, data).encode();
        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&packet).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            if let Some(waiters) = self.pending.lock().as_mut() {
                waiters.remove(&id);
            }
            return Err(e.into());
        }

        let reply = rx.await.map_err(|_| JdwpError::Disconnected)?;
        match reply.kind {
            PacketKind::Reply { error_code: 0 } => Ok(PacketReader::new(reply.data, self.sizes)),
            PacketKind::Reply { error_code } => {
                Err(JdwpError::Command { command_set, command, code: error_code })
            }
            PacketKind::Command { .. } => {
                Err(JdwpError::Protocol(format!("packet {id} answered with a command")))
            }
        }
    }

    async fn id_sizes(&self) -> Result<IdSizes, JdwpError> {
        let mut reply = self.send(command::VIRTUAL_MACHINE, command::VM_ID_SIZES, Bytes::new()).await?;
        let mut size = || -> Result<usize, JdwpError> { reply.count() };
        Ok(IdSizes {
            field: size()?,
            method: size()?,
            object: size()?,
            reference_type: size()?,
            frame: size()?,
        })
    }

    /// `VirtualMachine.Resume`
    pub async fn vm_resume(&self) -> Result<(), JdwpError> {
        self.send(command::VIRTUAL_MACHINE, command::VM_RESUME, Bytes::new()).await.map(drop)
    }

    /// `VirtualMachine.Dispose`
    pub async fn vm_dispose(&self) -> Result<(), JdwpError> {
        self.send(command::VIRTUAL_MACHINE, command::VM_DISPOSE, Bytes::new()).await.map(drop)
    }

    /// `ReferenceType.Fields`: fields declared by the type itself.
    pub async fn reference_type_fields(&self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
        let data = self.payload().reference_type_id(type_id).finish();
        self.send(command::REFERENCE_TYPE, command::RT_FIELDS, data).await?.fields()
    }

    /// `ClassType.Superclass`; 0 for `java.lang.Object`.
    pub async fn class_type_superclass(&self, class_id: ReferenceTypeId) -> Result<ReferenceTypeId, JdwpError> {
        let data = self.payload().reference_type_id(class_id).finish();
        self.send(command::CLASS_TYPE, command::CT_SUPERCLASS, data).await?.reference_type_id()
    }

    /// `Method.LineTable`
    pub async fn method_line_table(
        &self,
        class_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<LineTable, JdwpError> {
        let data = self.payload().reference_type_id(class_id).method_id(method_id).finish();
        self.send(command::METHOD, command::M_LINE_TABLE, data).await?.line_table()
    }

    /// `Method.VariableTable`
    pub async fn method_variable_table(
        &self,
        class_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<VariableInfo>, JdwpError> {
        let data = self.payload().reference_type_id(class_id).method_id(method_id).finish();
        self.send(command::METHOD, command::M_VARIABLE_TABLE, data).await?.variable_table()
    }

    /// `ObjectReference.ReferenceType`: the runtime type tag and id.
    pub async fn object_reference_reference_type(
        &self,
        object: ObjectId,
    ) -> Result<(u8, ReferenceTypeId), JdwpError> {
        let data = self.payload().object_id(object).finish();
        let mut reply = self.send(command::OBJECT_REFERENCE, command::OR_REFERENCE_TYPE, data).await?;
        Ok((reply.u8()?, reply.reference_type_id()?))
    }

    /// `ObjectReference.GetValues`
    pub async fn object_reference_get_values(
        &self,
        object: ObjectId,
        fields: &[FieldId],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut payload = self.payload();
        payload.object_id(object).i32(fields.len() as i32);
        for field in fields {
            payload.field_id(*field);
        }
        let mut reply = self.send(command::OBJECT_REFERENCE, command::OR_GET_VALUES, payload.finish()).await?;
        let count = reply.count()?;
        (0..count).map(|_| reply.value()).collect()
    }

    /// `ThreadReference.Resume`
    pub async fn thread_resume(&self, thread: ThreadId) -> Result<(), JdwpError> {
        let data = self.payload().object_id(thread).finish();
        self.send(command::THREAD_REFERENCE, command::TR_RESUME, data).await.map(drop)
    }

    /// `ThreadReference.Frames`; `length == -1` means all remaining frames.
    pub async fn frames(&self, thread: ThreadId, start: i32, length: i32) -> Result<Vec<FrameInfo>, JdwpError> {
        let data = self.payload().object_id(thread).i32(start).i32(length).finish();
        self.send(command::THREAD_REFERENCE, command::TR_FRAMES, data).await?.frames()
    }

    /// `ArrayReference.Length`
    pub async fn array_length(&self, array: ObjectId) -> Result<i32, JdwpError> {
        let data = self.payload().object_id(array).finish();
        self.send(command::ARRAY_REFERENCE, command::AR_LENGTH, data).await?.i32()
    }

    /// `ArrayReference.GetValues`
    pub async fn array_get_values(
        &self,
        array: ObjectId,
        first: i32,
        length: i32,
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let data = self.payload().object_id(array).i32(first).i32(length).finish();
        self.send(command::ARRAY_REFERENCE, command::AR_GET_VALUES, data).await?.array_region()
    }

    /// `EventRequest.Set`
    pub async fn event_request_set(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> Result<RequestId, JdwpError> {
        let mut payload = self.payload();
        payload.u8(event_kind).u8(suspend_policy as u8).i32(modifiers.len() as i32);
        for modifier in modifiers {
            payload.modifier(modifier);
        }
        self.send(command::EVENT_REQUEST, command::ER_SET, payload.finish()).await?.i32()
    }

    /// `EventRequest.Clear`
    pub async fn event_request_clear(&self, event_kind: u8, request_id: RequestId) -> Result<(), JdwpError> {
        let data = self.payload().u8(event_kind).i32(request_id).finish();
        self.send(command::EVENT_REQUEST, command::ER_CLEAR, data).await.map(drop)
    }

    /// `StackFrame.GetValues` for `(slot, tag)` pairs.
    pub async fn stack_frame_get_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[(i32, u8)],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut payload = self.payload();
        payload.object_id(thread).frame_id(frame).i32(slots.len() as i32);
        for (slot, tag) in slots {
            payload.i32(*slot).u8(*tag);
        }
        let mut reply = self.send(command::STACK_FRAME, command::SF_GET_VALUES, payload.finish()).await?;
        let count = reply.count()?;
        (0..count).map(|_| reply.value()).collect()
    }
}

impl Drop for JdwpClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_loop<R>(mut reader: R, pending: PendingReplies, events: mpsc::UnboundedSender<Bytes>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(JdwpError::Disconnected) => {
                debug!("JDWP connection closed by the VM");
                break;
            }
            Err(e) => {
                warn!(error = %e, "JDWP read failed, closing connection");
                break;
            }
        };

        match packet.kind {
            PacketKind::Reply { .. } => {
                let waiter = pending.lock().as_mut().and_then(|waiters| waiters.remove(&packet.id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(packet);
                    }
                    None => debug!(id = packet.id, "dropping reply nobody waits for"),
                }
            }
            PacketKind::Command { command_set: command::EVENT, command: command::E_COMPOSITE } => {
                if events.send(packet.data).is_err() {
                    trace!("event stream dropped, discarding event packet");
                }
            }
            PacketKind::Command { command_set, command: cmd } => {
                debug!(command_set, command = cmd, "ignoring unexpected VM command");
            }
        }
    }

    // Dropping the waiters fails every in-flight command with `Disconnected`.
    pending.lock().take();
}
