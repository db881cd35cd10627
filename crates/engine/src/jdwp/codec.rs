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

//! Packet framing and field encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{
    tag, EventModifier, FieldInfo, FrameInfo, IdSizes, JdwpError, JdwpValue, LineTable, Location,
    VariableInfo,
};

/// Length of the fixed packet header
pub const HEADER_LEN: usize = 11;
/// Flag set on reply packets
pub const REPLY_FLAG: u8 = 0x80;

/// Upper bound for a single packet, guarding against garbage lengths
const MAX_PACKET_LEN: usize = 64 * 1024 * 1024;

/// What a packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A command, sent by either side
    Command {
        /// Command set
        command_set: u8,
        /// Command
        command: u8,
    },
    /// A reply to an earlier command
    Reply {
        /// 0 on success
        error_code: u16,
    },
}

/// One framed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Packet id
    pub id: u32,
    /// Command or reply header fields
    pub kind: PacketKind,
    /// Payload
    pub data: Bytes,
}

impl RawPacket {
    /// Encode a command packet.
    pub fn command(id: u32, command_set: u8, command: u8, data: Bytes) -> Self {
        Self { id, kind: PacketKind::Command { command_set, command }, data }
    }

    /// Encode a reply packet.
    pub fn reply(id: u32, error_code: u16, data: Bytes) -> Self {
        Self { id, kind: PacketKind::Reply { error_code }, data }
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.put_u32((HEADER_LEN + self.data.len()) as u32);
        buf.put_u32(self.id);
        match self.kind {
            PacketKind::Command { command_set, command } => {
                buf.put_u8(0);
                buf.put_u8(command_set);
                buf.put_u8(command);
            }
            PacketKind::Reply { error_code } => {
                buf.put_u8(REPLY_FLAG);
                buf.put_u16(error_code);
            }
        }
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

/// Read one packet from the stream.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<RawPacket, JdwpError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(JdwpError::Disconnected),
        Err(e) => return Err(e.into()),
    }

    let mut head = &header[..];
    let length = head.get_u32() as usize;
    let id = head.get_u32();
    let flags = head.get_u8();
    if !(HEADER_LEN..=MAX_PACKET_LEN).contains(&length) {
        return Err(JdwpError::Protocol(format!("invalid packet length {length}")));
    }

    let kind = if flags & REPLY_FLAG != 0 {
        PacketKind::Reply { error_code: head.get_u16() }
    } else {
        PacketKind::Command { command_set: head.get_u8(), command: head.get_u8() }
    };

    let mut data = vec![0u8; length - HEADER_LEN];
    reader.read_exact(&mut data).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => JdwpError::Disconnected,
        _ => JdwpError::Io(e),
    })?;

    Ok(RawPacket { id, kind, data: data.into() })
}

/// Builds a command payload
#[derive(Debug)]
pub struct PacketWriter {
    buf: BytesMut,
    sizes: IdSizes,
}

impl PacketWriter {
    /// Start an empty payload.
    pub fn new(sizes: IdSizes) -> Self {
        Self { buf: BytesMut::new(), sizes }
    }

    /// Append a byte.
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append a boolean.
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(u8::from(value))
    }

    /// Append a 4-byte int.
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    /// Append a 8-byte long.
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    fn id(&mut self, size: usize, value: u64) -> &mut Self {
        self.buf.put_uint(value, size);
        self
    }

    /// Append an objectID (also used for thread ids).
    pub fn object_id(&mut self, value: u64) -> &mut Self {
        self.id(self.sizes.object, value)
    }

    /// Append a referenceTypeID.
    pub fn reference_type_id(&mut self, value: u64) -> &mut Self {
        self.id(self.sizes.reference_type, value)
    }

    /// Append a methodID.
    pub fn method_id(&mut self, value: u64) -> &mut Self {
        self.id(self.sizes.method, value)
    }

    /// Append a fieldID.
    pub fn field_id(&mut self, value: u64) -> &mut Self {
        self.id(self.sizes.field, value)
    }

    /// Append a frameID.
    pub fn frame_id(&mut self, value: u64) -> &mut Self {
        self.id(self.sizes.frame, value)
    }

    /// Append a location.
    pub fn location(&mut self, location: &Location) -> &mut Self {
        self.u8(location.type_tag)
            .reference_type_id(location.class_id)
            .method_id(location.method_id)
            .u64(location.index)
    }

    /// Append an event request modifier.
    pub fn modifier(&mut self, modifier: &EventModifier) -> &mut Self {
        self.u8(modifier.kind());
        match modifier {
            EventModifier::ThreadOnly { thread } => self.object_id(*thread),
            EventModifier::ClassMatch { pattern } | EventModifier::ClassExclude { pattern } => {
                self.string(pattern)
            }
            EventModifier::ExceptionOnly { exception, caught, uncaught } => {
                self.reference_type_id(*exception).bool(*caught).bool(*uncaught)
            }
            EventModifier::Step { thread, size, depth } => {
                self.object_id(*thread).i32(*size as i32).i32(*depth as i32)
            }
        }
    }

    /// Append a tagged value.
    pub fn value(&mut self, value: &JdwpValue) -> &mut Self {
        match *value {
            JdwpValue::Void => self.u8(tag::VOID),
            JdwpValue::Boolean(v) => self.u8(tag::BOOLEAN).bool(v),
            JdwpValue::Byte(v) => self.u8(tag::BYTE).u8(v as u8),
            JdwpValue::Char(v) => {
                self.u8(tag::CHAR);
                self.buf.put_u16(v);
                self
            }
            JdwpValue::Short(v) => {
                self.u8(tag::SHORT);
                self.buf.put_i16(v);
                self
            }
            JdwpValue::Int(v) => self.u8(tag::INT).i32(v),
            JdwpValue::Long(v) => self.u8(tag::LONG).u64(v as u64),
            JdwpValue::Float(v) => {
                self.u8(tag::FLOAT);
                self.buf.put_f32(v);
                self
            }
            JdwpValue::Double(v) => {
                self.u8(tag::DOUBLE);
                self.buf.put_f64(v);
                self
            }
            JdwpValue::Object { tag, id } => self.u8(tag).object_id(id),
        }
    }

    /// Finish the payload.
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

/// Reads fields out of a reply or event payload
#[derive(Debug, Clone)]
pub struct PacketReader {
    buf: Bytes,
    sizes: IdSizes,
}

impl PacketReader {
    /// Wrap a payload.
    pub fn new(buf: Bytes, sizes: IdSizes) -> Self {
        Self { buf, sizes }
    }

    /// Bytes left unread.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, len: usize) -> Result<(), JdwpError> {
        if self.buf.remaining() < len {
            return Err(JdwpError::Protocol(format!(
                "needed {len} more bytes, {} left",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    /// Read a byte.
    pub fn u8(&mut self) -> Result<u8, JdwpError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a boolean.
    pub fn bool(&mut self) -> Result<bool, JdwpError> {
        Ok(self.u8()? != 0)
    }

    /// Read a 2-byte value.
    pub fn u16(&mut self) -> Result<u16, JdwpError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read a 4-byte int.
    pub fn i32(&mut self) -> Result<i32, JdwpError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read an 8-byte long.
    pub fn u64(&mut self) -> Result<u64, JdwpError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Read a non-negative count.
    pub fn count(&mut self) -> Result<usize, JdwpError> {
        let count = self.i32()?;
        usize::try_from(count).map_err(|_| JdwpError::Protocol(format!("negative count {count}")))
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn string(&mut self) -> Result<String, JdwpError> {
        let len = self.count()?;
        self.need(len)?;
        let raw = self.buf.split_to(len);
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn id(&mut self, size: usize) -> Result<u64, JdwpError> {
        if !(1..=8).contains(&size) {
            return Err(JdwpError::Protocol(format!("unsupported id size {size}")));
        }
        self.need(size)?;
        Ok(self.buf.get_uint(size))
    }

    /// Read an objectID.
    pub fn object_id(&mut self) -> Result<u64, JdwpError> {
        self.id(self.sizes.object)
    }

    /// Read a referenceTypeID.
    pub fn reference_type_id(&mut self) -> Result<u64, JdwpError> {
        self.id(self.sizes.reference_type)
    }

    /// Read a methodID.
    pub fn method_id(&mut self) -> Result<u64, JdwpError> {
        self.id(self.sizes.method)
    }

    /// Read a fieldID.
    pub fn field_id(&mut self) -> Result<u64, JdwpError> {
        self.id(self.sizes.field)
    }

    /// Read a frameID.
    pub fn frame_id(&mut self) -> Result<u64, JdwpError> {
        self.id(self.sizes.frame)
    }

    /// Read a location.
    pub fn location(&mut self) -> Result<Location, JdwpError> {
        Ok(Location {
            type_tag: self.u8()?,
            class_id: self.reference_type_id()?,
            method_id: self.method_id()?,
            index: self.u64()?,
        })
    }

    /// Read a tagged value.
    pub fn value(&mut self) -> Result<JdwpValue, JdwpError> {
        let tag = self.u8()?;
        self.untagged_value(tag)
    }

    /// Read a value whose tag is known from context.
    pub fn untagged_value(&mut self, value_tag: u8) -> Result<JdwpValue, JdwpError> {
        Ok(match value_tag {
            tag::VOID => JdwpValue::Void,
            tag::BOOLEAN => JdwpValue::Boolean(self.bool()?),
            tag::BYTE => JdwpValue::Byte(self.u8()? as i8),
            tag::CHAR => JdwpValue::Char(self.u16()?),
            tag::SHORT => JdwpValue::Short(self.u16()? as i16),
            tag::INT => JdwpValue::Int(self.i32()?),
            tag::LONG => JdwpValue::Long(self.u64()? as i64),
            tag::FLOAT => JdwpValue::Float(f32::from_bits(self.i32()? as u32)),
            tag::DOUBLE => JdwpValue::Double(f64::from_bits(self.u64()?)),
            tag::ARRAY
            | tag::OBJECT
            | tag::STRING
            | tag::THREAD
            | tag::THREAD_GROUP
            | tag::CLASS_LOADER
            | tag::CLASS_OBJECT => JdwpValue::Object { tag: value_tag, id: self.object_id()? },
            other => return Err(JdwpError::Protocol(format!("unknown value tag {other:#x}"))),
        })
    }

    /// Read an `ArrayReference.GetValues` array region.
    pub fn array_region(&mut self) -> Result<Vec<JdwpValue>, JdwpError> {
        let region_tag = self.u8()?;
        let count = self.count()?;
        let primitive = tag::is_primitive(region_tag);
        (0..count)
            .map(|_| if primitive { self.untagged_value(region_tag) } else { self.value() })
            .collect()
    }

    /// Read a `ReferenceType.Fields` reply.
    pub fn fields(&mut self) -> Result<Vec<FieldInfo>, JdwpError> {
        let count = self.count()?;
        (0..count)
            .map(|_| -> Result<FieldInfo, JdwpError> {
                Ok(FieldInfo {
                    field_id: self.field_id()?,
                    name: self.string()?,
                    signature: self.string()?,
                    mod_bits: self.i32()?,
                })
            })
            .collect()
    }

    /// Read a `Method.LineTable` reply.
    pub fn line_table(&mut self) -> Result<LineTable, JdwpError> {
        let start = self.u64()? as i64;
        let end = self.u64()? as i64;
        let count = self.count()?;
        let lines = (0..count)
            .map(|_| -> Result<(u64, i32), JdwpError> { Ok((self.u64()?, self.i32()?)) })
            .collect::<Result<_, _>>()?;
        Ok(LineTable { start, end, lines })
    }

    /// Read a `Method.VariableTable` reply.
    pub fn variable_table(&mut self) -> Result<Vec<VariableInfo>, JdwpError> {
        let _arg_count = self.i32()?;
        let count = self.count()?;
        (0..count)
            .map(|_| -> Result<VariableInfo, JdwpError> {
                Ok(VariableInfo {
                    code_index: self.u64()?,
                    name: self.string()?,
                    signature: self.string()?,
                    length: self.i32()? as u32,
                    slot: self.i32()?,
                })
            })
            .collect()
    }

    /// Read a `ThreadReference.Frames` reply.
    pub fn frames(&mut self) -> Result<Vec<FrameInfo>, JdwpError> {
        let count = self.count()?;
        (0..count)
            .map(|_| -> Result<FrameInfo, JdwpError> {
                Ok(FrameInfo { frame_id: self.frame_id()?, location: self.location()? })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdwp::{StepDepth, StepSize};

    #[tokio::test]
    async fn test_packet_framing() {
        let mut payload = PacketWriter::new(IdSizes::default());
        payload.object_id(7).i32(0).i32(1);
        let packet = RawPacket::command(3, 11, 6, payload.finish());
        let encoded = packet.encode();
        assert_eq!(&encoded[..4], &[0, 0, 0, 27]);

        let mut stream = &encoded[..];
        let decoded = read_packet(&mut stream).await.unwrap();
        assert_eq!(decoded, packet);

        let reply = RawPacket::reply(3, 101, Bytes::new()).encode();
        let mut stream = &reply[..];
        let decoded = read_packet(&mut stream).await.unwrap();
        assert_eq!(decoded.kind, PacketKind::Reply { error_code: 101 });
    }

    #[tokio::test]
    async fn test_truncated_stream_is_a_disconnect() {
        let mut stream: &[u8] = &[0, 0, 0, 20, 0, 0];
        assert!(matches!(read_packet(&mut stream).await, Err(JdwpError::Disconnected)));
    }

    #[test]
    fn test_narrow_ids_and_tagged_values() {
        let sizes = IdSizes { field: 4, method: 4, object: 4, reference_type: 4, frame: 4 };
        let mut writer = PacketWriter::new(sizes);
        writer
            .value(&JdwpValue::Object { tag: tag::ARRAY, id: 0x0102_0304 })
            .value(&JdwpValue::Char(u16::from(b'x')))
            .value(&JdwpValue::Double(2.5));
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 5 + 3 + 9);

        let mut reader = PacketReader::new(bytes, sizes);
        assert_eq!(reader.value().unwrap(), JdwpValue::Object { tag: tag::ARRAY, id: 0x0102_0304 });
        assert_eq!(reader.value().unwrap(), JdwpValue::Char(120));
        assert_eq!(reader.value().unwrap(), JdwpValue::Double(2.5));
        assert!(reader.u8().is_err());
    }

    #[test]
    fn test_thread_scoped_step_request_modifiers() {
        let mut writer = PacketWriter::new(IdSizes::default());
        writer
            .modifier(&EventModifier::ThreadOnly { thread: 9 })
            .modifier(&EventModifier::Step { thread: 9, size: StepSize::Line, depth: StepDepth::Into });
        let mut reader = PacketReader::new(writer.finish(), IdSizes::default());
        assert_eq!(reader.u8().unwrap(), 3);
        assert_eq!(reader.object_id().unwrap(), 9);
        assert_eq!(reader.u8().unwrap(), 10);
        assert_eq!(reader.object_id().unwrap(), 9);
        assert_eq!(reader.i32().unwrap(), StepSize::Line as i32);
        assert_eq!(reader.i32().unwrap(), StepDepth::Into as i32);
        assert!(reader.u8().is_err());
    }

    #[test]
    fn test_primitive_array_region_is_untagged() {
        let mut writer = PacketWriter::new(IdSizes::default());
        writer.u8(tag::INT).i32(2).i32(5).i32(-1);
        let mut reader = PacketReader::new(writer.finish(), IdSizes::default());
        assert_eq!(reader.array_region().unwrap(), vec![JdwpValue::Int(5), JdwpValue::Int(-1)]);

        let mut writer = PacketWriter::new(IdSizes::default());
        writer.u8(tag::OBJECT).i32(1).value(&JdwpValue::Object { tag: tag::STRING, id: 4 });
        let mut reader = PacketReader::new(writer.finish(), IdSizes::default());
        assert_eq!(reader.array_region().unwrap(), vec![JdwpValue::Object { tag: tag::STRING, id: 4 }]);
    }
}
