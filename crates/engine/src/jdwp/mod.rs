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

//! A minimal Java Debug Wire Protocol client.
//!
//! Only the commands needed to drive a line-stepping trace are implemented:
//! event requests, frames and local variables, field/array reads, and
//! resume/dispose. Replies are routed to callers by packet id; composite
//! event packets are forwarded to a separate [`JdwpEvents`] stream.

mod client;
mod codec;
mod events;
mod types;

pub use client::*;
pub use codec::*;
pub use events::*;
pub use types::*;

use thiserror::Error;

/// The handshake string both sides exchange before any packet
pub const HANDSHAKE: &[u8; 14] = b"JDWP-Handshake";

/// Command sets and commands used by the client
pub mod command {
    /// VirtualMachine command set
    pub const VIRTUAL_MACHINE: u8 = 1;
    /// VirtualMachine.IDSizes
    pub const VM_ID_SIZES: u8 = 7;
    /// VirtualMachine.Dispose
    pub const VM_DISPOSE: u8 = 6;
    /// VirtualMachine.Resume
    pub const VM_RESUME: u8 = 9;

    /// ReferenceType command set
    pub const REFERENCE_TYPE: u8 = 2;
    /// ReferenceType.Fields
    pub const RT_FIELDS: u8 = 4;

    /// ClassType command set
    pub const CLASS_TYPE: u8 = 3;
    /// ClassType.Superclass
    pub const CT_SUPERCLASS: u8 = 1;

    /// Method command set
    pub const METHOD: u8 = 6;
    /// Method.LineTable
    pub const M_LINE_TABLE: u8 = 1;
    /// Method.VariableTable
    pub const M_VARIABLE_TABLE: u8 = 2;

    /// ObjectReference command set
    pub const OBJECT_REFERENCE: u8 = 9;
    /// ObjectReference.ReferenceType
    pub const OR_REFERENCE_TYPE: u8 = 1;
    /// ObjectReference.GetValues
    pub const OR_GET_VALUES: u8 = 2;

    /// ThreadReference command set
    pub const THREAD_REFERENCE: u8 = 11;
    /// ThreadReference.Resume
    pub const TR_RESUME: u8 = 3;
    /// ThreadReference.Frames
    pub const TR_FRAMES: u8 = 6;

    /// ArrayReference command set
    pub const ARRAY_REFERENCE: u8 = 13;
    /// ArrayReference.Length
    pub const AR_LENGTH: u8 = 1;
    /// ArrayReference.GetValues
    pub const AR_GET_VALUES: u8 = 2;

    /// EventRequest command set
    pub const EVENT_REQUEST: u8 = 15;
    /// EventRequest.Set
    pub const ER_SET: u8 = 1;
    /// EventRequest.Clear
    pub const ER_CLEAR: u8 = 2;

    /// StackFrame command set
    pub const STACK_FRAME: u8 = 16;
    /// StackFrame.GetValues
    pub const SF_GET_VALUES: u8 = 1;

    /// Event command set (sent by the VM)
    pub const EVENT: u8 = 64;
    /// Event.Composite
    pub const E_COMPOSITE: u8 = 100;
}

/// Event kinds
pub mod event_kind {
    /// Single step
    pub const SINGLE_STEP: u8 = 1;
    /// Breakpoint
    pub const BREAKPOINT: u8 = 2;
    /// Exception thrown
    pub const EXCEPTION: u8 = 4;
    /// Thread started
    pub const THREAD_START: u8 = 6;
    /// Thread ended
    pub const THREAD_DEATH: u8 = 7;
    /// Class prepared
    pub const CLASS_PREPARE: u8 = 8;
    /// Method entered
    pub const METHOD_ENTRY: u8 = 40;
    /// Method exited
    pub const METHOD_EXIT: u8 = 41;
    /// VM initialized
    pub const VM_START: u8 = 90;
    /// VM terminated
    pub const VM_DEATH: u8 = 99;
}

/// Error codes the client interprets
pub mod error_code {
    /// Debug information (line or variable table) is missing
    pub const ABSENT_INFORMATION: u16 = 101;
    /// The VM is dead
    pub const VM_DEAD: u16 = 112;
}

/// Failures talking to a debuggee
#[derive(Debug, Error)]
pub enum JdwpError {
    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The peer did not answer the handshake correctly
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The connection closed
    #[error("VM disconnected")]
    Disconnected,
    /// A packet could not be decoded
    #[error("malformed packet: {0}")]
    Protocol(String),
    /// The VM rejected a command
    #[error("command {command_set}/{command} failed with error code {code}")]
    Command {
        /// Command set of the rejected command
        command_set: u8,
        /// Command within the set
        command: u8,
        /// JDWP error code
        code: u16,
    },
}

impl JdwpError {
    /// The JDWP error code, when the VM rejected a command.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Command { code, .. } => Some(*code),
            _ => None,
        }
    }
}
