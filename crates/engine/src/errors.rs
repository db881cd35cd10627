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

//! Error types of the trace pipeline.

use std::time::Duration;
use thiserror::Error;

use crate::jdwp::JdwpError;

/// Failures while turning a snippet into a runnable program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// The snippet has no runnable entry point and no method to wrap
    #[error("Could not find an entry method to run.")]
    NoEntryMethod,
    /// A parameter declaration could not be split into type and name
    #[error("Could not parse parameter `{parameter}` of method `{method}`")]
    MalformedParameter {
        /// Method whose parameter list failed to parse
        method: String,
        /// The offending parameter text
        parameter: String,
    },
    /// Every candidate driver class name is taken or falls in the container family
    #[error("Could not choose a driver class name next to `{0}`")]
    DriverNameClash(String),
}

/// The closed set of ways a trace run can fail
#[derive(Debug, Error)]
pub enum TraceError {
    /// The snippet could not be assembled
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    /// The compiler rejected the assembled source
    #[error("Compilation failed: {0}")]
    Compile(String),
    /// The target wrote to stderr and no step was captured
    #[error("Runtime Error: {0}")]
    Runtime(String),
    /// The wall-clock budget ran out; partial traces are discarded
    #[error("Execution timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
    /// The JVM could not be started or never attached
    #[error("Failed to launch the JVM: {0}")]
    Launch(String),
    /// The debug connection misbehaved
    #[error("Debugger protocol error: {0}")]
    Protocol(#[from] JdwpError),
    /// Workspace or process I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
