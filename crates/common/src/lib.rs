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

//! Stepwise Common - Shared functionality for Stepwise components
//!
//! This crate provides the wire contract shared by the trace engine and the
//! `stepwise` binary (trace documents, request payloads) together with the
//! logging setup used by every component.

/// Wire types: trace documents, heap entries and request payloads
pub mod types;

/// Logging setup and utilities for consistent logging across Stepwise components
pub mod logging;

pub use logging::*;
pub use types::*;
