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

//! Wire contract of the trace service.
//!
//! [`trace`] holds the response document (trace file, input cases, step
//! records, heap entries and values); [`request`] holds the validated
//! request payload.

/// Request payload parsing and validation
pub mod request;
/// Trace documents as delivered to the visualizer front-end
pub mod trace;

pub use request::*;
pub use trace::*;
