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

//! Per-step heap materialization.
//!
//! A [`HeapSnapshotBuilder`] turns one suspended frame into a
//! [`StepRecord`](stepwise_common::StepRecord): locals in slot order plus every
//! array and linked node reachable from them, each materialized once per step.
//! Object types are classified into a closed set of [`Shape`]s once per run.

mod builder;
mod shape;

pub use builder::*;
pub use shape::*;
