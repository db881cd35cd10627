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

//! Stepwise trace engine: snippet assembly, compilation, JDWP-driven stepping
//! and per-step heap snapshots.

pub mod assembly;
pub use assembly::*;

pub mod compiler;
pub use compiler::*;

pub mod core;
pub use core::*;

pub mod errors;
pub use errors::*;

pub mod host;
pub use host::*;

pub mod jdwp;

pub mod session;
pub use session::*;

pub mod snapshot;
pub use snapshot::*;
