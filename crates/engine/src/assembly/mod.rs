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

//! Snippet assembly.
//!
//! A submitted snippet is either a complete program (a class with an entry
//! point), which runs as-is, or a fragment with at least one method, which is
//! wrapped in a container class and driven by a synthesized entry class that
//! calls the first detected method with arguments built from the input text.

mod literal;
mod program;
mod signature;

pub use literal::*;
pub use program::*;
pub use signature::*;
