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

//! Program assembly: snippet in, compilable units out.

use tracing::debug;

use super::{
    find_classes, find_entry_point, find_method, strip_comments, ClassDecl, LiteralSynthesizer,
    MethodSignature,
};
use crate::AssemblyError;

/// Imports every generated or user unit can rely on
pub const BASELINE_IMPORTS: &str = "import java.util.*; import java.util.stream.*;";

/// Container class synthesized around a bare method body
pub const SYNTHESIZED_CONTAINER: &str = "Solution";

/// Candidate names for the driver class, in preference order
const DRIVER_NAMES: &[&str] = &["Main", "Driver", "TraceMain"];

/// One compilation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Name of the public class; the file is `<class_name>.java`
    pub class_name: String,
    /// Full source text
    pub source: String,
}

impl SourceUnit {
    /// File name this unit must be written to.
    pub fn file_name(&self) -> String {
        format!("{}.java", self.class_name)
    }
}

/// How the snippet was turned into a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStrategy {
    /// The snippet already declares a class with an entry point
    Direct,
    /// A driver unit invokes a detected method
    Wrapper,
}

/// The result of assembling a snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledProgram {
    /// Strategy that produced this program
    pub strategy: AssemblyStrategy,
    /// Class whose entry point the JVM runs
    pub entry_class_name: String,
    /// Class whose family (name prefix) is stepped
    pub container_class_name: String,
    /// The snippet, as given or wrapped
    pub entry_unit: SourceUnit,
    /// Driver owning the entry point, in wrapper mode
    pub driver_unit: Option<SourceUnit>,
    /// The invoked method, in wrapper mode
    pub method: Option<MethodSignature>,
}

impl AssembledProgram {
    /// All units to compile.
    pub fn units(&self) -> impl Iterator<Item = &SourceUnit> {
        std::iter::once(&self.entry_unit).chain(self.driver_unit.iter())
    }

    /// Class filter pattern selecting the container family.
    pub fn class_filter(&self) -> String {
        format!("{}*", self.container_class_name)
    }
}

/// Decides how to run a snippet and synthesizes the missing pieces.
///
/// Pure: the same snippet and input always produce the same units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramAssembler {
    literals: LiteralSynthesizer,
}

impl ProgramAssembler {
    /// Create an assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble `code` into a runnable program, using `input` for call arguments.
    pub fn assemble(&self, code: &str, input: Option<&str>) -> Result<AssembledProgram, AssemblyError> {
        let scanned = strip_comments(code);
        let classes = find_classes(&scanned);

        if let (Some(entry_offset), false) = (find_entry_point(&scanned), classes.is_empty()) {
            let entry_class = enclosing_class(&classes, entry_offset).name.clone();
            debug!(entry_class = %entry_class, "assembling snippet directly");
            return Ok(AssembledProgram {
                strategy: AssemblyStrategy::Direct,
                entry_class_name: entry_class.clone(),
                container_class_name: entry_class,
                entry_unit: SourceUnit {
                    class_name: unit_class_name(&classes, entry_offset),
                    source: with_baseline_imports(code),
                },
                driver_unit: None,
                method: None,
            });
        }

        let method = find_method(&scanned)?.ok_or(AssemblyError::NoEntryMethod)?;

        let (container, entry_unit) = if classes.is_empty() {
            let unit = SourceUnit {
                class_name: SYNTHESIZED_CONTAINER.to_string(),
                source: format!("{BASELINE_IMPORTS} public class {SYNTHESIZED_CONTAINER} {{ {code}\n}}\n"),
            };
            (SYNTHESIZED_CONTAINER.to_string(), unit)
        } else {
            let container = enclosing_class(&classes, method.offset).name.clone();
            let unit = SourceUnit {
                class_name: unit_class_name(&classes, method.offset),
                source: with_baseline_imports(code),
            };
            (container, unit)
        };

        let driver_name = DRIVER_NAMES
            .iter()
            .find(|name| !name.starts_with(&container) && classes.iter().all(|class| class.name != **name))
            .ok_or_else(|| AssemblyError::DriverNameClash(container.clone()))?;

        let arguments = self.literals.arguments(&method.params, input);
        debug!(container = %container, driver = %driver_name, method = %method.name, "assembling wrapper program");

        Ok(AssembledProgram {
            strategy: AssemblyStrategy::Wrapper,
            entry_class_name: driver_name.to_string(),
            container_class_name: container.clone(),
            entry_unit,
            driver_unit: Some(SourceUnit {
                class_name: driver_name.to_string(),
                source: driver_source(driver_name, &container, &method, &arguments),
            }),
            method: Some(method),
        })
    }
}

/// The nearest class declared before `offset`, else the first class.
///
/// `classes` must be non-empty.
fn enclosing_class(classes: &[ClassDecl], offset: usize) -> &ClassDecl {
    classes.iter().rev().find(|class| class.offset < offset).unwrap_or(&classes[0])
}

/// The public class names the file; otherwise the enclosing class does.
fn unit_class_name(classes: &[ClassDecl], offset: usize) -> String {
    classes
        .iter()
        .find(|class| class.public)
        .unwrap_or_else(|| enclosing_class(classes, offset))
        .name
        .clone()
}

/// Put the baseline imports on line 1 so traced line numbers match the snippet.
pub fn with_baseline_imports(code: &str) -> String {
    if code.contains("import java.util.") {
        return code.to_string();
    }

    let leading = code.len() - code.trim_start().len();
    let body = &code[leading..];
    if body.starts_with("package ") {
        if let Some(semi) = body.find(';').filter(|semi| !body[..*semi].contains('\n')) {
            let split = leading + semi + 1;
            return format!("{} {BASELINE_IMPORTS}{}", &code[..split], &code[split..]);
        }
    }

    format!("{BASELINE_IMPORTS} {code}")
}

fn driver_source(driver: &str, container: &str, method: &MethodSignature, arguments: &[String]) -> String {
    let call = format!("solution.{}({})", method.name, arguments.join(", "));
    let invocation = if method.is_void() {
        format!("{call};")
    } else {
        format!("{} result = {call};", method.return_type)
    };

    format!(
        "{BASELINE_IMPORTS}\n\
         \n\
         public class {driver} {{\n\
         \x20 public static void main(String[] args) throws Exception {{\n\
         \x20   {container} solution = new {container}();\n\
         \x20   {invocation}\n\
         \x20 }}\n\
         }}\n"
    )
}
