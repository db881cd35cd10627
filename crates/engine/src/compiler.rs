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

//! Compiling assembled programs in a throwaway workspace.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{AssembledProgram, SourceUnit, TraceError};

/// A temporary directory holding one run's sources and classes.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, which also covers a cancelled (timed out) run.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    sources: Vec<PathBuf>,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new() -> Result<Self, TraceError> {
        let dir = tempfile::Builder::new().prefix("stepwise-").tempdir()?;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir, sources: Vec::new() })
    }

    /// Create a workspace holding every unit of `program`.
    pub async fn with_program(program: &AssembledProgram) -> Result<Self, TraceError> {
        let mut workspace = Self::new()?;
        for unit in program.units() {
            workspace.write_unit(unit).await?;
        }
        Ok(workspace)
    }

    /// Write `unit` as `<ClassName>.java`.
    pub async fn write_unit(&mut self, unit: &SourceUnit) -> Result<PathBuf, TraceError> {
        let path = self.dir.path().join(unit.file_name());
        tokio::fs::write(&path, &unit.source).await?;
        self.sources.push(path.clone());
        Ok(path)
    }

    /// Root of the workspace, also the classpath.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Source files written so far.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

/// Runs `javac` with debug tables on
#[derive(Debug, Clone)]
pub struct JavaCompiler {
    javac: PathBuf,
}

impl JavaCompiler {
    /// Create a compiler driver for the given `javac`.
    pub fn new(javac: impl Into<PathBuf>) -> Self {
        Self { javac: javac.into() }
    }

    /// Compile every source in `workspace` into the workspace root.
    ///
    /// Compiler diagnostics are returned verbatim in [`TraceError::Compile`].
    pub async fn compile(&self, workspace: &Workspace) -> Result<(), TraceError> {
        let output = Command::new(&self.javac)
            .arg("-g")
            .arg("-encoding")
            .arg("UTF-8")
            .arg("-d")
            .arg(workspace.path())
            .args(workspace.sources())
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TraceError::Launch(format!("could not run {}: {e}", self.javac.display())))?;

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            if diagnostics.trim().is_empty() {
                diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            info!(status = %output.status, "compilation failed");
            return Err(TraceError::Compile(diagnostics));
        }

        debug!(sources = workspace.sources().len(), "compiled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProgramAssembler;
    use stepwise_common::logging;
    use tracing::info;

    #[tokio::test]
    async fn test_workspace_writes_units_and_cleans_up() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let program = ProgramAssembler::new().assemble("int add(int a, int b) { return a + b; }", Some("a=1, b=2")).unwrap();
        let workspace = Workspace::with_program(&program).await.unwrap();
        let root = workspace.path().to_path_buf();

        let names: Vec<_> =
            workspace.sources().iter().filter_map(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["Solution.java", "Main.java"]);
        let container = std::fs::read_to_string(root.join("Solution.java")).unwrap();
        assert!(container.contains("int add(int a, int b)"));

        drop(workspace);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_missing_compiler_is_a_launch_error() {
        logging::ensure_test_logging(None);
        info!("Running test");

        let workspace = Workspace::new().unwrap();
        let compiler = JavaCompiler::new("/nonexistent/stepwise/javac");
        let err = compiler.compile(&workspace).await.unwrap_err();
        assert!(matches!(err, TraceError::Launch(_)), "{err}");
    }
}
