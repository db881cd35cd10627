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

//! The trace pipeline.
//!
//! A [`Tracer`] takes a snippet and one input through assembly, compilation,
//! launch under JDWP and the dispatch loop, all under one wall-clock timeout.
//!
//! # Workflow
//!
//! 1. **Assembly**: [`ProgramAssembler`] makes the snippet runnable
//! 2. **Compilation**: sources go to a fresh [`Workspace`] and through `javac -g`
//! 3. **Launch**: [`JvmLauncher`] starts the JVM suspended and attaches
//! 4. **Dispatch**: [`DebugSession`] records one [`StepRecord`] per line step
//!
//! The workspace and the JVM are owned by the pipeline future, so a timeout
//! that drops it also removes the directory and kills the process.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use stepwise_common::{InputCase, StepRecord, TraceFile, TraceRequest};

use crate::{
    DebugSession, JavaCompiler, JvmLauncher, OutputSink, ProgramAssembler, TraceError, Workspace,
};

/// Hard ceilings applied to every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLimits {
    /// Step events accepted before the loop stops early
    pub max_steps: usize,
    /// Objects materialized per step
    pub max_heap_objects: usize,
    /// Items kept per array
    pub max_array_items: usize,
    /// Deepest node chain followed from a local
    pub max_node_depth: usize,
}

impl Default for TraceLimits {
    fn default() -> Self {
        Self { max_steps: 3000, max_heap_objects: 500, max_array_items: 200, max_node_depth: 60 }
    }
}

/// Configuration for a [`Tracer`]
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// `java` executable
    pub java: PathBuf,
    /// `javac` executable
    pub javac: PathBuf,
    /// Per-run ceilings
    pub limits: TraceLimits,
    /// Wall-clock budget for one input, from assembly to teardown
    pub timeout: Duration,
    /// How long the JVM gets to connect back
    pub attach_timeout: Duration,
    /// Sessions allowed to run at once
    pub max_sessions: usize,
    /// Where the traced program's stdout goes
    pub stdout_sink: OutputSink,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            java: "java".into(),
            javac: "javac".into(),
            limits: TraceLimits::default(),
            timeout: Duration::from_secs(15),
            attach_timeout: Duration::from_secs(10),
            max_sessions: 10,
            stdout_sink: OutputSink::Stdout,
        }
    }
}

impl TracerConfig {
    /// Use `java` and `javac` from `<java_home>/bin`
    pub fn with_java_home(mut self, java_home: impl AsRef<Path>) -> Self {
        let bin = java_home.as_ref().join("bin");
        self.java = bin.join("java");
        self.javac = bin.join("javac");
        self
    }

    /// Set the step ceiling
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    /// Set the wall-clock budget per input
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the JVM attach timeout
    pub fn with_attach_timeout(mut self, attach_timeout: Duration) -> Self {
        self.attach_timeout = attach_timeout;
        self
    }

    /// Set the session pool size; zero is treated as one
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Set where the traced program's stdout goes
    pub fn with_stdout_sink(mut self, stdout_sink: OutputSink) -> Self {
        self.stdout_sink = stdout_sink;
        self
    }
}

/// Bound `run` by `limit`, failing with [`TraceError::Timeout`] on expiry.
///
/// Everything `run` owns is dropped on expiry; any partial result is discarded.
pub async fn with_timeout<T, F>(limit: Duration, run: F) -> Result<T, TraceError>
where
    F: Future<Output = Result<T, TraceError>>,
{
    match tokio::time::timeout(limit, run).await {
        Ok(result) => result,
        Err(_) => Err(TraceError::Timeout(limit)),
    }
}

/// Runs snippets and records their execution
#[derive(Debug, Clone)]
pub struct Tracer {
    config: TracerConfig,
    assembler: ProgramAssembler,
    compiler: JavaCompiler,
    launcher: JvmLauncher,
    sessions: Arc<Semaphore>,
}

impl Tracer {
    /// Create a tracer; clones share the session pool.
    pub fn new(config: TracerConfig) -> Self {
        let launcher = JvmLauncher::new(&config.java)
            .with_attach_timeout(config.attach_timeout)
            .with_stdout_sink(config.stdout_sink);
        Self {
            assembler: ProgramAssembler::new(),
            compiler: JavaCompiler::new(&config.javac),
            launcher,
            sessions: Arc::new(Semaphore::new(config.max_sessions.max(1))),
            config,
        }
    }

    /// The configuration this tracer was built with.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Trace `code` with one input.
    ///
    /// Waiting for a free session does not count against the timeout.
    pub async fn trace(&self, code: &str, input: Option<&str>) -> Result<Vec<StepRecord>, TraceError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|_| TraceError::Launch("the session pool is shut down".into()))?;
        debug!(available = self.sessions.available_permits(), "acquired session permit");

        with_timeout(self.config.timeout, self.run(code, input)).await
    }

    async fn run(&self, code: &str, input: Option<&str>) -> Result<Vec<StepRecord>, TraceError> {
        let program = self.assembler.assemble(code, input)?;
        info!(
            strategy = ?program.strategy,
            entry = %program.entry_class_name,
            container = %program.container_class_name,
            "assembled program"
        );

        let workspace = Workspace::with_program(&program).await?;
        self.compiler.compile(&workspace).await?;

        let target = self.launcher.launch(workspace.path(), &program.entry_class_name, input).await?;
        let outcome = DebugSession::new(target, program.class_filter(), self.config.limits).run().await?;
        Ok(outcome.steps)
    }

    /// Trace every input of `request` in order; the first failure aborts the rest.
    pub async fn trace_document(&self, request: &TraceRequest) -> Result<TraceFile, TraceError> {
        let mut inputs = Vec::with_capacity(request.inputs.len());
        for input in &request.inputs {
            info!(id = %input.id, "tracing input");
            let trace = self.trace(&request.code, input.value.as_deref()).await?;
            inputs.push(InputCase { id: input.id.clone(), label: input.label.clone(), value: input.value.clone(), trace });
        }

        Ok(TraceFile {
            title: request.title.clone(),
            language: request.language.clone(),
            code: request.code.clone(),
            inputs,
        })
    }
}
