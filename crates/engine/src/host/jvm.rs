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

//! A JVM launched under JDWP.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    process::{Child, Command},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use super::{DebugTarget, FrameSnapshot, HeapReader};
use crate::{
    jdwp::{
        error_code, event_kind, EventModifier, EventSet, FieldId, FieldInfo, JdwpClient, JdwpError,
        JdwpEvents, JdwpValue, LineTable, MethodId, ObjectId, ReferenceTypeId, RequestId, StepDepth,
        StepSize, SuspendPolicy, ThreadId, VariableInfo,
    },
    TraceError,
};

/// How long disposal waits for the VM to acknowledge and the process to exit
const DISPOSE_GRACE: Duration = Duration::from_millis(500);

/// Where the target's standard output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Forward to this process's stdout unmodified
    #[default]
    Stdout,
    /// Forward to this process's stderr, keeping stdout free for results
    Stderr,
}

/// Starts JVMs that connect back to a debugger socket
#[derive(Debug, Clone)]
pub struct JvmLauncher {
    java: PathBuf,
    attach_timeout: Duration,
    stderr_grace: Duration,
    stdout_sink: OutputSink,
}

impl JvmLauncher {
    /// Create a launcher for the given `java` executable.
    pub fn new(java: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            attach_timeout: Duration::from_secs(10),
            stderr_grace: Duration::from_millis(250),
            stdout_sink: OutputSink::Stdout,
        }
    }

    /// Set how long to wait for the JVM to connect.
    pub fn with_attach_timeout(mut self, attach_timeout: Duration) -> Self {
        self.attach_timeout = attach_timeout;
        self
    }

    /// Set where the target's stdout goes.
    pub fn with_stdout_sink(mut self, stdout_sink: OutputSink) -> Self {
        self.stdout_sink = stdout_sink;
        self
    }

    /// Launch `main_class` from `classpath`, suspended, and attach to it.
    ///
    /// `input`, when given, is written once to the program's stdin followed by a
    /// newline; stdin is closed afterwards either way.
    pub async fn launch(
        &self,
        classpath: &Path,
        main_class: &str,
        input: Option<&str>,
    ) -> Result<JvmTarget, TraceError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let port = listener.local_addr()?.port();

        let mut child = Command::new(&self.java)
            .arg(format!("-agentlib:jdwp=transport=dt_socket,server=n,suspend=y,address=127.0.0.1:{port}"))
            .arg("-cp")
            .arg(classpath)
            .arg(main_class)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TraceError::Launch(format!("could not start {}: {e}", self.java.display())))?;
        info!(pid = ?child.id(), port, main_class, "launched JVM");

        let mut io_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            io_tasks.push(forward_stdout(stdout, self.stdout_sink));
        }
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = child.stderr.take().map(|pipe| collect_stderr(pipe, stderr.clone()));
        if let Some(mut stdin) = child.stdin.take() {
            let line = input.map(|input| format!("{input}\n"));
            io_tasks.push(tokio::spawn(async move {
                if let Some(line) = line {
                    if let Err(e) = stdin.write_all(line.as_bytes()).await {
                        debug!(error = %e, "target did not take its input");
                    }
                }
                // Dropping stdin closes it.
            }));
        }

        let mut target = JvmTarget {
            client: None,
            child,
            stderr,
            stderr_task,
            io_tasks,
            stderr_grace: self.stderr_grace,
            line_tables: HashMap::new(),
            variable_tables: HashMap::new(),
            fields: HashMap::new(),
            disposed: false,
        };

        let attach = tokio::select! {
            accepted = timeout(self.attach_timeout, listener.accept()) => Ok(accepted),
            status = target.child.wait() => Err(status),
        };
        let accepted = match attach {
            Ok(accepted) => accepted,
            Err(status) => {
                let status = match status {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                let stderr = target.error_output().await;
                return Err(TraceError::Launch(format!(
                    "JVM exited ({status}) before the debugger attached: {stderr}"
                )));
            }
        };
        let stream = match accepted {
            Ok(Ok((stream, peer))) => {
                debug!(%peer, "JVM attached");
                stream
            }
            Ok(Err(e)) => return Err(TraceError::Launch(format!("accepting the JVM connection failed: {e}"))),
            Err(_) => {
                return Err(TraceError::Launch(format!(
                    "JVM did not attach within {} seconds",
                    self.attach_timeout.as_secs()
                )))
            }
        };

        target.client = Some(JdwpClient::connect(stream).await?);
        Ok(target)
    }
}

fn forward_stdout<R>(mut pipe: R, sink: OutputSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let copied = match sink {
            OutputSink::Stdout => tokio::io::copy(&mut pipe, &mut tokio::io::stdout()).await,
            OutputSink::Stderr => tokio::io::copy(&mut pipe, &mut tokio::io::stderr()).await,
        };
        if let Err(e) = copied {
            debug!(error = %e, "stopped forwarding target stdout");
        }
    })
}

fn collect_stderr<R>(mut pipe: R, buffer: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "stopped reading target stderr");
                    break;
                }
            }
        }
    })
}

/// A JVM process and its debug connection
pub struct JvmTarget {
    client: Option<(JdwpClient, JdwpEvents)>,
    child: Child,
    stderr: Arc<Mutex<Vec<u8>>>,
    stderr_task: Option<JoinHandle<()>>,
    io_tasks: Vec<JoinHandle<()>>,
    stderr_grace: Duration,
    line_tables: HashMap<(ReferenceTypeId, MethodId), Option<LineTable>>,
    variable_tables: HashMap<(ReferenceTypeId, MethodId), Vec<VariableInfo>>,
    fields: HashMap<ReferenceTypeId, Vec<FieldInfo>>,
    disposed: bool,
}

impl std::fmt::Debug for JvmTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JvmTarget").field("pid", &self.child.id()).field("disposed", &self.disposed).finish()
    }
}

impl JvmTarget {
    fn client(&self) -> Result<&JdwpClient, JdwpError> {
        self.client.as_ref().map(|(client, _)| client).ok_or(JdwpError::Disconnected)
    }

    async fn line_table(
        &mut self,
        class_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Option<LineTable>, JdwpError> {
        if let Some(table) = self.line_tables.get(&(class_id, method_id)) {
            return Ok(table.clone());
        }
        let table = match self.client()?.method_line_table(class_id, method_id).await {
            Ok(table) => Some(table),
            Err(e) if e.code() == Some(error_code::ABSENT_INFORMATION) => None,
            Err(e) => return Err(e),
        };
        self.line_tables.insert((class_id, method_id), table.clone());
        Ok(table)
    }

    async fn variable_table(
        &mut self,
        class_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<VariableInfo>, JdwpError> {
        if let Some(table) = self.variable_tables.get(&(class_id, method_id)) {
            return Ok(table.clone());
        }
        let table = match self.client()?.method_variable_table(class_id, method_id).await {
            Ok(table) => table,
            Err(e) if e.code() == Some(error_code::ABSENT_INFORMATION) => Vec::new(),
            Err(e) => return Err(e),
        };
        self.variable_tables.insert((class_id, method_id), table.clone());
        Ok(table)
    }
}

/// Variables in scope at `index`, the way a source-level debugger lists them:
/// `this` and synthetic outer references are hidden, a later declaration shadows
/// an earlier one of the same name, and the result is ordered by slot.
pub fn visible_locals(table: &[VariableInfo], index: u64) -> Vec<&VariableInfo> {
    let mut by_name: HashMap<&str, &VariableInfo> = HashMap::new();
    for var in table.iter().filter(|var| var.is_visible_at(index)) {
        if var.name == "this" || var.name.starts_with("this$") {
            continue;
        }
        by_name
            .entry(var.name.as_str())
            .and_modify(|existing| {
                if var.code_index >= existing.code_index {
                    *existing = var;
                }
            })
            .or_insert(var);
    }

    let mut visible: Vec<&VariableInfo> = by_name.into_values().collect();
    visible.sort_by_key(|var| (var.slot, var.code_index));
    visible
}

#[async_trait]
impl HeapReader for JvmTarget {
    async fn reference_type(&mut self, object: ObjectId) -> Result<ReferenceTypeId, JdwpError> {
        Ok(self.client()?.object_reference_reference_type(object).await?.1)
    }

    async fn instance_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
        if let Some(fields) = self.fields.get(&type_id) {
            return Ok(fields.clone());
        }

        let mut fields = Vec::new();
        let mut current = type_id;
        while current != 0 {
            let client = self.client()?;
            fields.extend(client.reference_type_fields(current).await?.into_iter().filter(|f| !f.is_static()));
            current = client.class_type_superclass(current).await?;
        }

        self.fields.insert(type_id, fields.clone());
        Ok(fields)
    }

    async fn field_values(&mut self, object: ObjectId, fields: &[FieldId]) -> Result<Vec<JdwpValue>, JdwpError> {
        self.client()?.object_reference_get_values(object, fields).await
    }

    async fn array_length(&mut self, array: ObjectId) -> Result<i32, JdwpError> {
        self.client()?.array_length(array).await
    }

    async fn array_values(&mut self, array: ObjectId, first: i32, length: i32) -> Result<Vec<JdwpValue>, JdwpError> {
        self.client()?.array_get_values(array, first, length).await
    }
}

#[async_trait]
impl DebugTarget for JvmTarget {
    async fn next_event_set(&mut self) -> Result<Option<EventSet>, JdwpError> {
        match self.client.as_mut() {
            Some((_, events)) => events.next().await,
            None => Ok(None),
        }
    }

    async fn resume(&mut self, events: &EventSet) -> Result<(), JdwpError> {
        let client = self.client()?;
        match (events.suspend_policy, events.thread()) {
            (SuspendPolicy::All, _) => client.vm_resume().await,
            (SuspendPolicy::EventThread, Some(thread)) => client.thread_resume(thread).await,
            (SuspendPolicy::EventThread, None) | (SuspendPolicy::None, _) => Ok(()),
        }
    }

    async fn request_method_entry(&mut self, class_pattern: &str) -> Result<RequestId, JdwpError> {
        let modifiers = [EventModifier::ClassMatch { pattern: class_pattern.to_string() }];
        self.client()?.event_request_set(event_kind::METHOD_ENTRY, SuspendPolicy::EventThread, &modifiers).await
    }

    async fn request_exceptions(&mut self, class_pattern: &str) -> Result<RequestId, JdwpError> {
        let modifiers = [
            EventModifier::ExceptionOnly { exception: 0, caught: true, uncaught: true },
            EventModifier::ClassMatch { pattern: class_pattern.to_string() },
        ];
        self.client()?.event_request_set(event_kind::EXCEPTION, SuspendPolicy::EventThread, &modifiers).await
    }

    async fn request_line_step(
        &mut self,
        thread: ThreadId,
        class_pattern: &str,
        exclusions: &[&str],
    ) -> Result<RequestId, JdwpError> {
        let mut modifiers = vec![
            EventModifier::Step { thread, size: StepSize::Line, depth: StepDepth::Into },
            EventModifier::ClassMatch { pattern: class_pattern.to_string() },
        ];
        modifiers.extend(exclusions.iter().map(|pattern| EventModifier::ClassExclude { pattern: pattern.to_string() }));
        self.client()?.event_request_set(event_kind::SINGLE_STEP, SuspendPolicy::EventThread, &modifiers).await
    }

    async fn clear_step(&mut self, request: RequestId) -> Result<(), JdwpError> {
        self.client()?.event_request_clear(event_kind::SINGLE_STEP, request).await
    }

    async fn top_frame(&mut self, thread: ThreadId) -> Result<Option<FrameSnapshot>, JdwpError> {
        let Some(frame) = self.client()?.frames(thread, 0, 1).await?.into_iter().next() else {
            return Ok(None);
        };
        let location = frame.location;

        let line = self
            .line_table(location.class_id, location.method_id)
            .await?
            .and_then(|table| table.line_at(location.index))
            .unwrap_or(-1);

        let table = self.variable_table(location.class_id, location.method_id).await?;
        let visible = visible_locals(&table, location.index);
        let slots: Vec<(i32, u8)> = visible.iter().map(|var| (var.slot, var.value_tag())).collect();
        let values = if slots.is_empty() {
            Vec::new()
        } else {
            self.client()?.stack_frame_get_values(thread, frame.frame_id, &slots).await?
        };

        let locals = visible.into_iter().map(|var| var.name.clone()).zip(values).collect();
        Ok(Some(FrameSnapshot { line, locals }))
    }

    async fn error_output(&mut self) -> String {
        if let Some(task) = self.stderr_task.take() {
            if timeout(self.stderr_grace, task).await.is_err() {
                debug!("target stderr still open after the drain grace period");
            }
        }
        String::from_utf8_lossy(&self.stderr.lock()).into_owned()
    }

    async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some((client, _)) = self.client.take() {
            match timeout(DISPOSE_GRACE, client.vm_dispose()).await {
                Ok(Ok(())) => debug!("VM disposed"),
                Ok(Err(e)) => debug!(error = %e, "VM dispose failed, the VM is probably gone"),
                Err(_) => warn!("VM did not acknowledge dispose in time"),
            }
        }

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "JVM already exited");
        }
        match timeout(DISPOSE_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "JVM exited"),
            Ok(Err(e)) => warn!(error = %e, "failed to reap JVM"),
            Err(_) => warn!("JVM did not exit after kill"),
        }

        for task in self.io_tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for JvmTarget {
    fn drop(&mut self) {
        for task in self.io_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, code_index: u64, length: u32, slot: i32) -> VariableInfo {
        VariableInfo { code_index, name: name.into(), signature: "I".into(), length, slot }
    }

    #[test]
    fn test_visible_locals_follow_debugger_rules() {
        let table = vec![
            var("this", 0, 40, 0),
            var("n", 0, 40, 1),
            var("i", 2, 10, 2),
            var("total", 4, 36, 3),
            var("i", 14, 20, 2),
            var("this$0", 0, 40, 4),
        ];

        let names = |index| visible_locals(&table, index).into_iter().map(|v| (v.name.as_str(), v.code_index)).collect::<Vec<_>>();

        assert_eq!(names(0), vec![("n", 0)]);
        assert_eq!(names(5), vec![("n", 0), ("i", 2), ("total", 4)]);
        assert_eq!(names(12), vec![("n", 0), ("total", 4)]);
        assert_eq!(names(20), vec![("n", 0), ("i", 14), ("total", 4)]);
    }

    #[test]
    fn test_shadowing_prefers_later_declaration() {
        let table = vec![var("x", 0, 30, 1), var("x", 10, 10, 2)];
        let visible = visible_locals(&table, 12);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].slot, 2);
    }
}
