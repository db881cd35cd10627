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

//! The event-dispatch loop of one traced run.
//!
//! A [`DebugSession`] owns a [`DebugTarget`] for exactly one run. It subscribes
//! to method entry and exceptions in the traced class family, keeps one
//! line-step request per thread, and turns every step event into a
//! [`StepRecord`] until the program ends or the step ceiling is reached.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use stepwise_common::StepRecord;

use crate::{
    host::{DebugTarget, STEP_EXCLUSIONS},
    jdwp::{error_code, EventSet, JdwpError, JdwpEvent, RequestId, ThreadId},
    HeapSnapshotBuilder, TraceError, TraceLimits,
};

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The VM reported its own death
    VmDeath,
    /// The connection closed without a death event
    Disconnected,
    /// More steps arrived than the step ceiling allows
    StepCeiling,
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, requests not yet installed
    Launching,
    /// Dispatching events
    Running,
    /// The loop ended normally
    Terminated(StopReason),
    /// The run failed
    Failed,
}

/// Result of a completed session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    /// Captured steps in execution order
    pub steps: Vec<StepRecord>,
    /// Why the loop ended
    pub stop: StopReason,
    /// Step events received, captured or not
    pub steps_seen: usize,
}

/// One traced run over a [`DebugTarget`]
#[derive(Debug)]
pub struct DebugSession<T> {
    target: T,
    class_filter: String,
    limits: TraceLimits,
    builder: HeapSnapshotBuilder,
    state: SessionState,
    step_requests: HashMap<ThreadId, RequestId>,
    steps: Vec<StepRecord>,
    steps_seen: usize,
}

impl<T: DebugTarget> DebugSession<T> {
    /// Create a session tracing classes matching `class_filter`.
    pub fn new(target: T, class_filter: impl Into<String>, limits: TraceLimits) -> Self {
        Self {
            target,
            class_filter: class_filter.into(),
            limits,
            builder: HeapSnapshotBuilder::new(limits),
            state: SessionState::Launching,
            step_requests: HashMap::new(),
            steps: Vec::new(),
            steps_seen: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the program to completion and dispose of it.
    ///
    /// Fails with [`TraceError::Runtime`] when nothing was captured and the
    /// program wrote to stderr.
    pub async fn run(mut self) -> Result<SessionOutcome, TraceError> {
        let result = self.drive().await;
        self.target.dispose().await;

        match &result {
            Ok(outcome) => info!(
                steps = outcome.steps.len(),
                steps_seen = outcome.steps_seen,
                stop = ?outcome.stop,
                "trace session finished"
            ),
            Err(e) => warn!(error = %e, "trace session failed"),
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionOutcome, TraceError> {
        let stop = match self.dispatch_loop().await {
            Ok(stop) => stop,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };
        self.state = SessionState::Terminated(stop);

        if self.steps.is_empty() {
            let stderr = self.target.error_output().await;
            if !stderr.is_empty() {
                self.state = SessionState::Failed;
                return Err(TraceError::Runtime(stderr));
            }
        }

        Ok(SessionOutcome { steps: std::mem::take(&mut self.steps), stop, steps_seen: self.steps_seen })
    }

    async fn dispatch_loop(&mut self) -> Result<StopReason, JdwpError> {
        self.target.request_method_entry(&self.class_filter).await?;
        self.target.request_exceptions(&self.class_filter).await?;
        self.state = SessionState::Running;
        debug!(class_filter = %self.class_filter, "installed entry and exception requests");

        loop {
            let Some(events) = self.target.next_event_set().await? else {
                return Ok(StopReason::Disconnected);
            };

            if let Some(stop) = self.dispatch(&events).await? {
                return Ok(stop);
            }

            if let Err(e) = self.target.resume(&events).await {
                if is_gone(&e) {
                    debug!(error = %e, "VM went away while resuming");
                    return Ok(StopReason::Disconnected);
                }
                return Err(e);
            }
        }
    }

    async fn dispatch(&mut self, events: &EventSet) -> Result<Option<StopReason>, JdwpError> {
        for event in &events.events {
            match event {
                JdwpEvent::MethodEntry { thread, .. } => self.swap_step_request(*thread).await?,
                JdwpEvent::SingleStep { thread, .. } => {
                    self.steps_seen += 1;
                    if self.steps_seen > self.limits.max_steps {
                        info!(max_steps = self.limits.max_steps, "step ceiling reached, stopping early");
                        return Ok(Some(StopReason::StepCeiling));
                    }
                    self.capture(*thread).await;
                }
                JdwpEvent::Exception { thread, exception, catch_location, .. } => {
                    debug!(thread, exception, caught = catch_location.is_some(), "exception in traced code");
                }
                JdwpEvent::VmDeath { .. } => return Ok(Some(StopReason::VmDeath)),
                JdwpEvent::VmDisconnected => return Ok(Some(StopReason::Disconnected)),
                other => debug!(event = ?other, "ignoring event"),
            }
        }
        Ok(None)
    }

    /// Replace the thread's step request so exactly one is active.
    async fn swap_step_request(&mut self, thread: ThreadId) -> Result<(), JdwpError> {
        if let Some(previous) = self.step_requests.remove(&thread) {
            self.target.clear_step(previous).await?;
        }
        let request = self.target.request_line_step(thread, &self.class_filter, STEP_EXCLUSIONS).await?;
        self.step_requests.insert(thread, request);
        Ok(())
    }

    async fn capture(&mut self, thread: ThreadId) {
        let frame = match self.target.top_frame(thread).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(thread, "no frames to capture");
                return;
            }
            Err(e) => {
                warn!(thread, error = %e, "failed to read the top frame");
                return;
            }
        };

        match self.builder.capture(&mut self.target, &frame).await {
            Ok(step) => self.steps.push(step),
            Err(e) => warn!(thread, line = frame.line, error = %e, "failed to capture step"),
        }
    }
}

fn is_gone(e: &JdwpError) -> bool {
    matches!(e, JdwpError::Disconnected) || e.code() == Some(error_code::VM_DEAD)
}
