//! SessionCore: the debugger session state machine
//!
//! Owns the active `DebugSession` transport (if any), the breakpoint and
//! thread collections, and the source cache. Command handlers call into
//! this type; asynchronous adapter events are pumped into it one at a
//! time via [`SessionCore::pump_event`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{AdapterKind, Error, Result};
use crate::dap::{
    AttachArguments, Breakpoint as DapBreakpoint, Capabilities, Event, FunctionBreakpoint as DapFunctionBreakpoint,
    LaunchArguments, Source, SourceBreakpoint as DapSourceBreakpoint,
};
use crate::dap::DebugSession;

use super::breakpoints::{Breakpoint, BreakpointCollection};
use super::source_cache::{split_lines, SourceFileCache};
use super::state::SessionState;
use super::threads::ThreadCollection;

/// How the active session was started; governs relaunch/termination policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Launch,
    Attach,
}

/// The minimal concrete shape of an adapter launch/attach request: enough
/// to spawn the adapter and issue the right DAP request.
#[derive(Debug, Clone)]
pub struct AdapterDescriptor {
    pub adapter_id: String,
    pub kind: AdapterKind,
    pub mode: SessionMode,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub stop_on_entry: bool,
    pub pid: Option<u32>,
    /// If set, a `pause` is issued for this thread immediately after
    /// `configurationDone` completes in attach mode (scenario: an
    /// adapter that always starts a freshly-attached process running).
    pub async_stop_thread: Option<i64>,
}

impl AdapterDescriptor {
    fn launch_arguments(&self) -> LaunchArguments {
        LaunchArguments {
            program: self.program.clone(),
            args: self.args.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            stop_on_entry: self.stop_on_entry,
            init_commands: match self.kind {
                AdapterKind::LldbDap | AdapterKind::Codelldb => Some(Vec::new()),
                _ => None,
            },
            request: match self.kind {
                AdapterKind::Debugpy => Some("launch".to_string()),
                _ => None,
            },
            console: match self.kind {
                AdapterKind::Debugpy => Some("internalConsole".to_string()),
                _ => None,
            },
            just_my_code: match self.kind {
                AdapterKind::Debugpy => Some(true),
                _ => None,
            },
        }
    }
}

/// A snapshot of one scope's variables, in the adapter's original order.
#[derive(Debug)]
pub struct ScopeVariables {
    pub expensive: bool,
    pub scope_name: String,
    pub variables: Vec<crate::dap::Variable>,
}

/// The debugger session state machine.
pub struct SessionCore {
    state: SessionState,
    debug_session: Option<Box<dyn DebugSession>>,
    capabilities: Capabilities,
    breakpoints: BreakpointCollection,
    threads: ThreadCollection,
    source_cache: SourceFileCache,
    mode: Option<SessionMode>,
    ready_for_evaluations: bool,
    stopped_thread: Option<i64>,
    cached_frames: Vec<crate::dap::StackFrame>,
    exit_code: Option<i32>,
    request_timeout: Duration,
    initialize_timeout: Duration,
    descriptor: Option<AdapterDescriptor>,
    pending_relaunch: bool,
}

impl SessionCore {
    pub fn new(source_cache: SourceFileCache, request_timeout: Duration, initialize_timeout: Duration) -> Self {
        Self {
            state: SessionState::Terminated,
            debug_session: None,
            capabilities: Capabilities::default(),
            breakpoints: BreakpointCollection::new(),
            threads: ThreadCollection::new(),
            source_cache,
            mode: None,
            ready_for_evaluations: false,
            stopped_thread: None,
            cached_frames: Vec::new(),
            exit_code: None,
            request_timeout,
            initialize_timeout,
            descriptor: None,
            pending_relaunch: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn breakpoints(&self) -> &BreakpointCollection {
        &self.breakpoints
    }

    pub fn threads(&self) -> &ThreadCollection {
        &self.threads
    }

    /// Console input is enabled iff `Stopped`, or `Configuring` with the
    /// `readyForEvaluations` flag already raised.
    pub fn accepts_input(&self) -> bool {
        self.state == SessionState::Stopped
            || (self.state == SessionState::Configuring && self.ready_for_evaluations)
    }

    fn require_no_active_session(&self) -> Result<()> {
        if self.debug_session.is_some() {
            return Err(Error::SessionAlreadyActive);
        }
        Ok(())
    }

    fn require_active_session(&mut self) -> Result<&mut Box<dyn DebugSession>> {
        self.debug_session.as_mut().ok_or(Error::NoActiveSession)
    }

    fn require_state(&self, allowed: &[SessionState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::state_violation(action, self.state.label()))
        }
    }

    /// Attach a freshly spawned transport and start the handshake.
    /// `launch`/`relaunch` both funnel through here; `launch` additionally
    /// clears breakpoints first (callers decide that, per spec's
    /// launch-resets / relaunch-preserves distinction).
    pub async fn create_session(
        &mut self,
        mut debug_session: Box<dyn DebugSession>,
        descriptor: AdapterDescriptor,
    ) -> Result<()> {
        self.require_no_active_session()?;

        self.threads = ThreadCollection::new();
        self.cached_frames.clear();
        self.stopped_thread = None;
        self.ready_for_evaluations = false;
        self.exit_code = None;
        self.mode = Some(descriptor.mode);
        self.pending_relaunch = false;

        let caps = debug_session.initialize(&descriptor.adapter_id).await?;
        self.capabilities = caps;
        self.ready_for_evaluations = !self.capabilities.supports_ready_for_evaluations_event;

        self.debug_session = Some(debug_session);
        self.set_state(SessionState::Initializing);
        self.descriptor = Some(descriptor.clone());

        {
            let timeout = self.initialize_timeout;
            let session = self.require_active_session()?;
            session.wait_initialized(timeout).await?;
        }

        match descriptor.mode {
            SessionMode::Launch => {
                let args = descriptor.launch_arguments();
                let session = self.require_active_session()?;
                session.launch(args).await?;
                self.set_state(SessionState::Configuring);
            }
            SessionMode::Attach => {
                let pid = descriptor
                    .pid
                    .ok_or_else(|| Error::Internal("attach descriptor missing pid".to_string()))?;
                {
                    let session = self.require_active_session()?;
                    session.attach(AttachArguments { pid }).await?;
                }
                self.set_state(SessionState::Configuring);
                self.run().await?;
                if let Some(thread_id) = descriptor.async_stop_thread {
                    let session = self.require_active_session()?;
                    session.pause(thread_id).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn launch(&mut self, debug_session: Box<dyn DebugSession>, descriptor: AdapterDescriptor) -> Result<()> {
        self.breakpoints.delete_all();
        self.create_session(debug_session, descriptor).await
    }

    pub async fn relaunch(&mut self, debug_session: Box<dyn DebugSession>, descriptor: AdapterDescriptor) -> Result<()> {
        self.create_session(debug_session, descriptor).await
    }

    /// `run`: `Configuring` → `Running`. Resends the full breakpoint set,
    /// an empty exception-breakpoint set, `configurationDone` if
    /// supported, then refreshes the thread list.
    pub async fn run(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Configuring], "run")?;
        self.reset_all_breakpoints().await?;

        let supports_config_done = self.capabilities.supports_configuration_done_request;
        let session = self.require_active_session()?;
        session.set_exception_breakpoints(Vec::new()).await?;
        if supports_config_done {
            session.configuration_done().await?;
        }

        self.threads.mark_all_threads_running();
        let thread_list = { self.require_active_session()?.threads().await? };
        self.threads
            .update_threads(thread_list.into_iter().map(|t| (t.id, t.name)));
        self.threads.mark_all_threads_running();

        self.set_state(SessionState::Running);
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        tracing::info!(from = self.state.label(), to = state.label(), "session state transition");
        self.state = state;
    }

    /// Re-sends every enabled source's breakpoints plus the function
    /// breakpoint set, pairing the adapter's positional response back
    /// into the local collection.
    pub async fn reset_all_breakpoints(&mut self) -> Result<()> {
        let by_source: Vec<(PathBuf, Vec<(u32, DapSourceBreakpoint)>)> = self
            .breakpoints
            .all_enabled_by_source()
            .into_iter()
            .map(|(path, bps)| {
                let wire = bps
                    .iter()
                    .map(|b| {
                        (
                            b.index,
                            DapSourceBreakpoint {
                                line: b.line,
                                column: None,
                                condition: None,
                                hit_condition: None,
                            },
                        )
                    })
                    .collect();
                (path, wire)
            })
            .collect();

        for (path, indexed) in by_source {
            let wire_bps: Vec<DapSourceBreakpoint> = indexed.iter().map(|(_, b)| b.clone()).collect();
            let session = self.require_active_session()?;
            let response = session.set_breakpoints(&path, wire_bps).await?;
            self.apply_reconcile(&indexed.iter().map(|(i, _)| *i).collect::<Vec<_>>(), &response, false)?;
        }

        if self.capabilities.supports_function_breakpoints {
            let func_indices: Vec<u32> = self
                .breakpoints
                .all_enabled_function()
                .iter()
                .map(|b| b.index)
                .collect();
            let wire: Vec<DapFunctionBreakpoint> = self
                .breakpoints
                .all_enabled_function()
                .iter()
                .map(|b| DapFunctionBreakpoint {
                    name: b.func.clone(),
                    condition: None,
                    hit_condition: None,
                })
                .collect();
            if !func_indices.is_empty() {
                let session = self.require_active_session()?;
                let response = session.set_function_breakpoints(wire).await?;
                self.apply_reconcile(&func_indices, &response, true)?;
            }
        }

        Ok(())
    }

    fn apply_reconcile(&mut self, indices: &[u32], response: &[DapBreakpoint], is_function: bool) -> Result<()> {
        for (index, bp) in indices.iter().zip(response.iter()) {
            let id = bp.id;
            let verified = if id.is_none() { true } else { bp.verified };
            self.breakpoints.set_id(*index, id)?;
            self.breakpoints.set_verified(*index, verified, bp.message.clone())?;
            if is_function {
                if let (Some(source), Some(line)) = (&bp.source, bp.line) {
                    if let Some(path) = &source.path {
                        self.breakpoints.set_path_and_line(*index, PathBuf::from(path), line)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn add_source_breakpoint(&mut self, path: impl Into<PathBuf>, line: u32) -> u32 {
        self.breakpoints.add_source(path, line)
    }

    pub fn add_function_breakpoint(&mut self, func: impl Into<String>) -> Result<u32> {
        if !self.capabilities.supports_function_breakpoints {
            return Err(Error::CapabilityNotSupported("function breakpoints"));
        }
        Ok(self.breakpoints.add_function(func))
    }

    /// Enable/disable/delete all re-reconcile immediately if a session
    /// is active and past `Configuring`'s pre-launch batching window;
    /// while `Initializing`/before launch they just mutate local state
    /// (the initial `run()` sends the first full set).
    pub async fn set_breakpoint_enabled(&mut self, index: u32, enabled: bool) -> Result<()> {
        self.breakpoints.set_enabled(index, enabled)?;
        self.maybe_reconcile().await
    }

    pub async fn delete_breakpoint(&mut self, index: u32) -> Result<()> {
        self.breakpoints.delete(index)?;
        self.maybe_reconcile().await
    }

    pub async fn delete_all_breakpoints(&mut self) -> Result<()> {
        self.breakpoints.delete_all();
        self.maybe_reconcile().await
    }

    async fn maybe_reconcile(&mut self) -> Result<()> {
        if self.debug_session.is_some()
            && matches!(self.state, SessionState::Running | SessionState::Stopped | SessionState::Configuring)
        {
            self.reset_all_breakpoints().await?;
        }
        Ok(())
    }

    pub async fn continue_execution(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Stopped], "continue")?;
        let thread_id = self.stopped_thread.ok_or(Error::NoActiveSession)?;
        self.set_state(SessionState::Running);
        let session = self.require_active_session()?;
        session.continue_execution(thread_id).await?;
        Ok(())
    }

    pub async fn next(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Stopped], "next")?;
        let thread_id = self.stopped_thread.ok_or(Error::NoActiveSession)?;
        self.set_state(SessionState::Running);
        let session = self.require_active_session()?;
        session.next(thread_id).await
    }

    pub async fn step_in(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Stopped], "step")?;
        let thread_id = self.stopped_thread.ok_or(Error::NoActiveSession)?;
        self.set_state(SessionState::Running);
        let session = self.require_active_session()?;
        session.step_in(thread_id).await
    }

    pub async fn step_out(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Stopped], "finish")?;
        let thread_id = self.stopped_thread.ok_or(Error::NoActiveSession)?;
        self.set_state(SessionState::Running);
        let session = self.require_active_session()?;
        session.step_out(thread_id).await
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.require_state(&[SessionState::Running], "pause")?;
        let thread_id = self
            .threads
            .iter()
            .next()
            .map(|t| t.id)
            .ok_or(Error::NoActiveSession)?;
        let session = self.require_active_session()?;
        session.pause(thread_id).await?;
        Ok(())
    }

    pub async fn stack_trace(&mut self, levels: i64) -> Result<Vec<crate::dap::StackFrame>> {
        self.require_state(&[SessionState::Stopped], "backtrace")?;
        let thread_id = self.stopped_thread.ok_or(Error::NoActiveSession)?;
        let session = self.require_active_session()?;
        let frames = session.stack_trace(thread_id, levels).await?;
        self.cached_frames = frames.clone();
        Ok(frames)
    }

    pub fn select_thread(&mut self, id: i64) -> Result<()> {
        self.threads.set_focus_thread(id)?;
        self.stopped_thread = Some(id);
        Ok(())
    }

    pub fn focus_thread(&self) -> Option<i64> {
        self.threads.focus_thread().or(self.stopped_thread)
    }

    pub fn select_frame(&mut self, index: u32) -> Result<()> {
        if index as usize >= self.cached_frames.len() {
            return Err(Error::NoSuchFrame(index as usize));
        }
        if let Some(thread_id) = self.focus_thread() {
            self.threads.set_selected_frame(thread_id, index)?;
        }
        Ok(())
    }

    pub fn current_frame_index(&self) -> u32 {
        self.focus_thread()
            .and_then(|id| self.threads.get(id).ok())
            .map(|t| t.selected_frame)
            .unwrap_or(0)
    }

    pub fn frame_up(&mut self) -> Result<()> {
        let next = self.current_frame_index() + 1;
        self.select_frame(next)
    }

    pub fn frame_down(&mut self) -> Result<()> {
        let current = self.current_frame_index();
        if current == 0 {
            return Err(Error::NoSuchFrame(0));
        }
        self.select_frame(current - 1)
    }

    fn current_frame_id(&self) -> Option<i64> {
        self.cached_frames
            .get(self.current_frame_index() as usize)
            .map(|f| f.id)
    }

    /// Source location of the currently selected frame, for `list` with
    /// no explicit file argument.
    pub fn current_source(&self) -> Option<&Source> {
        self.cached_frames
            .get(self.current_frame_index() as usize)
            .and_then(|f| f.source.as_ref())
    }

    pub async fn get_variables_by_scope(&mut self, scope_name: Option<&str>) -> Result<Vec<ScopeVariables>> {
        self.require_state(&[SessionState::Stopped], "variables")?;
        let frame_id = self.current_frame_id().ok_or(Error::NoSuchFrame(0))?;

        let scopes = {
            let session = self.require_active_session()?;
            session.scopes(frame_id).await?
        };

        let retained: Vec<_> = match scope_name {
            Some(name) => {
                let found = scopes.iter().find(|s| s.name == name).cloned();
                match found {
                    Some(s) => vec![s],
                    None => return Err(Error::NoSuchScope(name.to_string())),
                }
            }
            None => scopes.into_iter().filter(|s| !s.expensive).collect(),
        };

        let mut result = Vec::with_capacity(retained.len());
        for scope in retained {
            let session = self.require_active_session()?;
            let variables = session.variables(scope.variables_reference).await?;
            result.push(ScopeVariables {
                expensive: scope.expensive,
                scope_name: scope.name,
                variables,
            });
        }
        Ok(result)
    }

    /// `frameId` is attached only when `Stopped` — a stack frame only
    /// exists once the debuggee has halted.
    pub async fn evaluate(&mut self, expression: &str) -> Result<crate::dap::EvaluateResponseBody> {
        let frame_id = if self.state == SessionState::Stopped {
            self.current_frame_id()
        } else {
            None
        };
        let session = self.require_active_session()?;
        session.evaluate(expression, frame_id, "repl").await
    }

    pub async fn get_source_lines(&mut self, source: &Source, start: usize, length: usize) -> Result<Vec<String>> {
        let all_lines = if let Some(reference) = source.source_reference.filter(|r| *r > 0) {
            match self.source_cache.cached_reference(reference) {
                Some(lines) => lines,
                None => {
                    let lines = match self.fetch_source_reference(source).await {
                        Ok(content) => split_lines(&content),
                        Err(e) => vec![format!("<source unavailable: {}>", e)],
                    };
                    self.source_cache.insert_reference(reference, lines.clone());
                    lines
                }
            }
        } else if let Some(path) = &source.path {
            self.source_cache.get_by_path(Path::new(path)).await
        } else {
            Vec::new()
        };

        if start > all_lines.len() {
            return Ok(Vec::new());
        }
        let from = start - 1;
        let to = (from + length).min(all_lines.len());
        Ok(all_lines[from..to].to_vec())
    }

    /// Issue the adapter's `source` request for a `sourceReference`. Kept
    /// separate from `get_source_lines` so the cache lookup above never
    /// holds a borrow across the request.
    async fn fetch_source_reference(&mut self, source: &Source) -> Result<String> {
        let session = self.require_active_session()?;
        Ok(session.source(source).await?.content)
    }

    pub async fn detach(&mut self) -> Result<()> {
        let session = self.require_active_session()?;
        session.disconnect(false).await?;
        self.close_session();
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        let session = self.require_active_session()?;
        session.disconnect(true).await?;
        self.close_session();
        Ok(())
    }

    fn close_session(&mut self) {
        self.debug_session = None;
        self.set_state(SessionState::Terminated);
        self.source_cache.flush();
        self.mode = None;
    }

    /// Process one adapter event, updating local models and state.
    /// Returns `Some(event)` echoed back for callers that want to log
    /// or print it (e.g. `output` events).
    pub async fn handle_event(&mut self, event: Event) -> Result<Option<Event>> {
        match event {
            Event::Stopped(ref body) => {
                let thread_id = body.thread_id;
                if body.all_threads_stopped {
                    self.threads.mark_all_threads_stopped();
                } else if let Some(id) = thread_id {
                    let _ = self.threads.mark_thread_stopped(id);
                }

                let focus = thread_id
                    .or_else(|| self.threads.first_stopped_thread().map(|t| t.id));
                if let Some(id) = focus {
                    self.stopped_thread = Some(id);
                    let _ = self.threads.set_focus_thread(id);
                }

                for id in &body.hit_breakpoint_ids {
                    if let Some(index) = self.breakpoints.get_index_by_id(*id) {
                        let _ = self.breakpoints.set_verified(index, true, None);
                    }
                }

                self.set_state(SessionState::Stopped);
            }
            Event::Continued { thread_id, all_threads_continued } => {
                if all_threads_continued {
                    self.threads.mark_all_threads_running();
                } else {
                    let _ = self.threads.mark_thread_running(thread_id);
                }
                self.set_state(SessionState::Running);
            }
            Event::Thread(ref body) => {
                if body.reason == "started" {
                    self.threads.add_thread(body.thread_id, format!("thread {}", body.thread_id));
                } else if body.reason == "exited" {
                    self.threads.remove_thread(body.thread_id);
                }
            }
            Event::Breakpoint { ref breakpoint, .. } => {
                if let Some(id) = breakpoint.id {
                    if let Some(index) = self.breakpoints.get_index_by_id(id) {
                        let _ = self.breakpoints.set_verified(index, breakpoint.verified, breakpoint.message.clone());
                    }
                }
            }
            Event::Exited(ref body) => {
                self.exit_code = Some(body.exit_code);
            }
            Event::Terminated(_) => {
                let mode = self.mode;
                self.close_session();
                // Launch mode: the debuggee was ours to begin with, so the
                // console relaunches it rather than ending the session.
                // Spawning the fresh transport needs the adapter registry
                // and process spawning that live with the main run loop,
                // so this only raises the flag; `relaunch` does the work.
                self.pending_relaunch = mode == Some(SessionMode::Launch);
            }
            Event::ReadyForEvaluations => {
                self.ready_for_evaluations = true;
            }
            Event::Initialized | Event::Output(_) | Event::Unknown { .. } => {}
        }
        Ok(Some(event))
    }

    /// Block until the next adapter event arrives, apply it, and return
    /// it for the console's output formatter. Used by the main run loop
    /// while waiting for a stop after `continue`/`step`/`pause`.
    pub async fn pump_event(&mut self) -> Result<Event> {
        let event = {
            let session = self.require_active_session()?;
            session.next_event().await?
        };
        self.handle_event(event.clone()).await?;
        Ok(event)
    }

    pub fn is_attached(&self) -> bool {
        self.mode == Some(SessionMode::Attach)
    }

    /// The descriptor used to start the current (or most recently
    /// closed) session, for `restart`-style relaunches.
    pub fn descriptor(&self) -> Option<&AdapterDescriptor> {
        self.descriptor.as_ref()
    }

    /// Set once a launch-mode session terminates, asking the caller to
    /// spawn a fresh transport and call [`SessionCore::relaunch`].
    pub fn needs_relaunch(&self) -> bool {
        self.pending_relaunch
    }

    pub fn clear_relaunch(&mut self) {
        self.pending_relaunch = false;
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::dap::{Scope, Thread as DapThread, Variable};

    use super::*;

    /// In-process stand-in for [`DapClient`], scripted by the test:
    /// canned responses for requests, a queue of events for
    /// `next_event`. No subprocess, no wire format.
    struct RecordingDebugSession {
        capabilities: Capabilities,
        next_bp_id: i64,
        events: VecDeque<Event>,
        threads: Vec<DapThread>,
        frames: Vec<crate::dap::StackFrame>,
        scopes: Vec<Scope>,
        variables: HashMap<i64, Vec<Variable>>,
        calls: Vec<String>,
    }

    impl RecordingDebugSession {
        fn new(capabilities: Capabilities) -> Self {
            Self {
                capabilities,
                next_bp_id: 1,
                events: VecDeque::new(),
                threads: vec![DapThread { id: 1, name: "main".to_string() }],
                frames: vec![crate::dap::StackFrame {
                    id: 10,
                    name: "main".to_string(),
                    source: Some(Source {
                        name: Some("main.rs".to_string()),
                        path: Some("/src/main.rs".to_string()),
                        source_reference: None,
                    }),
                    line: 5,
                    column: 1,
                }],
                scopes: vec![
                    Scope { name: "Locals".to_string(), variables_reference: 100, expensive: false },
                    Scope { name: "Registers".to_string(), variables_reference: 200, expensive: true },
                ],
                variables: HashMap::from([(
                    100,
                    vec![Variable {
                        name: "x".to_string(),
                        value: "1".to_string(),
                        type_name: Some("i32".to_string()),
                        variables_reference: 0,
                    }],
                )]),
                calls: Vec::new(),
            }
        }

        fn push_event(&mut self, event: Event) {
            self.events.push_back(event);
        }
    }

    #[async_trait]
    impl DebugSession for RecordingDebugSession {
        fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
            None
        }

        async fn initialize(&mut self, _adapter_id: &str) -> Result<Capabilities> {
            Ok(self.capabilities.clone())
        }

        async fn wait_initialized(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn launch(&mut self, _args: LaunchArguments) -> Result<()> {
            self.calls.push("launch".to_string());
            Ok(())
        }

        async fn attach(&mut self, _args: AttachArguments) -> Result<()> {
            self.calls.push("attach".to_string());
            Ok(())
        }

        async fn configuration_done(&mut self) -> Result<()> {
            self.calls.push("configurationDone".to_string());
            Ok(())
        }

        async fn set_breakpoints(
            &mut self,
            _source_path: &Path,
            breakpoints: Vec<DapSourceBreakpoint>,
        ) -> Result<Vec<DapBreakpoint>> {
            Ok(breakpoints
                .into_iter()
                .map(|b| {
                    let id = self.next_bp_id;
                    self.next_bp_id += 1;
                    DapBreakpoint {
                        id: Some(id),
                        verified: true,
                        message: None,
                        source: None,
                        line: Some(b.line),
                        column: None,
                    }
                })
                .collect())
        }

        async fn set_function_breakpoints(
            &mut self,
            breakpoints: Vec<DapFunctionBreakpoint>,
        ) -> Result<Vec<DapBreakpoint>> {
            Ok(breakpoints
                .into_iter()
                .map(|_| DapBreakpoint {
                    id: None,
                    verified: false,
                    message: None,
                    source: None,
                    line: None,
                    column: None,
                })
                .collect())
        }

        async fn set_exception_breakpoints(&mut self, _filters: Vec<String>) -> Result<()> {
            self.calls.push("setExceptionBreakpoints".to_string());
            Ok(())
        }

        async fn continue_execution(&mut self, _thread_id: i64) -> Result<bool> {
            self.calls.push("continue".to_string());
            Ok(true)
        }

        async fn next(&mut self, _thread_id: i64) -> Result<()> {
            self.calls.push("next".to_string());
            Ok(())
        }

        async fn step_in(&mut self, _thread_id: i64) -> Result<()> {
            self.calls.push("stepIn".to_string());
            Ok(())
        }

        async fn step_out(&mut self, _thread_id: i64) -> Result<()> {
            self.calls.push("stepOut".to_string());
            Ok(())
        }

        async fn pause(&mut self, _thread_id: i64) -> Result<()> {
            self.calls.push("pause".to_string());
            Ok(())
        }

        async fn stack_trace(&mut self, _thread_id: i64, _levels: i64) -> Result<Vec<crate::dap::StackFrame>> {
            Ok(self.frames.clone())
        }

        async fn threads(&mut self) -> Result<Vec<DapThread>> {
            Ok(self.threads.clone())
        }

        async fn scopes(&mut self, _frame_id: i64) -> Result<Vec<Scope>> {
            Ok(self.scopes.clone())
        }

        async fn variables(&mut self, variables_reference: i64) -> Result<Vec<Variable>> {
            Ok(self.variables.get(&variables_reference).cloned().unwrap_or_default())
        }

        async fn evaluate(
            &mut self,
            expression: &str,
            frame_id: Option<i64>,
            _context: &str,
        ) -> Result<crate::dap::EvaluateResponseBody> {
            Ok(crate::dap::EvaluateResponseBody {
                result: format!("{}@{:?}", expression, frame_id),
                type_name: None,
                variables_reference: 0,
            })
        }

        async fn source(&mut self, _source: &Source) -> Result<crate::dap::SourceResponseBody> {
            Ok(crate::dap::SourceResponseBody {
                content: "line one\r\nline two\r\n".to_string(),
                mime_type: None,
            })
        }

        async fn next_event(&mut self) -> Result<Event> {
            self.events
                .pop_front()
                .ok_or_else(|| Error::Internal("no more scripted events".to_string()))
        }

        async fn disconnect(&mut self, _terminate_debuggee: bool) -> Result<()> {
            self.calls.push("disconnect".to_string());
            Ok(())
        }

        async fn terminate(&mut self) -> Result<()> {
            self.calls.push("terminate".to_string());
            Ok(())
        }

        fn is_running(&mut self) -> bool {
            true
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }
    }

    fn full_capabilities() -> Capabilities {
        Capabilities {
            supports_configuration_done_request: true,
            supports_function_breakpoints: true,
            supports_ready_for_evaluations_event: false,
            ..Default::default()
        }
    }

    fn new_core() -> SessionCore {
        SessionCore::new(SourceFileCache::new(), Duration::from_secs(1), Duration::from_secs(1))
    }

    fn launch_descriptor() -> AdapterDescriptor {
        AdapterDescriptor {
            adapter_id: "test".to_string(),
            kind: AdapterKind::Generic,
            mode: SessionMode::Launch,
            program: "prog".to_string(),
            args: Vec::new(),
            cwd: None,
            env: None,
            stop_on_entry: false,
            pid: None,
            async_stop_thread: None,
        }
    }

    #[tokio::test]
    async fn launch_breakpoint_run_stop_continue_exit_scenario() {
        let mut core = new_core();
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, launch_descriptor()).await.unwrap();
        assert_eq!(core.state(), SessionState::Configuring);

        core.add_source_breakpoint(PathBuf::from("/src/main.rs"), 5);
        core.run().await.unwrap();
        assert_eq!(core.state(), SessionState::Running);
        assert!(core.breakpoints().all().next().unwrap().verified());

        core.handle_event(Event::Stopped(crate::dap::StoppedEventBody {
            reason: "breakpoint".to_string(),
            description: None,
            thread_id: Some(1),
            all_threads_stopped: true,
            hit_breakpoint_ids: vec![1],
            text: None,
        }))
        .await
        .unwrap();
        assert_eq!(core.state(), SessionState::Stopped);

        core.continue_execution().await.unwrap();
        assert_eq!(core.state(), SessionState::Running);

        core.handle_event(Event::Exited(crate::dap::ExitedEventBody { exit_code: 7 })).await.unwrap();
        assert_eq!(core.exit_code(), Some(7));

        core.handle_event(Event::Terminated(None)).await.unwrap();
        assert_eq!(core.state(), SessionState::Terminated);
        assert!(core.needs_relaunch(), "launch-mode termination should ask for a relaunch");
    }

    #[tokio::test]
    async fn attach_mode_termination_does_not_request_relaunch() {
        let mut core = new_core();
        let descriptor = AdapterDescriptor {
            adapter_id: "test".to_string(),
            kind: AdapterKind::Generic,
            mode: SessionMode::Attach,
            program: String::new(),
            args: Vec::new(),
            cwd: None,
            env: None,
            stop_on_entry: false,
            pid: Some(123),
            async_stop_thread: None,
        };
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, descriptor).await.unwrap();

        core.handle_event(Event::Terminated(None)).await.unwrap();
        assert_eq!(core.state(), SessionState::Terminated);
        assert!(!core.needs_relaunch());
    }

    #[tokio::test]
    async fn attach_runs_then_pauses_requested_thread() {
        let mut core = new_core();
        let mut debug_session = RecordingDebugSession::new(full_capabilities());
        debug_session.push_event(Event::Stopped(crate::dap::StoppedEventBody {
            reason: "pause".to_string(),
            description: None,
            thread_id: Some(1),
            all_threads_stopped: true,
            hit_breakpoint_ids: Vec::new(),
            text: None,
        }));

        let descriptor = AdapterDescriptor {
            adapter_id: "test".to_string(),
            kind: AdapterKind::Generic,
            mode: SessionMode::Attach,
            program: String::new(),
            args: Vec::new(),
            cwd: None,
            env: None,
            stop_on_entry: false,
            pid: Some(123),
            async_stop_thread: Some(1),
        };

        core.create_session(Box::new(debug_session), descriptor).await.unwrap();
        assert!(core.is_attached());
        assert_eq!(core.state(), SessionState::Running);

        let event = core.pump_event().await.unwrap();
        assert!(matches!(event, Event::Stopped(_)));
        assert_eq!(core.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn breakpoint_event_updates_verification() {
        let mut core = new_core();
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, launch_descriptor()).await.unwrap();
        let index = core.add_source_breakpoint(PathBuf::from("/src/main.rs"), 5);
        core.run().await.unwrap();

        core.handle_event(Event::Breakpoint {
            reason: "changed".to_string(),
            breakpoint: crate::dap::Breakpoint {
                id: core.breakpoints().get_by_index(index).unwrap().id(),
                verified: false,
                message: Some("module unloaded".to_string()),
                source: None,
                line: None,
                column: None,
            },
        })
        .await
        .unwrap();

        let bp = core.breakpoints().get_by_index(index).unwrap();
        assert!(!bp.verified());
    }

    #[tokio::test]
    async fn function_breakpoint_rejected_without_capability() {
        let mut core = new_core();
        let mut caps = full_capabilities();
        caps.supports_function_breakpoints = false;
        let session = Box::new(RecordingDebugSession::new(caps));
        core.create_session(session, launch_descriptor()).await.unwrap();

        let err = core.add_function_breakpoint("main").unwrap_err();
        assert!(matches!(err, Error::CapabilityNotSupported(_)));
    }

    #[tokio::test]
    async fn evaluate_attaches_frame_id_only_when_stopped() {
        let mut core = new_core();
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, launch_descriptor()).await.unwrap();
        core.run().await.unwrap();

        let result = core.evaluate("1 + 1").await.unwrap();
        assert_eq!(result.result, "1 + 1@None");

        core.handle_event(Event::Stopped(crate::dap::StoppedEventBody {
            reason: "breakpoint".to_string(),
            description: None,
            thread_id: Some(1),
            all_threads_stopped: true,
            hit_breakpoint_ids: Vec::new(),
            text: None,
        }))
        .await
        .unwrap();
        core.stack_trace(10).await.unwrap();

        let result = core.evaluate("x").await.unwrap();
        assert_eq!(result.result, "x@Some(10)");
    }

    #[tokio::test]
    async fn selected_scope_not_present_is_an_error() {
        let mut core = new_core();
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, launch_descriptor()).await.unwrap();
        core.run().await.unwrap();
        core.handle_event(Event::Stopped(crate::dap::StoppedEventBody {
            reason: "breakpoint".to_string(),
            description: None,
            thread_id: Some(1),
            all_threads_stopped: true,
            hit_breakpoint_ids: Vec::new(),
            text: None,
        }))
        .await
        .unwrap();
        core.stack_trace(10).await.unwrap();

        let err = core.get_variables_by_scope(Some("Watch")).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchScope(_)));

        let locals = core.get_variables_by_scope(Some("Locals")).await.unwrap();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].variables[0].name, "x");

        let defaults = core.get_variables_by_scope(None).await.unwrap();
        assert_eq!(defaults.len(), 1, "the expensive Registers scope should be skipped by default");
    }

    #[tokio::test]
    async fn source_reference_fetch_strips_carriage_returns() {
        let mut core = new_core();
        let session = Box::new(RecordingDebugSession::new(full_capabilities()));
        core.create_session(session, launch_descriptor()).await.unwrap();

        // `RecordingDebugSession::source` always returns
        // "line one\r\nline two\r\n"; `get_source_lines` drives the real
        // `source` request and the cache just memoizes the result.
        let frame_source = Source {
            name: None,
            path: None,
            source_reference: Some(42),
        };
        let lines = core.get_source_lines(&frame_source, 1, 2).await.unwrap();
        assert_eq!(lines, vec!["line one".to_string(), "line two".to_string()]);

        let path_lines = core
            .get_source_lines(
                &Source { name: None, path: Some("/does/not/exist".to_string()), source_reference: None },
                1,
                5,
            )
            .await
            .unwrap();
        assert!(path_lines.is_empty());
    }
}
