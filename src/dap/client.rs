//! DAP client for communicating with debug adapters
//!
//! This module handles communication with DAP adapters like lldb-dap,
//! including the initialization sequence and request/response handling.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use crate::common::{Error, Result};

use super::codec;
use super::types::*;

/// The transport and protocol surface that the session core depends on.
///
/// [`DapClient`] is the production implementation, backed by a real
/// adapter subprocess. Session-core tests implement this trait with an
/// in-process double so they can run without spawning anything.
#[async_trait]
pub trait DebugSession: Send {
    fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<Event>>;

    async fn initialize(&mut self, adapter_id: &str) -> Result<Capabilities>;
    async fn wait_initialized(&mut self, timeout: Duration) -> Result<()>;

    async fn launch(&mut self, args: LaunchArguments) -> Result<()>;
    async fn attach(&mut self, args: AttachArguments) -> Result<()>;
    async fn configuration_done(&mut self) -> Result<()>;

    async fn set_breakpoints(
        &mut self,
        source_path: &Path,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>>;
    async fn set_function_breakpoints(
        &mut self,
        breakpoints: Vec<FunctionBreakpoint>,
    ) -> Result<Vec<Breakpoint>>;
    async fn set_exception_breakpoints(&mut self, filters: Vec<String>) -> Result<()>;

    async fn continue_execution(&mut self, thread_id: i64) -> Result<bool>;
    async fn next(&mut self, thread_id: i64) -> Result<()>;
    async fn step_in(&mut self, thread_id: i64) -> Result<()>;
    async fn step_out(&mut self, thread_id: i64) -> Result<()>;
    async fn pause(&mut self, thread_id: i64) -> Result<()>;

    async fn stack_trace(&mut self, thread_id: i64, levels: i64) -> Result<Vec<StackFrame>>;
    async fn threads(&mut self) -> Result<Vec<Thread>>;
    async fn scopes(&mut self, frame_id: i64) -> Result<Vec<Scope>>;
    async fn variables(&mut self, variables_reference: i64) -> Result<Vec<Variable>>;
    async fn evaluate(
        &mut self,
        expression: &str,
        frame_id: Option<i64>,
        context: &str,
    ) -> Result<EvaluateResponseBody>;
    async fn source(&mut self, source: &Source) -> Result<SourceResponseBody>;

    /// Block until the adapter sends the next event, forwarding any
    /// stray response to its waiter. Used by the session core's run
    /// loop while idle (e.g. waiting for `stopped` after `continue`).
    async fn next_event(&mut self) -> Result<Event>;

    async fn disconnect(&mut self, terminate_debuggee: bool) -> Result<()>;
    async fn terminate(&mut self) -> Result<()>;

    fn is_running(&mut self) -> bool;

    fn capabilities(&self) -> &Capabilities;
}

/// DAP client for communicating with a debug adapter subprocess
pub struct DapClient {
    adapter: Child,
    reader: BufReader<ChildStdout>,
    writer: BufWriter<ChildStdin>,
    seq: AtomicI64,
    capabilities: Capabilities,
    pending: HashMap<i64, oneshot::Sender<ResponseMessage>>,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: Option<mpsc::UnboundedReceiver<Event>>,
}

impl DapClient {
    /// Spawn a new DAP adapter and create a client
    pub async fn spawn(adapter_path: &Path, args: &[String]) -> Result<Self> {
        let mut cmd = Command::new(adapter_path);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut adapter = cmd.spawn().map_err(|e| {
            Error::AdapterSpawnFailed(format!(
                "Failed to start {}: {}",
                adapter_path.display(),
                e
            ))
        })?;

        let stdin = adapter
            .stdin
            .take()
            .ok_or_else(|| Error::AdapterSpawnFailed("Failed to get adapter stdin".to_string()))?;
        let stdout = adapter
            .stdout
            .take()
            .ok_or_else(|| Error::AdapterSpawnFailed("Failed to get adapter stdout".to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            adapter,
            reader: BufReader::new(stdout),
            writer: BufWriter::new(stdin),
            seq: AtomicI64::new(1),
            capabilities: Capabilities::default(),
            pending: HashMap::new(),
            event_tx,
            event_rx: Some(event_rx),
        })
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_request(&mut self, command: &str, arguments: Option<Value>) -> Result<i64> {
        let seq = self.next_seq();

        let request = if let Some(args) = arguments {
            serde_json::json!({
                "seq": seq,
                "type": "request",
                "command": command,
                "arguments": args
            })
        } else {
            serde_json::json!({
                "seq": seq,
                "type": "request",
                "command": command
            })
        };

        let json = serde_json::to_string(&request)?;
        tracing::debug!(%command, %json, "dap request");

        codec::write_message(&mut self.writer, &json).await?;

        Ok(seq)
    }

    async fn read_message(&mut self) -> Result<Value> {
        let json = codec::read_message(&mut self.reader).await?;
        tracing::debug!(%json, "dap message");
        serde_json::from_str(&json).map_err(|e| Error::DapProtocol(format!("Invalid JSON: {}", e)))
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &mut self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<T> {
        let seq = self.send_request(command, arguments).await?;

        loop {
            let msg = self.read_message().await?;

            let msg_type = msg
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            match msg_type {
                "response" => {
                    let response: ResponseMessage = serde_json::from_value(msg)?;

                    if response.request_seq == seq {
                        if response.success {
                            let body = response.body.unwrap_or(Value::Null);
                            return serde_json::from_value(body).map_err(|e| {
                                Error::DapProtocol(format!(
                                    "Failed to parse {} response: {}",
                                    command, e
                                ))
                            });
                        } else {
                            return Err(Error::dap_request_failed(
                                command,
                                &response.message.unwrap_or_else(|| "Unknown error".to_string()),
                            ));
                        }
                    } else if let Some(tx) = self.pending.remove(&response.request_seq) {
                        let _ = tx.send(response);
                    }
                }
                "event" => {
                    let event_msg: EventMessage = serde_json::from_value(msg)?;
                    let event = Event::from_message(&event_msg);
                    let _ = self.event_tx.send(event);
                }
                _ => {
                    tracing::warn!(%msg_type, "unexpected dap message type");
                }
            }
        }
    }
}

#[async_trait]
impl DebugSession for DapClient {
    fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.event_rx.take()
    }

    async fn initialize(&mut self, adapter_id: &str) -> Result<Capabilities> {
        let args = InitializeArguments {
            adapter_id: adapter_id.to_string(),
            ..Default::default()
        };

        let caps: Capabilities = self
            .request("initialize", Some(serde_json::to_value(&args)?))
            .await?;

        self.capabilities = caps.clone();
        Ok(caps)
    }

    async fn wait_initialized(&mut self, timeout: Duration) -> Result<()> {
        let timeout_secs = timeout.as_secs();
        tokio::time::timeout(timeout, async {
            loop {
                let msg = self.read_message().await?;

                let msg_type = msg
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");

                if msg_type == "event" {
                    let event_msg: EventMessage = serde_json::from_value(msg)?;
                    let event = Event::from_message(&event_msg);

                    if matches!(event, Event::Initialized) {
                        return Ok(());
                    }

                    let _ = self.event_tx.send(event);
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout(timeout_secs))?
    }

    async fn launch(&mut self, args: LaunchArguments) -> Result<()> {
        self.request::<Value>("launch", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn attach(&mut self, args: AttachArguments) -> Result<()> {
        self.request::<Value>("attach", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn configuration_done(&mut self) -> Result<()> {
        self.request::<Value>("configurationDone", None).await?;
        Ok(())
    }

    async fn set_breakpoints(
        &mut self,
        source_path: &Path,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>> {
        let args = SetBreakpointsArguments {
            source: Source {
                path: Some(source_path.to_string_lossy().into_owned()),
                ..Default::default()
            },
            breakpoints,
        };

        let response: SetBreakpointsResponseBody = self
            .request("setBreakpoints", Some(serde_json::to_value(&args)?))
            .await?;

        Ok(response.breakpoints)
    }

    async fn set_function_breakpoints(
        &mut self,
        breakpoints: Vec<FunctionBreakpoint>,
    ) -> Result<Vec<Breakpoint>> {
        let args = SetFunctionBreakpointsArguments { breakpoints };

        let response: SetBreakpointsResponseBody = self
            .request(
                "setFunctionBreakpoints",
                Some(serde_json::to_value(&args)?),
            )
            .await?;

        Ok(response.breakpoints)
    }

    async fn set_exception_breakpoints(&mut self, filters: Vec<String>) -> Result<()> {
        let args = SetExceptionBreakpointsArguments { filters };
        self.request::<Value>("setExceptionBreakpoints", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn continue_execution(&mut self, thread_id: i64) -> Result<bool> {
        let args = ContinueArguments {
            thread_id,
            single_thread: false,
        };

        let response: ContinueResponseBody = self
            .request("continue", Some(serde_json::to_value(&args)?))
            .await?;

        Ok(response.all_threads_continued)
    }

    async fn next(&mut self, thread_id: i64) -> Result<()> {
        let args = StepArguments {
            thread_id,
            granularity: Some("statement".to_string()),
        };

        self.request::<Value>("next", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn step_in(&mut self, thread_id: i64) -> Result<()> {
        let args = StepArguments {
            thread_id,
            granularity: Some("statement".to_string()),
        };

        self.request::<Value>("stepIn", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn step_out(&mut self, thread_id: i64) -> Result<()> {
        let args = StepArguments {
            thread_id,
            granularity: Some("statement".to_string()),
        };

        self.request::<Value>("stepOut", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn pause(&mut self, thread_id: i64) -> Result<()> {
        let args = PauseArguments { thread_id };

        self.request::<Value>("pause", Some(serde_json::to_value(&args)?))
            .await?;
        Ok(())
    }

    async fn stack_trace(&mut self, thread_id: i64, levels: i64) -> Result<Vec<StackFrame>> {
        let args = StackTraceArguments {
            thread_id,
            start_frame: Some(0),
            levels: Some(levels),
        };

        let response: StackTraceResponseBody = self
            .request("stackTrace", Some(serde_json::to_value(&args)?))
            .await?;

        Ok(response.stack_frames)
    }

    async fn threads(&mut self) -> Result<Vec<Thread>> {
        let response: ThreadsResponseBody = self.request("threads", None).await?;
        Ok(response.threads)
    }

    async fn scopes(&mut self, frame_id: i64) -> Result<Vec<Scope>> {
        let args = ScopesArguments { frame_id };

        let response: ScopesResponseBody = self
            .request("scopes", Some(serde_json::to_value(&args)?))
            .await?;

        Ok(response.scopes)
    }

    async fn variables(&mut self, variables_reference: i64) -> Result<Vec<Variable>> {
        let args = VariablesArguments {
            variables_reference,
            start: None,
            count: None,
        };

        let response: VariablesResponseBody = self
            .request("variables", Some(serde_json::to_value(&args)?))
            .await?;

        Ok(response.variables)
    }

    async fn evaluate(
        &mut self,
        expression: &str,
        frame_id: Option<i64>,
        context: &str,
    ) -> Result<EvaluateResponseBody> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: Some(context.to_string()),
        };

        self.request("evaluate", Some(serde_json::to_value(&args)?))
            .await
    }

    async fn source(&mut self, source: &Source) -> Result<SourceResponseBody> {
        let args = SourceArguments {
            source: Some(source.clone()),
            source_reference: source.source_reference.unwrap_or(0),
        };

        self.request("source", Some(serde_json::to_value(&args)?))
            .await
    }

    async fn next_event(&mut self) -> Result<Event> {
        // `request()` forwards events it runs into while waiting for its
        // own response onto this channel; drain it before blocking on
        // the wire, or those events are lost forever.
        if let Some(rx) = self.event_rx.as_mut() {
            if let Ok(event) = rx.try_recv() {
                return Ok(event);
            }
        }

        loop {
            let msg = self.read_message().await?;

            let msg_type = msg
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            match msg_type {
                "event" => {
                    let event_msg: EventMessage = serde_json::from_value(msg)?;
                    return Ok(Event::from_message(&event_msg));
                }
                "response" => {
                    let response: ResponseMessage = serde_json::from_value(msg)?;
                    if let Some(tx) = self.pending.remove(&response.request_seq) {
                        let _ = tx.send(response);
                    }
                }
                _ => tracing::warn!(%msg_type, "unexpected dap message type while waiting for event"),
            }
        }
    }

    async fn disconnect(&mut self, terminate_debuggee: bool) -> Result<()> {
        let args = DisconnectArguments {
            restart: false,
            terminate_debuggee: Some(terminate_debuggee),
        };

        // Don't wait for a response: the adapter may exit immediately.
        let _ = self
            .send_request("disconnect", Some(serde_json::to_value(&args)?))
            .await;

        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        let _ = self.disconnect(true).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let _ = self.adapter.kill().await;

        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.adapter.try_wait().ok().flatten().is_none()
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

impl Drop for DapClient {
    fn drop(&mut self) {
        // Best-effort: we can't await in Drop.
        let _ = self.adapter.start_kill();
    }
}
