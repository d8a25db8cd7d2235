//! Mock DAP adapter for integration tests
//!
//! Implements just the request/event surface a console session actually
//! drives: initialize/launch/attach/configurationDone, breakpoints,
//! execution control, stack/scope/variable inspection, evaluate, source,
//! and a clean disconnect/terminate. Event ordering follows the real
//! protocol (`initialized` after the `initialize` response, not after
//! `configurationDone`), unlike a naive mock.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    let mut state = MockState::default();

    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).unwrap_or(0) == 0 {
            break;
        }
        if !header_line.starts_with("Content-Length:") {
            continue;
        }
        let content_length: usize = header_line
            .trim_start_matches("Content-Length:")
            .trim()
            .parse()
            .unwrap_or(0);

        let mut empty_line = String::new();
        reader.read_line(&mut empty_line).ok();

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let message: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };

        for response in state.process_message(&message) {
            send_message(&mut writer, &response);
        }
    }
}

fn send_message<W: Write>(writer: &mut W, message: &Value) {
    let body = serde_json::to_string(message).unwrap();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).ok();
    writer.write_all(body.as_bytes()).ok();
    writer.flush().ok();
}

struct MockState {
    seq: i64,
    mode_attach: bool,
    stop_on_entry: bool,
    current_line: u32,
    current_file: String,
    continue_count: u32,
    next_breakpoint_id: i64,
    variables: HashMap<String, (String, String)>,
}

impl Default for MockState {
    fn default() -> Self {
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), ("42".to_string(), "int".to_string()));
        variables.insert("y".to_string(), ("3.14".to_string(), "double".to_string()));

        Self {
            seq: 1,
            mode_attach: false,
            stop_on_entry: false,
            current_line: 1,
            current_file: "main.c".to_string(),
            continue_count: 0,
            next_breakpoint_id: 1,
            variables,
        }
    }
}

impl MockState {
    fn next_seq(&mut self) -> i64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    fn event(&mut self, event: &str, body: Value) -> Value {
        let seq = self.next_seq();
        json!({ "seq": seq, "type": "event", "event": event, "body": body })
    }

    fn stopped_event(&mut self, reason: &str, hit_ids: Vec<i64>) -> Value {
        self.event(
            "stopped",
            json!({
                "reason": reason,
                "threadId": 1,
                "allThreadsStopped": true,
                "hitBreakpointIds": hit_ids,
            }),
        )
    }

    fn process_message(&mut self, message: &Value) -> Vec<Value> {
        let (Some("request"), Some(command), Some(request_seq)) = (
            message.get("type").and_then(|v| v.as_str()),
            message.get("command").and_then(|v| v.as_str()),
            message.get("seq").and_then(|v| v.as_i64()),
        ) else {
            return Vec::new();
        };
        let arguments = message.get("arguments").cloned().unwrap_or(json!({}));

        let mut events = Vec::new();
        let (success, body) = self.handle(command, &arguments, &mut events);

        let seq = self.next_seq();
        let response = json!({
            "seq": seq,
            "type": "response",
            "request_seq": request_seq,
            "success": success,
            "command": command,
            "body": body,
        });

        let mut out = vec![response];
        out.extend(events);
        out
    }

    fn handle(&mut self, command: &str, arguments: &Value, events: &mut Vec<Value>) -> (bool, Value) {
        match command {
            "initialize" => {
                events.push(self.event("initialized", Value::Null));
                (
                    true,
                    json!({
                        "supportsConfigurationDoneRequest": true,
                        "supportsFunctionBreakpoints": true,
                        "supportsConditionalBreakpoints": false,
                        "supportsHitConditionalBreakpoints": false,
                        "supportsEvaluateForHovers": false,
                        "supportsStepBack": false,
                        "supportsSetVariable": false,
                        "supportsRestartRequest": false,
                        "supportsGotoTargetsRequest": false,
                        "supportsStepInTargetsRequest": false,
                        "supportsCompletionsRequest": false,
                        "supportsModulesRequest": false,
                        "supportsTerminateRequest": true,
                        "supportsReadyForEvaluationsEvent": true
                    }),
                )
            }
            "launch" => {
                self.stop_on_entry = arguments
                    .get("stopOnEntry")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                (true, Value::Null)
            }
            "attach" => {
                self.mode_attach = true;
                (true, Value::Null)
            }
            "configurationDone" => {
                events.push(self.event("readyForEvaluations", Value::Null));
                if self.mode_attach {
                    // Attached process keeps running until an explicit pause.
                } else if self.stop_on_entry {
                    let ev = self.stopped_event("entry", Vec::new());
                    events.push(ev);
                } else {
                    // Simulates hitting the breakpoint set before `run`.
                    let ev = self.stopped_event("breakpoint", vec![1]);
                    events.push(ev);
                }
                (true, Value::Null)
            }
            "setBreakpoints" => {
                let path = arguments
                    .get("source")
                    .and_then(|s| s.get("path"))
                    .and_then(|p| p.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let bps = arguments
                    .get("breakpoints")
                    .and_then(|b| b.as_array())
                    .cloned()
                    .unwrap_or_default();
                let breakpoints: Vec<Value> = bps
                    .iter()
                    .map(|bp| {
                        let id = self.next_breakpoint_id;
                        self.next_breakpoint_id += 1;
                        let line = bp.get("line").and_then(|l| l.as_u64()).unwrap_or(1);
                        json!({
                            "id": id,
                            "verified": true,
                            "line": line,
                            "source": { "path": path }
                        })
                    })
                    .collect();
                (true, json!({ "breakpoints": breakpoints }))
            }
            "setFunctionBreakpoints" => {
                let bps = arguments
                    .get("breakpoints")
                    .and_then(|b| b.as_array())
                    .cloned()
                    .unwrap_or_default();
                let breakpoints: Vec<Value> = bps
                    .iter()
                    .map(|bp| {
                        let id = self.next_breakpoint_id;
                        self.next_breakpoint_id += 1;
                        let name = bp.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
                        json!({ "id": id, "verified": true, "message": format!("breakpoint at {}", name) })
                    })
                    .collect();
                (true, json!({ "breakpoints": breakpoints }))
            }
            "setExceptionBreakpoints" => (true, json!({ "breakpoints": [] })),
            "continue" => {
                self.continue_count += 1;
                self.current_line += 1;
                if self.continue_count >= 3 {
                    events.push(self.event("exited", json!({ "exitCode": 0 })));
                    events.push(self.event("terminated", Value::Null));
                } else {
                    let ev = self.stopped_event("breakpoint", vec![1]);
                    events.push(ev);
                }
                (true, json!({ "allThreadsContinued": true }))
            }
            "next" | "stepIn" | "stepOut" => {
                self.current_line += 1;
                let ev = self.stopped_event("step", Vec::new());
                events.push(ev);
                (true, Value::Null)
            }
            "pause" => {
                let ev = self.stopped_event("pause", Vec::new());
                events.push(ev);
                (true, Value::Null)
            }
            "threads" => (true, json!({ "threads": [{ "id": 1, "name": "main" }] })),
            "stackTrace" => (
                true,
                json!({
                    "stackFrames": [
                        {
                            "id": 1,
                            "name": "main",
                            "source": { "name": &self.current_file, "path": format!("/test/{}", &self.current_file) },
                            "line": self.current_line,
                            "column": 1
                        }
                    ],
                    "totalFrames": 1
                }),
            ),
            "scopes" => (
                true,
                json!({
                    "scopes": [
                        { "name": "Locals", "variablesReference": 1000, "expensive": false },
                        { "name": "Globals", "variablesReference": 2000, "expensive": true }
                    ]
                }),
            ),
            "variables" => {
                let var_ref = arguments.get("variablesReference").and_then(|v| v.as_i64()).unwrap_or(0);
                let vars: Vec<Value> = if var_ref == 1000 {
                    self.variables
                        .iter()
                        .map(|(name, (value, type_name))| {
                            json!({ "name": name, "value": value, "type": type_name, "variablesReference": 0 })
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                (true, json!({ "variables": vars }))
            }
            "evaluate" => {
                let expr = arguments.get("expression").and_then(|e| e.as_str()).unwrap_or("");
                let result = match self.variables.get(expr) {
                    Some((value, type_name)) => json!({ "result": value, "type": type_name, "variablesReference": 0 }),
                    None => json!({ "result": format!("(eval: {})", expr), "type": "int", "variablesReference": 0 }),
                };
                (true, result)
            }
            "source" => {
                let reference = arguments.get("sourceReference").and_then(|v| v.as_i64()).unwrap_or(0);
                (
                    true,
                    json!({ "content": format!("// synthesized source for reference {}\n", reference) }),
                )
            }
            "disconnect" => {
                if !self.mode_attach {
                    events.push(self.event("terminated", Value::Null));
                }
                (true, Value::Null)
            }
            "terminate" => {
                events.push(self.event("exited", json!({ "exitCode": 0 })));
                events.push(self.event("terminated", Value::Null));
                (true, Value::Null)
            }
            _ => (false, json!({ "message": format!("unknown command: {}", command) })),
        }
    }
}
