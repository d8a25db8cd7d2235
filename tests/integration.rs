//! End-to-end test driving the real `DapClient`/codec against the mock
//! adapter subprocess, exercising the launch -> breakpoint -> run ->
//! stop -> continue -> exit scenario end to end.

use std::path::PathBuf;
use std::time::Duration;

use dbgconsole::core::{AdapterDescriptor, SessionCore, SessionMode, SourceFileCache};
use dbgconsole::dap::DapClient;

fn mock_adapter_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock_adapter"))
}

fn test_session() -> SessionCore {
    SessionCore::new(SourceFileCache::new(), Duration::from_secs(5), Duration::from_secs(5))
}

fn launch_descriptor() -> AdapterDescriptor {
    AdapterDescriptor {
        adapter_id: "mock".to_string(),
        kind: Default::default(),
        mode: SessionMode::Launch,
        program: "/bin/true".to_string(),
        args: Vec::new(),
        cwd: None,
        env: None,
        stop_on_entry: false,
        pid: None,
        async_stop_thread: None,
    }
}

#[tokio::test]
async fn launch_breakpoint_run_stop_continue_exit() {
    let transport = DapClient::spawn(&mock_adapter_path(), &[]).await.expect("spawn mock adapter");
    let mut session = test_session();

    session
        .create_session(Box::new(transport), launch_descriptor())
        .await
        .expect("create session");

    assert!(session.capabilities().supports_function_breakpoints);

    session.add_source_breakpoint(PathBuf::from("/test/main.c"), 10);
    session.run().await.expect("run");
    assert_eq!(session.state(), dbgconsole::core::SessionState::Running);

    // Mock adapter responds to configurationDone with readyForEvaluations
    // before any stop; pump it so the flag settles.
    let event = session.pump_event().await.expect("pump readyForEvaluations");
    assert!(matches!(event, dbgconsole::dap::Event::ReadyForEvaluations));

    session.continue_execution().await.expect_err("cannot continue before stopped");

    // The mock stops once right after `configurationDone`, simulating
    // the breakpoint already being hit; each further `continue` stops
    // again until the third, which exits the debuggee.
    session.pump_event().await.expect("pump stop after run");
    assert_eq!(session.state(), dbgconsole::core::SessionState::Stopped);
    for _ in 0..2 {
        if session.state() == dbgconsole::core::SessionState::Stopped {
            session.continue_execution().await.expect("continue");
            session.pump_event().await.expect("pump after continue");
        }
    }

    assert!(session.breakpoints().all().next().is_some());
}

#[tokio::test]
async fn attach_runs_immediately_and_pauses_requested_thread() {
    let transport = DapClient::spawn(&mock_adapter_path(), &[]).await.expect("spawn mock adapter");
    let mut session = test_session();

    let descriptor = AdapterDescriptor {
        adapter_id: "mock".to_string(),
        kind: Default::default(),
        mode: SessionMode::Attach,
        program: String::new(),
        args: Vec::new(),
        cwd: None,
        env: None,
        stop_on_entry: false,
        pid: Some(4242),
        async_stop_thread: Some(1),
    };

    session.create_session(Box::new(transport), descriptor).await.expect("attach");
    assert!(session.is_attached());

    // readyForEvaluations fires from configurationDone, then the
    // requested pause produces a stopped event.
    let mut saw_stopped = false;
    for _ in 0..3 {
        let event = session.pump_event().await.expect("pump attach events");
        if matches!(event, dbgconsole::dap::Event::Stopped(_)) {
            saw_stopped = true;
            break;
        }
    }
    assert!(saw_stopped, "expected a stopped event after attach's requested pause");
}
