//! Interactive console debugger front-end
//!
//! Parses launch/attach arguments, spawns the adapter, and drives a
//! single-threaded read-eval loop: console input and adapter events are
//! both pumped from the same task via `tokio::select!`.

use std::collections::HashMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dbgconsole::common::{logging, AdapterRegistry, Config, Error, FatalSessionError};
use dbgconsole::console::{dispatch, ConsoleCommand, ConsoleIO};
use dbgconsole::core::{AdapterDescriptor, SessionCore, SessionMode};
use dbgconsole::dap::DapClient;
use dbgconsole::Result;

#[derive(Parser)]
#[command(name = "dbgconsole", about = "Interactive console debugger for DAP adapters")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Launch a program under a debug adapter
    Launch {
        /// Adapter name, as configured in `[adapters]` or found on PATH
        #[arg(long, default_value = "lldb-dap")]
        adapter: String,
        /// Program to launch
        program: String,
        /// Arguments passed to the launched program
        args: Vec<String>,
        #[arg(long)]
        cwd: Option<String>,
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        #[arg(long)]
        stop_on_entry: bool,
    },
    /// Attach to a running process
    Attach {
        #[arg(long, default_value = "lldb-dap")]
        adapter: String,
        /// PID of the process to attach to
        pid: u32,
        /// Thread to pause immediately after attaching, if the adapter
        /// leaves the process running on attach
        #[arg(long)]
        async_stop_thread: Option<i64>,
    },
}

fn parse_env_pair(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

#[tokio::main]
async fn main() {
    let _guard = logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("fatal: {}", err.source);
        std::process::exit(err.exit_code);
    }
}

async fn run(cli: Cli) -> std::result::Result<(), FatalSessionError> {
    let config = Config::load().map_err(FatalSessionError::new)?;
    let mut descriptor = build_descriptor(&cli.command).map_err(FatalSessionError::new)?;

    let adapter_name = match &cli.command {
        Action::Launch { adapter, .. } => adapter,
        Action::Attach { adapter, .. } => adapter,
    };
    let adapter_config = AdapterRegistry::resolve(adapter_name, &config).map_err(FatalSessionError::new)?;
    descriptor.kind = adapter_config.kind;

    let transport = DapClient::spawn(&adapter_config.path, &adapter_config.args)
        .await
        .map_err(FatalSessionError::new)?;

    let request_timeout = Duration::from_secs(config.timeouts.dap_request_secs);
    let initialize_timeout = Duration::from_secs(config.timeouts.dap_initialize_secs);

    let mut session = SessionCore::new(dbgconsole::core::SourceFileCache::new(), request_timeout, initialize_timeout);

    session
        .create_session(Box::new(transport), descriptor)
        .await
        .map_err(FatalSessionError::new)?;

    let mut io = ConsoleIO::new();
    run_loop(&mut session, &mut io, &config).await.map_err(FatalSessionError::new)?;

    Ok(())
}

/// Spawn a fresh transport for the session's stored descriptor and
/// re-enter the configuring sequence, preserving breakpoints.
async fn relaunch_session(session: &mut SessionCore, config: &Config) -> Result<()> {
    let descriptor = session
        .descriptor()
        .cloned()
        .ok_or_else(|| Error::Internal("no descriptor to relaunch from".to_string()))?;
    let adapter_config = AdapterRegistry::resolve(&descriptor.adapter_id, config)?;
    let transport = DapClient::spawn(&adapter_config.path, &adapter_config.args).await?;
    session.relaunch(Box::new(transport), descriptor).await?;
    session.clear_relaunch();
    Ok(())
}

fn build_descriptor(action: &Action) -> Result<AdapterDescriptor> {
    match action {
        Action::Launch { adapter, program, args, cwd, env, stop_on_entry } => Ok(AdapterDescriptor {
            adapter_id: adapter.clone(),
            kind: Default::default(),
            mode: SessionMode::Launch,
            program: program.clone(),
            args: args.clone(),
            cwd: cwd.clone(),
            env: if env.is_empty() {
                None
            } else {
                Some(env.iter().cloned().collect::<HashMap<_, _>>())
            },
            stop_on_entry: *stop_on_entry,
            pid: None,
            async_stop_thread: None,
        }),
        Action::Attach { adapter, pid, async_stop_thread } => Ok(AdapterDescriptor {
            adapter_id: adapter.clone(),
            kind: Default::default(),
            mode: SessionMode::Attach,
            program: String::new(),
            args: Vec::new(),
            cwd: None,
            env: None,
            stop_on_entry: false,
            pid: Some(*pid),
            async_stop_thread: *async_stop_thread,
        }),
    }
}

/// Drive the console: read a line when input is enabled, otherwise pump
/// adapter events, printing whichever resolves first.
async fn run_loop(session: &mut SessionCore, io: &mut ConsoleIO, config: &Config) -> Result<()> {
    loop {
        if session.accepts_input() {
            io.start_input();
        } else {
            io.stop_input();
        }
        io.prompt();

        tokio::select! {
            line = io.next_line(), if io.input_enabled() => {
                match line? {
                    None => return Ok(()),
                    Some(text) => match ConsoleCommand::parse(&text) {
                        Ok(command) => {
                            let keep_going = dispatch(command, session, io).await.unwrap_or_else(|e| {
                                io.error_line(&e.to_string());
                                true
                            });
                            if !keep_going {
                                let _ = session.stop().await;
                                return Ok(());
                            }
                        }
                        Err(e) => io.error_line(&e.to_string()),
                    },
                }
            }
            event = session.pump_event() => {
                match event {
                    Ok(event) => print_event(io, &event),
                    Err(e) => {
                        io.error_line(&e.to_string());
                        return Ok(());
                    }
                }
            }
        }

        if session.state() == dbgconsole::core::SessionState::Terminated {
            if session.needs_relaunch() {
                io.status_line("debuggee terminated, relaunching");
                relaunch_session(session, config).await?;
            } else {
                return Ok(());
            }
        }
    }
}

fn print_event(io: &ConsoleIO, event: &dbgconsole::dap::Event) {
    use dbgconsole::dap::Event;
    match event {
        Event::Output(body) => io.output(&body.output),
        Event::Stopped(body) => io.status_line(&format!("stopped: {}", body.reason)),
        Event::Exited(body) => io.status_line(&format!("program exited with code {}", body.exit_code)),
        Event::Terminated(_) => io.status_line("debuggee terminated"),
        _ => {}
    }
}
