//! Console command grammar and dispatch
//!
//! One line of console input becomes a [`ConsoleCommand`], which the
//! dispatcher turns into calls against [`SessionCore`], printing results
//! through [`ConsoleIO`]. This is the REPL analogue of the one-shot clap
//! subcommands a short-lived CLI process would use: same command names,
//! read from a loop instead of `std::env::args()`.

use std::path::PathBuf;

use crate::common::{Error, Result};
use crate::core::SessionCore;

use super::io::ConsoleIO;

/// A breakpoint location, parsed from either `file:line` or a bare
/// function name.
#[derive(Debug, Clone)]
pub enum Location {
    Line { file: PathBuf, line: u32 },
    Function { name: String },
}

impl Location {
    /// Parse `"file.rs:42"` or `"main"`. Careful with Windows paths like
    /// `C:\path\file.rs:10`: only the last `:` followed purely by digits
    /// counts as a line separator.
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(colon_idx) = s.rfind(':') {
            let (file_part, line_part) = s.split_at(colon_idx);
            let line_str = &line_part[1..];

            if !line_str.is_empty() && line_str.chars().all(|c| c.is_ascii_digit()) {
                let line: u32 = line_str
                    .parse()
                    .map_err(|_| Error::InvalidLocation(format!("invalid line number: {}", line_str)))?;
                return Ok(Self::Line {
                    file: PathBuf::from(file_part),
                    line,
                });
            }
        }

        if s.trim().is_empty() {
            return Err(Error::InvalidLocation("empty location".to_string()));
        }

        Ok(Self::Function { name: s.to_string() })
    }
}

/// One parsed line of console input.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    Break(Location),
    Run,
    Continue,
    Next,
    Step,
    Finish,
    Pause,
    Backtrace,
    Frame(usize),
    Up,
    Down,
    Threads,
    Thread(i64),
    Print(String),
    Eval(String),
    List { start: Option<usize>, count: Option<usize> },
    Enable(u32),
    Disable(u32),
    Delete(Option<u32>),
    InfoBreakpoints,
    Quit,
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ConsoleCommand::Empty);
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        match command {
            "break" | "b" => Ok(ConsoleCommand::Break(Location::parse(rest)?)),
            "run" | "r" => Ok(ConsoleCommand::Run),
            "continue" | "c" => Ok(ConsoleCommand::Continue),
            "next" | "n" => Ok(ConsoleCommand::Next),
            "step" | "s" => Ok(ConsoleCommand::Step),
            "finish" => Ok(ConsoleCommand::Finish),
            "pause" => Ok(ConsoleCommand::Pause),
            "backtrace" | "bt" => Ok(ConsoleCommand::Backtrace),
            "frame" => {
                let n: usize = rest
                    .parse()
                    .map_err(|_| Error::InvalidLocation(format!("not a frame number: {}", rest)))?;
                Ok(ConsoleCommand::Frame(n))
            }
            "up" => Ok(ConsoleCommand::Up),
            "down" => Ok(ConsoleCommand::Down),
            "threads" => Ok(ConsoleCommand::Threads),
            "thread" => {
                let id: i64 = rest
                    .parse()
                    .map_err(|_| Error::InvalidLocation(format!("not a thread id: {}", rest)))?;
                Ok(ConsoleCommand::Thread(id))
            }
            "print" | "p" => Ok(ConsoleCommand::Print(rest.to_string())),
            "eval" => Ok(ConsoleCommand::Eval(rest.to_string())),
            "list" | "l" => {
                if rest.is_empty() {
                    Ok(ConsoleCommand::List { start: None, count: None })
                } else {
                    let mut pieces = rest.splitn(2, ',');
                    let start = pieces.next().and_then(|s| s.trim().parse().ok());
                    let count = pieces.next().and_then(|s| s.trim().parse().ok());
                    Ok(ConsoleCommand::List { start, count })
                }
            }
            "enable" => Ok(ConsoleCommand::Enable(parse_index(rest)?)),
            "disable" => Ok(ConsoleCommand::Disable(parse_index(rest)?)),
            "delete" => {
                if rest.is_empty() {
                    Ok(ConsoleCommand::Delete(None))
                } else {
                    Ok(ConsoleCommand::Delete(Some(parse_index(rest)?)))
                }
            }
            "info" if rest == "breakpoints" => Ok(ConsoleCommand::InfoBreakpoints),
            "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(Error::InvalidLocation(format!("unknown command: {}", other))),
        }
    }
}

fn parse_index(s: &str) -> Result<u32> {
    s.parse()
        .map_err(|_| Error::InvalidLocation(format!("not a breakpoint index: {}", s)))
}

/// Default number of lines `list` with no explicit count shows.
const DEFAULT_LIST_COUNT: usize = 10;

/// Run one parsed command against the session core, printing results.
pub async fn dispatch(command: ConsoleCommand, session: &mut SessionCore, io: &ConsoleIO) -> Result<bool> {
    match command {
        ConsoleCommand::Empty => {}

        ConsoleCommand::Break(location) => match location {
            Location::Line { file, line } => {
                let index = session.add_source_breakpoint(file.clone(), line);
                io.status_line(&format!("Breakpoint {} at {}:{}", index, file.display(), line));
            }
            Location::Function { name } => {
                let index = session.add_function_breakpoint(name.clone())?;
                io.status_line(&format!("Breakpoint {} at function '{}'", index, name));
            }
        },

        ConsoleCommand::Run => {
            session.run().await?;
            io.status_line("Running");
        }

        ConsoleCommand::Continue => {
            session.continue_execution().await?;
            io.status_line("Continuing");
        }

        ConsoleCommand::Next => {
            session.next().await?;
        }

        ConsoleCommand::Step => {
            session.step_in().await?;
        }

        ConsoleCommand::Finish => {
            session.step_out().await?;
        }

        ConsoleCommand::Pause => {
            session.pause().await?;
        }

        ConsoleCommand::Backtrace => {
            let frames = session.stack_trace(50).await?;
            for (i, frame) in frames.iter().enumerate() {
                let source = frame
                    .source
                    .as_ref()
                    .and_then(|s| s.path.as_deref())
                    .unwrap_or("?");
                io.output_line(&format!("#{} {} at {}:{}", i, frame.name, source, frame.line));
            }
        }

        ConsoleCommand::Frame(n) => {
            session.select_frame(n as u32)?;
            io.status_line(&format!("Selected frame {}", n));
        }

        ConsoleCommand::Up => {
            session.frame_up()?;
            io.status_line(&format!("Frame {}", session.current_frame_index()));
        }

        ConsoleCommand::Down => {
            session.frame_down()?;
            io.status_line(&format!("Frame {}", session.current_frame_index()));
        }

        ConsoleCommand::Threads => {
            for t in session.threads().iter() {
                let marker = if Some(t.id) == session.focus_thread() { "*" } else { " " };
                io.output_line(&format!("{} thread {} ({})", marker, t.id, t.name));
            }
        }

        ConsoleCommand::Thread(id) => {
            session.select_thread(id)?;
            io.status_line(&format!("Switched to thread {}", id));
        }

        ConsoleCommand::Print(expr) | ConsoleCommand::Eval(expr) => {
            let result = session.evaluate(&expr).await?;
            io.output_line(&result.result);
        }

        ConsoleCommand::List { start, count } => {
            let source = session
                .current_source()
                .cloned()
                .ok_or_else(|| Error::SourceUnavailable("no current frame selected".to_string()))?;
            let lines = session
                .get_source_lines(&source, start.unwrap_or(1), count.unwrap_or(DEFAULT_LIST_COUNT))
                .await?;
            for (i, line) in lines.iter().enumerate() {
                io.output_line(&format!("{}\t{}", start.unwrap_or(1) + i, line));
            }
        }

        ConsoleCommand::Enable(index) => {
            session.set_breakpoint_enabled(index, true).await?;
            io.status_line(&format!("Breakpoint {} enabled", index));
        }

        ConsoleCommand::Disable(index) => {
            session.set_breakpoint_enabled(index, false).await?;
            io.status_line(&format!("Breakpoint {} disabled", index));
        }

        ConsoleCommand::Delete(Some(index)) => {
            session.delete_breakpoint(index).await?;
            io.status_line(&format!("Breakpoint {} deleted", index));
        }

        ConsoleCommand::Delete(None) => {
            session.delete_all_breakpoints().await?;
            io.status_line("All breakpoints deleted");
        }

        ConsoleCommand::InfoBreakpoints => {
            let mut any = false;
            for bp in session.breakpoints().all() {
                any = true;
                print_breakpoint(bp, io);
            }
            if !any {
                io.output_line("No breakpoints set");
            }
        }

        ConsoleCommand::Quit => return Ok(false),
    }

    Ok(true)
}

fn print_breakpoint(bp: &crate::core::Breakpoint, io: &ConsoleIO) {
    use crate::core::Breakpoint;
    let status = if bp.enabled() { "enabled" } else { "disabled" };
    let verified = if bp.verified() { "verified" } else { "pending" };
    match bp {
        Breakpoint::Source(b) => io.output_line(&format!(
            "#{} {}:{} [{}, {}]",
            b.index,
            b.path.display(),
            b.line,
            status,
            verified
        )),
        Breakpoint::Function(b) => io.output_line(&format!("#{} {} [{}, {}]", b.index, b.func, status, verified)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_line_location() {
        match Location::parse("src/main.rs:42").unwrap() {
            Location::Line { file, line } => {
                assert_eq!(file, PathBuf::from("src/main.rs"));
                assert_eq!(line, 42);
            }
            _ => panic!("expected a line location"),
        }
    }

    #[test]
    fn parses_function_location() {
        match Location::parse("main").unwrap() {
            Location::Function { name } => assert_eq!(name, "main"),
            _ => panic!("expected a function location"),
        }
    }

    #[test]
    fn aliases_resolve_to_the_same_command() {
        assert!(matches!(ConsoleCommand::parse("c").unwrap(), ConsoleCommand::Continue));
        assert!(matches!(ConsoleCommand::parse("continue").unwrap(), ConsoleCommand::Continue));
        assert!(matches!(ConsoleCommand::parse("bt").unwrap(), ConsoleCommand::Backtrace));
    }

    #[test]
    fn list_parses_start_and_count() {
        match ConsoleCommand::parse("list 5,3").unwrap() {
            ConsoleCommand::List { start: Some(5), count: Some(3) } => {}
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(ConsoleCommand::parse("frobnicate").is_err());
    }
}
