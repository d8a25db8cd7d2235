//! ConsoleIO: line-oriented console output and input enable/disable
//!
//! DAP is event-driven: the adapter can emit `output`/`stopped` events at
//! any time. To keep a half-typed command from interleaving with an
//! adapter event, input is explicitly suppressed while the debuggee is
//! running and restored once it stops.

use std::io::Write;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Console line reader paired with an enable/disable flag.
///
/// When disabled, [`ConsoleIO::next_line`] never resolves — callers
/// `tokio::select!` it alongside the adapter's event stream and simply
/// omit the branch (or let it pend) while input is off.
pub struct ConsoleIO {
    lines: Lines<BufReader<Stdin>>,
    enabled: bool,
}

impl ConsoleIO {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            enabled: true,
        }
    }

    pub fn start_input(&mut self) {
        self.enabled = true;
    }

    pub fn stop_input(&mut self) {
        self.enabled = false;
    }

    pub fn input_enabled(&self) -> bool {
        self.enabled
    }

    pub fn prompt(&self) {
        if self.enabled {
            print!("(dbg) ");
            let _ = std::io::stdout().flush();
        }
    }

    /// Read the next line. Returns `Ok(None)` on EOF (stdin closed).
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    pub fn output(&self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    pub fn output_line(&self, text: &str) {
        println!("{}", text);
    }

    pub fn error_line(&self, text: &str) {
        eprintln!("{}", text.red());
    }

    pub fn status_line(&self, text: &str) {
        println!("{} {}", "*".cyan(), text);
    }
}

impl Default for ConsoleIO {
    fn default() -> Self {
        Self::new()
    }
}
