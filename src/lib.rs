//! Console debugger front-end for the Debug Adapter Protocol
//!
//! Drives a DAP-speaking adapter process from an interactive console:
//! `core` holds the session state machine, breakpoint reconciler, and
//! thread/frame model; `dap` is the wire protocol and transport;
//! `console` is the command grammar and line-oriented I/O; `common` is
//! the ambient configuration/error/logging layer shared by both.

pub mod common;
pub mod console;
pub mod core;
pub mod dap;

pub use common::{Error, Result};
pub use core::SessionCore;
