//! Debugger session core: state machine, breakpoint reconciler, thread
//! and stack-frame model, and source cache.

pub mod breakpoints;
pub mod session;
pub mod source_cache;
pub mod state;
pub mod threads;

pub use breakpoints::{Breakpoint, BreakpointCollection, FunctionBreakpoint, SourceBreakpoint};
pub use session::{AdapterDescriptor, ScopeVariables, SessionCore, SessionMode};
pub use source_cache::SourceFileCache;
pub use state::SessionState;
pub use threads::{Thread, ThreadCollection};
