//! BreakpointCollection: user-visible breakpoints with stable indices
//!
//! DAP's `setBreakpoints`/`setFunctionBreakpoints` replace the whole set
//! for a source (or the whole function set) on every call, so the
//! collection is organized the way the reconciler needs to read it back:
//! grouped by path for source breakpoints, and as one flat list for
//! function breakpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// A breakpoint the user declared, independent of the adapter's view of it.
#[derive(Debug, Clone)]
pub enum Breakpoint {
    Source(SourceBreakpoint),
    Function(FunctionBreakpoint),
}

impl Breakpoint {
    pub fn index(&self) -> u32 {
        match self {
            Breakpoint::Source(b) => b.index,
            Breakpoint::Function(b) => b.index,
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Breakpoint::Source(b) => b.id,
            Breakpoint::Function(b) => b.id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Breakpoint::Source(b) => b.enabled,
            Breakpoint::Function(b) => b.enabled,
        }
    }

    pub fn verified(&self) -> bool {
        match self {
            Breakpoint::Source(b) => b.verified,
            Breakpoint::Function(b) => b.verified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceBreakpoint {
    pub index: u32,
    pub path: PathBuf,
    pub line: u32,
    pub enabled: bool,
    pub id: Option<i64>,
    pub verified: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionBreakpoint {
    pub index: u32,
    pub func: String,
    pub enabled: bool,
    pub id: Option<i64>,
    pub verified: bool,
    pub message: Option<String>,
    pub resolved_path: Option<PathBuf>,
    pub resolved_line: Option<u32>,
}

const UNVERIFIED_MESSAGE: &str =
    "Could not set this breakpoint. The module may not have been loaded yet.";

/// Stable, 1-based-index collection of source and function breakpoints.
#[derive(Debug, Default)]
pub struct BreakpointCollection {
    breakpoints: HashMap<u32, Breakpoint>,
    order: Vec<u32>,
    next_index: u32,
    id_to_index: HashMap<i64, u32>,
}

impl BreakpointCollection {
    pub fn new() -> Self {
        Self {
            breakpoints: HashMap::new(),
            order: Vec::new(),
            next_index: 1,
            id_to_index: HashMap::new(),
        }
    }

    fn allocate_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    pub fn add_source(&mut self, path: impl Into<PathBuf>, line: u32) -> u32 {
        let index = self.allocate_index();
        let bp = SourceBreakpoint {
            index,
            path: path.into(),
            line,
            enabled: true,
            id: None,
            verified: false,
            message: None,
        };
        self.order.push(index);
        self.breakpoints.insert(index, Breakpoint::Source(bp));
        index
    }

    pub fn add_function(&mut self, func: impl Into<String>) -> u32 {
        let index = self.allocate_index();
        let bp = FunctionBreakpoint {
            index,
            func: func.into(),
            enabled: true,
            id: None,
            verified: false,
            message: None,
            resolved_path: None,
            resolved_line: None,
        };
        self.order.push(index);
        self.breakpoints.insert(index, Breakpoint::Function(bp));
        index
    }

    pub fn delete(&mut self, index: u32) -> Result<()> {
        let removed = self
            .breakpoints
            .remove(&index)
            .ok_or(Error::NoSuchBreakpoint(index as usize))?;
        self.order.retain(|i| *i != index);
        if let Some(id) = removed.id() {
            self.id_to_index.remove(&id);
        }
        Ok(())
    }

    pub fn delete_all(&mut self) {
        self.breakpoints.clear();
        self.order.clear();
        self.id_to_index.clear();
    }

    pub fn set_enabled(&mut self, index: u32, enabled: bool) -> Result<()> {
        match self.get_mut(index)? {
            Breakpoint::Source(b) => b.enabled = enabled,
            Breakpoint::Function(b) => b.enabled = enabled,
        }
        Ok(())
    }

    /// Record the adapter's verification result for a breakpoint,
    /// applying the reconciler's "no message on unverified" fallback.
    pub fn set_verified(&mut self, index: u32, verified: bool, message: Option<String>) -> Result<()> {
        let message = if !verified && message.is_none() {
            Some(UNVERIFIED_MESSAGE.to_string())
        } else {
            message
        };
        match self.get_mut(index)? {
            Breakpoint::Source(b) => {
                b.verified = verified;
                b.message = message;
            }
            Breakpoint::Function(b) => {
                b.verified = verified;
                b.message = message;
            }
        }
        Ok(())
    }

    pub fn set_id(&mut self, index: u32, id: Option<i64>) -> Result<()> {
        let previous = self.get_by_index(index)?.id();
        if let Some(prev) = previous {
            self.id_to_index.remove(&prev);
        }
        match self.get_mut(index)? {
            Breakpoint::Source(b) => b.id = id,
            Breakpoint::Function(b) => b.id = id,
        }
        if let Some(id) = id {
            self.id_to_index.insert(id, index);
        }
        Ok(())
    }

    pub fn set_path_and_line(&mut self, index: u32, path: PathBuf, line: u32) -> Result<()> {
        match self.get_mut(index)? {
            Breakpoint::Function(b) => {
                b.resolved_path = Some(path);
                b.resolved_line = Some(line);
            }
            Breakpoint::Source(_) => {
                return Err(Error::Internal(
                    "set_path_and_line called on a source breakpoint".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn get_mut(&mut self, index: u32) -> Result<&mut Breakpoint> {
        self.breakpoints
            .get_mut(&index)
            .ok_or(Error::NoSuchBreakpoint(index as usize))
    }

    pub fn get_by_index(&self, index: u32) -> Result<&Breakpoint> {
        self.breakpoints
            .get(&index)
            .ok_or(Error::NoSuchBreakpoint(index as usize))
    }

    pub fn get_by_id(&self, id: i64) -> Option<&Breakpoint> {
        self.id_to_index.get(&id).and_then(|i| self.breakpoints.get(i))
    }

    pub fn get_index_by_id(&self, id: i64) -> Option<u32> {
        self.id_to_index.get(&id).copied()
    }

    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.order.iter().filter_map(|i| self.breakpoints.get(i))
    }

    /// Enabled source breakpoints grouped by path, the shape DAP's
    /// per-source `setBreakpoints` full replacement needs.
    pub fn all_enabled_by_source(&self) -> HashMap<PathBuf, Vec<&SourceBreakpoint>> {
        let mut grouped: HashMap<PathBuf, Vec<&SourceBreakpoint>> = HashMap::new();
        for bp in self.all() {
            if let Breakpoint::Source(b) = bp {
                if b.enabled {
                    grouped.entry(b.path.clone()).or_default().push(b);
                }
            }
        }
        grouped
    }

    pub fn all_enabled_function(&self) -> Vec<&FunctionBreakpoint> {
        self.all()
            .filter_map(|bp| match bp {
                Breakpoint::Function(b) if b.enabled => Some(b),
                _ => None,
            })
            .collect()
    }

    /// Every distinct source path with at least one breakpoint declared
    /// (enabled or not), used to clear a source's breakpoints entirely.
    pub fn all_paths(&self) -> std::collections::HashSet<&Path> {
        self.all()
            .filter_map(|bp| match bp {
                Breakpoint::Source(b) => Some(b.path.as_path()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_monotonic_and_never_reused() {
        let mut c = BreakpointCollection::new();
        let a = c.add_source("/a.py", 10);
        let b = c.add_source("/b.py", 20);
        c.delete(a).unwrap();
        let d = c.add_source("/c.py", 30);
        assert!(b > a);
        assert!(d > b);
        assert!(c.delete(a).is_err());
    }

    #[test]
    fn add_source_round_trips() {
        let mut c = BreakpointCollection::new();
        let idx = c.add_source("/a.py", 10);
        match c.get_by_index(idx).unwrap() {
            Breakpoint::Source(b) => {
                assert_eq!(b.path, PathBuf::from("/a.py"));
                assert_eq!(b.line, 10);
                assert!(b.enabled);
            }
            _ => panic!("expected a source breakpoint"),
        }
    }

    #[test]
    fn toggle_enabled_is_a_no_op_on_round_trip() {
        let mut c = BreakpointCollection::new();
        let idx = c.add_source("/a.py", 10);
        c.set_enabled(idx, false).unwrap();
        c.set_enabled(idx, true).unwrap();
        assert!(c.get_by_index(idx).unwrap().enabled());
    }

    #[test]
    fn id_lookup_is_updated_by_set_id() {
        let mut c = BreakpointCollection::new();
        let idx = c.add_source("/a.py", 10);
        c.set_id(idx, Some(42)).unwrap();
        assert_eq!(c.get_index_by_id(42), Some(idx));
        assert!(c.get_by_id(42).is_some());
    }

    #[test]
    fn unverified_breakpoint_without_message_gets_default_message() {
        let mut c = BreakpointCollection::new();
        let idx = c.add_source("/a.py", 10);
        c.set_verified(idx, false, None).unwrap();
        match c.get_by_index(idx).unwrap() {
            Breakpoint::Source(b) => {
                assert!(!b.verified);
                assert!(b.message.is_some());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn all_enabled_by_source_groups_by_path() {
        let mut c = BreakpointCollection::new();
        c.add_source("/a.py", 1);
        c.add_source("/a.py", 2);
        c.add_source("/b.py", 1);
        let grouped = c.all_enabled_by_source();
        assert_eq!(grouped.get(&PathBuf::from("/a.py")).unwrap().len(), 2);
        assert_eq!(grouped.get(&PathBuf::from("/b.py")).unwrap().len(), 1);
    }
}
