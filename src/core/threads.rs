//! ThreadCollection: live debuggee threads, focus thread, selected frame

use std::collections::BTreeMap;

use crate::common::{Error, Result};

#[derive(Debug, Clone)]
pub struct Thread {
    pub id: i64,
    pub name: String,
    pub running: bool,
    pub selected_frame: u32,
}

/// Live set of debuggee threads plus the one the console is "focused" on.
#[derive(Debug, Default)]
pub struct ThreadCollection {
    threads: BTreeMap<i64, Thread>,
    focus_thread: Option<i64>,
}

impl ThreadCollection {
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            focus_thread: None,
        }
    }

    /// Reconcile against a freshly fetched thread list: threads absent
    /// from `new_list` are dropped. Focus is preserved if its thread
    /// still exists, cleared otherwise.
    pub fn update_threads(&mut self, new_list: impl IntoIterator<Item = (i64, String)>) {
        let mut updated = BTreeMap::new();
        for (id, name) in new_list {
            let running = self.threads.get(&id).map(|t| t.running).unwrap_or(false);
            let selected_frame = self.threads.get(&id).map(|t| t.selected_frame).unwrap_or(0);
            updated.insert(
                id,
                Thread {
                    id,
                    name,
                    running,
                    selected_frame,
                },
            );
        }
        self.threads = updated;
        if let Some(focus) = self.focus_thread {
            if !self.threads.contains_key(&focus) {
                self.focus_thread = None;
            }
        }
    }

    pub fn add_thread(&mut self, id: i64, name: String) {
        self.threads.entry(id).or_insert(Thread {
            id,
            name,
            running: false,
            selected_frame: 0,
        });
    }

    pub fn remove_thread(&mut self, id: i64) {
        self.threads.remove(&id);
        if self.focus_thread == Some(id) {
            self.focus_thread = None;
        }
    }

    pub fn mark_thread_running(&mut self, id: i64) -> Result<()> {
        self.get_mut(id)?.running = true;
        Ok(())
    }

    pub fn mark_thread_stopped(&mut self, id: i64) -> Result<()> {
        let t = self.get_mut(id)?;
        t.running = false;
        t.selected_frame = 0;
        Ok(())
    }

    pub fn mark_all_threads_running(&mut self) {
        for t in self.threads.values_mut() {
            t.running = true;
        }
    }

    /// Per the state-machine invariant, stopping all threads also
    /// resets every thread's selected stack frame to 0.
    pub fn mark_all_threads_stopped(&mut self) {
        for t in self.threads.values_mut() {
            t.running = false;
            t.selected_frame = 0;
        }
    }

    pub fn set_focus_thread(&mut self, id: i64) -> Result<()> {
        if !self.threads.contains_key(&id) {
            return Err(Error::NoSuchThread(id));
        }
        self.focus_thread = Some(id);
        Ok(())
    }

    pub fn focus_thread(&self) -> Option<i64> {
        self.focus_thread
    }

    pub fn get(&self, id: i64) -> Result<&Thread> {
        self.threads.get(&id).ok_or(Error::NoSuchThread(id))
    }

    fn get_mut(&mut self, id: i64) -> Result<&mut Thread> {
        self.threads.get_mut(&id).ok_or(Error::NoSuchThread(id))
    }

    pub fn set_selected_frame(&mut self, id: i64, frame: u32) -> Result<()> {
        self.get_mut(id)?.selected_frame = frame;
        Ok(())
    }

    /// Deterministic: lowest thread id among those currently stopped.
    pub fn first_stopped_thread(&self) -> Option<&Thread> {
        self.threads.values().find(|t| !t.running)
    }

    pub fn all_threads_running(&self) -> bool {
        !self.threads.is_empty() && self.threads.values().all(|t| t.running)
    }

    pub fn all_threads_stopped(&self) -> bool {
        !self.threads.is_empty() && self.threads.values().all(|t| !t.running)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_is_preserved_across_reconcile_if_thread_survives() {
        let mut t = ThreadCollection::new();
        t.update_threads([(1, "main".to_string()), (2, "worker".to_string())]);
        t.set_focus_thread(1).unwrap();
        t.update_threads([(1, "main".to_string())]);
        assert_eq!(t.focus_thread(), Some(1));
    }

    #[test]
    fn focus_is_cleared_if_thread_disappears() {
        let mut t = ThreadCollection::new();
        t.update_threads([(1, "main".to_string())]);
        t.set_focus_thread(1).unwrap();
        t.update_threads([(2, "worker".to_string())]);
        assert_eq!(t.focus_thread(), None);
    }

    #[test]
    fn mark_all_stopped_clears_every_selected_frame() {
        let mut t = ThreadCollection::new();
        t.update_threads([(1, "main".to_string())]);
        t.set_selected_frame(1, 3).unwrap();
        t.mark_all_threads_stopped();
        assert_eq!(t.get(1).unwrap().selected_frame, 0);
        assert!(t.all_threads_stopped());
    }

    #[test]
    fn first_stopped_thread_is_lowest_id() {
        let mut t = ThreadCollection::new();
        t.update_threads([(5, "a".to_string()), (2, "b".to_string()), (9, "c".to_string())]);
        t.mark_all_threads_stopped();
        assert_eq!(t.first_stopped_thread().unwrap().id, 2);
    }

    #[test]
    fn set_focus_thread_requires_existing_thread() {
        let mut t = ThreadCollection::new();
        assert!(t.set_focus_thread(1).is_err());
    }
}
