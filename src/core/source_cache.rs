//! SourceFileCache: memoized source content for `list`/backtrace printing
//!
//! Entries are keyed by either a local filesystem path or an adapter
//! `sourceReference`. Reference-backed content can only be obtained by
//! asking the live `DebugSession` for it, so the cache itself only holds
//! already-fetched lines; `SessionCore::get_source_lines` drives the
//! actual `source` request and feeds the result back in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SourceKey {
    Path(PathBuf),
    Reference(i64),
}

#[derive(Debug, Default)]
pub struct SourceFileCache {
    entries: HashMap<SourceKey, Vec<String>>,
}

/// Split content the way the cache stores every entry: split on `\n`,
/// with a trailing `\r` on any line stripped.
pub(crate) fn split_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

impl SourceFileCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Read a local file lazily. Missing/unreadable files are not
    /// fatal: callers already tolerate missing source, so this returns
    /// an empty sequence rather than an error.
    pub async fn get_by_path(&mut self, path: &Path) -> Vec<String> {
        let key = SourceKey::Path(path.to_path_buf());
        if let Some(lines) = self.entries.get(&key) {
            return lines.clone();
        }
        let lines = match tokio::fs::read_to_string(path).await {
            Ok(content) => split_lines(&content),
            Err(_) => Vec::new(),
        };
        self.entries.insert(key, lines.clone());
        lines
    }

    /// Already-memoized lines for a `sourceReference`, if fetched before.
    pub fn cached_reference(&self, reference: i64) -> Option<Vec<String>> {
        self.entries.get(&SourceKey::Reference(reference)).cloned()
    }

    /// Record the result of fetching a `sourceReference`, whatever form
    /// it took (real content or a degrade-to-message placeholder).
    pub fn insert_reference(&mut self, reference: i64, lines: Vec<String>) {
        self.entries.insert(SourceKey::Reference(reference), lines);
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline_and_strips_trailing_cr() {
        let lines = split_lines("a\r\nb\r\nc\n");
        assert_eq!(lines, vec!["a".to_string(), "b".to_string(), "c".to_string(), "".to_string()]);
    }

    #[test]
    fn cached_reference_is_absent_until_inserted() {
        let cache = SourceFileCache::new();
        assert!(cache.cached_reference(1).is_none());
    }

    #[test]
    fn insert_reference_memoizes() {
        let mut cache = SourceFileCache::new();
        cache.insert_reference(1, vec!["x".to_string()]);
        assert_eq!(cache.cached_reference(1), Some(vec!["x".to_string()]));
    }

    #[test]
    fn flush_clears_memoized_entries() {
        let mut cache = SourceFileCache::new();
        cache.insert_reference(1, vec!["x".to_string()]);
        cache.flush();
        assert!(cache.cached_reference(1).is_none());
    }

    #[tokio::test]
    async fn missing_local_file_returns_empty_not_error() {
        let mut cache = SourceFileCache::new();
        let lines = cache.get_by_path(Path::new("/nonexistent/path/does/not/exist")).await;
        assert!(lines.is_empty());
    }
}
