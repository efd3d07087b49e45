//! The live exclude rule.
//!
//! A runtime-mutable pattern that marks matching file names as pass-through,
//! settable without remounting. The rule is an explicitly constructed handle:
//! clone it to share it, hand a clone to each [`Namespace`] at mount time,
//! and mounts sharing the same handle see each other's updates.
//!
//! [`Namespace`]: crate::namespace::Namespace

use std::sync::{Arc, Mutex};

/// Capacity of the exclude pattern in bytes. Longer input is truncated.
pub const EXCLUDE_PATTERN_CAPACITY: usize = 100;

/// Runtime-mutable substring rule marking matching file names as pass-through.
///
/// Cloning is cheap and clones share the same underlying pattern. `get` and
/// `set` are linearizable with respect to each other; a change only affects
/// files classified after the `set` returns.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRule {
    pattern: Arc<Mutex<String>>,
}

impl ExcludeRule {
    /// Create a rule with an empty pattern (matches nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pattern.
    pub fn get(&self) -> String {
        self.pattern.lock().unwrap().clone()
    }

    /// Replace the pattern.
    ///
    /// Input is cut at the first newline and silently truncated to
    /// [`EXCLUDE_PATTERN_CAPACITY`] bytes. Overlong input is not an error.
    ///
    /// # Arguments
    /// * `value` - New pattern text
    pub fn set(&self, value: &str) {
        let line: &str = value.split('\n').next().unwrap_or("");
        let mut end: usize = line.len().min(EXCLUDE_PATTERN_CAPACITY);
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        let trimmed: &str = &line[..end];

        let mut guard = self.pattern.lock().unwrap();
        guard.clear();
        guard.push_str(trimmed);
        tracing::info!(pattern = %trimmed, "will keep data for files matching pattern");
    }

    /// Whether the pattern is currently empty.
    pub fn is_empty(&self) -> bool {
        self.pattern.lock().unwrap().is_empty()
    }
}
