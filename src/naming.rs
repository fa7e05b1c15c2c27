//! Unique names for ephemeral helper pods and sibling containers.
//!
//! Concurrent sessions against the same node must never collide, so every
//! created resource carries a generated suffix. The source of suffixes is
//! injected so tests can produce predictable names.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Length of generated suffixes.
pub const SUFFIX_LEN: usize = 8;

/// Source of unique name suffixes.
pub trait NameGenerator: Send + Sync + fmt::Debug {
    /// Returns a fresh suffix of lowercase alphanumerics (DNS-1123 safe).
    fn unique_suffix(&self) -> String;

    /// Returns `prefix` followed by a fresh suffix.
    fn unique_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.unique_suffix())
    }
}

/// Random suffixes taken from a v4 UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSuffix;

impl NameGenerator for RandomSuffix {
    fn unique_suffix(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        id[..SUFFIX_LEN].to_string()
    }
}

/// Deterministic suffixes (`00000001`, `00000002`, ...).
#[derive(Debug, Default)]
pub struct SequentialSuffix {
    next: AtomicUsize,
}

impl SequentialSuffix {
    /// Creates a generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for SequentialSuffix {
    fn unique_suffix(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{n:0width$}", width = SUFFIX_LEN)
    }
}
