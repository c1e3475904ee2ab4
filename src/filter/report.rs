//! Security-posture warnings
//!
//! Every relaxation of the default policy is announced with one WARN line
//! carrying a fixed prefix, so weakened sandboxes stand out in the logs.

use std::sync::{Arc, Mutex};

/// Prefix of every posture warning
pub const WARNING_PREFIX: &str = "*** SECCOMP WARNING: ";

/// Sink for posture warnings
///
/// Implementations must not fail or block; the assembler ignores whatever
/// happens to the message.
pub trait Reporter {
    fn report(&self, msg: &str);
}

/// Emit a posture warning through `tracing`
pub fn report(msg: &str) {
    tracing::warn!("{}{}", WARNING_PREFIX, msg);
}

/// Reporter backed by the process-wide `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, msg: &str) {
        report(msg);
    }
}

/// Reporter that keeps the formatted lines in memory
///
/// Clones share the same buffer, so one handle can go into a
/// `SyscallFilter` while another reads what was reported.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines reported so far, prefix included
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, msg: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{}{}", WARNING_PREFIX, msg));
    }
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, msg: &str) {
        (**self).report(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_prefixes_lines() {
        let reporter = MemoryReporter::new();
        reporter.report("console is enabled");
        assert_eq!(
            reporter.lines(),
            vec!["*** SECCOMP WARNING: console is enabled".to_string()]
        );
    }

    #[test]
    fn test_memory_reporter_clones_share_buffer() {
        let reporter = MemoryReporter::new();
        let handle = reporter.clone();
        reporter.report("one");
        reporter.report("two");
        assert_eq!(handle.len(), 2);
        assert!(!handle.is_empty());
    }

    #[test]
    fn test_tracing_reporter_never_panics_without_subscriber() {
        TracingReporter.report("no subscriber installed");
    }
}
