//! Structured error accumulation for cache operations.
//!
//! Every admission or block-pump step records recoverable failures into an
//! [`ErrorReport`] keyed by the subsystem that produced them. A non-empty
//! report at completion time means the operation failed; callers receive it
//! wrapped in a [`CacheFailure`] together with the classified
//! [`FailureKind`].

use std::collections::BTreeMap;
use std::fmt;

/// The subsystem a recorded error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subsystem {
    Storage,
    Transcoder,
    Metadata,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Transcoder => "transcoder",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated error messages, keyed by subsystem.
///
/// Non-empty ⇒ the operation that produced it failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    entries: BTreeMap<Subsystem, Vec<String>>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subsystem: Subsystem, message: impl Into<String>) {
        self.entries.entry(subsystem).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of recorded messages across all subsystems.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn contains(&self, subsystem: Subsystem) -> bool {
        self.entries.contains_key(&subsystem)
    }

    pub fn messages(&self, subsystem: Subsystem) -> &[String] {
        self.entries.get(&subsystem).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (subsystem, messages) in &self.entries {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{subsystem}: {message}")?;
                first = false;
            }
        }
        if first {
            f.write_str("no errors recorded")?;
        }
        Ok(())
    }
}

/// Classification of a failed cache operation, matching the failure legs of
/// admission and the block pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MkdirFailed,
    MetadataMissing,
    LockContended,
    OpenFailed,
    ProcessorFailed,
    ReadFailed,
    WriteFailed,
    InvalidSpec,
}

/// A failed cache operation: the classified kind plus the full report the
/// operation accumulated before routing through teardown.
#[derive(Debug, Clone)]
pub struct CacheFailure {
    kind: FailureKind,
    report: ErrorReport,
}

impl CacheFailure {
    pub fn new(kind: FailureKind, report: ErrorReport) -> Self {
        Self { kind, report }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn report(&self) -> &ErrorReport {
        &self.report
    }
}

impl fmt::Display for CacheFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.report.fmt(f)
    }
}

impl std::error::Error for CacheFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_means_success() {
        let report = ErrorReport::new();
        assert!(report.is_empty());
        assert_eq!(report.len(), 0);
        assert_eq!(report.to_string(), "no errors recorded");
    }

    #[test]
    fn messages_accumulate_per_subsystem() {
        let mut report = ErrorReport::new();
        report.insert(Subsystem::Storage, "mkdir failed");
        report.insert(Subsystem::Storage, "open failed");
        report.insert(Subsystem::Transcoder, "bad segment");

        assert!(!report.is_empty());
        assert_eq!(report.len(), 3);
        assert_eq!(report.messages(Subsystem::Storage).len(), 2);
        assert!(report.contains(Subsystem::Transcoder));
        assert!(!report.contains(Subsystem::Metadata));
        assert_eq!(report.messages(Subsystem::Metadata), &[] as &[String]);
    }

    #[test]
    fn failure_renders_all_entries() {
        let mut report = ErrorReport::new();
        report.insert(Subsystem::Metadata, "sidecar missing");
        let failure = CacheFailure::new(FailureKind::MetadataMissing, report);
        assert_eq!(failure.kind(), FailureKind::MetadataMissing);
        assert_eq!(failure.to_string(), "metadata: sidecar missing");
    }
}
