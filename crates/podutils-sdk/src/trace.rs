use parking_lot::Mutex;
use std::fmt;

/// Severity of a trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraceLevel::Verbose => "verbose",
            TraceLevel::Info => "info",
            TraceLevel::Warning => "warning",
            TraceLevel::Error => "error",
        })
    }
}

/// Sink for the human-readable progress of the entrypoint and the sidecar.
///
/// Components take an `Arc<dyn TraceWriter>` when they are built instead of
/// logging through a global, which lets tests see exactly what was reported.
/// Implementors only provide [`TraceWriter::write`].
pub trait TraceWriter: Send + Sync {
    fn write(&self, level: TraceLevel, message: &str);

    fn verbose(&self, message: &str) {
        self.write(TraceLevel::Verbose, message);
    }

    fn info(&self, message: &str) {
        self.write(TraceLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.write(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.write(TraceLevel::Error, message);
    }
}

/// Drops every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceWriter;

impl TraceWriter for NullTraceWriter {
    fn write(&self, _level: TraceLevel, _message: &str) {}
}

/// Keeps every line in memory so tests can assert on it.
#[derive(Debug, Default)]
pub struct CollectingTraceWriter {
    lines: Mutex<Vec<(TraceLevel, String)>>,
}

impl CollectingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(TraceLevel, String)> {
        self.lines.lock().clone()
    }

    /// True when some line at exactly `level` contains `needle`.
    pub fn contains(&self, level: TraceLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(at, line)| *at == level && line.contains(needle))
    }
}

impl TraceWriter for CollectingTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        self.lines.lock().push((level, message.to_owned()));
    }
}
