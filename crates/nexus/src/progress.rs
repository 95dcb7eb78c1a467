//! Ingestion progress reporting.
//!
//! Reports observable progress during `nexus ingest` so users see which
//! collection is being scanned, how many files are left, and the final
//! counts. Progress is emitted on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event for one collection's run.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// Walking the collection roots. Total unknown.
    Discovering { collection: String },
    /// About to handle file `n` of `total` (1-based).
    Ingesting {
        collection: String,
        n: u64,
        total: u64,
    },
    /// The per-file loop is done.
    Finished {
        collection: String,
        processed: u64,
        skipped: u64,
        duplicates: u64,
        failed: u64,
    },
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingestion orchestrator.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly line: "ingest library  ingesting  12 / 1,500 files".
pub fn human_line(event: &IngestProgressEvent) -> String {
    match event {
        IngestProgressEvent::Discovering { collection } => {
            format!("ingest {}  discovering...", collection)
        }
        IngestProgressEvent::Ingesting {
            collection,
            n,
            total,
        } => format!(
            "ingest {}  ingesting  {} / {} files",
            collection,
            format_number(*n),
            format_number(*total)
        ),
        IngestProgressEvent::Finished {
            collection,
            processed,
            skipped,
            duplicates,
            failed,
        } => format!(
            "ingest {}  done  processed {}, skipped {}, duplicates {}, failed {}",
            collection,
            format_number(*processed),
            format_number(*skipped),
            format_number(*duplicates),
            format_number(*failed)
        ),
    }
}

/// Machine-readable form: one JSON object per event.
pub fn json_value(event: &IngestProgressEvent) -> serde_json::Value {
    match event {
        IngestProgressEvent::Discovering { collection } => serde_json::json!({
            "event": "progress",
            "collection": collection,
            "phase": "discovering"
        }),
        IngestProgressEvent::Ingesting {
            collection,
            n,
            total,
        } => serde_json::json!({
            "event": "progress",
            "collection": collection,
            "phase": "ingesting",
            "n": n,
            "total": total
        }),
        IngestProgressEvent::Finished {
            collection,
            processed,
            skipped,
            duplicates,
            failed,
        } => serde_json::json!({
            "event": "progress",
            "collection": collection,
            "phase": "finished",
            "processed": processed,
            "skipped": skipped,
            "duplicates": duplicates,
            "failed": failed
        }),
    }
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", human_line(&event));
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_value(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode, shareable across concurrent runs.
    pub fn reporter(&self) -> Arc<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
