//! Append-only destinations for [`TrapRecord`]s.
//!
//! Sinks never report failure to the caller. A record that cannot be written
//! is dropped and the failure is logged at debug level.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::trap::TrapRecord;

/// Where trap records go.
pub trait TrapSink: Send + Sync {
    /// Persist one record. Must not panic and must not block indefinitely.
    fn append(&self, record: &TrapRecord);
}

/// Appends one line per record to a file.
///
/// The file is opened, written and closed for every record, so independent
/// processes can share the same path without holding a handle. Each record
/// goes out as a single `write_all` on an `O_APPEND` descriptor.
#[derive(Debug, Clone)]
pub struct FileTrapSink {
    path: PathBuf,
}

impl FileTrapSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl TrapSink for FileTrapSink {
    fn append(&self, record: &TrapRecord) {
        if let Err(e) = self.try_append(&record.to_line()) {
            log::debug!(
                "FileTrapSink: dropped record for {:?}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Keeps records in memory for in-process inspection.
#[derive(Debug, Default)]
pub struct MemoryTrapSink {
    records: Mutex<Vec<TrapRecord>>,
}

impl MemoryTrapSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<TrapRecord> {
        self.records.lock().clone()
    }

    /// Take all records, leaving the sink empty.
    pub fn drain(&self) -> Vec<TrapRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl TrapSink for MemoryTrapSink {
    fn append(&self, record: &TrapRecord) {
        self.records.lock().push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trap::TrapKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(key: &str) -> TrapRecord {
        TrapRecord::new(TrapKind::Get, "chrome", vec![key.to_string()])
    }

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = TempDir::new().expect("temp dir");
        let sink = FileTrapSink::new(dir.path().join("traps.log"));
        sink.append(&record("runtime"));
        sink.append(&record("app"));

        let contents = std::fs::read_to_string(sink.path()).expect("read log");
        assert_eq!(
            contents,
            "get: [chrome] |runtime|, \nget: [chrome] |app|, \n"
        );
    }

    #[test]
    fn test_file_sink_keeps_existing_content() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("traps.log");
        std::fs::write(&path, "earlier\n").expect("seed");
        FileTrapSink::new(&path).append(&record("x"));
        let contents = std::fs::read_to_string(&path).expect("read log");
        assert!(contents.starts_with("earlier\n"));
        assert!(contents.ends_with("|x|, \n"));
    }

    #[test]
    fn test_file_sink_swallows_open_failure() {
        let dir = TempDir::new().expect("temp dir");
        // Parent directory does not exist, so open fails.
        let sink = FileTrapSink::new(dir.path().join("missing").join("traps.log"));
        sink.append(&record("runtime"));
        assert!(!sink.path().exists());
    }

    #[test]
    fn test_file_sink_concurrent_writers_do_not_interleave_lines() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("traps.log");

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = FileTrapSink::new(&path);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.append(&record(&format!("t{t}-k{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let contents = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        for line in lines {
            assert!(line.starts_with("get: [chrome] |t"), "torn line: {line:?}");
            assert!(line.ends_with("|, "), "torn line: {line:?}");
        }
    }

    #[test]
    fn test_memory_sink_records_and_drains() {
        let sink = Arc::new(MemoryTrapSink::new());
        sink.append(&record("a"));
        sink.append(&record("b"));
        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained[1].args(), ["b".to_string()]);
        assert!(sink.is_empty());
    }
}
