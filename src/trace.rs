//! Per-round selection trace capture and a JSON Lines file sink.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::model::{ComparisonPair, ParticipantId};
use crate::selection::{SamplingStrategy, Selection, SelectionError, SelectionOutcomeKind};

#[derive(Debug, Clone, Serialize)]
pub struct SelectionTrace {
    pub timestamp_ms: i64,
    pub owner: ParticipantId,
    pub strategy: SamplingStrategy,
    pub roster_size: usize,
    pub outcome: SelectionOutcomeKind,
    pub attempts: usize,
    pub max_attempts: usize,
    pub pair: Option<ComparisonPair>,
    pub error: Option<String>,
}

impl SelectionTrace {
    pub fn from_result(
        owner: &ParticipantId,
        strategy: SamplingStrategy,
        roster_size: usize,
        max_attempts: usize,
        result: &Result<Selection, SelectionError>,
    ) -> Self {
        let (outcome, attempts, pair, error) = match result {
            Ok(selection) => (
                SelectionOutcomeKind::Selected,
                selection.attempts,
                Some(selection.pair.clone()),
                None,
            ),
            Err(e) => (e.kind(), e.attempts(), None, Some(e.to_string())),
        };
        Self {
            timestamp_ms: now_epoch_ms(),
            owner: owner.clone(),
            strategy,
            roster_size,
            outcome,
            attempts,
            max_attempts,
            pair,
            error,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace writer stopped")]
    Closed,
    #[error("trace writer panicked")]
    WriterPanicked,
}

pub trait SelectionTraceSink: Send + Sync {
    fn record(&self, event: SelectionTrace) -> Result<(), TraceError>;
}

/// Appends serialized events to a JSON Lines file.
///
/// Events are encoded on the caller's thread, so a value that cannot be
/// serialized fails its own `append` call. A background thread owns the file.
pub struct JsonlSink<T> {
    lines: mpsc::Sender<String>,
    _event: PhantomData<fn(&T)>,
}

pub type JsonlTraceSink = JsonlSink<SelectionTrace>;

impl<T> Clone for JsonlSink<T> {
    fn clone(&self) -> Self {
        Self {
            lines: self.lines.clone(),
            _event: PhantomData,
        }
    }
}

impl<T: Serialize> JsonlSink<T> {
    /// Truncates `path` and starts the writer thread.
    pub fn create(path: impl AsRef<Path>) -> Result<(Self, JsonlWriter), TraceError> {
        let file = File::create(path)?;
        let (lines, queued) = mpsc::channel::<String>();
        let handle = thread::spawn(move || drain_lines(file, queued));
        let sink = Self {
            lines,
            _event: PhantomData,
        };
        Ok((sink, JsonlWriter { handle }))
    }

    pub fn append(&self, event: &T) -> Result<(), TraceError> {
        let line = serde_json::to_string(event)?;
        self.lines.send(line).map_err(|_| TraceError::Closed)
    }
}

impl SelectionTraceSink for JsonlSink<SelectionTrace> {
    fn record(&self, event: SelectionTrace) -> Result<(), TraceError> {
        self.append(&event)
    }
}

/// Handle on the thread that owns the trace file.
pub struct JsonlWriter {
    handle: thread::JoinHandle<std::io::Result<usize>>,
}

impl JsonlWriter {
    /// Blocks until every sink clone is dropped and the queue is flushed.
    /// Returns the number of lines written.
    pub fn finish(self) -> Result<usize, TraceError> {
        let written = self
            .handle
            .join()
            .map_err(|_| TraceError::WriterPanicked)??;
        Ok(written)
    }
}

fn drain_lines(file: File, queued: mpsc::Receiver<String>) -> std::io::Result<usize> {
    let mut out = BufWriter::new(file);
    let mut written = 0;
    for line in queued {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

pub fn now_epoch_ms() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Tick {
        n: u32,
    }

    #[test]
    fn cloned_sinks_share_one_file_and_count_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticks.jsonl");
        let (sink, writer) = JsonlSink::<Tick>::create(&path).unwrap();
        let other = sink.clone();
        sink.append(&Tick { n: 1 }).unwrap();
        other.append(&Tick { n: 2 }).unwrap();
        drop((sink, other));

        assert_eq!(writer.finish().unwrap(), 2);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\"n\":1}\n{\"n\":2}\n");
    }
}
