//! Bounded-memory streaming writer.
//!
//! [`StreamingWriter`] holds at most `batch_size` records. When the batch
//! fills it is handed to a [`RecordSink`] in one call and then released, so
//! the writer's footprint never depends on how many entries a walk produces.

use fsinventory_core::EntryRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OutputError;

/// Destination for flushed batches.
///
/// Each call receives one complete batch, in arrival order. A sink that
/// returns `Ok` has persisted the batch.
pub trait RecordSink {
    /// Persist one batch.
    fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
        (**self).write_batch(batch)
    }
}

/// Counters for a writer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStats {
    /// Records persisted by the sink.
    pub records_written: u64,
    /// Batches handed to the sink.
    pub batches_written: u64,
}

/// Accumulates records and flushes them to a sink in fixed-size batches.
#[derive(Debug)]
pub struct StreamingWriter<S: RecordSink> {
    sink: S,
    batch: Vec<EntryRecord>,
    batch_size: usize,
    stats: WriterStats,
    poisoned: bool,
}

impl<S: RecordSink> StreamingWriter<S> {
    /// Create a writer. A batch size of zero is treated as one.
    pub fn new(sink: S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            stats: WriterStats::default(),
            poisoned: false,
        }
    }

    /// Add a record, flushing if the batch is now full.
    pub fn append(&mut self, record: EntryRecord) -> Result<(), OutputError> {
        if self.poisoned {
            return Err(OutputError::Poisoned);
        }
        self.batch.push(record);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out any buffered records. A no-op when nothing is buffered.
    pub fn flush(&mut self) -> Result<(), OutputError> {
        if self.poisoned {
            return Err(OutputError::Poisoned);
        }
        if self.batch.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.sink.write_batch(&self.batch) {
            self.poisoned = true;
            return Err(err);
        }

        self.stats.records_written += self.batch.len() as u64;
        self.stats.batches_written += 1;
        debug!(
            records = self.batch.len(),
            total = self.stats.records_written,
            "Flushed batch"
        );
        self.batch.clear();
        Ok(())
    }

    /// Records currently held in memory.
    pub fn resident(&self) -> usize {
        self.batch.len()
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Counters so far.
    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Whether an earlier flush failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Flush the trailing partial batch and return the sink.
    pub fn finish(mut self) -> Result<(S, WriterStats), OutputError> {
        self.flush()?;
        Ok((self.sink, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsinventory_core::Timestamps;

    #[derive(Default)]
    struct Recording {
        batches: Vec<usize>,
        fail_on: Option<usize>,
    }

    impl RecordSink for Recording {
        fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
            if self.fail_on == Some(self.batches.len()) {
                return Err(OutputError::Write {
                    path: "sink".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.batches.push(batch.len());
            Ok(())
        }
    }

    fn record(n: usize) -> EntryRecord {
        EntryRecord::file(
            format!("f{n}"),
            format!("/r/f{n}"),
            n as u64,
            Timestamps::default(),
        )
    }

    #[test]
    fn test_flushes_on_batch_boundaries() {
        let mut writer = StreamingWriter::new(Recording::default(), 2);
        for n in 0..5 {
            writer.append(record(n)).unwrap();
            assert!(writer.resident() <= 2);
        }
        assert_eq!(writer.resident(), 1);

        let (sink, stats) = writer.finish().unwrap();
        assert_eq!(sink.batches, vec![2, 2, 1]);
        assert_eq!(stats.records_written, 5);
        assert_eq!(stats.batches_written, 3);
    }

    #[test]
    fn test_finish_without_records_writes_nothing() {
        let writer = StreamingWriter::new(Recording::default(), 4);
        let (sink, stats) = writer.finish().unwrap();
        assert!(sink.batches.is_empty());
        assert_eq!(stats, WriterStats::default());
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        let mut writer = StreamingWriter::new(Recording::default(), 0);
        writer.append(record(0)).unwrap();
        assert_eq!(writer.batch_size(), 1);
        assert_eq!(writer.resident(), 0);
        assert_eq!(writer.sink().batches, vec![1]);
    }

    #[test]
    fn test_failure_poisons_writer() {
        let sink = Recording {
            fail_on: Some(1),
            ..Default::default()
        };
        let mut writer = StreamingWriter::new(sink, 1);
        writer.append(record(0)).unwrap();
        assert!(writer.append(record(1)).is_err());
        assert!(writer.is_poisoned());
        assert!(matches!(
            writer.append(record(2)),
            Err(OutputError::Poisoned)
        ));
        assert_eq!(writer.stats().records_written, 1);
    }
}
