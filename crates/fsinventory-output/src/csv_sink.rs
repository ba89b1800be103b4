//! CSV record sink.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use fsinventory_core::EntryRecord;
use tracing::debug;

use crate::columns::ColumnLayout;
use crate::error::OutputError;
use crate::writer::RecordSink;

/// Writes batches as CSV rows.
///
/// The header goes out when the sink is created. Each batch is encoded in
/// memory first and reaches the destination in a single write followed by a
/// flush, so an interrupted run leaves only whole batches behind.
#[derive(Debug)]
pub struct CsvSink<W: Write> {
    inner: W,
    layout: ColumnLayout,
    path: PathBuf,
    buffer: Vec<u8>,
}

impl CsvSink<File> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: impl AsRef<Path>, layout: ColumnLayout) -> Result<Self, OutputError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| OutputError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Created inventory file");
        Self::with_label(file, layout, path.to_path_buf())
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap an arbitrary writer and write the header.
    pub fn new(inner: W, layout: ColumnLayout) -> Result<Self, OutputError> {
        Self::with_label(inner, layout, PathBuf::from("-"))
    }

    fn with_label(inner: W, layout: ColumnLayout, path: PathBuf) -> Result<Self, OutputError> {
        let mut sink = Self {
            inner,
            layout,
            path,
            buffer: Vec::new(),
        };
        sink.buffer.clear();
        {
            let mut encoder = encoder(&mut sink.buffer);
            layout.write_header(&mut encoder)?;
            encoder.flush().map_err(csv::Error::from)?;
        }
        sink.emit()?;
        Ok(sink)
    }

    /// Column layout in use.
    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    /// Destination path, or `-` for a wrapped writer.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unwrap the destination.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn emit(&mut self) -> Result<(), OutputError> {
        let result = self
            .inner
            .write_all(&self.buffer)
            .and_then(|()| self.inner.flush());
        self.buffer.clear();
        result.map_err(|source| OutputError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_batch(&mut self, batch: &[EntryRecord]) -> Result<(), OutputError> {
        self.buffer.clear();
        {
            let mut encoder = encoder(&mut self.buffer);
            for record in batch {
                self.layout.write_row(&mut encoder, record)?;
            }
            encoder.flush().map_err(csv::Error::from)?;
        }
        self.emit()
    }
}

fn encoder(buffer: &mut Vec<u8>) -> csv::Writer<&mut Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(buffer)
}
