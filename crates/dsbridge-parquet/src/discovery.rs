//! Parquet-backed dataset discovery.
//!
//! A discovery handle owns an open file and its decoded footer. Opening and
//! closing are counted so callers can check that every handle was released.

use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use dsbridge_core::{
    classify_filesystem, BridgeError, ByteRange, DiscoveryFactory, DiscoveryHandle, Filesystem,
    NativeFormat, Result,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

/// Open/close counters shared by a factory and its handles.
#[derive(Debug, Default)]
pub struct HandleStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl HandleStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Handles opened but not yet closed.
    pub fn live(&self) -> usize {
        let closed = self.closed();
        self.opened().saturating_sub(closed)
    }
}

/// Discovery factory reading parquet footers from the local filesystem.
#[derive(Debug, Default, Clone)]
pub struct ParquetDiscoveryFactory {
    stats: Arc<HandleStats>,
}

impl ParquetDiscoveryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &HandleStats {
        &self.stats
    }
}

impl DiscoveryFactory for ParquetDiscoveryFactory {
    type Handle = ParquetDiscoveryHandle;

    fn open(&self, path: &str, format: NativeFormat, range: ByteRange) -> Result<Self::Handle> {
        if classify_filesystem(path)? != Filesystem::Local {
            return Err(BridgeError::UnsupportedFilesystem(path.to_string()));
        }

        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Opened {} discovery handle on '{}' ({:?}, {} row groups)",
            format,
            path,
            range,
            builder.metadata().num_row_groups()
        );

        Ok(ParquetDiscoveryHandle {
            path: path.to_string(),
            builder: Some(builder),
            stats: Arc::clone(&self.stats),
        })
    }
}

/// An open parquet file with its decoded footer.
pub struct ParquetDiscoveryHandle {
    path: String,
    builder: Option<ParquetRecordBatchReaderBuilder<File>>,
    stats: Arc<HandleStats>,
}

impl DiscoveryHandle for ParquetDiscoveryHandle {
    fn inspect(&self) -> Result<SchemaRef> {
        let builder = self.builder.as_ref().ok_or_else(|| {
            BridgeError::Io(std::io::Error::other(format!(
                "discovery handle on '{}' already closed",
                self.path
            )))
        })?;
        Ok(Arc::clone(builder.schema()))
    }

    fn close(&mut self) {
        if self.builder.take().is_some() {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            debug!("Closed discovery handle on '{}'", self.path);
        }
    }
}
