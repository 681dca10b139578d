//! Schema probing through a native dataset-discovery factory.

use std::ops::Deref;

use arrow::datatypes::SchemaRef;
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::format::NativeFormat;
use crate::schema::SchemaConversion;
use crate::uri::UriRewriter;

/// The portion of a file a discovery handle or scan task covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteRange {
    /// The whole file, whatever its length.
    #[default]
    Whole,
    /// `length` bytes starting at `start`.
    Slice { start: u64, length: u64 },
}

impl ByteRange {
    pub fn contains(&self, offset: u64) -> bool {
        match *self {
            ByteRange::Whole => true,
            ByteRange::Slice { start, length } => {
                offset >= start && offset - start < length
            }
        }
    }
}

/// Opens discovery handles on individual files.
pub trait DiscoveryFactory: Send + Sync {
    type Handle: DiscoveryHandle;

    /// Open a handle scoped to `range` of the file at `path`. `path` is
    /// already rewritten for the native reader.
    fn open(&self, path: &str, format: NativeFormat, range: ByteRange) -> Result<Self::Handle>;
}

/// A native discovery handle. Must be closed exactly once.
pub trait DiscoveryHandle {
    /// Report the schema of the file without reading its data.
    fn inspect(&self) -> Result<SchemaRef>;

    /// Release native resources held by the handle.
    fn close(&mut self);
}

/// Closes the wrapped handle when dropped, on success and error paths alike.
pub struct DiscoveryGuard<H: DiscoveryHandle> {
    handle: H,
}

impl<H: DiscoveryHandle> DiscoveryGuard<H> {
    pub fn new(handle: H) -> Self {
        Self { handle }
    }
}

impl<H: DiscoveryHandle> Deref for DiscoveryGuard<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: DiscoveryHandle> Drop for DiscoveryGuard<H> {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Probes file schemas and converts them to the host representation.
pub struct SchemaProbe<F> {
    factory: F,
    rewriter: UriRewriter,
    conversion: SchemaConversion,
}

impl<F: DiscoveryFactory> SchemaProbe<F> {
    pub fn new(factory: F, rewriter: UriRewriter, conversion: SchemaConversion) -> Self {
        Self {
            factory,
            rewriter,
            conversion,
        }
    }

    pub fn from_config(factory: F, config: &BridgeConfig) -> Self {
        Self::new(factory, config.uri_rewriter(), config.schema_conversion())
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Probe the schema of a single file.
    pub fn probe_schema(&self, path: &str, format: NativeFormat) -> Result<SchemaRef> {
        let native_path = self.rewriter.rewrite_for_read(path)?;
        debug!("Opening {} discovery handle on '{}'", format, native_path);

        let handle = DiscoveryGuard::new(self.factory.open(&native_path, format, ByteRange::Whole)?);
        let native_schema = handle.inspect()?;
        let schema = self.conversion.convert_schema(&native_schema);

        info!(
            "Probed schema of '{}': {} fields",
            path,
            schema.fields().len()
        );
        Ok(schema)
    }

    /// Probe the schema of a file list.
    ///
    /// Only the first file is inspected; schemas are not merged across files.
    pub fn probe_files<S: AsRef<str>>(&self, files: &[S], format: NativeFormat) -> Result<SchemaRef> {
        let first = files.first().ok_or(BridgeError::NoFiles)?;
        if files.len() > 1 {
            debug!(
                "Probing first of {} files; remaining schemas are not merged",
                files.len()
            );
        }
        self.probe_schema(first.as_ref(), format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory factory recording every open and close.
    #[derive(Default)]
    struct FakeFactory {
        opened: Mutex<Vec<(String, ByteRange)>>,
        closed: Arc<AtomicUsize>,
        fail_inspect: bool,
    }

    struct FakeHandle {
        closed: Arc<AtomicUsize>,
        fail_inspect: bool,
    }

    impl DiscoveryFactory for FakeFactory {
        type Handle = FakeHandle;

        fn open(&self, path: &str, _format: NativeFormat, range: ByteRange) -> Result<FakeHandle> {
            self.opened.lock().unwrap().push((path.to_string(), range));
            Ok(FakeHandle {
                closed: self.closed.clone(),
                fail_inspect: self.fail_inspect,
            })
        }
    }

    impl DiscoveryHandle for FakeHandle {
        fn inspect(&self) -> Result<SchemaRef> {
            if self.fail_inspect {
                return Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "corrupt footer",
                )));
            }
            Ok(Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int64, false),
                Field::new(
                    "name",
                    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                    true,
                ),
            ])))
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn new_probe(factory: FakeFactory) -> SchemaProbe<FakeFactory> {
        SchemaProbe::new(factory, UriRewriter::default(), SchemaConversion::default())
    }

    #[test]
    fn test_probe_whole_file_and_release() {
        let probe = new_probe(FakeFactory::default());
        let schema = probe
            .probe_schema("file:///data/a.parquet", NativeFormat::Parquet)
            .unwrap();

        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);

        let opened = probe.factory().opened.lock().unwrap().clone();
        assert_eq!(opened, vec![("/data/a.parquet".to_string(), ByteRange::Whole)]);
        assert_eq!(probe.factory().closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_releases_handle_on_failure() {
        let probe = new_probe(FakeFactory {
            fail_inspect: true,
            ..Default::default()
        });
        let result = probe.probe_schema("/data/a.parquet", NativeFormat::Parquet);
        assert!(result.is_err());
        assert_eq!(probe.factory().closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_rewrites_hdfs_path() {
        let probe = new_probe(FakeFactory::default());
        probe
            .probe_schema("hdfs://nn:8020/data/a.parquet", NativeFormat::Parquet)
            .unwrap();
        let opened = probe.factory().opened.lock().unwrap().clone();
        assert_eq!(opened[0].0, "hdfs://nn:8020/data/a.parquet?use_hdfs3=1");
    }

    #[test]
    fn test_probe_bad_scheme_opens_nothing() {
        let probe = new_probe(FakeFactory::default());
        let result = probe.probe_schema("s3://bucket/a.parquet", NativeFormat::Parquet);
        assert!(matches!(result, Err(BridgeError::UnrecognizedScheme { .. })));
        assert!(probe.factory().opened.lock().unwrap().is_empty());
        assert_eq!(probe.factory().closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_probe_files_uses_first_only() {
        let probe = new_probe(FakeFactory::default());
        probe
            .probe_files(&["/data/a.parquet", "/data/b.parquet"], NativeFormat::Parquet)
            .unwrap();
        let opened = probe.factory().opened.lock().unwrap().clone();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].0, "/data/a.parquet");
    }

    #[test]
    fn test_probe_files_empty() {
        let probe = new_probe(FakeFactory::default());
        let files: [&str; 0] = [];
        assert!(matches!(
            probe.probe_files(&files, NativeFormat::Parquet),
            Err(BridgeError::NoFiles)
        ));
    }

    #[test]
    fn test_probe_is_idempotent() {
        let probe = new_probe(FakeFactory::default());
        let first = probe.probe_schema("/data/a.parquet", NativeFormat::Parquet).unwrap();
        let second = probe.probe_schema("/data/a.parquet", NativeFormat::Parquet).unwrap();
        assert_eq!(first, second);
        assert_eq!(probe.factory().closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_byte_range_contains() {
        assert!(ByteRange::Whole.contains(u64::MAX));
        let range = ByteRange::Slice {
            start: 100,
            length: 50,
        };
        assert!(!range.contains(99));
        assert!(range.contains(100));
        assert!(range.contains(149));
        assert!(!range.contains(150));
    }
}
