//! dsbridge parquet - parquet-backed native capabilities
//!
//! Binds the bridge's discovery and scan-result interfaces to the `parquet`
//! crate for local files:
//! - [`ParquetDiscoveryFactory`] opens footers for schema probing
//! - [`ParquetScanTask`] reads a byte range and yields bundled vectors
//! - [`scan_file`] assembles those vectors with partition columns

pub mod discovery;
pub mod scan;

pub use discovery::{HandleStats, ParquetDiscoveryFactory, ParquetDiscoveryHandle};
pub use scan::{scan_file, BundledBatches, ParquetScanTask};
