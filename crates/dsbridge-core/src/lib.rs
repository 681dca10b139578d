//! dsbridge core - schema and vector bridge
//!
//! Translates between a columnar dataset library's handles and Arrow batches:
//! - format resolution and split-read support
//! - URI rewriting for filesystem-specific read hints
//! - schema probing through discovery handles
//! - re-assembly of scan output plus constant partition columns

pub mod assemble;
pub mod config;
pub mod error;
pub mod format;
pub mod partition;
pub mod probe;
pub mod schema;
pub mod uri;

pub use assemble::{
    assemble, BatchColumn, BundledVectors, ConstantColumn, DictionaryEncoding, ResultBatch,
    ScanResult,
};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use format::{is_splittable, resolve, NativeFormat};
pub use partition::parse_partition_path;
pub use probe::{ByteRange, DiscoveryFactory, DiscoveryGuard, DiscoveryHandle, SchemaProbe};
pub use schema::SchemaConversion;
pub use uri::{classify_filesystem, rewrite_for_read, Filesystem, UriRewriter};

// Re-export for downstream consumers
pub use datafusion::scalar::ScalarValue;
