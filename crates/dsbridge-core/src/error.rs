//! Typed errors for the bridge.

use arrow::datatypes::DataType;
use thiserror::Error;

/// Errors raised while probing schemas, rewriting URIs or assembling batches.
///
/// Every variant is fatal for the probe or assembly call that produced it.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    #[error("unrecognized filesystem scheme '{scheme}' in URI: {uri}")]
    UnrecognizedScheme { scheme: String, uri: String },

    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("column '{0}' not found in scan result")]
    MissingColumn(String),

    #[error("column '{column}' is {actual} in scan result, expected {expected}")]
    ColumnType {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("dictionary index type for column '{column}' must be an integer, got {index_type}")]
    InvalidDictionaryIndexType { column: String, index_type: DataType },

    #[error("dictionary {id} for column '{column}' not found in scan result")]
    MissingDictionary { column: String, id: i64 },

    #[error("expected {expected} partition values, got {actual}")]
    PartitionArity { expected: usize, actual: usize },

    #[error("partition value for '{0}' not found in path")]
    MissingPartitionValue(String),

    #[error("invalid partition value for '{column}': {reason}")]
    InvalidPartitionValue { column: String, reason: String },

    #[error("no files to probe")]
    NoFiles,

    #[error("filesystem not supported by this discovery factory: {0}")]
    UnsupportedFilesystem(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
