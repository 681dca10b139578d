//! File format resolution.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Option key carrying the configured file format.
pub const ORIGINAL_FORMAT_KEY: &str = "originalFormat";

/// File formats understood by the native dataset library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeFormat {
    Parquet,
}

impl NativeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeFormat::Parquet => "parquet",
        }
    }
}

impl fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a configured format name to its native format.
///
/// Only the exact literal `"parquet"` is recognized.
pub fn resolve(format_name: &str) -> Result<NativeFormat> {
    match format_name {
        "parquet" => Ok(NativeFormat::Parquet),
        other => Err(BridgeError::UnsupportedFormat(other.to_string())),
    }
}

/// Resolve the format named by the `originalFormat` option.
pub fn resolve_options(options: &HashMap<String, String>) -> Result<NativeFormat> {
    let name = options
        .get(ORIGINAL_FORMAT_KEY)
        .map(String::as_str)
        .unwrap_or_default();
    resolve(name)
}

/// Whether files of this format can be read in byte-range splits.
pub fn is_splittable(format: NativeFormat) -> bool {
    matches!(format, NativeFormat::Parquet)
}
