//! Bridge configuration from option maps or environment variables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::format::{self, NativeFormat, ORIGINAL_FORMAT_KEY};
use crate::schema::SchemaConversion;
use crate::uri::{UriRewriter, DEFAULT_HDFS_CLIENT_HINT};

pub const SESSION_TIMEZONE_KEY: &str = "sessionTimezone";
pub const HDFS_CLIENT_HINT_KEY: &str = "hdfsClientHint";
pub const BATCH_SIZE_KEY: &str = "batchSize";

pub const DEFAULT_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Format name, resolved through [`format::resolve`].
    pub original_format: String,
    /// Timezone stamped onto timezone-less timestamps during schema conversion.
    pub session_timezone: Option<String>,
    /// Query parameter appended to distributed-filesystem URIs. `None` disables it.
    pub hdfs_client_hint: Option<String>,
    /// Maximum rows per batch when scanning.
    pub batch_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            original_format: NativeFormat::Parquet.as_str().to_string(),
            session_timezone: None,
            hdfs_client_hint: Some(DEFAULT_HDFS_CLIENT_HINT.to_string()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Build a config from a host-engine option map.
    ///
    /// A missing `originalFormat` is kept empty so that [`BridgeConfig::format`]
    /// rejects it. An empty `hdfsClientHint` disables URI rewriting.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            original_format: options
                .get(ORIGINAL_FORMAT_KEY)
                .cloned()
                .unwrap_or_default(),
            session_timezone: options
                .get(SESSION_TIMEZONE_KEY)
                .filter(|tz| !tz.is_empty())
                .cloned(),
            hdfs_client_hint: match options.get(HDFS_CLIENT_HINT_KEY) {
                Some(hint) if hint.is_empty() => None,
                Some(hint) => Some(hint.clone()),
                None => defaults.hdfs_client_hint,
            },
            batch_size: match options.get(BATCH_SIZE_KEY) {
                Some(v) => parse_batch_size(v)?,
                None => defaults.batch_size,
            },
        })
    }

    /// Build a config from environment variables:
    ///   DSBRIDGE_FORMAT, DSBRIDGE_TIMEZONE, DSBRIDGE_HDFS_HINT, DSBRIDGE_BATCH_SIZE
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            original_format: std::env::var("DSBRIDGE_FORMAT")
                .unwrap_or_else(|_| NativeFormat::Parquet.as_str().to_string()),
            session_timezone: std::env::var("DSBRIDGE_TIMEZONE")
                .ok()
                .filter(|tz| !tz.is_empty()),
            hdfs_client_hint: match std::env::var("DSBRIDGE_HDFS_HINT") {
                Ok(hint) if hint.is_empty() => None,
                Ok(hint) => Some(hint),
                Err(_) => Some(DEFAULT_HDFS_CLIENT_HINT.to_string()),
            },
            batch_size: parse_batch_size(
                &std::env::var("DSBRIDGE_BATCH_SIZE")
                    .unwrap_or_else(|_| DEFAULT_BATCH_SIZE.to_string()),
            )?,
        })
    }

    pub fn format(&self) -> Result<NativeFormat> {
        format::resolve(&self.original_format)
    }

    pub fn schema_conversion(&self) -> SchemaConversion {
        SchemaConversion::new(self.session_timezone.clone())
    }

    pub fn uri_rewriter(&self) -> UriRewriter {
        UriRewriter::new(self.hdfs_client_hint.clone())
    }
}

fn parse_batch_size(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(BridgeError::Config(format!("invalid batch size: '{}'", value))),
    }
}
