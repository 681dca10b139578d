//! Partition values from hive-style directory paths (`.../year=2024/month=01/file`).

use std::collections::HashMap;

use arrow::datatypes::Schema;
use datafusion::scalar::ScalarValue;
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Directory value standing for a null partition value.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Parse the partition values of `path` for every field of `partition_schema`.
///
/// Only directory segments are considered; the file name is ignored. When a
/// key appears more than once the deepest segment wins.
pub fn parse_partition_path(path: &str, partition_schema: &Schema) -> Result<Vec<ScalarValue>> {
    let directories = match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    };

    let mut raw: HashMap<&str, &str> = HashMap::new();
    for segment in directories.split('/') {
        if let Some((key, value)) = segment.split_once('=') {
            raw.insert(key, value);
        }
    }

    partition_schema
        .fields()
        .iter()
        .map(|field| -> Result<ScalarValue> {
            let encoded = raw
                .get(field.name().as_str())
                .ok_or_else(|| BridgeError::MissingPartitionValue(field.name().clone()))?;
            let decoded = percent_decode_str(encoded).decode_utf8().map_err(|e| {
                BridgeError::InvalidPartitionValue {
                    column: field.name().clone(),
                    reason: e.to_string(),
                }
            })?;
            debug!("Partition '{}' = '{}'", field.name(), decoded);

            if decoded == HIVE_DEFAULT_PARTITION {
                return Ok(ScalarValue::try_from(field.data_type())?);
            }
            Ok(ScalarValue::try_from_string(
                decoded.into_owned(),
                field.data_type(),
            )?)
        })
        .collect()
}
