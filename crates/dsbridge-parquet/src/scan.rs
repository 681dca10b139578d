//! Parquet scan tasks producing bundled vectors, and per-file assembly.

use std::fs::File;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatchReader;
use dsbridge_core::{
    assemble, classify_filesystem, is_splittable, parse_partition_path, BridgeConfig, BridgeError,
    BundledVectors, ByteRange, Filesystem, ResultBatch, Result,
};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use parquet::file::metadata::RowGroupMetaData;
use tracing::{debug, info};

/// One scan task: a byte range of a local parquet file.
///
/// Row groups are assigned to the range holding their midpoint, so ranges
/// that tile a file read every row group exactly once.
#[derive(Debug, Clone)]
pub struct ParquetScanTask {
    path: String,
    range: ByteRange,
    batch_size: usize,
    projection: Option<Vec<String>>,
}

impl ParquetScanTask {
    pub fn new(path: impl Into<String>, range: ByteRange, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            range,
            batch_size,
            projection: None,
        }
    }

    /// Read only the named top-level columns. Names absent from the file are
    /// skipped here and reported by assembly.
    pub fn with_projection(mut self, columns: Vec<String>) -> Self {
        self.projection = Some(columns);
        self
    }

    /// Open the file and return an iterator of bundled batches.
    pub fn execute(&self) -> Result<BundledBatches> {
        if self.batch_size == 0 {
            return Err(BridgeError::Config("batch size must be positive".to_string()));
        }
        if classify_filesystem(&self.path)? != Filesystem::Local {
            return Err(BridgeError::UnsupportedFilesystem(self.path.clone()));
        }

        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let row_groups: Vec<usize> = builder
            .metadata()
            .row_groups()
            .iter()
            .enumerate()
            .filter(|(_, rg)| self.range.contains(row_group_midpoint(rg)))
            .map(|(idx, _)| idx)
            .collect();
        debug!(
            "Scan of '{}' {:?}: row groups {:?} of {}",
            self.path,
            self.range,
            row_groups,
            builder.metadata().num_row_groups()
        );

        let builder = match &self.projection {
            Some(columns) => {
                let file_schema = builder.schema();
                let indices: Vec<usize> = columns
                    .iter()
                    .filter_map(|name| file_schema.index_of(name).ok())
                    .collect();
                let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
                builder.with_projection(mask)
            }
            None => builder,
        };

        let reader = builder
            .with_row_groups(row_groups)
            .with_batch_size(self.batch_size)
            .build()?;

        Ok(BundledBatches { reader })
    }
}

/// Iterator over the bundled vectors of a scan task.
pub struct BundledBatches {
    reader: ParquetRecordBatchReader,
}

impl BundledBatches {
    pub fn schema(&self) -> SchemaRef {
        self.reader.schema()
    }
}

impl Iterator for BundledBatches {
    type Item = Result<BundledVectors>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = match self.reader.next()? {
            Ok(batch) => batch,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(BundledVectors::from_record_batch(&batch)))
    }
}

/// Byte offset of the middle of a row group's column chunks.
fn row_group_midpoint(rg: &RowGroupMetaData) -> u64 {
    let start = rg
        .columns()
        .first()
        .map(|col| match col.dictionary_page_offset() {
            Some(offset) => offset.min(col.data_page_offset()),
            None => col.data_page_offset(),
        })
        .unwrap_or(0);
    (start + rg.compressed_size() / 2).max(0) as u64
}

/// Scan a file range and assemble every batch with the file's partition values.
///
/// `path` is the URI as the host engine knows it; partition values are parsed
/// from it before it is rewritten for the reader.
pub fn scan_file(
    path: &str,
    range: ByteRange,
    data_schema: &Schema,
    partition_schema: &Schema,
    config: &BridgeConfig,
) -> Result<Vec<ResultBatch>> {
    let format = config.format()?;
    if range != ByteRange::Whole && !is_splittable(format) {
        return Err(BridgeError::Config(format!(
            "format {} does not support split reads",
            format
        )));
    }

    let partition_values = parse_partition_path(path, partition_schema)?;
    let native_path = config.uri_rewriter().rewrite_for_read(path)?;
    let projection = data_schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    let task = ParquetScanTask::new(native_path, range, config.batch_size).with_projection(projection);

    let mut batches = Vec::new();
    for bundled in task.execute()? {
        let bundled = bundled?;
        batches.push(assemble(
            &bundled,
            &partition_values,
            partition_schema,
            data_schema,
        )?);
    }

    info!(
        "Scanned '{}': {} batches, {} rows",
        path,
        batches.len(),
        batches.iter().map(ResultBatch::num_rows).sum::<usize>()
    );
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use arrow::record_batch::RecordBatch;
    use dsbridge_core::ScanResult;
    use parquet::file::properties::WriterProperties;
    use std::sync::Arc;

    fn write_ids(path: &std::path::Path, rows: i64, row_group_size: usize) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let ids: ArrayRef = Arc::new(Int64Array::from((0..rows).collect::<Vec<_>>()));
        let names: ArrayRef = Arc::new(StringArray::from(
            (0..rows).map(|i| format!("n{}", i)).collect::<Vec<_>>(),
        ));
        let batch = RecordBatch::try_new(schema.clone(), vec![ids, names]).unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(row_group_size)
            .build();
        let file = File::create(path).unwrap();
        let mut writer = parquet::arrow::ArrowWriter::try_new(file, schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn count_rows(task: &ParquetScanTask) -> usize {
        task.execute()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum()
    }

    #[test]
    fn test_whole_file_reads_all_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 10, 3);

        let task = ParquetScanTask::new(path.to_str().unwrap(), ByteRange::Whole, 4);
        assert_eq!(count_rows(&task), 10);
    }

    #[test]
    fn test_batch_size_respected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 10, 100);

        let task = ParquetScanTask::new(path.to_str().unwrap(), ByteRange::Whole, 4);
        let sizes: Vec<usize> = task
            .execute()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 3, 3);

        let task = ParquetScanTask::new(path.to_str().unwrap(), ByteRange::Whole, 0);
        assert!(matches!(task.execute(), Err(BridgeError::Config(_))));

        let config = BridgeConfig {
            batch_size: 0,
            ..Default::default()
        };
        let err = scan_file(
            path.to_str().unwrap(),
            ByteRange::Whole,
            &Schema::new(vec![Field::new("id", DataType::Int64, false)]),
            &Schema::empty(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_split_ranges_cover_each_row_group_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 12, 3);
        let size = std::fs::metadata(&path).unwrap().len();
        let half = size / 2;

        let first = ParquetScanTask::new(
            path.to_str().unwrap(),
            ByteRange::Slice {
                start: 0,
                length: half,
            },
            100,
        );
        let second = ParquetScanTask::new(
            path.to_str().unwrap(),
            ByteRange::Slice {
                start: half,
                length: size - half,
            },
            100,
        );
        assert_eq!(count_rows(&first) + count_rows(&second), 12);
    }

    #[test]
    fn test_range_past_end_reads_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 5, 5);
        let size = std::fs::metadata(&path).unwrap().len();

        let task = ParquetScanTask::new(
            path.to_str().unwrap(),
            ByteRange::Slice {
                start: size,
                length: 100,
            },
            100,
        );
        assert_eq!(count_rows(&task), 0);
    }

    #[test]
    fn test_projection_limits_vectors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 3, 3);

        let task = ParquetScanTask::new(path.to_str().unwrap(), ByteRange::Whole, 100)
            .with_projection(vec!["name".to_string(), "missing".to_string()]);
        let batches = task.execute().unwrap();
        assert_eq!(batches.schema().fields().len(), 1);

        let bundled: Vec<BundledVectors> = batches.map(|b| b.unwrap()).collect();
        assert!(bundled[0].value_vector("name").is_some());
        assert!(bundled[0].value_vector("id").is_none());
    }

    #[test]
    fn test_scan_file_missing_column() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ids.parquet");
        write_ids(&path, 3, 3);

        let data_schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("absent", DataType::Int64, true),
        ]);
        let err = scan_file(
            path.to_str().unwrap(),
            ByteRange::Whole,
            &data_schema,
            &Schema::empty(),
            &BridgeConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::MissingColumn(ref name) if name == "absent"));
    }

    #[test]
    fn test_scan_task_hdfs_unsupported() {
        let task = ParquetScanTask::new(
            "hdfs://nn:8020/data/a.parquet?use_hdfs3=1",
            ByteRange::Whole,
            10,
        );
        assert!(matches!(
            task.execute(),
            Err(BridgeError::UnsupportedFilesystem(_))
        ));
    }
}
