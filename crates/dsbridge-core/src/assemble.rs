//! Re-assembly of native scan output into host-engine batches.
//!
//! A native scan result exposes plain value vectors by name and decoded
//! dictionaries by id, with dictionary-encoded fields carrying only their
//! index vectors. [`assemble`] resolves every requested data column against
//! that output, rebuilds dictionary arrays where a field declares an
//! encoding, brings each column to the type the data schema declares, and
//! appends one constant column per partition value.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{make_array, Array, ArrayData, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, FieldRef, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::error::ArrowError;
use datafusion::scalar::ScalarValue;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

// ---------------------------------------------------------------------------
// Scan result capability
// ---------------------------------------------------------------------------

/// Dictionary encoding declared by a native field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEncoding {
    pub id: i64,
    pub index_type: DataType,
}

/// Read-only view over one native record batch.
pub trait ScanResult {
    fn num_rows(&self) -> usize;

    /// Value vector for `name`. For dictionary-encoded fields this is the
    /// index vector.
    fn value_vector(&self, name: &str) -> Option<&ArrayRef>;

    /// Decoded dictionary registered under `id`.
    fn dictionary_vector(&self, id: i64) -> Option<&ArrayRef>;

    /// Dictionary encoding declared by the native field `name`, if any.
    fn dictionary_encoding(&self, name: &str) -> Option<&DictionaryEncoding>;
}

/// In-memory scan result: named vectors plus a dictionary table.
#[derive(Debug, Clone, Default)]
pub struct BundledVectors {
    num_rows: usize,
    vectors: HashMap<String, ArrayRef>,
    encodings: HashMap<String, DictionaryEncoding>,
    dictionaries: HashMap<i64, ArrayRef>,
}

impl BundledVectors {
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            ..Default::default()
        }
    }

    pub fn with_vector(mut self, name: impl Into<String>, vector: ArrayRef) -> Self {
        self.vectors.insert(name.into(), vector);
        self
    }

    /// Add a dictionary-encoded field: its index vector, its encoding, and
    /// the dictionary stored under `encoding.id`.
    pub fn with_encoded_vector(
        mut self,
        name: impl Into<String>,
        indices: ArrayRef,
        encoding: DictionaryEncoding,
        dictionary: ArrayRef,
    ) -> Self {
        let name = name.into();
        self.dictionaries.insert(encoding.id, dictionary);
        self.encodings.insert(name.clone(), encoding);
        self.vectors.insert(name, indices);
        self
    }

    /// Declare an encoding without registering its dictionary.
    pub fn with_encoding(mut self, name: impl Into<String>, encoding: DictionaryEncoding) -> Self {
        self.encodings.insert(name.into(), encoding);
        self
    }

    /// Split a record batch into bundled vectors, the way the native library
    /// hands them over: dictionary columns become an index vector plus a
    /// dictionary entry. Ids are assigned in column order starting at 0.
    pub fn from_record_batch(batch: &RecordBatch) -> Self {
        let mut bundled = Self::new(batch.num_rows());
        let mut next_id = 0i64;

        for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
            match column.as_any_dictionary_opt() {
                Some(dict) => {
                    let indices = make_array(dict.keys().to_data());
                    let encoding = DictionaryEncoding {
                        id: next_id,
                        index_type: indices.data_type().clone(),
                    };
                    next_id += 1;
                    bundled = bundled.with_encoded_vector(
                        field.name().clone(),
                        indices,
                        encoding,
                        Arc::clone(dict.values()),
                    );
                }
                None => {
                    bundled = bundled.with_vector(field.name().clone(), Arc::clone(column));
                }
            }
        }
        bundled
    }
}

impl ScanResult for BundledVectors {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn value_vector(&self, name: &str) -> Option<&ArrayRef> {
        self.vectors.get(name)
    }

    fn dictionary_vector(&self, id: i64) -> Option<&ArrayRef> {
        self.dictionaries.get(&id)
    }

    fn dictionary_encoding(&self, name: &str) -> Option<&DictionaryEncoding> {
        self.encodings.get(name)
    }
}

// ---------------------------------------------------------------------------
// Result batch
// ---------------------------------------------------------------------------

/// A column holding one literal for every row of its batch.
///
/// The value is stored once; [`ConstantColumn::to_array`] materializes it
/// only when a plain Arrow array is required.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantColumn {
    value: ScalarValue,
    num_rows: usize,
}

impl ConstantColumn {
    pub fn new(value: ScalarValue, num_rows: usize) -> Self {
        Self { value, num_rows }
    }

    pub fn value(&self) -> &ScalarValue {
        &self.value
    }

    /// Value at `row`, or `None` past the end of the batch.
    pub fn value_at(&self, row: usize) -> Option<&ScalarValue> {
        (row < self.num_rows).then_some(&self.value)
    }

    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    pub fn to_array(&self) -> Result<ArrayRef> {
        Ok(self.value.to_array_of_size(self.num_rows)?)
    }
}

#[derive(Debug, Clone)]
pub enum BatchColumn {
    /// A vector loaded from the scan result.
    Vector(ArrayRef),
    /// A partition value broadcast over the batch.
    Constant(ConstantColumn),
}

impl BatchColumn {
    pub fn is_constant(&self) -> bool {
        matches!(self, BatchColumn::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&ConstantColumn> {
        match self {
            BatchColumn::Constant(c) => Some(c),
            BatchColumn::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&ArrayRef> {
        match self {
            BatchColumn::Vector(v) => Some(v),
            BatchColumn::Constant(_) => None,
        }
    }

    pub fn to_array(&self) -> Result<ArrayRef> {
        match self {
            BatchColumn::Vector(v) => Ok(Arc::clone(v)),
            BatchColumn::Constant(c) => c.to_array(),
        }
    }
}

/// Data columns followed by partition columns, with one shared row count.
#[derive(Debug, Clone)]
pub struct ResultBatch {
    schema: SchemaRef,
    columns: Vec<BatchColumn>,
    num_rows: usize,
}

impl ResultBatch {
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[BatchColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &BatchColumn {
        &self.columns[index]
    }

    pub fn column_by_name(&self, name: &str) -> Option<&BatchColumn> {
        self.schema
            .index_of(name)
            .ok()
            .map(|idx| &self.columns[idx])
    }

    /// Convert to an Arrow record batch, materializing constant columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let arrays = self
            .columns
            .iter()
            .map(BatchColumn::to_array)
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            arrays,
            &options,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build a result batch from a scan result.
///
/// `data_schema` names the columns to pull from the scan result, in output
/// order, and fixes their output types; a schema returned by
/// [`SchemaProbe`](crate::SchemaProbe) is accepted as is. `partition_values`
/// is a single row aligned with `partition_schema`. Any unresolvable column
/// fails the whole call.
pub fn assemble<S: ScanResult + ?Sized>(
    scan_result: &S,
    partition_values: &[ScalarValue],
    partition_schema: &Schema,
    data_schema: &Schema,
) -> Result<ResultBatch> {
    let num_rows = scan_result.num_rows();

    let data_vectors = data_schema
        .fields()
        .iter()
        .map(|field| {
            scan_result
                .value_vector(field.name())
                .ok_or_else(|| BridgeError::MissingColumn(field.name().clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let dictionaries = data_schema
        .fields()
        .iter()
        .map(|field| resolve_dictionary(scan_result, field.name()))
        .collect::<Result<Vec<_>>>()?;

    let width = data_schema.fields().len() + partition_schema.fields().len();
    let mut fields: Vec<FieldRef> = Vec::with_capacity(width);
    let mut columns = Vec::with_capacity(width);

    for ((field, vector), dictionary) in data_schema
        .fields()
        .iter()
        .zip(data_vectors)
        .zip(dictionaries)
    {
        let loaded = load_column(field.name(), vector, dictionary)?;
        let column = conform_column(field.name(), loaded, field.data_type())?;
        debug!(
            "Loaded column '{}' as {} ({} rows)",
            field.name(),
            column.data_type(),
            column.len()
        );
        fields.push(Arc::clone(field));
        columns.push(BatchColumn::Vector(column));
    }

    for (field, value) in constant_partition_columns(partition_values, partition_schema)? {
        columns.push(BatchColumn::Constant(ConstantColumn::new(value, num_rows)));
        fields.push(field);
    }

    Ok(ResultBatch {
        schema: Arc::new(Schema::new_with_metadata(
            fields,
            data_schema.metadata().clone(),
        )),
        columns,
        num_rows,
    })
}

/// Dictionary for `name`, or `None` if the native field is not encoded.
fn resolve_dictionary<'a, S: ScanResult + ?Sized>(
    scan_result: &'a S,
    name: &str,
) -> Result<Option<(&'a DictionaryEncoding, &'a ArrayRef)>> {
    let Some(encoding) = scan_result.dictionary_encoding(name) else {
        return Ok(None);
    };
    if !is_integer(&encoding.index_type) {
        return Err(BridgeError::InvalidDictionaryIndexType {
            column: name.to_string(),
            index_type: encoding.index_type.clone(),
        });
    }
    let dictionary = scan_result
        .dictionary_vector(encoding.id)
        .ok_or_else(|| BridgeError::MissingDictionary {
            column: name.to_string(),
            id: encoding.id,
        })?;
    Ok(Some((encoding, dictionary)))
}

/// Turn a value vector and its optional dictionary into one Arrow array.
fn load_column(
    name: &str,
    vector: &ArrayRef,
    dictionary: Option<(&DictionaryEncoding, &ArrayRef)>,
) -> Result<ArrayRef> {
    let Some((encoding, values)) = dictionary else {
        return Ok(Arc::clone(vector));
    };
    if vector.data_type() != &encoding.index_type {
        return Err(ArrowError::InvalidArgumentError(format!(
            "index vector for column '{}' is {}, encoding declares {}",
            name,
            vector.data_type(),
            encoding.index_type
        ))
        .into());
    }

    let dict_type = DataType::Dictionary(
        Box::new(encoding.index_type.clone()),
        Box::new(values.data_type().clone()),
    );
    let data = vector
        .to_data()
        .into_builder()
        .data_type(dict_type)
        .child_data(vec![values.to_data()])
        .build()?;
    Ok(make_array(data))
}

/// Bring a loaded column to the type its data field declares.
///
/// Dictionary arrays are decoded unless a dictionary type is declared.
/// Timestamps without a timezone take the declared one with their values
/// unchanged, also inside lists and structs. Any other difference fails.
fn conform_column(name: &str, array: ArrayRef, expected: &DataType) -> Result<ArrayRef> {
    let decode_to = match array.data_type() {
        DataType::Dictionary(_, value_type) if !matches!(expected, DataType::Dictionary(..)) => {
            Some(value_type.as_ref().clone())
        }
        _ => None,
    };
    let array = match decode_to {
        Some(value_type) => cast(&array, &value_type)?,
        None => array,
    };

    if array.data_type() == expected {
        return Ok(array);
    }
    if !reinterpretable(array.data_type(), expected) {
        return Err(BridgeError::ColumnType {
            column: name.to_string(),
            expected: expected.clone(),
            actual: array.data_type().clone(),
        });
    }
    Ok(make_array(retype(array.to_data(), expected)?))
}

/// Whether `from` and `to` share a physical layout and differ only in
/// timestamp timezones the session conversion adds.
fn reinterpretable(from: &DataType, to: &DataType) -> bool {
    match (from, to) {
        _ if from == to => true,
        (DataType::Timestamp(from_unit, None), DataType::Timestamp(to_unit, Some(_))) => {
            from_unit == to_unit
        }
        (DataType::List(a), DataType::List(b)) | (DataType::LargeList(a), DataType::LargeList(b)) => {
            reinterpretable(a.data_type(), b.data_type())
        }
        (DataType::FixedSizeList(a, n), DataType::FixedSizeList(b, m)) => {
            n == m && reinterpretable(a.data_type(), b.data_type())
        }
        (DataType::Struct(a), DataType::Struct(b)) => {
            a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| {
                    x.name() == y.name() && reinterpretable(x.data_type(), y.data_type())
                })
        }
        _ => false,
    }
}

/// Relabel `data` as `to`, recursing into children. Buffers are shared.
fn retype(data: ArrayData, to: &DataType) -> Result<ArrayData> {
    let children = match to {
        DataType::List(field) | DataType::LargeList(field) | DataType::FixedSizeList(field, _) => {
            vec![retype(data.child_data()[0].clone(), field.data_type())?]
        }
        DataType::Struct(fields) => data
            .child_data()
            .iter()
            .zip(fields.iter())
            .map(|(child, field)| retype(child.clone(), field.data_type()))
            .collect::<Result<Vec<_>>>()?,
        _ => data.child_data().to_vec(),
    };
    Ok(data
        .into_builder()
        .data_type(to.clone())
        .child_data(children)
        .build()?)
}

/// Pair each partition field with its value, cast to the field type.
fn constant_partition_columns(
    partition_values: &[ScalarValue],
    partition_schema: &Schema,
) -> Result<Vec<(FieldRef, ScalarValue)>> {
    if partition_values.len() != partition_schema.fields().len() {
        return Err(BridgeError::PartitionArity {
            expected: partition_schema.fields().len(),
            actual: partition_values.len(),
        });
    }

    partition_schema
        .fields()
        .iter()
        .zip(partition_values)
        .map(|(field, value)| -> Result<(FieldRef, ScalarValue)> {
            let value = if &value.data_type() == field.data_type() {
                value.clone()
            } else {
                warn!(
                    "Casting partition value for '{}' from {} to {}",
                    field.name(),
                    value.data_type(),
                    field.data_type()
                );
                value.cast_to(field.data_type())?
            };
            Ok((Arc::clone(field), value))
        })
        .collect()
}

fn is_integer(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}
