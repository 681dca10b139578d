//! Conversion from native file schemas to the host engine's schema.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

/// Converts schemas reported by the native library into the host engine's
/// logical representation.
///
/// Dictionary encoding is a physical detail of the file, so dictionary types
/// are replaced by their value types. Timestamps without a timezone are
/// stamped with the session timezone when one is configured; the timezone is
/// always passed in explicitly and never read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaConversion {
    session_timezone: Option<Arc<str>>,
}

impl SchemaConversion {
    pub fn new(session_timezone: Option<String>) -> Self {
        Self {
            session_timezone: session_timezone.map(Arc::from),
        }
    }

    pub fn session_timezone(&self) -> Option<&str> {
        self.session_timezone.as_deref()
    }

    pub fn convert_schema(&self, schema: &Schema) -> SchemaRef {
        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|f| self.convert_field(f))
            .collect();
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()))
    }

    pub fn convert_field(&self, field: &Field) -> Field {
        field
            .clone()
            .with_data_type(self.convert_data_type(field.data_type()))
    }

    fn convert_data_type(&self, data_type: &DataType) -> DataType {
        match data_type {
            DataType::Dictionary(_, value_type) => self.convert_data_type(value_type),
            DataType::Timestamp(unit, None) => {
                DataType::Timestamp(*unit, self.session_timezone.clone())
            }
            DataType::List(inner) => DataType::List(Arc::new(self.convert_field(inner))),
            DataType::LargeList(inner) => {
                DataType::LargeList(Arc::new(self.convert_field(inner)))
            }
            DataType::FixedSizeList(inner, size) => {
                DataType::FixedSizeList(Arc::new(self.convert_field(inner)), *size)
            }
            DataType::Struct(fields) => DataType::Struct(
                fields
                    .iter()
                    .map(|f| Arc::new(self.convert_field(f)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Fields, TimeUnit};
    use std::collections::HashMap;

    #[test]
    fn test_dictionary_unwrapped() {
        let schema = Schema::new(vec![Field::new(
            "city",
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            true,
        )]);
        let converted = SchemaConversion::default().convert_schema(&schema);
        assert_eq!(converted.field(0).data_type(), &DataType::Utf8);
        assert!(converted.field(0).is_nullable());
    }

    #[test]
    fn test_timestamp_gets_session_timezone() {
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Timestamp(TimeUnit::Microsecond, None), false),
            Field::new(
                "ts_utc",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]);
        let conversion = SchemaConversion::new(Some("Asia/Tokyo".to_string()));
        let converted = conversion.convert_schema(&schema);
        assert_eq!(
            converted.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("Asia/Tokyo".into()))
        );
        assert_eq!(
            converted.field(1).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
    }

    #[test]
    fn test_timestamp_without_session_timezone_untouched() {
        let schema = Schema::new(vec![Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        )]);
        let converted = SchemaConversion::default().convert_schema(&schema);
        assert_eq!(
            converted.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, None)
        );
    }

    #[test]
    fn test_nested_types_converted() {
        let inner = Fields::from(vec![Field::new(
            "tag",
            DataType::Dictionary(Box::new(DataType::Int8), Box::new(DataType::Utf8)),
            true,
        )]);
        let schema = Schema::new(vec![
            Field::new("s", DataType::Struct(inner), true),
            Field::new_list(
                "l",
                Field::new("item", DataType::Timestamp(TimeUnit::Second, None), true),
                true,
            ),
        ]);
        let converted = SchemaConversion::new(Some("UTC".to_string())).convert_schema(&schema);

        let DataType::Struct(fields) = converted.field(0).data_type() else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].data_type(), &DataType::Utf8);

        let DataType::List(item) = converted.field(1).data_type() else {
            panic!("expected list");
        };
        assert_eq!(
            item.data_type(),
            &DataType::Timestamp(TimeUnit::Second, Some("UTC".into()))
        );
    }

    #[test]
    fn test_metadata_preserved() {
        let mut field_meta = HashMap::new();
        field_meta.insert("origin".to_string(), "native".to_string());
        let mut schema_meta = HashMap::new();
        schema_meta.insert("writer".to_string(), "test".to_string());
        let schema = Schema::new_with_metadata(
            vec![Field::new("a", DataType::Int64, false).with_metadata(field_meta.clone())],
            schema_meta.clone(),
        );
        let converted = SchemaConversion::default().convert_schema(&schema);
        assert_eq!(converted.metadata(), &schema_meta);
        assert_eq!(converted.field(0).metadata(), &field_meta);
    }
}
