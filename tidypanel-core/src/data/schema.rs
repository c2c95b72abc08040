use crate::domain::columns;
use polars::prelude::*;

/// Fixed leading columns of the long table, with their Parquet dtypes.
pub struct LongSchema;

impl LongSchema {
    pub const FIXED_COLUMNS: [&'static str; 6] = [
        columns::FLOW_ID,
        columns::DATE,
        columns::TIME,
        columns::VALUE,
        columns::UNIT,
        columns::SERIES_NAME,
    ];

    /// Schema of the long table; metadata columns are text.
    pub fn schema(metadata_columns: &[String]) -> Schema {
        let mut fields = vec![
            Field::new(columns::FLOW_ID.into(), DataType::String),
            Field::new(columns::DATE.into(), DataType::Date),
            Field::new(columns::TIME.into(), DataType::String),
            Field::new(columns::VALUE.into(), DataType::Float64),
            Field::new(columns::UNIT.into(), DataType::String),
            Field::new(columns::SERIES_NAME.into(), DataType::String),
        ];
        fields.extend(
            metadata_columns
                .iter()
                .map(|name| Field::new(name.as_str().into(), DataType::String)),
        );
        Schema::from_iter(fields)
    }

    /// Metadata column names of a long-table frame: everything after the
    /// fixed columns, in frame order.
    pub fn metadata_columns(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| !Self::FIXED_COLUMNS.contains(&name.as_str()))
            .collect()
    }

    /// Validate DataFrame against schema
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_against(df, &Self::schema(&Self::metadata_columns(df)))
    }
}

/// `date` plus one `Float64` column per flow.
pub struct WideSchema;

impl WideSchema {
    pub fn schema(flows: &[String]) -> Schema {
        let mut fields = vec![Field::new(columns::DATE.into(), DataType::Date)];
        fields.extend(
            flows
                .iter()
                .map(|flow| Field::new(flow.as_str().into(), DataType::Float64)),
        );
        Schema::from_iter(fields)
    }

    pub fn flow_columns(df: &DataFrame) -> Vec<String> {
        df.get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name != columns::DATE)
            .collect()
    }

    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_against(df, &Self::schema(&Self::flow_columns(df)))
    }
}

fn validate_against(df: &DataFrame, expected: &Schema) -> Result<(), SchemaError> {
    let actual = df.schema();

    // Check all required columns exist
    for field in expected.iter_fields() {
        if !actual.contains(field.name()) {
            return Err(SchemaError::MissingColumn(field.name().to_string()));
        }
    }

    // Check data types match
    for field in expected.iter_fields() {
        let actual_dtype = actual
            .get(field.name())
            .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
        if actual_dtype != field.dtype() {
            return Err(SchemaError::TypeMismatch {
                column: field.name().to_string(),
                expected: field.dtype().clone(),
                actual: actual_dtype.clone(),
            });
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_schema_has_fixed_and_metadata_columns() {
        let schema = LongSchema::schema(&["obs_status".to_string()]);
        for name in LongSchema::FIXED_COLUMNS {
            assert!(schema.contains(name), "{name}");
        }
        assert_eq!(schema.get("obs_status"), Some(&DataType::String));
        assert_eq!(schema.get("date"), Some(&DataType::Date));
    }

    #[test]
    fn wide_validate_rejects_text_flow_column() {
        let date = Column::new("date".into(), &[18262i32])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![
            date,
            Column::new("X".into(), &["1.0"]),
        ])
        .unwrap();

        let result = WideSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn long_validate_rejects_missing_column() {
        let df = DataFrame::new(vec![Column::new("flow_id".into(), &["A"])]).unwrap();
        assert!(matches!(
            LongSchema::validate(&df),
            Err(SchemaError::MissingColumn(_))
        ));
    }
}
