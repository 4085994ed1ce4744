//! Calendar decomposition of the sale date
//!
//! The source data stores the sale date as `20141013T000000`. Models only see
//! numbers, so the column is widened into `year`, `month` and `day`.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::{Error, Result};

/// Timestamp layout used by the sale-date column.
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Names of the columns a date column is widened into, in order.
pub const CALENDAR_COLUMNS: [&str; 3] = ["year", "month", "day"];

/// Integer calendar features of one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    /// Calendar year
    pub year: i32,
    /// Month, 1-12
    pub month: u32,
    /// Day of month, 1-31
    pub day: u32,
}

/// Split a sale date into year, month and day.
///
/// Accepts the full `%Y%m%dT%H%M%S` layout and a bare `%Y-%m-%d` date.
///
/// # Errors
///
/// Returns `InvalidInput` if the value matches neither layout.
pub fn decompose_date(value: &str) -> Result<CalendarParts> {
    let date = NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|e| Error::InvalidInput(format!("unparsable date '{value}': {e}")))?;

    Ok(CalendarParts {
        year: date.year(),
        month: date.month(),
        day: date.day(),
    })
}

/// Replace a string date column with `year`, `month`, `day` columns.
///
/// The three new `Int32` columns are appended after the remaining columns.
///
/// # Errors
///
/// Returns `InvalidInput` if the column is missing, not a string column,
/// contains nulls, or holds an unparsable date.
pub fn widen_date_column(batch: &RecordBatch, column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let (index, _) = schema
        .column_with_name(column)
        .ok_or_else(|| Error::InvalidInput(format!("date column '{column}' not found")))?;

    let dates = batch
        .column(index)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "date column '{column}' must be Utf8, found {:?}",
                batch.column(index).data_type()
            ))
        })?;

    let mut years = Vec::with_capacity(dates.len());
    let mut months = Vec::with_capacity(dates.len());
    let mut days = Vec::with_capacity(dates.len());
    for row in 0..dates.len() {
        if dates.is_null(row) {
            return Err(Error::InvalidInput(format!(
                "date column '{column}' is null at row {row}"
            )));
        }
        let parts = decompose_date(dates.value(row))?;
        years.push(parts.year);
        // month and day are at most 31
        #[allow(clippy::cast_possible_wrap)]
        let (month, day) = (parts.month as i32, parts.day as i32);
        months.push(month);
        days.push(day);
    }

    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + 2);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 2);
    for (i, field) in schema.fields().iter().enumerate() {
        if i != index {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(batch.column(i)));
        }
    }
    for (name, values) in CALENDAR_COLUMNS.iter().zip([years, months, days]) {
        fields.push(Field::new(*name, DataType::Int32, false));
        columns.push(Arc::new(Int32Array::from(values)));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_source_layout() {
        let parts = decompose_date("20141013T000000").unwrap();
        assert_eq!(
            parts,
            CalendarParts {
                year: 2014,
                month: 10,
                day: 13
            }
        );
    }

    #[test]
    fn test_decompose_iso_date() {
        assert_eq!(decompose_date("2015-02-25").unwrap().month, 2);
    }

    #[test]
    fn test_decompose_rejects_garbage() {
        assert!(matches!(
            decompose_date("not a date"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_widen_date_column() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("date", DataType::Utf8, false),
            Field::new("price", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["20141013T000000", "20150225T000000"])),
                Arc::new(arrow::array::Float64Array::from(vec![221_900.0, 180_000.0])),
            ],
        )
        .unwrap();

        let widened = widen_date_column(&batch, "date").unwrap();
        let names: Vec<String> = widened
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["price", "year", "month", "day"]);

        let months = widened
            .column(2)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(months.value(0), 10);
        assert_eq!(months.value(1), 2);
    }

    #[test]
    fn test_widen_missing_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1]))]).unwrap();
        assert!(widen_date_column(&batch, "date").is_err());
    }
}
