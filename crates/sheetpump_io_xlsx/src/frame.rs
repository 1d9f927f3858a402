//! Polars `DataFrame` as a source of positional rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::{AnyValue, Column, DataFrame, TimeUnit};

use crate::spec::{BoxError, EnumFieldValue};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const N_DAYS_CE_TO_UNIX_EPOCH: i32 = 719_163;

/// Positional source row: one field per selected column.
pub type TypeFrameRow = Vec<EnumFieldValue>;

/// Map one polars value to a raw field value.
///
/// Types without a rule come back as `Other(dtype)` so the mapper can reject
/// them by name. Datetimes are read as UTC wall-clock time; a column time
/// zone is not applied.
pub fn derive_field_value_from_any_value(value: AnyValue<'_>) -> EnumFieldValue {
    match value {
        AnyValue::Null => EnumFieldValue::Null,
        AnyValue::String(val) => EnumFieldValue::Text(val.to_string()),
        AnyValue::StringOwned(val) => EnumFieldValue::Text(val.to_string()),
        AnyValue::Boolean(val) => EnumFieldValue::Bool(val),
        AnyValue::UInt8(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::UInt16(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::UInt32(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::UInt64(val) => match i64::try_from(val) {
            Ok(n) => EnumFieldValue::Integer(n),
            Err(_) => EnumFieldValue::Float(val as f64),
        },
        AnyValue::Int8(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::Int16(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::Int32(val) => EnumFieldValue::Integer(i64::from(val)),
        AnyValue::Int64(val) => EnumFieldValue::Integer(val),
        AnyValue::Float32(val) => EnumFieldValue::Float(f64::from(val)),
        AnyValue::Float64(val) => EnumFieldValue::Float(val),
        AnyValue::Date(n_days) => n_days
            .checked_add(N_DAYS_CE_TO_UNIX_EPOCH)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map_or_else(|| EnumFieldValue::Other("date".to_string()), EnumFieldValue::Date),
        AnyValue::Datetime(n_ts, time_unit, _) | AnyValue::DatetimeOwned(n_ts, time_unit, _) => {
            derive_naive_datetime(n_ts, time_unit).map_or_else(
                || EnumFieldValue::Other("datetime".to_string()),
                EnumFieldValue::DateTime,
            )
        }
        other => EnumFieldValue::Other(other.dtype().to_string()),
    }
}

fn derive_naive_datetime(n_ts: i64, time_unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match time_unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(n_ts)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(n_ts)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(n_ts),
    };
    Some(dt.naive_utc())
}

/// Read `fields` of every row of `df` as positional rows.
pub fn derive_rows_from_dataframe(
    df: &DataFrame,
    fields: &[String],
) -> Result<Vec<TypeFrameRow>, String> {
    let l_cols: Vec<&Column> = fields
        .iter()
        .map(|c_field| {
            df.column(c_field)
                .map_err(|err| format!("Field {c_field:?} not found in DataFrame: {err}"))
        })
        .collect::<Result<_, _>>()?;

    let mut l_rows = Vec::with_capacity(df.height());
    for n_idx_row in 0..df.height() {
        let mut row = Vec::with_capacity(l_cols.len());
        for col in &l_cols {
            let value = col
                .get(n_idx_row)
                .map_err(|err| format!("Failed to read DataFrame value: {err}"))?;
            row.push(derive_field_value_from_any_value(value));
        }
        l_rows.push(row);
    }
    Ok(l_rows)
}

/// Page an in-memory `DataFrame` as a page source of positional rows.
///
/// Page `n` holds rows `(n - 1) * page_size ..`; pages past the end are empty.
pub fn derive_page_source_from_dataframe(
    df: DataFrame,
    fields: Vec<String>,
    page_size: usize,
) -> impl FnMut(u32) -> Result<Option<Vec<TypeFrameRow>>, BoxError> {
    move |page_no: u32| -> Result<Option<Vec<TypeFrameRow>>, BoxError> {
        let n_offset = (page_no.saturating_sub(1) as usize).saturating_mul(page_size);
        if page_size == 0 || n_offset >= df.height() {
            return Ok(None);
        }
        let n_offset = i64::try_from(n_offset).map_err(|_| "Page offset overflows i64.")?;
        let df_page = df.slice(n_offset, page_size);
        let l_rows = derive_rows_from_dataframe(&df_page, &fields)?;
        Ok(Some(l_rows))
    }
}
