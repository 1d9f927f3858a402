//! Field-to-cell conversion with per-column formatting rules.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::spec::{
    EnumCellKind, EnumCellValue, EnumFieldValue, ExportError, SpecColumn, SpecColumnFormat,
    SpecXlsxValuePolicy,
};
use crate::util::{convert_date_pattern_to_strftime, convert_nan_inf_to_str};

/// Converts raw field values into cells.
///
/// Owns the translated date patterns of one export; nothing is shared
/// between exporters.
#[derive(Debug, Default)]
pub struct CellValueMapper {
    value_policy: SpecXlsxValuePolicy,
    dict_strftime_by_pattern: HashMap<String, String>,
}

impl CellValueMapper {
    pub fn new(value_policy: SpecXlsxValuePolicy) -> Self {
        Self {
            value_policy,
            dict_strftime_by_pattern: HashMap::new(),
        }
    }

    /// Read `column` from `row` and convert it.
    pub fn map_row_field<R>(
        &mut self,
        column: &SpecColumn<R>,
        row: &R,
    ) -> Result<EnumCellValue, ExportError> {
        self.map_field(&column.name, &column.format, column.extract(row))
    }

    /// Convert one field value of column `name`.
    ///
    /// Null becomes the column default (as text) or Blank. Float, Decimal
    /// and date values without a configured rule fail with
    /// [`ExportError::UnsupportedValueType`], as does any `Other` value.
    pub fn map_field(
        &mut self,
        name: &str,
        format: &SpecColumnFormat,
        value: EnumFieldValue,
    ) -> Result<EnumCellValue, ExportError> {
        if format.cell_kind == EnumCellKind::Blank {
            return Ok(EnumCellValue::Blank);
        }

        let unsupported = |value: &EnumFieldValue| ExportError::UnsupportedValueType {
            column: name.to_string(),
            type_name: value.type_name().to_string(),
        };

        match value {
            EnumFieldValue::Null => Ok(match &format.default_value {
                Some(c_default) if c_default.is_empty() => EnumCellValue::Empty,
                Some(c_default) => EnumCellValue::Text(c_default.clone()),
                None => EnumCellValue::Blank,
            }),
            EnumFieldValue::Text(val) => Ok(match format.cell_kind {
                EnumCellKind::Formula => {
                    EnumCellValue::Formula(val.strip_prefix('=').unwrap_or(&val).to_string())
                }
                _ if val.is_empty() => EnumCellValue::Empty,
                _ => EnumCellValue::Text(val),
            }),
            EnumFieldValue::Integer(val) => Ok(EnumCellValue::Integer(val)),
            EnumFieldValue::Bool(val) => Ok(EnumCellValue::Text(
                if val { "TRUE" } else { "FALSE" }.to_string(),
            )),
            EnumFieldValue::Float(val) => {
                let Some(n_scale) = format.decimal_scale else {
                    return Err(unsupported(&EnumFieldValue::Float(val)));
                };
                if !val.is_finite() {
                    let c_text = convert_nan_inf_to_str(val, &self.value_policy)
                        .unwrap_or_else(|_| self.value_policy.nan_str.clone());
                    return Ok(EnumCellValue::Text(c_text));
                }
                Ok(EnumCellValue::Decimal(match Decimal::try_from(val) {
                    Ok(dec) => format_decimal(dec, n_scale, format),
                    Err(_) => format!("{val:.prec$}", prec = n_scale as usize),
                }))
            }
            EnumFieldValue::Decimal(dec) => {
                let Some(n_scale) = format.decimal_scale else {
                    return Err(unsupported(&EnumFieldValue::Decimal(dec)));
                };
                Ok(EnumCellValue::Decimal(format_decimal(dec, n_scale, format)))
            }
            EnumFieldValue::Date(date) => {
                let Some(c_pattern) = &format.date_pattern else {
                    return Err(unsupported(&EnumFieldValue::Date(date)));
                };
                self.format_datetime(name, c_pattern, date.and_time(NaiveTime::MIN))
            }
            EnumFieldValue::DateTime(dt) => {
                let Some(c_pattern) = &format.date_pattern else {
                    return Err(unsupported(&EnumFieldValue::DateTime(dt)));
                };
                self.format_datetime(name, c_pattern, dt)
            }
            other @ EnumFieldValue::Other(_) => Err(unsupported(&other)),
        }
    }

    fn format_datetime(
        &mut self,
        name: &str,
        pattern: &str,
        dt: NaiveDateTime,
    ) -> Result<EnumCellValue, ExportError> {
        if !self.dict_strftime_by_pattern.contains_key(pattern) {
            let c_strftime = convert_date_pattern_to_strftime(pattern).map_err(|msg| {
                ExportError::MalformedSchema(format!("Column {name:?}: {msg}"))
            })?;
            self.dict_strftime_by_pattern
                .insert(pattern.to_string(), c_strftime);
        }
        let c_strftime = &self.dict_strftime_by_pattern[pattern];

        let mut c_out = String::new();
        write!(c_out, "{}", dt.format(c_strftime)).map_err(|_| {
            ExportError::MalformedSchema(format!(
                "Column {name:?}: date pattern {pattern:?} cannot format {dt}."
            ))
        })?;
        Ok(EnumCellValue::DateTime(c_out))
    }

    /// Number of distinct date patterns translated so far.
    pub fn cached_pattern_count(&self) -> usize {
        self.dict_strftime_by_pattern.len()
    }
}

fn format_decimal(dec: Decimal, scale: u32, format: &SpecColumnFormat) -> String {
    let mut dec_rounded = dec.round_dp_with_strategy(scale, format.rule_rounding.to_strategy());
    dec_rounded.rescale(scale);
    dec_rounded.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::spec::EnumRoundingRule;

    fn format_decimal_rule(scale: u32, rule: EnumRoundingRule) -> SpecColumnFormat {
        SpecColumnFormat {
            decimal_scale: Some(scale),
            rule_rounding: rule,
            ..Default::default()
        }
    }

    #[test]
    fn test_null_maps_to_blank_or_default() {
        let mut mapper = CellValueMapper::default();
        let format = SpecColumnFormat::default();
        assert_eq!(
            mapper.map_field("a", &format, EnumFieldValue::Null).unwrap(),
            EnumCellValue::Blank
        );

        let format = SpecColumnFormat {
            default_value: Some("n/a".to_string()),
            ..Default::default()
        };
        assert_eq!(
            mapper.map_field("a", &format, EnumFieldValue::Null).unwrap(),
            EnumCellValue::Text("n/a".to_string())
        );
    }

    #[test]
    fn test_text_respects_cell_kind() {
        let mut mapper = CellValueMapper::default();
        let mut format = SpecColumnFormat::default();
        assert_eq!(
            mapper.map_field("a", &format, "".into()).unwrap(),
            EnumCellValue::Empty
        );

        format.cell_kind = EnumCellKind::Formula;
        assert_eq!(
            mapper.map_field("a", &format, "=SUM(A1:A2)".into()).unwrap(),
            EnumCellValue::Formula("SUM(A1:A2)".to_string())
        );

        format.cell_kind = EnumCellKind::Blank;
        assert_eq!(
            mapper.map_field("a", &format, "x".into()).unwrap(),
            EnumCellValue::Blank
        );
    }

    #[test]
    fn test_decimal_scale_and_rounding() {
        let mut mapper = CellValueMapper::default();
        let cases = [
            (Decimal::new(125, 3), EnumRoundingRule::HalfEven, "0.12"),
            (Decimal::new(135, 3), EnumRoundingRule::HalfEven, "0.14"),
            (Decimal::new(125, 3), EnumRoundingRule::HalfUp, "0.13"),
            (Decimal::new(121, 3), EnumRoundingRule::Up, "0.13"),
            (Decimal::new(-121, 3), EnumRoundingRule::Floor, "-0.13"),
            (Decimal::new(15, 1), EnumRoundingRule::HalfEven, "1.50"),
        ];
        for (dec, rule, c_expected) in cases {
            let format = format_decimal_rule(2, rule);
            assert_eq!(
                mapper.map_field("x", &format, dec.into()).unwrap(),
                EnumCellValue::Decimal(c_expected.to_string())
            );
        }
    }

    #[test]
    fn test_float_needs_scale_and_handles_non_finite() {
        let mut mapper = CellValueMapper::default();
        let err = mapper
            .map_field("price", &SpecColumnFormat::default(), 1.5.into())
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsupportedValueType { ref column, ref type_name }
                if column == "price" && type_name == "float"
        ));

        let format = format_decimal_rule(1, EnumRoundingRule::HalfEven);
        assert_eq!(
            mapper.map_field("price", &format, 2.0.into()).unwrap(),
            EnumCellValue::Decimal("2.0".to_string())
        );
        assert_eq!(
            mapper
                .map_field("price", &format, f64::INFINITY.into())
                .unwrap(),
            EnumCellValue::Text("Inf".to_string())
        );
    }

    #[test]
    fn test_dates_use_pattern_and_cache() {
        let mut mapper = CellValueMapper::default();
        let format = SpecColumnFormat {
            date_pattern: Some("yyyy-MM-dd".to_string()),
            ..Default::default()
        };
        let Some(date) = NaiveDate::from_ymd_opt(2024, 3, 9) else {
            panic!("valid date");
        };
        assert_eq!(
            mapper.map_field("d", &format, date.into()).unwrap(),
            EnumCellValue::DateTime("2024-03-09".to_string())
        );

        let dt = date.and_hms_opt(7, 5, 0).unwrap();
        let format_dt = SpecColumnFormat {
            date_pattern: Some("yyyy/MM/dd HH:mm".to_string()),
            ..Default::default()
        };
        assert_eq!(
            mapper.map_field("d", &format_dt, dt.into()).unwrap(),
            EnumCellValue::DateTime("2024/03/09 07:05".to_string())
        );
        mapper.map_field("d", &format, date.into()).unwrap();
        assert_eq!(mapper.cached_pattern_count(), 2);

        let err = mapper
            .map_field("d", &SpecColumnFormat::default(), date.into())
            .unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedValueType { .. }));
    }

    #[test]
    fn test_other_and_bool() {
        let mut mapper = CellValueMapper::default();
        let format = SpecColumnFormat::default();
        assert_eq!(
            mapper.map_field("b", &format, true.into()).unwrap(),
            EnumCellValue::Text("TRUE".to_string())
        );
        let err = mapper
            .map_field("b", &format, EnumFieldValue::Other("binary".to_string()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column \"b\": no formatting rule for value type \"binary\""
        );
    }
}
