//! Shared export specification models.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::conf::{
    C_SHEET_NAME_DEFAULT, N_DECIMAL_SCALE_MAX, N_NCOLS_EXCEL_MAX, N_PAGE_SIZE_DEFAULT,
    N_ROW_CAPACITY_PER_SHEET_MAX, N_WIDTH_CELL_MAX_DEFAULT, N_WIDTH_CELL_MAX_EXCEL,
    N_WIDTH_CELL_MIN_DEFAULT, TUP_ZERO_SENTINELS,
};
use crate::util::convert_date_pattern_to_strftime;

/// Boxed error returned by page sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Cell value after mapping, ready for serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumCellValue {
    /// Present but empty text.
    Empty,
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Decimal value already rendered with its column scale.
    ///
    /// Written as text so trailing zeros of the scale survive.
    Decimal(String),
    /// Date/time value already rendered with its column pattern.
    DateTime(String),
    /// Cell formula (without leading `=`).
    Formula(String),
    /// Explicit blank cell.
    Blank,
}

impl EnumCellValue {
    /// Text used for width estimation.
    pub fn display_text(&self) -> Cow<'_, str> {
        match self {
            Self::Empty | Self::Blank => Cow::Borrowed(""),
            Self::Text(val) | Self::Decimal(val) | Self::DateTime(val) | Self::Formula(val) => {
                Cow::Borrowed(val.as_str())
            }
            Self::Integer(val) => Cow::Owned(val.to_string()),
        }
    }

    /// Whether the cell counts as empty for row suppression.
    ///
    /// Blank, empty and whitespace-only text, plus the zero sentinels
    /// `0`, `0.0` and `0.00`.
    pub fn is_empty_like(&self) -> bool {
        match self {
            Self::Empty | Self::Blank => true,
            Self::Formula(_) | Self::DateTime(_) => false,
            Self::Integer(val) => *val == 0,
            Self::Text(val) | Self::Decimal(val) => {
                val.trim().is_empty() || TUP_ZERO_SENTINELS.contains(&val.as_str())
            }
        }
    }
}

/// Raw field value read from a source row by a column extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumFieldValue {
    /// Missing value.
    Null,
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Floating point value; needs a decimal scale.
    Float(f64),
    /// Exact decimal value; needs a decimal scale.
    Decimal(Decimal),
    /// Boolean value.
    Bool(bool),
    /// Calendar date; needs a date pattern.
    Date(NaiveDate),
    /// Date and time; needs a date pattern.
    DateTime(NaiveDateTime),
    /// Value of a type the mapper has no rule for, carrying the type name.
    Other(String),
}

impl EnumFieldValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Bool(_) => "bool",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for EnumFieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EnumFieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for EnumFieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for EnumFieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for EnumFieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for EnumFieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for EnumFieldValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for EnumFieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for EnumFieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for EnumFieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T> From<Option<T>> for EnumFieldValue
where
    T: Into<EnumFieldValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnSpecification

/// How a text field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCellKind {
    /// Plain text cell (default).
    #[default]
    Text,
    /// Text is a cell formula.
    Formula,
    /// Always an explicit blank cell.
    Blank,
}

/// Decimal rounding rule applied when rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumRoundingRule {
    /// Round half to even (default).
    #[default]
    HalfEven,
    /// Round half away from zero.
    HalfUp,
    /// Round half toward zero.
    HalfDown,
    /// Away from zero.
    Up,
    /// Toward zero.
    Down,
    /// Toward positive infinity.
    Ceiling,
    /// Toward negative infinity.
    Floor,
}

impl EnumRoundingRule {
    /// Matching [`RoundingStrategy`].
    pub fn to_strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfDown => RoundingStrategy::MidpointTowardZero,
            Self::Up => RoundingStrategy::AwayFromZero,
            Self::Down => RoundingStrategy::ToZero,
            Self::Ceiling => RoundingStrategy::ToPositiveInfinity,
            Self::Floor => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

/// Per-column formatting rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecColumnFormat {
    /// Decimal places for float/decimal fields. `None` rejects such fields.
    pub decimal_scale: Option<u32>,
    /// Rounding rule used with `decimal_scale`.
    pub rule_rounding: EnumRoundingRule,
    /// Date pattern (`yyyy-MM-dd HH:mm:ss` letters). `None` rejects date fields.
    pub date_pattern: Option<String>,
    /// Text written instead of a null field.
    pub default_value: Option<String>,
    /// Cell kind for text fields.
    pub cell_kind: EnumCellKind,
}

/// Field extractor reading one value out of a source row.
pub type FnFieldExtractor<R> = Box<dyn Fn(&R) -> EnumFieldValue + Send + Sync>;

/// One exported column.
pub struct SpecColumn<R> {
    /// Header text.
    pub name: String,
    /// Reads the field from a source row.
    pub extractor: FnFieldExtractor<R>,
    /// Formatting rules.
    pub format: SpecColumnFormat,
    /// Comment attached to the header cell of the first sheet.
    pub comment: Option<String>,
    /// Value written by template export.
    pub template_value: Option<String>,
}

impl<R> SpecColumn<R> {
    /// Create a text-formatted column.
    pub fn new<F>(name: impl Into<String>, extractor: F) -> Self
    where
        F: Fn(&R) -> EnumFieldValue + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            extractor: Box::new(extractor),
            format: SpecColumnFormat::default(),
            comment: None,
            template_value: None,
        }
    }

    /// Set decimal scale and rounding rule.
    pub fn with_decimal(mut self, scale: u32, rule_rounding: EnumRoundingRule) -> Self {
        self.format.decimal_scale = Some(scale);
        self.format.rule_rounding = rule_rounding;
        self
    }

    /// Set the date pattern.
    pub fn with_date_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.format.date_pattern = Some(pattern.into());
        self
    }

    /// Set the default text for null fields.
    pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
        self.format.default_value = Some(value.into());
        self
    }

    /// Set the cell kind for text fields.
    pub fn with_cell_kind(mut self, cell_kind: EnumCellKind) -> Self {
        self.format.cell_kind = cell_kind;
        self
    }

    /// Attach a header comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the template export value.
    pub fn with_template_value(mut self, value: impl Into<String>) -> Self {
        self.template_value = Some(value.into());
        self
    }

    /// Read this column's field from `row`.
    pub fn extract(&self, row: &R) -> EnumFieldValue {
        (self.extractor)(row)
    }
}

impl SpecColumn<Vec<EnumFieldValue>> {
    /// Column reading position `idx` of a positional row; out of range reads null.
    pub fn positional(name: impl Into<String>, idx: usize) -> Self {
        Self::new(name, move |row: &Vec<EnumFieldValue>| {
            row.get(idx).cloned().unwrap_or(EnumFieldValue::Null)
        })
    }
}

impl<R> fmt::Debug for SpecColumn<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecColumn")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("comment", &self.comment)
            .field("template_value", &self.template_value)
            .finish_non_exhaustive()
    }
}

/// Ordered, validated column list for one export.
#[derive(Debug)]
pub struct SpecExportSchema<R> {
    columns: Vec<SpecColumn<R>>,
}

impl<R> SpecExportSchema<R> {
    /// Start an empty schema builder.
    pub fn builder() -> SpecExportSchemaBuilder<R> {
        SpecExportSchemaBuilder {
            columns: Vec::new(),
        }
    }

    /// Columns in output order.
    pub fn columns(&self) -> &[SpecColumn<R>] {
        &self.columns
    }

    /// Column count.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false for a built schema.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Header texts in output order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.name.clone()).collect()
    }
}

/// Builder for [`SpecExportSchema`].
pub struct SpecExportSchemaBuilder<R> {
    columns: Vec<SpecColumn<R>>,
}

impl<R> SpecExportSchemaBuilder<R> {
    /// Append one column.
    pub fn column(mut self, column: SpecColumn<R>) -> Self {
        self.columns.push(column);
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> Result<SpecExportSchema<R>, ExportError> {
        if self.columns.is_empty() {
            return Err(ExportError::MalformedSchema(
                "Schema must have >= 1 column.".to_string(),
            ));
        }
        if self.columns.len() > N_NCOLS_EXCEL_MAX {
            return Err(ExportError::MalformedSchema(format!(
                "Schema has {} columns; Excel allows at most {N_NCOLS_EXCEL_MAX}.",
                self.columns.len()
            )));
        }

        let l_colnames: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        validate_unique_columns(&l_colnames).map_err(ExportError::MalformedSchema)?;

        for col in &self.columns {
            if let Some(n_scale) = col.format.decimal_scale
                && n_scale > N_DECIMAL_SCALE_MAX
            {
                return Err(ExportError::MalformedSchema(format!(
                    "Column {:?}: decimal scale {n_scale} exceeds {N_DECIMAL_SCALE_MAX}.",
                    col.name
                )));
            }
            if let Some(c_pattern) = &col.format.date_pattern {
                convert_date_pattern_to_strftime(c_pattern).map_err(|msg| {
                    ExportError::MalformedSchema(format!("Column {:?}: {msg}", col.name))
                })?;
            }
        }

        Ok(SpecExportSchema {
            columns: self.columns,
        })
    }
}

/// Validate that `columns` has no duplicated names.
pub fn validate_unique_columns(columns: &[String]) -> Result<(), String> {
    if columns.len() == columns.iter().collect::<BTreeSet<_>>().len() {
        return Ok(());
    }

    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, c_name) in columns.iter().enumerate() {
        dict_pos.entry(c_name).or_default().push(n_idx);
    }

    let c_msg = dict_pos
        .iter()
        .filter(|(_, l_pos)| l_pos.len() > 1)
        .map(|(c_name, l_pos)| format!("{c_name:?} x{} at indices {:?}", l_pos.len(), l_pos))
        .collect::<Vec<_>>()
        .join("; ");

    Err(format!("Duplicate column names detected: {c_msg}"))
}

/// Zero-based cell coordinate, ordered row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecCellRef {
    /// Zero-based row.
    pub row: u32,
    /// Zero-based column.
    pub col: u32,
}

impl SpecCellRef {
    /// Create a coordinate.
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Column width fitting policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnWidthPolicy {
    /// Emit estimated widths.
    pub if_enabled: bool,
    /// Minimum final width.
    pub width_min: usize,
    /// Maximum final width.
    pub width_max: usize,
}

impl Default for SpecColumnWidthPolicy {
    fn default() -> Self {
        Self {
            if_enabled: true,
            width_min: N_WIDTH_CELL_MIN_DEFAULT,
            width_max: N_WIDTH_CELL_MAX_DEFAULT,
        }
    }
}

/// Replacement texts for non-finite floats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxValuePolicy {
    /// Replacement text for NaN.
    pub nan_str: String,
    /// Replacement text for positive infinity.
    pub posinf_str: String,
    /// Replacement text for negative infinity.
    pub neginf_str: String,
}

impl Default for SpecXlsxValuePolicy {
    fn default() -> Self {
        Self {
            nan_str: "NaN".to_string(),
            posinf_str: "Inf".to_string(),
            neginf_str: "-Inf".to_string(),
        }
    }
}

/// Export-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxExportOptions {
    /// Base sheet name; overflow sheets get `_1`, `_2`, ... suffixes.
    pub sheet_name: String,
    /// Rows requested per page; a shorter page ends the export.
    pub page_size: usize,
    /// Data rows per sheet, header excluded.
    pub row_capacity_per_sheet: usize,
    /// Column width fitting.
    pub policy_width: SpecColumnWidthPolicy,
    /// Non-finite float replacement texts.
    pub value_policy: SpecXlsxValuePolicy,
    /// Drop rows whose cells all look empty.
    pub if_suppress_empty_rows: bool,
    /// Freeze the header row of every sheet.
    pub if_freeze_header: bool,
}

impl Default for SpecXlsxExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: C_SHEET_NAME_DEFAULT.to_string(),
            page_size: N_PAGE_SIZE_DEFAULT,
            row_capacity_per_sheet: N_ROW_CAPACITY_PER_SHEET_MAX,
            policy_width: SpecColumnWidthPolicy::default(),
            value_policy: SpecXlsxValuePolicy::default(),
            if_suppress_empty_rows: true,
            if_freeze_header: true,
        }
    }
}

impl SpecXlsxExportOptions {
    /// Check option ranges.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.page_size == 0 {
            return Err(ExportError::InvalidOptions(
                "page_size must be >= 1.".to_string(),
            ));
        }
        if self.row_capacity_per_sheet == 0
            || self.row_capacity_per_sheet > N_ROW_CAPACITY_PER_SHEET_MAX
        {
            return Err(ExportError::InvalidOptions(format!(
                "row_capacity_per_sheet must be in [1, {N_ROW_CAPACITY_PER_SHEET_MAX}]."
            )));
        }
        if self.policy_width.width_min == 0 {
            return Err(ExportError::InvalidOptions(
                "policy_width.width_min must be >= 1.".to_string(),
            ));
        }
        if self.policy_width.width_max < self.policy_width.width_min
            || self.policy_width.width_max > N_WIDTH_CELL_MAX_EXCEL
        {
            return Err(ExportError::InvalidOptions(format!(
                "policy_width.width_max must be in [width_min, {N_WIDTH_CELL_MAX_EXCEL}]."
            )));
        }
        Ok(())
    }
}

/// CSV merge options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCsvMergeOptions {
    /// Glob matched against fragment file names.
    pub pattern_fragment: String,
    /// Delete work-dir files whose name does not contain the target name.
    pub if_delete_foreign: bool,
}

impl Default for SpecCsvMergeOptions {
    fn default() -> Self {
        Self {
            pattern_fragment: "*.csv".to_string(),
            if_delete_foreign: true,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// One emitted sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetReport {
    /// Sheet name in the workbook.
    pub sheet_name: String,
    /// Zero-based creation index.
    pub sheet_index: usize,
    /// Data rows written, header excluded.
    pub n_rows_data: usize,
}

/// Per-export report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxExportReport {
    /// Sheets in creation order.
    pub sheets: Vec<SpecSheetReport>,
    /// Page source invocations.
    pub n_pages_consumed: usize,
    /// Data rows written across all sheets.
    pub n_rows_written: usize,
    /// Rows dropped by empty-row suppression.
    pub n_rows_suppressed: usize,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxExportReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} sheets={} pages={} rows={} suppressed={} warnings={}",
            self.sheets.len(),
            self.n_pages_consumed,
            self.n_rows_written,
            self.n_rows_suppressed,
            self.warnings.len()
        )
    }
}

impl fmt::Display for SpecXlsxExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[XLSX]"))
    }
}

/// CSV merge counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportCsvMerge {
    /// Merged output file.
    pub path_file_out: PathBuf,
    /// Fragments appended to the output.
    pub cnt_fragments_merged: u64,
    /// Files removed from the work dir.
    pub cnt_deleted: u64,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl ReportCsvMerge {
    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} merged={} deleted={} warnings={}",
            self.cnt_fragments_merged,
            self.cnt_deleted,
            self.warnings.len()
        )
    }
}

impl fmt::Display for ReportCsvMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[CSV]"))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Export failure. Any error aborts the export; the partial package is invalid.
#[derive(Debug)]
pub enum ExportError {
    /// Schema rejected before any page was requested.
    MalformedSchema(String),
    /// Option values out of range.
    InvalidOptions(String),
    /// Page source returned an error.
    PageSourceFailure {
        /// 1-based page number passed to the source.
        page_no: u32,
        /// Error raised by the source.
        source: BoxError,
    },
    /// Field type without a formatting rule.
    UnsupportedValueType {
        /// Column header text.
        column: String,
        /// Runtime type of the field.
        type_name: String,
    },
    /// I/O or zip failure while streaming a part.
    ContainerWriteFailure(String),
    /// Exporter was already used.
    AlreadyFinished,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSchema(msg) => write!(f, "Malformed schema: {msg}"),
            Self::InvalidOptions(msg) => write!(f, "Invalid options: {msg}"),
            Self::PageSourceFailure { page_no, source } => {
                write!(f, "Page source failed on page {page_no}: {source}")
            }
            Self::UnsupportedValueType { column, type_name } => write!(
                f,
                "Column {column:?}: no formatting rule for value type {type_name:?}"
            ),
            Self::ContainerWriteFailure(msg) => write!(f, "xlsx write error: {msg}"),
            Self::AlreadyFinished => write!(f, "Export already finished."),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PageSourceFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::ContainerWriteFailure(err.to_string())
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ContainerWriteFailure(err.to_string())
    }
}

/// CSV merge failure.
#[derive(Debug)]
pub enum CsvMergeError {
    /// Invalid fragment pattern.
    InvalidPattern(String),
    /// Filesystem failure on `path`.
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error text.
        message: String,
    },
}

impl fmt::Display for CsvMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPattern(msg) => write!(f, "{msg}"),
            Self::Io { path, message } => {
                write!(f, "CSV merge failed at {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for CsvMergeError {}

impl From<CsvMergeError> for ExportError {
    fn from(err: CsvMergeError) -> Self {
        Self::ContainerWriteFailure(err.to_string())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn col_text(name: &str) -> SpecColumn<Vec<EnumFieldValue>> {
        SpecColumn::positional(name, 0)
    }

    #[test]
    fn test_schema_rejects_zero_columns() {
        let err = SpecExportSchema::<Vec<EnumFieldValue>>::builder()
            .build()
            .unwrap_err();
        assert!(matches!(err, ExportError::MalformedSchema(_)));
    }

    #[test]
    fn test_schema_rejects_duplicate_names_and_bad_patterns() {
        let err = SpecExportSchema::builder()
            .column(col_text("a"))
            .column(col_text("a"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate column names"));

        let err = SpecExportSchema::builder()
            .column(col_text("when").with_date_pattern("yyyy-QQ"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ExportError::MalformedSchema(_)));
    }

    #[test]
    fn test_cell_ref_orders_row_major() {
        let mut l_refs = vec![
            SpecCellRef::new(5, 0),
            SpecCellRef::new(2, 3),
            SpecCellRef::new(2, 1),
        ];
        l_refs.sort();
        assert_eq!(
            l_refs,
            vec![
                SpecCellRef::new(2, 1),
                SpecCellRef::new(2, 3),
                SpecCellRef::new(5, 0)
            ]
        );
    }

    #[test]
    fn test_is_empty_like_covers_sentinels() {
        assert!(EnumCellValue::Blank.is_empty_like());
        assert!(EnumCellValue::Empty.is_empty_like());
        assert!(EnumCellValue::Integer(0).is_empty_like());
        assert!(EnumCellValue::Decimal("0.00".to_string()).is_empty_like());
        assert!(EnumCellValue::Text("0.0".to_string()).is_empty_like());
        assert!(EnumCellValue::Text("  ".to_string()).is_empty_like());
        assert!(!EnumCellValue::Decimal("0.000".to_string()).is_empty_like());
        assert!(!EnumCellValue::Text("x".to_string()).is_empty_like());
        assert!(!EnumCellValue::Formula("0".to_string()).is_empty_like());
    }

    #[test]
    fn test_options_validate_ranges() {
        assert!(SpecXlsxExportOptions::default().validate().is_ok());

        let options = SpecXlsxExportOptions {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ExportError::InvalidOptions(_))
        ));

        let options = SpecXlsxExportOptions {
            policy_width: SpecColumnWidthPolicy {
                if_enabled: true,
                width_min: 10,
                width_max: 5,
            },
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_report_format() {
        let report = SpecXlsxExportReport {
            sheets: vec![SpecSheetReport {
                sheet_name: "Export".to_string(),
                sheet_index: 0,
                n_rows_data: 3,
            }],
            n_pages_consumed: 1,
            n_rows_written: 3,
            n_rows_suppressed: 1,
            warnings: vec![],
        };
        assert_eq!(
            report.to_string(),
            "[XLSX] sheets=1 pages=1 rows=3 suppressed=1 warnings=0"
        );
    }
}
