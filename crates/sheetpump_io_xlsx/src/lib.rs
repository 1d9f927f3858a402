//! `sheetpump_io_xlsx` v1:
//! Streaming, paginated XLSX export kernel.
//!
//! Rows are pulled page by page from a caller-supplied source, mapped to
//! cells per column rules and streamed into a zip package, rolling over to
//! `<name>_1`, `<name>_2`, ... sheets at the configured row capacity.
//!
//! Modules:
//! - `conf`     : limits, defaults and package constants
//! - `spec`     : values/schema/options/reports/errors
//! - `util`     : pure helper functions
//! - `package`  : zip container and manifest parts
//! - `comments` : cell annotations and their parts
//! - `mapper`   : field to cell conversion
//! - `width`    : column width estimation
//! - `sheet`    : sheet overflow controller
//! - `writer`   : export driver
//! - `merge`    : CSV fragment merge
//! - `frame`    : polars `DataFrame` page source
pub mod comments;
pub mod conf;
pub mod frame;
pub mod mapper;
pub mod merge;
pub mod package;
pub mod sheet;
pub mod spec;
pub mod util;
pub mod width;
pub mod writer;

pub use comments::SpecAnnotationMap;
pub use conf::{
    C_SHEET_NAME_DEFAULT, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
    N_PAGE_SIZE_DEFAULT, N_ROW_CAPACITY_PER_SHEET_MAX, TUP_EXCEL_ILLEGAL,
};
pub use frame::{
    TypeFrameRow, derive_field_value_from_any_value, derive_page_source_from_dataframe,
    derive_rows_from_dataframe,
};
pub use mapper::CellValueMapper;
pub use merge::{export_csv, merge_csv_fragments, write_csv_fragment};
pub use spec::{
    BoxError, CsvMergeError, EnumCellKind, EnumCellValue, EnumFieldValue, EnumRoundingRule,
    ExportError, ReportCsvMerge, SpecCellRef, SpecColumn, SpecColumnFormat,
    SpecColumnWidthPolicy, SpecCsvMergeOptions, SpecExportSchema, SpecExportSchemaBuilder,
    SpecSheetReport, SpecXlsxExportOptions, SpecXlsxExportReport, SpecXlsxValuePolicy,
};
pub use util::{
    convert_cell_ref_to_a1, convert_col_to_letters, convert_date_pattern_to_strftime,
    convert_nan_inf_to_str, escape_xml_text, estimate_text_width, sanitize_sheet_name,
};
pub use width::ColumnWidthTracker;
pub use writer::{PageSource, XlsxExporter, XlsxFileSink, export_xlsx, export_xlsx_to_path};
