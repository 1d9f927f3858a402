//! XLSX constants and default option factories.

use crate::spec::{SpecCsvMergeOptions, SpecXlsxExportOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Largest decimal scale representable by [`rust_decimal::Decimal`].
pub const N_DECIMAL_SCALE_MAX: u32 = 28;

/// Base sheet name used when none is configured.
pub const C_SHEET_NAME_DEFAULT: &str = "Export";
/// Rows requested from the page source per call.
pub const N_PAGE_SIZE_DEFAULT: usize = 1_000;
/// Data rows per sheet; one row of the Excel limit is reserved for the header.
pub const N_ROW_CAPACITY_PER_SHEET_MAX: usize = N_NROWS_EXCEL_MAX - 1;
/// Lower clamp for estimated column widths.
pub const N_WIDTH_CELL_MIN_DEFAULT: usize = 8;
/// Upper clamp for estimated column widths.
pub const N_WIDTH_CELL_MAX_DEFAULT: usize = 60;
/// Excel's own ceiling for a column width.
pub const N_WIDTH_CELL_MAX_EXCEL: usize = 255;

/// Cell texts treated as "looks empty" by row suppression.
pub const TUP_ZERO_SENTINELS: [&str; 3] = ["0", "0.0", "0.00"];

/// Fill color of legacy comment boxes.
pub const C_COMMENT_FILL_COLOR: &str = "#ffffee";

pub const C_XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
pub const C_NS_SPREADSHEETML: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const C_NS_RELATIONSHIPS_DOC: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const C_NS_RELATIONSHIPS_PKG: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships";
pub const C_NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
pub const C_NS_SPREADSHEET_DRAWING: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";

pub const C_REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const C_REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub const C_REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const C_REL_TYPE_COMMENTS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
pub const C_REL_TYPE_VML_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
pub const C_REL_TYPE_DRAWING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";

pub const C_CONTENT_TYPE_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub const C_CONTENT_TYPE_XML: &str = "application/xml";
pub const C_CONTENT_TYPE_VML: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";
pub const C_CONTENT_TYPE_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub const C_CONTENT_TYPE_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub const C_CONTENT_TYPE_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub const C_CONTENT_TYPE_COMMENTS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
pub const C_CONTENT_TYPE_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";

/// Style index of header cells in `xl/styles.xml`.
pub const N_STYLE_IDX_HEADER: u32 = 1;

/// Build default export options.
pub fn derive_default_xlsx_export_options() -> SpecXlsxExportOptions {
    SpecXlsxExportOptions::default()
}

/// Build default CSV merge options.
pub fn derive_default_csv_merge_options() -> SpecCsvMergeOptions {
    SpecCsvMergeOptions::default()
}
