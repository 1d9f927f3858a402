//! Sheet overflow controller.
//!
//! Places rows into the active sheet, starting a new sheet with a fresh
//! header whenever the active one holds `row_capacity_per_sheet` data rows.
//! The most recently placed row stays pending until the next placement (or
//! the sheet closes) so the driver can retract it.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::comments::SpecAnnotationMap;
use crate::conf::N_STYLE_IDX_HEADER;
use crate::package::{PartWrite, SpecWorksheetPart, XlsxPackage, derive_col_letters};
use crate::spec::{
    EnumCellValue, ExportError, SpecColumnWidthPolicy, SpecSheetReport, SpecXlsxExportOptions,
};
use crate::util::{derive_sheet_name, escape_xml_text, sanitize_sheet_name};
use crate::width::ColumnWidthTracker;

////////////////////////////////////////////////////////////////////////////////
// #region SheetState

struct SpecSheetState {
    sheet_index: usize,
    sheet_name: String,
    n_rows_data: usize,
    tracker: ColumnWidthTracker,
    spool: BufWriter<File>,
    buf_row_pending: Option<String>,
}

enum EnumSheetState {
    NoSheet,
    Writing(SpecSheetState),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Controller

/// Row placement state machine over one package.
pub struct SheetController<W: Write + Seek> {
    package: XlsxPackage<W>,
    c_sheet_name_base: String,
    l_header: Vec<String>,
    l_col_letters: Vec<String>,
    n_row_capacity: usize,
    policy_width: SpecColumnWidthPolicy,
    if_freeze_header: bool,
    if_first_sheet_annotated: bool,
    state: EnumSheetState,
    l_sheet_reports: Vec<SpecSheetReport>,
}

impl<W: Write + Seek> SheetController<W> {
    /// Create a controller; no sheet is opened until the first row or `finish`.
    ///
    /// `if_first_sheet_annotated` links the first sheet to the comment parts.
    pub fn new(
        package: XlsxPackage<W>,
        options: &SpecXlsxExportOptions,
        l_header: Vec<String>,
        if_first_sheet_annotated: bool,
    ) -> Self {
        let l_col_letters = derive_col_letters(l_header.len());
        Self {
            package,
            c_sheet_name_base: sanitize_sheet_name(&options.sheet_name, "_"),
            l_header,
            l_col_letters,
            n_row_capacity: options.row_capacity_per_sheet,
            policy_width: options.policy_width.clone(),
            if_freeze_header: options.if_freeze_header,
            if_first_sheet_annotated,
            state: EnumSheetState::NoSheet,
            l_sheet_reports: Vec::new(),
        }
    }

    /// Place one data row; returns its zero-based row index within its sheet.
    ///
    /// Rollover happens before the row is placed, so a row that is retracted
    /// right after can leave the last sheet with only its header.
    pub fn place_row(&mut self, cells: &[EnumCellValue]) -> Result<u32, ExportError> {
        if cells.len() != self.l_header.len() {
            return Err(ExportError::ContainerWriteFailure(format!(
                "Row has {} cells; expected {}.",
                cells.len(),
                self.l_header.len()
            )));
        }

        if matches!(self.state, EnumSheetState::NoSheet) {
            self.open_sheet(0)?;
        } else if self.current_row_count() >= self.n_row_capacity {
            let n_sheet_index_next = self.close_sheet()? + 1;
            self.open_sheet(n_sheet_index_next)?;
        }

        let EnumSheetState::Writing(sheet) = &mut self.state else {
            return Err(ExportError::AlreadyFinished);
        };
        commit_pending_row(sheet)?;

        let n_row_idx = sheet.n_rows_data + 1;
        let c_row = render_row(&self.l_col_letters, n_row_idx, cells, None);
        sheet.buf_row_pending = Some(c_row);
        sheet.n_rows_data += 1;

        u32::try_from(n_row_idx).map_err(|_| {
            ExportError::ContainerWriteFailure(format!("Row index {n_row_idx} overflows u32."))
        })
    }

    /// Drop the row placed last, if it is still pending.
    pub fn retract_last_row(&mut self) -> bool {
        let EnumSheetState::Writing(sheet) = &mut self.state else {
            return false;
        };
        if sheet.buf_row_pending.take().is_none() {
            return false;
        }
        sheet.n_rows_data -= 1;
        true
    }

    /// Feed a cell's text to the active sheet's width estimator.
    pub fn observe_width(&mut self, idx_col: usize, text: &str) {
        if let EnumSheetState::Writing(sheet) = &mut self.state {
            sheet.tracker.observe(idx_col, text);
        }
    }

    /// Name of the active sheet.
    pub fn current_sheet_name(&self) -> Option<&str> {
        match &self.state {
            EnumSheetState::Writing(sheet) => Some(sheet.sheet_name.as_str()),
            EnumSheetState::NoSheet => None,
        }
    }

    /// Data rows placed on the active sheet, header excluded.
    pub fn current_row_count(&self) -> usize {
        match &self.state {
            EnumSheetState::Writing(sheet) => sheet.n_rows_data,
            EnumSheetState::NoSheet => 0,
        }
    }

    /// Close the last sheet and the package.
    ///
    /// With no row ever placed, a header-only first sheet is written.
    pub fn finish(
        mut self,
        annotations: &SpecAnnotationMap,
    ) -> Result<(W, Vec<SpecSheetReport>), ExportError> {
        if matches!(self.state, EnumSheetState::NoSheet) {
            self.open_sheet(0)?;
        }
        self.close_sheet()?;
        let sink = self.package.finish(annotations)?;
        Ok((sink, self.l_sheet_reports))
    }

    fn open_sheet(&mut self, sheet_index: usize) -> Result<(), ExportError> {
        let sheet_name = derive_sheet_name(&self.c_sheet_name_base, sheet_index);
        let mut tracker = ColumnWidthTracker::new(&self.policy_width);
        for (n_idx_col, c_name) in self.l_header.iter().enumerate() {
            tracker.observe(n_idx_col, c_name);
        }

        let mut spool = BufWriter::new(tempfile::tempfile()?);
        let l_cells_header: Vec<EnumCellValue> = self
            .l_header
            .iter()
            .map(|c_name| EnumCellValue::Text(c_name.clone()))
            .collect();
        spool.append_raw(&render_row(
            &self.l_col_letters,
            0,
            &l_cells_header,
            Some(N_STYLE_IDX_HEADER),
        ))?;

        if sheet_index > 0 {
            tracing::info!(sheet_name = %sheet_name, sheet_index, "sheet rollover");
        } else {
            tracing::debug!(sheet_name = %sheet_name, "sheet opened");
        }

        self.state = EnumSheetState::Writing(SpecSheetState {
            sheet_index,
            sheet_name,
            n_rows_data: 0,
            tracker,
            spool,
            buf_row_pending: None,
        });
        Ok(())
    }

    /// Flush the active sheet into the package; returns its index.
    fn close_sheet(&mut self) -> Result<usize, ExportError> {
        let EnumSheetState::Writing(mut sheet) =
            std::mem::replace(&mut self.state, EnumSheetState::NoSheet)
        else {
            return Err(ExportError::AlreadyFinished);
        };
        commit_pending_row(&mut sheet)?;

        let part = SpecWorksheetPart {
            sheet_name: sheet.sheet_name.clone(),
            n_cols: self.l_header.len(),
            n_rows_total: sheet.n_rows_data + 1,
            widths_by_col: sheet.tracker.take_widths(),
            if_freeze_header: self.if_freeze_header,
        };
        let mut file_spool = sheet.spool.into_inner().map_err(|err| err.into_error())?;
        file_spool.seek(SeekFrom::Start(0))?;

        let if_has_comments = self.if_first_sheet_annotated && sheet.sheet_index == 0;
        self.package
            .write_worksheet(&part, &mut file_spool, if_has_comments)?;

        self.l_sheet_reports.push(SpecSheetReport {
            sheet_name: sheet.sheet_name,
            sheet_index: sheet.sheet_index,
            n_rows_data: sheet.n_rows_data,
        });
        Ok(sheet.sheet_index)
    }
}

fn commit_pending_row(sheet: &mut SpecSheetState) -> Result<(), ExportError> {
    if let Some(c_row) = sheet.buf_row_pending.take() {
        sheet.spool.append_raw(&c_row)?;
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowMarkup

/// Render one `<row>` element; `n_row_idx` is zero-based.
pub fn render_row(
    l_col_letters: &[String],
    n_row_idx: usize,
    cells: &[EnumCellValue],
    style_idx: Option<u32>,
) -> String {
    let n_row_no = n_row_idx + 1;
    let mut c_row = format!(r#"<row r="{n_row_no}">"#);
    let c_style = style_idx.map(|n| format!(r#" s="{n}""#)).unwrap_or_default();

    for (c_letters, cell) in l_col_letters.iter().zip(cells) {
        let c_ref = format!("{c_letters}{n_row_no}");
        match cell {
            EnumCellValue::Blank => {
                c_row.push_str(&format!(r#"<c r="{c_ref}"{c_style}/>"#));
            }
            EnumCellValue::Empty => {
                c_row.push_str(&format!(
                    r#"<c r="{c_ref}"{c_style} t="inlineStr"><is><t></t></is></c>"#
                ));
            }
            EnumCellValue::Text(val)
            | EnumCellValue::Decimal(val)
            | EnumCellValue::DateTime(val) => {
                c_row.push_str(&format!(
                    r#"<c r="{c_ref}"{c_style} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    escape_xml_text(val)
                ));
            }
            EnumCellValue::Integer(val) => {
                c_row.push_str(&format!(r#"<c r="{c_ref}"{c_style}><v>{val}</v></c>"#));
            }
            EnumCellValue::Formula(val) => {
                c_row.push_str(&format!(
                    r#"<c r="{c_ref}"{c_style}><f>{}</f></c>"#,
                    escape_xml_text(val)
                ));
            }
        }
    }

    c_row.push_str("</row>");
    c_row
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    fn read_part(bytes: &[u8], path: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(path).unwrap();
        let mut c_text = String::new();
        file.read_to_string(&mut c_text).unwrap();
        c_text
    }

    fn controller(n_capacity: usize) -> SheetController<Cursor<Vec<u8>>> {
        let options = SpecXlsxExportOptions {
            row_capacity_per_sheet: n_capacity,
            ..Default::default()
        };
        SheetController::new(
            XlsxPackage::new(Cursor::new(Vec::new())),
            &options,
            vec!["id".to_string(), "name".to_string()],
            false,
        )
    }

    fn row(n_id: i64) -> Vec<EnumCellValue> {
        vec![
            EnumCellValue::Integer(n_id),
            EnumCellValue::Text(format!("n{n_id}")),
        ]
    }

    #[test]
    fn test_render_row_cell_kinds() {
        let l_letters = derive_col_letters(4);
        let c_row = render_row(
            &l_letters,
            1,
            &[
                EnumCellValue::Blank,
                EnumCellValue::Text("a&b".to_string()),
                EnumCellValue::Decimal("1.50".to_string()),
                EnumCellValue::Formula("SUM(A1:A2)".to_string()),
            ],
            None,
        );
        assert_eq!(
            c_row,
            concat!(
                r#"<row r="2"><c r="A2"/>"#,
                r#"<c r="B2" t="inlineStr"><is><t xml:space="preserve">a&amp;b</t></is></c>"#,
                r#"<c r="C2" t="inlineStr"><is><t xml:space="preserve">1.50</t></is></c>"#,
                r#"<c r="D2"><f>SUM(A1:A2)</f></c></row>"#
            )
        );
    }

    #[test]
    fn test_rollover_writes_fresh_header() {
        let mut ctrl = controller(2);
        for n_id in 0..5 {
            ctrl.place_row(&row(n_id)).unwrap();
            assert!(ctrl.current_row_count() <= 2);
        }
        assert_eq!(ctrl.current_sheet_name(), Some("Export_2"));

        let (sink, l_reports) = ctrl.finish(&SpecAnnotationMap::default()).unwrap();
        let l_rows: Vec<usize> = l_reports.iter().map(|r| r.n_rows_data).collect();
        assert_eq!(l_rows, vec![2, 2, 1]);

        let bytes = sink.into_inner();
        let c_sheet2 = read_part(&bytes, "xl/worksheets/sheet2.xml");
        assert!(c_sheet2.contains(r#"<row r="1"><c r="A1" s="1" t="inlineStr"><is><t xml:space="preserve">id</t>"#));
        assert!(c_sheet2.contains(r#"<row r="2"><c r="A2"><v>2</v></c>"#));
        assert!(c_sheet2.contains(r#"<row r="3"><c r="A3"><v>3</v></c>"#));
        assert!(!c_sheet2.contains(r#"<row r="4">"#));
    }

    #[test]
    fn test_retract_reuses_row_slot() {
        let mut ctrl = controller(10);
        ctrl.place_row(&row(1)).unwrap();
        assert_eq!(ctrl.place_row(&row(2)).unwrap(), 2);
        assert!(ctrl.retract_last_row());
        assert!(!ctrl.retract_last_row());
        assert_eq!(ctrl.place_row(&row(3)).unwrap(), 2);

        let (sink, l_reports) = ctrl.finish(&SpecAnnotationMap::default()).unwrap();
        assert_eq!(l_reports[0].n_rows_data, 2);
        let c_sheet = read_part(&sink.into_inner(), "xl/worksheets/sheet1.xml");
        assert!(!c_sheet.contains("n2"));
        assert!(c_sheet.contains("n3"));
    }

    #[test]
    fn test_retracted_overflow_row_leaves_header_only_sheet() {
        let mut ctrl = controller(1);
        ctrl.place_row(&row(1)).unwrap();
        ctrl.place_row(&row(2)).unwrap();
        assert_eq!(ctrl.current_sheet_name(), Some("Export_1"));
        assert!(ctrl.retract_last_row());

        let (sink, l_reports) = ctrl.finish(&SpecAnnotationMap::default()).unwrap();
        let l_rows: Vec<usize> = l_reports.iter().map(|r| r.n_rows_data).collect();
        assert_eq!(l_rows, vec![1, 0]);
        let c_sheet2 = read_part(&sink.into_inner(), "xl/worksheets/sheet2.xml");
        assert!(c_sheet2.contains(r#"<row r="1">"#));
        assert!(!c_sheet2.contains(r#"<row r="2">"#));
    }

    #[test]
    fn test_finish_without_rows_writes_header_only_sheet() {
        let ctrl = controller(10);
        let (sink, l_reports) = ctrl.finish(&SpecAnnotationMap::default()).unwrap();
        assert_eq!(l_reports.len(), 1);
        assert_eq!(l_reports[0].n_rows_data, 0);

        let c_sheet = read_part(&sink.into_inner(), "xl/worksheets/sheet1.xml");
        assert!(c_sheet.contains(r#"<dimension ref="A1:B1"/>"#));
        assert!(c_sheet.contains(r#"<row r="1">"#));
        assert!(!c_sheet.contains(r#"<row r="2">"#));
    }

    #[test]
    fn test_short_row_is_rejected() {
        let mut ctrl = controller(10);
        let err = ctrl.place_row(&[EnumCellValue::Blank]).unwrap_err();
        assert!(matches!(err, ExportError::ContainerWriteFailure(_)));
    }
}
