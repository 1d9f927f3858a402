//! Paginated XLSX export driver.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::comments::SpecAnnotationMap;
use crate::mapper::CellValueMapper;
use crate::package::XlsxPackage;
use crate::sheet::SheetController;
use crate::spec::{
    BoxError, EnumCellValue, ExportError, SpecExportSchema, SpecXlsxExportOptions,
    SpecXlsxExportReport,
};
use crate::util::convert_cell_ref_to_a1;

////////////////////////////////////////////////////////////////////////////////
// #region PageSource

/// Supplier of source rows, one page at a time.
///
/// Called with page numbers 1, 2, 3, ... in order. `Ok(None)` or an empty
/// page means no more data. A page shorter than the configured page size is
/// taken as the last one, so a source whose final page is exactly full is
/// asked once more and must then answer empty.
pub trait PageSource<R> {
    fn fetch_page(&mut self, page_no: u32) -> Result<Option<Vec<R>>, BoxError>;
}

impl<R, F, E> PageSource<R> for F
where
    F: FnMut(u32) -> Result<Option<Vec<R>>, E>,
    E: Into<BoxError>,
{
    fn fetch_page(&mut self, page_no: u32) -> Result<Option<Vec<R>>, BoxError> {
        self(page_no).map_err(Into::into)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Exporter

/// Single-use streaming exporter bound to an output sink.
///
/// The sink is handed back by [`Self::export`] or [`Self::export_template`];
/// any later call fails with [`ExportError::AlreadyFinished`].
pub struct XlsxExporter<W: Write + Seek> {
    sink: Option<W>,
    options: SpecXlsxExportOptions,
    annotations: SpecAnnotationMap,
}

impl<W: Write + Seek> XlsxExporter<W> {
    /// Create an exporter after validating `options`.
    pub fn new(sink: W, options: SpecXlsxExportOptions) -> Result<Self, ExportError> {
        options.validate()?;
        Ok(Self {
            sink: Some(sink),
            options,
            annotations: SpecAnnotationMap::default(),
        })
    }

    /// Export options in use.
    pub fn options(&self) -> &SpecXlsxExportOptions {
        &self.options
    }

    /// Attach a comment to zero-based `(row, col)` of the first sheet.
    ///
    /// Row 0 is the header row. Later calls on the same cell replace the text.
    pub fn annotate(&mut self, row: u32, col: u32, text: impl Into<String>) -> Result<(), ExportError> {
        if self.sink.is_none() {
            return Err(ExportError::AlreadyFinished);
        }
        self.annotations.set(row, col, text);
        Ok(())
    }

    /// Stream every page of `page_source` into the package and finalize it.
    pub fn export<R, S>(
        &mut self,
        schema: &SpecExportSchema<R>,
        mut page_source: S,
    ) -> Result<(W, SpecXlsxExportReport), ExportError>
    where
        S: PageSource<R>,
    {
        let sink = self.sink.take().ok_or(ExportError::AlreadyFinished)?;
        let annotations = self.derive_annotations(schema);
        let mut controller = SheetController::new(
            XlsxPackage::new(sink),
            &self.options,
            schema.column_names(),
            !annotations.is_empty(),
        );
        let mut mapper = CellValueMapper::new(self.options.value_policy.clone());
        let mut report = SpecXlsxExportReport::default();

        let n_page_size = self.options.page_size;
        let mut n_page_no: u32 = 1;
        loop {
            let l_rows = page_source
                .fetch_page(n_page_no)
                .map_err(|source| ExportError::PageSourceFailure {
                    page_no: n_page_no,
                    source,
                })?;
            report.n_pages_consumed += 1;

            let l_rows = l_rows.unwrap_or_default();
            if l_rows.is_empty() {
                tracing::info!(page_no = n_page_no, "empty page; export complete");
                break;
            }
            tracing::debug!(page_no = n_page_no, n_rows = l_rows.len(), "page fetched");

            for row in &l_rows {
                let l_cells = schema
                    .columns()
                    .iter()
                    .map(|column| mapper.map_row_field(column, row))
                    .collect::<Result<Vec<_>, _>>()?;
                self.place_data_row(&mut controller, &l_cells, &mut report)?;
            }

            if l_rows.len() < n_page_size {
                tracing::info!(
                    page_no = n_page_no,
                    n_rows = l_rows.len(),
                    page_size = n_page_size,
                    "short page; export complete"
                );
                break;
            }
            n_page_no = n_page_no.checked_add(1).ok_or_else(|| {
                ExportError::InvalidOptions("Page number overflowed u32.".to_string())
            })?;
        }

        let (sink, l_sheets) = controller.finish(&annotations)?;
        report.sheets = l_sheets;
        warn_annotations_outside_first_sheet(&annotations, &mut report);

        tracing::info!(
            n_sheets = report.sheets.len(),
            n_pages = report.n_pages_consumed,
            n_rows = report.n_rows_written,
            n_suppressed = report.n_rows_suppressed,
            "xlsx export finished"
        );
        Ok((sink, report))
    }

    /// Write a one-sheet template: the header plus one row of template values.
    ///
    /// Columns without a template value get a blank cell. The page source is
    /// not involved and rows are never suppressed.
    pub fn export_template<R>(
        &mut self,
        schema: &SpecExportSchema<R>,
    ) -> Result<(W, SpecXlsxExportReport), ExportError> {
        let sink = self.sink.take().ok_or(ExportError::AlreadyFinished)?;
        let annotations = self.derive_annotations(schema);
        let mut controller = SheetController::new(
            XlsxPackage::new(sink),
            &self.options,
            schema.column_names(),
            !annotations.is_empty(),
        );

        let l_cells: Vec<EnumCellValue> = schema
            .columns()
            .iter()
            .map(|column| match &column.template_value {
                Some(c_value) => EnumCellValue::Text(c_value.clone()),
                None => EnumCellValue::Blank,
            })
            .collect();
        controller.place_row(&l_cells)?;
        for (n_idx_col, cell) in l_cells.iter().enumerate() {
            controller.observe_width(n_idx_col, &cell.display_text());
        }

        let (sink, l_sheets) = controller.finish(&annotations)?;
        let report = SpecXlsxExportReport {
            sheets: l_sheets,
            n_rows_written: 1,
            ..Default::default()
        };
        tracing::info!(n_cols = schema.len(), "xlsx template written");
        Ok((sink, report))
    }

    fn place_data_row(
        &self,
        controller: &mut SheetController<W>,
        l_cells: &[EnumCellValue],
        report: &mut SpecXlsxExportReport,
    ) -> Result<(), ExportError> {
        let n_row_idx = controller.place_row(l_cells)?;
        for (n_idx_col, cell) in l_cells.iter().enumerate() {
            controller.observe_width(n_idx_col, &cell.display_text());
        }

        if self.options.if_suppress_empty_rows && l_cells.iter().all(EnumCellValue::is_empty_like) {
            controller.retract_last_row();
            report.n_rows_suppressed += 1;
            tracing::debug!(
                sheet_name = controller.current_sheet_name().unwrap_or_default(),
                row = n_row_idx,
                "empty row suppressed"
            );
        } else {
            report.n_rows_written += 1;
        }
        Ok(())
    }

    /// Caller annotations plus header comments declared on the schema.
    fn derive_annotations<R>(&self, schema: &SpecExportSchema<R>) -> SpecAnnotationMap {
        let mut annotations = SpecAnnotationMap::default();
        for (n_idx_col, column) in schema.columns().iter().enumerate() {
            if let Some(c_comment) = &column.comment {
                annotations.set(0, n_idx_col as u32, c_comment.clone());
            }
        }
        for (cell_ref, c_text) in self.annotations.iter() {
            annotations.set(cell_ref.row, cell_ref.col, c_text.clone());
        }
        annotations
    }
}

impl XlsxExporter<XlsxFileSink> {
    /// Create an exporter writing to `path_file_out` through an [`XlsxFileSink`].
    pub fn create(
        path_file_out: impl AsRef<Path>,
        options: SpecXlsxExportOptions,
    ) -> Result<Self, ExportError> {
        Self::new(XlsxFileSink::create(path_file_out)?, options)
    }
}

fn warn_annotations_outside_first_sheet(
    annotations: &SpecAnnotationMap,
    report: &mut SpecXlsxExportReport,
) {
    let Some(sheet_first) = report.sheets.first() else {
        return;
    };
    let n_row_last = sheet_first.n_rows_data;
    let l_outside: Vec<String> = annotations
        .iter()
        .filter(|(cell_ref, _)| cell_ref.row as usize > n_row_last)
        .map(|(cell_ref, _)| convert_cell_ref_to_a1(cell_ref.row, cell_ref.col))
        .collect();
    if !l_outside.is_empty() {
        report.warn(format!(
            "Comments outside the written rows of {:?}: {}",
            sheet_first.sheet_name,
            l_outside.join(", ")
        ));
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileSink

/// File output that appears at its target path only on [`Self::commit`].
///
/// Bytes go to a temp file in the target's directory. Dropping the sink
/// without committing removes the temp file and leaves the target path as
/// it was.
pub struct XlsxFileSink {
    writer: BufWriter<NamedTempFile>,
    path_file_out: PathBuf,
}

impl XlsxFileSink {
    /// Open a temp file next to `path_file_out`.
    pub fn create(path_file_out: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path_file_out = path_file_out.as_ref().to_path_buf();
        let dir_parent = match path_file_out.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_tmp = NamedTempFile::new_in(&dir_parent).map_err(|err| {
            ExportError::ContainerWriteFailure(format!(
                "Failed to create temp file in {}: {err}",
                dir_parent.display()
            ))
        })?;
        Ok(Self {
            writer: BufWriter::new(file_tmp),
            path_file_out,
        })
    }

    /// Target path.
    pub fn path(&self) -> &Path {
        &self.path_file_out
    }

    /// Flush and move the finished file to its target path, replacing any
    /// existing file there.
    pub fn commit(self) -> Result<PathBuf, ExportError> {
        let file_tmp = self.writer.into_inner().map_err(|err| err.into_error())?;
        file_tmp.persist(&self.path_file_out).map_err(|err| {
            ExportError::ContainerWriteFailure(format!(
                "Failed to persist {}: {}",
                self.path_file_out.display(),
                err.error
            ))
        })?;
        Ok(self.path_file_out)
    }
}

impl Write for XlsxFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for XlsxFileSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.writer.seek(pos)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Shortcuts

/// Export every page of `page_source` into `sink`.
pub fn export_xlsx<W, R, S>(
    sink: W,
    schema: &SpecExportSchema<R>,
    options: SpecXlsxExportOptions,
    page_source: S,
) -> Result<(W, SpecXlsxExportReport), ExportError>
where
    W: Write + Seek,
    S: PageSource<R>,
{
    XlsxExporter::new(sink, options)?.export(schema, page_source)
}

/// Export every page of `page_source` into a file at `path_file_out`.
///
/// The file appears only when the export succeeds.
pub fn export_xlsx_to_path<R, S>(
    path_file_out: impl AsRef<Path>,
    schema: &SpecExportSchema<R>,
    options: SpecXlsxExportOptions,
    page_source: S,
) -> Result<SpecXlsxExportReport, ExportError>
where
    S: PageSource<R>,
{
    let (sink, report) =
        XlsxExporter::create(path_file_out, options)?.export(schema, page_source)?;
    sink.commit()?;
    Ok(report)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
