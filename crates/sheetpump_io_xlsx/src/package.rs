//! Streaming container writer: zip entries filled with XML text fragments.
//!
//! No document tree is ever built. Each part is written front to back into its
//! zip entry; worksheet rows arrive from a spool file so that `<cols>` can be
//! emitted ahead of `<sheetData>`.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::comments::SpecAnnotationMap;
use crate::conf::{
    C_CONTENT_TYPE_COMMENTS, C_CONTENT_TYPE_DRAWING, C_CONTENT_TYPE_RELS, C_CONTENT_TYPE_STYLES,
    C_CONTENT_TYPE_VML, C_CONTENT_TYPE_WORKBOOK, C_CONTENT_TYPE_WORKSHEET, C_CONTENT_TYPE_XML,
    C_NS_CONTENT_TYPES, C_NS_RELATIONSHIPS_DOC, C_NS_RELATIONSHIPS_PKG, C_NS_SPREADSHEETML,
    C_REL_TYPE_COMMENTS, C_REL_TYPE_DRAWING, C_REL_TYPE_OFFICE_DOCUMENT, C_REL_TYPE_STYLES,
    C_REL_TYPE_VML_DRAWING, C_REL_TYPE_WORKSHEET, C_XML_DECLARATION,
};
use crate::spec::ExportError;
use crate::util::{convert_cell_ref_to_a1, convert_col_to_letters, escape_xml_text};

////////////////////////////////////////////////////////////////////////////////
// #region PartWriter

/// Text-fragment output for one package part.
pub trait PartWrite: Write {
    /// Append markup as-is.
    fn append_raw(&mut self, text: &str) -> io::Result<()> {
        self.write_all(text.as_bytes())
    }

    /// Append text with XML escaping.
    fn append_escaped(&mut self, text: &str) -> io::Result<()> {
        self.write_all(escape_xml_text(text).as_bytes())
    }
}

impl<W: Write + ?Sized> PartWrite for W {}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorksheetPart

/// Layout of one worksheet part, known once the sheet is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecWorksheetPart {
    /// Sheet name shown on the tab.
    pub sheet_name: String,
    /// Column count of every row.
    pub n_cols: usize,
    /// Rows written including the header.
    pub n_rows_total: usize,
    /// Column widths by zero-based index; empty means no `<cols>`.
    pub widths_by_col: BTreeMap<usize, usize>,
    /// Freeze the first row.
    pub if_freeze_header: bool,
}

#[derive(Debug, Clone)]
struct SpecPackageSheet {
    sheet_name: String,
    if_has_comments: bool,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Package

/// Zip-backed spreadsheet package.
pub struct XlsxPackage<W: Write + Seek> {
    zip: ZipWriter<W>,
    options_file: SimpleFileOptions,
    l_sheets: Vec<SpecPackageSheet>,
}

impl<W: Write + Seek> XlsxPackage<W> {
    /// Wrap `sink`; nothing is written until the first part starts.
    pub fn new(sink: W) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            options_file: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated),
            l_sheets: Vec::new(),
        }
    }

    /// Number of worksheet parts written so far.
    pub fn sheet_count(&self) -> usize {
        self.l_sheets.len()
    }

    /// Start a new zip entry at `path` and return its writer.
    pub fn start_part(&mut self, path: &str) -> Result<&mut ZipWriter<W>, ExportError> {
        self.zip.start_file(path, self.options_file)?;
        Ok(&mut self.zip)
    }

    /// Write the next worksheet part, copying row markup from `spool_rows`.
    ///
    /// A sheet with `if_has_comments` references the comment, VML and drawing
    /// parts written by [`Self::finish`].
    pub fn write_worksheet<S: Read>(
        &mut self,
        part: &SpecWorksheetPart,
        spool_rows: &mut S,
        if_has_comments: bool,
    ) -> Result<(), ExportError> {
        let n_sheet_no = self.l_sheets.len() + 1;
        let zip = self.start_part(&format!("xl/worksheets/sheet{n_sheet_no}.xml"))?;

        write_worksheet_head(zip, part, n_sheet_no == 1)?;
        io::copy(spool_rows, zip)?;
        zip.append_raw("</sheetData>")?;
        if if_has_comments {
            zip.append_raw(r#"<drawing r:id="rId3"/><legacyDrawing r:id="rId2"/>"#)?;
        }
        zip.append_raw("</worksheet>")?;

        self.l_sheets.push(SpecPackageSheet {
            sheet_name: part.sheet_name.clone(),
            if_has_comments,
        });
        Ok(())
    }

    /// Write shared parts and the manifest, then close the container.
    pub fn finish(mut self, annotations: &SpecAnnotationMap) -> Result<W, ExportError> {
        let l_sheets = std::mem::take(&mut self.l_sheets);
        let if_has_comments = !annotations.is_empty() && l_sheets.iter().any(|s| s.if_has_comments);

        write_styles(self.start_part("xl/styles.xml")?)?;
        write_workbook(self.start_part("xl/workbook.xml")?, &l_sheets)?;
        write_workbook_rels(self.start_part("xl/_rels/workbook.xml.rels")?, l_sheets.len())?;

        for (n_idx, sheet) in l_sheets.iter().enumerate() {
            if !(sheet.if_has_comments && if_has_comments) {
                continue;
            }
            let n_sheet_no = n_idx + 1;
            write_sheet_comment_rels(
                self.start_part(&format!("xl/worksheets/_rels/sheet{n_sheet_no}.xml.rels"))?,
            )?;
        }
        if if_has_comments {
            annotations.write_comments(self.start_part("xl/comments1.xml")?)?;
            annotations.write_vml_drawing(self.start_part("xl/drawings/vmlDrawing1.vml")?)?;
            annotations.write_drawing(self.start_part("xl/drawings/drawing1.xml")?)?;
        }

        write_content_types(
            self.start_part("[Content_Types].xml")?,
            l_sheets.len(),
            if_has_comments,
        )?;
        write_root_rels(self.start_part("_rels/.rels")?)?;

        Ok(self.zip.finish()?)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PartEncoders

fn write_worksheet_head<P: PartWrite + ?Sized>(
    w: &mut P,
    part: &SpecWorksheetPart,
    if_tab_selected: bool,
) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(
        r#"<worksheet xmlns="{C_NS_SPREADSHEETML}" xmlns:r="{C_NS_RELATIONSHIPS_DOC}">"#
    ))?;

    let n_row_last = u32::try_from(part.n_rows_total.max(1) - 1).unwrap_or(u32::MAX);
    let n_col_last = u32::try_from(part.n_cols.max(1) - 1).unwrap_or(u32::MAX);
    w.append_raw(&format!(
        r#"<dimension ref="A1:{}"/>"#,
        convert_cell_ref_to_a1(n_row_last, n_col_last)
    ))?;

    w.append_raw(r#"<sheetViews><sheetView workbookViewId="0""#)?;
    if if_tab_selected {
        w.append_raw(r#" tabSelected="1""#)?;
    }
    if part.if_freeze_header {
        w.append_raw(
            r#"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/><selection pane="bottomLeft" activeCell="A2" sqref="A2"/></sheetView></sheetViews>"#,
        )?;
    } else {
        w.append_raw("/></sheetViews>")?;
    }
    w.append_raw(r#"<sheetFormatPr defaultRowHeight="15"/>"#)?;

    if !part.widths_by_col.is_empty() {
        w.append_raw("<cols>")?;
        for (n_idx_col, n_width) in &part.widths_by_col {
            let n_col_no = n_idx_col + 1;
            w.append_raw(&format!(
                r#"<col min="{n_col_no}" max="{n_col_no}" width="{n_width}" customWidth="1"/>"#
            ))?;
        }
        w.append_raw("</cols>")?;
    }

    w.append_raw("<sheetData>")
}

fn write_styles<P: PartWrite + ?Sized>(w: &mut P) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(r#"<styleSheet xmlns="{C_NS_SPREADSHEETML}">"#))?;
    w.append_raw(
        r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font><font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>"#,
    )?;
    w.append_raw(
        r#"<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFD9D9D9"/><bgColor indexed="64"/></patternFill></fill></fills>"#,
    )?;
    w.append_raw(
        r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    )?;
    w.append_raw(
        r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    )?;
    w.append_raw(
        r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="49" fontId="1" fillId="2" borderId="0" xfId="0" applyNumberFormat="1" applyFont="1" applyFill="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf></cellXfs>"#,
    )?;
    w.append_raw(
        r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    )?;
    w.append_raw("</styleSheet>")
}

fn write_workbook<P: PartWrite + ?Sized>(w: &mut P, l_sheets: &[SpecPackageSheet]) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(
        r#"<workbook xmlns="{C_NS_SPREADSHEETML}" xmlns:r="{C_NS_RELATIONSHIPS_DOC}">"#
    ))?;
    w.append_raw(r#"<bookViews><workbookView/></bookViews><sheets>"#)?;
    for (n_idx, sheet) in l_sheets.iter().enumerate() {
        let n_sheet_no = n_idx + 1;
        w.append_raw(r#"<sheet name=""#)?;
        w.append_escaped(&sheet.sheet_name)?;
        w.append_raw(&format!(
            r#"" sheetId="{n_sheet_no}" r:id="rId{n_sheet_no}"/>"#
        ))?;
    }
    w.append_raw("</sheets></workbook>")
}

fn write_workbook_rels<P: PartWrite + ?Sized>(w: &mut P, n_sheets: usize) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(r#"<Relationships xmlns="{C_NS_RELATIONSHIPS_PKG}">"#))?;
    for n_sheet_no in 1..=n_sheets {
        w.append_raw(&format!(
            r#"<Relationship Id="rId{n_sheet_no}" Type="{C_REL_TYPE_WORKSHEET}" Target="worksheets/sheet{n_sheet_no}.xml"/>"#
        ))?;
    }
    w.append_raw(&format!(
        r#"<Relationship Id="rId{}" Type="{C_REL_TYPE_STYLES}" Target="styles.xml"/>"#,
        n_sheets + 1
    ))?;
    w.append_raw("</Relationships>")
}

fn write_sheet_comment_rels<P: PartWrite + ?Sized>(w: &mut P) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(r#"<Relationships xmlns="{C_NS_RELATIONSHIPS_PKG}">"#))?;
    w.append_raw(&format!(
        r#"<Relationship Id="rId1" Type="{C_REL_TYPE_COMMENTS}" Target="../comments1.xml"/>"#
    ))?;
    w.append_raw(&format!(
        r#"<Relationship Id="rId2" Type="{C_REL_TYPE_VML_DRAWING}" Target="../drawings/vmlDrawing1.vml"/>"#
    ))?;
    w.append_raw(&format!(
        r#"<Relationship Id="rId3" Type="{C_REL_TYPE_DRAWING}" Target="../drawings/drawing1.xml"/>"#
    ))?;
    w.append_raw("</Relationships>")
}

fn write_content_types<P: PartWrite + ?Sized>(
    w: &mut P,
    n_sheets: usize,
    if_has_comments: bool,
) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(r#"<Types xmlns="{C_NS_CONTENT_TYPES}">"#))?;
    w.append_raw(&format!(
        r#"<Default Extension="rels" ContentType="{C_CONTENT_TYPE_RELS}"/><Default Extension="xml" ContentType="{C_CONTENT_TYPE_XML}"/>"#
    ))?;
    if if_has_comments {
        w.append_raw(&format!(
            r#"<Default Extension="vml" ContentType="{C_CONTENT_TYPE_VML}"/>"#
        ))?;
    }
    w.append_raw(&format!(
        r#"<Override PartName="/xl/workbook.xml" ContentType="{C_CONTENT_TYPE_WORKBOOK}"/>"#
    ))?;
    for n_sheet_no in 1..=n_sheets {
        w.append_raw(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n_sheet_no}.xml" ContentType="{C_CONTENT_TYPE_WORKSHEET}"/>"#
        ))?;
    }
    w.append_raw(&format!(
        r#"<Override PartName="/xl/styles.xml" ContentType="{C_CONTENT_TYPE_STYLES}"/>"#
    ))?;
    if if_has_comments {
        w.append_raw(&format!(
            r#"<Override PartName="/xl/comments1.xml" ContentType="{C_CONTENT_TYPE_COMMENTS}"/>"#
        ))?;
        w.append_raw(&format!(
            r#"<Override PartName="/xl/drawings/drawing1.xml" ContentType="{C_CONTENT_TYPE_DRAWING}"/>"#
        ))?;
    }
    w.append_raw("</Types>")
}

fn write_root_rels<P: PartWrite + ?Sized>(w: &mut P) -> io::Result<()> {
    w.append_raw(C_XML_DECLARATION)?;
    w.append_raw(&format!(r#"<Relationships xmlns="{C_NS_RELATIONSHIPS_PKG}">"#))?;
    w.append_raw(&format!(
        r#"<Relationship Id="rId1" Type="{C_REL_TYPE_OFFICE_DOCUMENT}" Target="xl/workbook.xml"/>"#
    ))?;
    w.append_raw("</Relationships>")
}

/// Column letters for every index in `0..n_cols`, reused for every row.
pub fn derive_col_letters(n_cols: usize) -> Vec<String> {
    (0..n_cols)
        .map(|n_idx| convert_col_to_letters(u32::try_from(n_idx).unwrap_or(u32::MAX)))
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn read_part(bytes: &[u8], path: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(path).unwrap();
        let mut c_text = String::new();
        file.read_to_string(&mut c_text).unwrap();
        c_text
    }

    #[test]
    fn test_part_write_appends_raw_and_escaped() {
        let mut v_out: Vec<u8> = Vec::new();
        v_out.append_raw("<t>").unwrap();
        v_out.append_escaped("a&b").unwrap();
        v_out.append_raw("</t>").unwrap();
        assert_eq!(String::from_utf8(v_out).unwrap(), "<t>a&amp;b</t>");
    }

    #[test]
    fn test_package_writes_manifest_for_each_sheet() {
        let mut package = XlsxPackage::new(Cursor::new(Vec::new()));
        for c_name in ["Export", "Export_1"] {
            let part = SpecWorksheetPart {
                sheet_name: c_name.to_string(),
                n_cols: 2,
                n_rows_total: 1,
                widths_by_col: BTreeMap::from([(0, 9), (1, 12)]),
                if_freeze_header: true,
            };
            let mut spool = Cursor::new(b"<row r=\"1\"></row>".to_vec());
            package.write_worksheet(&part, &mut spool, false).unwrap();
        }
        assert_eq!(package.sheet_count(), 2);

        let bytes = package
            .finish(&SpecAnnotationMap::default())
            .unwrap()
            .into_inner();

        let c_workbook = read_part(&bytes, "xl/workbook.xml");
        assert!(c_workbook.contains(r#"<sheet name="Export" sheetId="1" r:id="rId1"/>"#));
        assert!(c_workbook.contains(r#"<sheet name="Export_1" sheetId="2" r:id="rId2"/>"#));

        let c_sheet = read_part(&bytes, "xl/worksheets/sheet2.xml");
        assert!(c_sheet.contains(r#"<col min="2" max="2" width="12" customWidth="1"/>"#));
        assert!(c_sheet.contains(r#"<sheetData><row r="1"></row></sheetData>"#));
        assert!(!c_sheet.contains("legacyDrawing"));

        let c_types = read_part(&bytes, "[Content_Types].xml");
        assert!(c_types.contains("/xl/worksheets/sheet2.xml"));
        assert!(!c_types.contains("comments1.xml"));

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert!(archive.by_name("xl/comments1.xml").is_err());
    }
}
