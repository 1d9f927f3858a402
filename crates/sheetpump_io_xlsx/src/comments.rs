//! Cell annotations and their package parts.
//!
//! Annotations become a comments part, a legacy VML part positioning one shape
//! per comment box, and an empty drawing placeholder.

use std::collections::BTreeMap;
use std::io;

use crate::conf::{C_COMMENT_FILL_COLOR, C_NS_SPREADSHEET_DRAWING, C_NS_SPREADSHEETML, C_XML_DECLARATION};
use crate::package::PartWrite;
use crate::spec::SpecCellRef;
use crate::util::convert_cell_ref_to_a1;

/// Cell annotations, emitted in ascending `(row, col)` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecAnnotationMap {
    dict_text_by_ref: BTreeMap<SpecCellRef, String>,
}

impl SpecAnnotationMap {
    /// Record `text` at `(row, col)`; a later call on the same cell replaces it.
    pub fn set(&mut self, row: u32, col: u32, text: impl Into<String>) {
        self.dict_text_by_ref
            .insert(SpecCellRef::new(row, col), text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.dict_text_by_ref.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dict_text_by_ref.len()
    }

    /// Annotations in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (&SpecCellRef, &String)> {
        self.dict_text_by_ref.iter()
    }

    /// Write `xl/comments1.xml`.
    pub fn write_comments<P: PartWrite + ?Sized>(&self, w: &mut P) -> io::Result<()> {
        w.append_raw(C_XML_DECLARATION)?;
        w.append_raw(&format!(r#"<comments xmlns="{C_NS_SPREADSHEETML}">"#))?;
        w.append_raw("<authors><author></author></authors><commentList>")?;
        for (cell_ref, c_text) in self.iter() {
            w.append_raw(&format!(
                r#"<comment ref="{}" authorId="0"><text><t xml:space="preserve">"#,
                convert_cell_ref_to_a1(cell_ref.row, cell_ref.col)
            ))?;
            w.append_escaped(c_text)?;
            w.append_raw("</t></text></comment>")?;
        }
        w.append_raw("</commentList></comments>")
    }

    /// Write `xl/drawings/vmlDrawing1.vml`, one hidden note shape per annotation.
    ///
    /// Shape ids run `s0`, `s1`, ... in emission order. Each box is anchored
    /// from `(col, row)` to `(col + 2, row + 2)`.
    pub fn write_vml_drawing<P: PartWrite + ?Sized>(&self, w: &mut P) -> io::Result<()> {
        w.append_raw(
            r#"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel">"#,
        )?;
        w.append_raw(
            r#"<o:shapelayout v:ext="edit"><o:idmap v:ext="edit" data="1"/></o:shapelayout>"#,
        )?;
        w.append_raw(
            r#"<v:shapetype id="c" coordsize="21600,21600" o:spt="202" path="m,l,21600r21600,l21600,xe"><v:stroke joinstyle="miter"/><v:path gradientshapeok="t" o:connecttype="rect"/></v:shapetype>"#,
        )?;

        for (n_shape_id, cell_ref) in self.dict_text_by_ref.keys().enumerate() {
            let (n_row, n_col) = (cell_ref.row, cell_ref.col);
            w.append_raw(&format!(
                r##"<v:shape id="s{n_shape_id}" type="#c" style="position:absolute;visibility:hidden" fillcolor="{C_COMMENT_FILL_COLOR}" o:insetmode="auto">"##
            ))?;
            w.append_raw(&format!(
                r#"<v:fill color2="{C_COMMENT_FILL_COLOR}"/><v:shadow on="t" obscured="t"/><v:path o:connecttype="none"/><v:textbox style="mso-direction-alt:auto"><div style="text-align:left"></div></v:textbox>"#
            ))?;
            w.append_raw(&format!(
                r#"<x:ClientData ObjectType="Note"><x:MoveWithCells/><x:SizeWithCells/><x:Anchor>{},0,{},0,{},0,{},0</x:Anchor><x:AutoFill>False</x:AutoFill><x:Row>{n_row}</x:Row><x:Column>{n_col}</x:Column></x:ClientData>"#,
                n_col,
                n_row,
                u64::from(n_col) + 2,
                u64::from(n_row) + 2,
            ))?;
            w.append_raw("</v:shape>")?;
        }

        w.append_raw("</xml>")
    }

    /// Write the empty `xl/drawings/drawing1.xml` placeholder.
    pub fn write_drawing<P: PartWrite + ?Sized>(&self, w: &mut P) -> io::Result<()> {
        w.append_raw(C_XML_DECLARATION)?;
        w.append_raw(&format!(r#"<xdr:wsDr xmlns:xdr="{C_NS_SPREADSHEET_DRAWING}"/>"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut v_out = Vec::new();
        f(&mut v_out).unwrap();
        String::from_utf8(v_out).unwrap()
    }

    #[test]
    fn test_comments_emit_in_row_major_order() {
        let mut annotations = SpecAnnotationMap::default();
        annotations.set(5, 0, "first");
        annotations.set(2, 3, "second");
        annotations.set(5, 0, "overwritten");
        assert_eq!(annotations.len(), 2);

        let c_xml = render(|w| annotations.write_comments(w));
        let n_pos_d3 = c_xml.find(r#"ref="D3""#).unwrap();
        let n_pos_a6 = c_xml.find(r#"ref="A6""#).unwrap();
        assert!(n_pos_d3 < n_pos_a6);
        assert!(c_xml.contains(">overwritten</t>"));
        assert!(!c_xml.contains("first"));
    }

    #[test]
    fn test_comment_text_is_escaped() {
        let mut annotations = SpecAnnotationMap::default();
        annotations.set(0, 0, "a < b & c");
        let c_xml = render(|w| annotations.write_comments(w));
        assert!(c_xml.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn test_vml_shapes_are_numbered_from_zero_and_anchored() {
        let mut annotations = SpecAnnotationMap::default();
        annotations.set(4, 1, "later");
        annotations.set(0, 2, "earlier");

        let c_vml = render(|w| annotations.write_vml_drawing(w));
        assert!(c_vml.contains(r#"id="s0""#));
        assert!(c_vml.contains(r#"id="s1""#));
        assert!(!c_vml.contains(r#"id="s2""#));
        assert!(c_vml.contains("<x:Anchor>2,0,0,0,4,0,2,0</x:Anchor>"));
        assert!(c_vml.contains("<x:Anchor>1,0,4,0,3,0,6,0</x:Anchor>"));

        let n_pos_first = c_vml.find("<x:Row>0</x:Row>").unwrap();
        let n_pos_second = c_vml.find("<x:Row>4</x:Row>").unwrap();
        assert!(n_pos_first < n_pos_second);
    }

    #[test]
    fn test_drawing_placeholder_is_empty() {
        let c_xml = render(|w| SpecAnnotationMap::default().write_drawing(w));
        assert!(c_xml.ends_with(&format!(r#"<xdr:wsDr xmlns:xdr="{C_NS_SPREADSHEET_DRAWING}"/>"#)));
    }
}
