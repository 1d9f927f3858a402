//! Stateless helper utilities used by the export kernel.

use std::borrow::Cow;

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::SpecXlsxValuePolicy;

////////////////////////////////////////////////////////////////////////////////
// #region CoordinateUtils

/// Convert a zero-based column index to its letter name (`0 -> A`, `26 -> AA`).
pub fn convert_col_to_letters(col: u32) -> String {
    let mut v_letters = Vec::with_capacity(4);
    let mut n_rest = u64::from(col) + 1;
    while n_rest > 0 {
        let n_digit = (n_rest - 1) % 26;
        v_letters.push(b'A' + n_digit as u8);
        n_rest = (n_rest - 1) / 26;
    }
    v_letters.reverse();
    String::from_utf8(v_letters).unwrap_or_default()
}

/// Convert a zero-based `(row, col)` to an A1-style reference.
pub fn convert_cell_ref_to_a1(row: u32, col: u32) -> String {
    format!("{}{}", convert_col_to_letters(col), u64::from(row) + 1)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XmlEscaping

/// Escape text for XML content and attribute values.
///
/// Control characters that XML 1.0 cannot carry are dropped.
pub fn escape_xml_text(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|chr| {
        matches!(chr, '&' | '<' | '>' | '"' | '\'') || is_xml_illegal_char(chr)
    }) {
        return Cow::Borrowed(text);
    }

    let mut c_escaped = String::with_capacity(text.len() + 16);
    for chr in text.chars() {
        match chr {
            '&' => c_escaped.push_str("&amp;"),
            '<' => c_escaped.push_str("&lt;"),
            '>' => c_escaped.push_str("&gt;"),
            '"' => c_escaped.push_str("&quot;"),
            '\'' => c_escaped.push_str("&apos;"),
            _ if is_xml_illegal_char(chr) => {}
            _ => c_escaped.push(chr),
        }
    }
    Cow::Owned(c_escaped)
}

fn is_xml_illegal_char(chr: char) -> bool {
    (chr < '\u{20}' && !matches!(chr, '\t' | '\n' | '\r')) || matches!(chr, '\u{FFFE}' | '\u{FFFF}')
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Create suffixed sheet name (`base_1`, `base_2`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_sheet_name_suffix = format!("_{part_idx_1based}");
    let n_len_base_name_max = N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

/// Name of the sheet at zero-based creation index `sheet_index`.
pub fn derive_sheet_name(base_name: &str, sheet_index: usize) -> String {
    if sheet_index == 0 {
        base_name.to_string()
    } else {
        create_sheet_identifier(base_name, sheet_index)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ValueFormatting

/// Convert `NaN`/`Inf` to policy string; return error for finite values.
pub fn convert_nan_inf_to_str(
    x: f64,
    value_policy: &SpecXlsxValuePolicy,
) -> Result<String, String> {
    if x.is_nan() {
        return Ok(value_policy.nan_str.clone());
    }
    if x.is_infinite() {
        return Ok(if x.is_sign_positive() {
            value_policy.posinf_str.clone()
        } else {
            value_policy.neginf_str.clone()
        });
    }
    Err("Input is neither NaN nor Inf.".to_string())
}

/// Translate a `yyyy-MM-dd HH:mm:ss` style date pattern into a chrono format string.
///
/// Letters are grouped into runs; text in single quotes is literal and `''`
/// is a quote. Unknown pattern letters are rejected.
pub fn convert_date_pattern_to_strftime(pattern: &str) -> Result<String, String> {
    let v_chars: Vec<char> = pattern.chars().collect();
    let mut c_out = String::with_capacity(pattern.len() * 2);
    let mut n_idx = 0;

    while n_idx < v_chars.len() {
        let chr = v_chars[n_idx];

        if chr == '\'' {
            if v_chars.get(n_idx + 1) == Some(&'\'') {
                c_out.push('\'');
                n_idx += 2;
                continue;
            }
            let mut n_end = n_idx + 1;
            while n_end < v_chars.len() && v_chars[n_end] != '\'' {
                push_strftime_literal(&mut c_out, v_chars[n_end]);
                n_end += 1;
            }
            if n_end >= v_chars.len() {
                return Err(format!("Unterminated quote in date pattern {pattern:?}."));
            }
            n_idx = n_end + 1;
            continue;
        }

        if !chr.is_ascii_alphabetic() {
            push_strftime_literal(&mut c_out, chr);
            n_idx += 1;
            continue;
        }

        let mut n_run = 1;
        while n_idx + n_run < v_chars.len() && v_chars[n_idx + n_run] == chr {
            n_run += 1;
        }

        let c_spec = match (chr, n_run) {
            ('y', 2) => "%y",
            ('y', _) => "%Y",
            ('M', 1) => "%-m",
            ('M', 2) => "%m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 1) => "%-d",
            ('d', _) => "%d",
            ('H', 1) => "%-H",
            ('H', _) => "%H",
            ('h', 1) => "%-I",
            ('h', _) => "%I",
            ('m', 1) => "%-M",
            ('m', _) => "%M",
            ('s', 1) => "%-S",
            ('s', _) => "%S",
            ('S', 1..=3) => "%3f",
            ('S', 4..=6) => "%6f",
            ('S', _) => "%9f",
            ('a', _) => "%p",
            ('E', 1..=3) => "%a",
            ('E', _) => "%A",
            _ => {
                return Err(format!(
                    "Unsupported letter {chr:?} in date pattern {pattern:?}."
                ));
            }
        };
        c_out.push_str(c_spec);
        n_idx += n_run;
    }

    Ok(c_out)
}

fn push_strftime_literal(c_out: &mut String, chr: char) {
    if chr == '%' {
        c_out.push_str("%%");
    } else {
        c_out.push(chr);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Estimate display width of `text` from its UTF-8 and character lengths.
///
/// `bytes + ceil(((chars * 3 - bytes) / 2) * 0.1)`, with integer division
/// before the scale factor. Not clamped.
pub fn estimate_text_width(text: &str) -> usize {
    let n_bytes = text.len() as i64;
    let n_chars = text.chars().count() as i64;
    let n_adjust = (((n_chars * 3 - n_bytes) / 2) as f64 * 0.1).ceil() as i64;
    usize::try_from(n_bytes + n_adjust).unwrap_or(0)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_col_to_letters_handles_carry() {
        assert_eq!(convert_col_to_letters(0), "A");
        assert_eq!(convert_col_to_letters(25), "Z");
        assert_eq!(convert_col_to_letters(26), "AA");
        assert_eq!(convert_col_to_letters(51), "AZ");
        assert_eq!(convert_col_to_letters(52), "BA");
        assert_eq!(convert_col_to_letters(701), "ZZ");
        assert_eq!(convert_col_to_letters(702), "AAA");
        assert_eq!(convert_col_to_letters(16_383), "XFD");
    }

    #[test]
    fn test_convert_cell_ref_to_a1() {
        assert_eq!(convert_cell_ref_to_a1(0, 0), "A1");
        assert_eq!(convert_cell_ref_to_a1(4, 27), "AB5");
    }

    #[test]
    fn test_escape_xml_text() {
        assert!(matches!(escape_xml_text("plain"), Cow::Borrowed("plain")));
        assert_eq!(
            escape_xml_text(r#"a<b & "c" 'd'>"#),
            "a&lt;b &amp; &quot;c&quot; &apos;d&apos;&gt;"
        );
        assert_eq!(escape_xml_text("x\u{1}y\tz"), "xy\tz");
    }

    #[test]
    fn test_sheet_names_are_sanitized_and_suffixed() {
        assert_eq!(sanitize_sheet_name("a/b:c", "_"), "a_b_c");
        assert_eq!(sanitize_sheet_name("  ", "_"), "Sheet");
        assert_eq!(derive_sheet_name("Export", 0), "Export");
        assert_eq!(derive_sheet_name("Export", 2), "Export_2");

        let c_long = "x".repeat(40);
        let c_name = derive_sheet_name(&c_long, 12);
        assert_eq!(c_name.chars().count(), N_LEN_EXCEL_SHEET_NAME_MAX);
        assert!(c_name.ends_with("_12"));
    }

    #[test]
    fn test_convert_date_pattern_to_strftime() {
        assert_eq!(
            convert_date_pattern_to_strftime("yyyy-MM-dd HH:mm:ss").unwrap(),
            "%Y-%m-%d %H:%M:%S"
        );
        assert_eq!(
            convert_date_pattern_to_strftime("yyyy/MM/dd'T'HH:mm:ss.SSS").unwrap(),
            "%Y/%m/%dT%H:%M:%S.%3f"
        );
        assert_eq!(convert_date_pattern_to_strftime("d%''").unwrap(), "%-d%%'");
        assert!(convert_date_pattern_to_strftime("yyyy-QQ").is_err());
        assert!(convert_date_pattern_to_strftime("'open").is_err());
    }

    #[test]
    fn test_estimate_text_width() {
        assert_eq!(estimate_text_width(""), 0);
        assert_eq!(estimate_text_width("hello"), 6);
        assert_eq!(estimate_text_width("中文"), 6);
        assert!(estimate_text_width("中文") > "中文".chars().count());
    }

    #[test]
    fn test_convert_nan_inf_to_str() {
        let policy = SpecXlsxValuePolicy::default();
        assert_eq!(convert_nan_inf_to_str(f64::NAN, &policy).unwrap(), "NaN");
        assert_eq!(
            convert_nan_inf_to_str(f64::NEG_INFINITY, &policy).unwrap(),
            "-Inf"
        );
        assert!(convert_nan_inf_to_str(1.0, &policy).is_err());
    }
}
