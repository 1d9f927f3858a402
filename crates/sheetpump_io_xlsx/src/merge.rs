//! CSV side channel: per-page fragments merged into one file.
//!
//! Fragments are headerless CSV files in a work directory. The merge writes
//! `<name>.csv` with a header row, appends the fragments in file-name order
//! and removes work files whose name does not contain `<name>`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use globset::Glob;

use crate::mapper::CellValueMapper;
use crate::spec::{
    CsvMergeError, ExportError, ReportCsvMerge, SpecCsvMergeOptions, SpecExportSchema,
    SpecXlsxExportOptions,
};
use crate::writer::PageSource;

////////////////////////////////////////////////////////////////////////////////
// #region Merge

/// Merge CSV fragments of `dir_work` into `dir_work/<name_target>.csv`.
///
/// An existing target is replaced. Fragments are files matching
/// `options.pattern_fragment`, taken in ascending file-name order.
pub fn merge_csv_fragments(
    dir_work: &Path,
    name_target: &str,
    column_names: &[String],
    options: &SpecCsvMergeOptions,
) -> Result<ReportCsvMerge, CsvMergeError> {
    let matcher = Glob::new(&options.pattern_fragment)
        .map_err(|err| {
            CsvMergeError::InvalidPattern(format!(
                "Invalid fragment pattern {:?}: {err}",
                options.pattern_fragment
            ))
        })?
        .compile_matcher();

    let c_file_target = format!("{name_target}.csv");
    let path_file_out = dir_work.join(&c_file_target);
    let mut report = ReportCsvMerge {
        path_file_out: path_file_out.clone(),
        ..Default::default()
    };

    let mut l_entries = list_work_files(dir_work)?;
    l_entries.sort_by(|a, b| a.0.cmp(&b.0));

    if path_file_out.exists() {
        fs::remove_file(&path_file_out).map_err(|err| derive_io_error(&path_file_out, err))?;
    }
    let file_out = File::create(&path_file_out).map_err(|err| derive_io_error(&path_file_out, err))?;
    let mut writer_csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(BufWriter::new(file_out));
    writer_csv
        .write_record(column_names)
        .map_err(|err| CsvMergeError::Io {
            path: path_file_out.clone(),
            message: err.to_string(),
        })?;
    let mut writer_out = writer_csv.into_inner().map_err(|err| CsvMergeError::Io {
        path: path_file_out.clone(),
        message: err.to_string(),
    })?;

    for (c_name, path_entry) in &l_entries {
        if *c_name == c_file_target {
            continue;
        }
        if matcher.is_match(c_name) {
            let mut file_in = File::open(path_entry).map_err(|err| derive_io_error(path_entry, err))?;
            io::copy(&mut file_in, &mut writer_out).map_err(|err| derive_io_error(path_entry, err))?;
            report.cnt_fragments_merged += 1;
        }
        if options.if_delete_foreign && !c_name.contains(name_target) {
            match fs::remove_file(path_entry) {
                Ok(()) => report.cnt_deleted += 1,
                Err(err) => {
                    tracing::warn!(path = %path_entry.display(), error = %err, "failed to delete work file");
                    report
                        .warnings
                        .push(format!("Failed to delete {}: {err}", path_entry.display()));
                }
            }
        }
    }

    writer_out
        .flush()
        .map_err(|err| derive_io_error(&path_file_out, err))?;
    tracing::info!(
        path = %path_file_out.display(),
        n_merged = report.cnt_fragments_merged,
        n_deleted = report.cnt_deleted,
        "csv fragments merged"
    );
    Ok(report)
}

fn list_work_files(dir_work: &Path) -> Result<Vec<(String, PathBuf)>, CsvMergeError> {
    let mut l_entries = Vec::new();
    let iter_dir = fs::read_dir(dir_work).map_err(|err| derive_io_error(dir_work, err))?;
    for entry in iter_dir {
        let entry = entry.map_err(|err| derive_io_error(dir_work, err))?;
        let path_entry = entry.path();
        if !path_entry.is_file() {
            continue;
        }
        let c_name = entry.file_name().to_string_lossy().to_string();
        l_entries.push((c_name, path_entry));
    }
    Ok(l_entries)
}

fn derive_io_error(path: &Path, err: io::Error) -> CsvMergeError {
    CsvMergeError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Fragments

/// Write one headerless CSV fragment.
pub fn write_csv_fragment(path_file: &Path, rows: &[Vec<String>]) -> Result<(), CsvMergeError> {
    let file = File::create(path_file).map_err(|err| derive_io_error(path_file, err))?;
    let mut writer_csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(BufWriter::new(file));
    for row in rows {
        writer_csv.write_record(row).map_err(|err| CsvMergeError::Io {
            path: path_file.to_path_buf(),
            message: err.to_string(),
        })?;
    }
    writer_csv
        .flush()
        .map_err(|err| derive_io_error(path_file, err))
}

/// Export `page_source` as CSV: one fragment per page, then merge.
///
/// Fragments are named `part-000001.csv`, ... and removed by the merge unless
/// their name contains `name_target`. Paging, empty-row suppression and value
/// mapping follow the XLSX export; there are no sheets.
pub fn export_csv<R, S>(
    dir_work: &Path,
    name_target: &str,
    schema: &SpecExportSchema<R>,
    options: &SpecXlsxExportOptions,
    mut page_source: S,
) -> Result<ReportCsvMerge, ExportError>
where
    S: PageSource<R>,
{
    options.validate()?;
    fs::create_dir_all(dir_work)?;
    let mut mapper = CellValueMapper::new(options.value_policy.clone());

    let mut n_page_no: u32 = 1;
    loop {
        let l_rows = page_source
            .fetch_page(n_page_no)
            .map_err(|source| ExportError::PageSourceFailure {
                page_no: n_page_no,
                source,
            })?
            .unwrap_or_default();
        if l_rows.is_empty() {
            break;
        }

        let mut l_records = Vec::with_capacity(l_rows.len());
        for row in &l_rows {
            let l_cells = schema
                .columns()
                .iter()
                .map(|column| mapper.map_row_field(column, row))
                .collect::<Result<Vec<_>, _>>()?;
            if options.if_suppress_empty_rows && l_cells.iter().all(|cell| cell.is_empty_like()) {
                continue;
            }
            l_records.push(
                l_cells
                    .iter()
                    .map(|cell| cell.display_text().into_owned())
                    .collect::<Vec<_>>(),
            );
        }
        let path_fragment = dir_work.join(format!("part-{n_page_no:06}.csv"));
        write_csv_fragment(&path_fragment, &l_records)?;
        tracing::debug!(page_no = n_page_no, n_rows = l_records.len(), "csv fragment written");

        if l_rows.len() < options.page_size {
            break;
        }
        n_page_no = n_page_no.checked_add(1).ok_or_else(|| {
            ExportError::InvalidOptions("Page number overflowed u32.".to_string())
        })?;
    }

    Ok(merge_csv_fragments(
        dir_work,
        name_target,
        &schema.column_names(),
        &SpecCsvMergeOptions::default(),
    )?)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{BoxError, EnumFieldValue, SpecColumn};

    fn names(l: &[&str]) -> Vec<String> {
        l.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_merge_orders_fragments_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path_dir = dir.path();
        fs::write(path_dir.join("b.csv"), "3,c\r\n").unwrap();
        fs::write(path_dir.join("a.csv"), "1,a\r\n2,b\r\n").unwrap();
        fs::write(path_dir.join("report_keep.csv"), "4,d\r\n").unwrap();
        fs::write(path_dir.join("notes.txt"), "ignored").unwrap();
        fs::write(path_dir.join("report.csv"), "stale").unwrap();

        let report = merge_csv_fragments(
            path_dir,
            "report",
            &names(&["id", "name"]),
            &SpecCsvMergeOptions::default(),
        )
        .unwrap();

        let c_out = fs::read_to_string(path_dir.join("report.csv")).unwrap();
        assert_eq!(c_out, "id,name\r\n1,a\r\n2,b\r\n3,c\r\n4,d\r\n");
        assert_eq!(report.cnt_fragments_merged, 3);
        assert_eq!(report.cnt_deleted, 3);
        assert!(!path_dir.join("a.csv").exists());
        assert!(!path_dir.join("notes.txt").exists());
        assert!(path_dir.join("report_keep.csv").exists());
        assert_eq!(report.to_string(), "[CSV] merged=3 deleted=3 warnings=0");
    }

    #[test]
    fn test_merge_keeps_foreign_files_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.csv"), "1\r\n").unwrap();
        let options = SpecCsvMergeOptions {
            if_delete_foreign: false,
            ..Default::default()
        };
        let report = merge_csv_fragments(dir.path(), "out", &names(&["n"]), &options).unwrap();
        assert_eq!(report.cnt_deleted, 0);
        assert!(dir.path().join("x.csv").exists());
    }

    #[test]
    fn test_merge_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let options = SpecCsvMergeOptions {
            pattern_fragment: "[".to_string(),
            ..Default::default()
        };
        let err = merge_csv_fragments(dir.path(), "out", &names(&["n"]), &options).unwrap_err();
        assert!(matches!(err, CsvMergeError::InvalidPattern(_)));
    }

    #[test]
    fn test_header_is_quoted_like_excel_csv() {
        let dir = tempfile::tempdir().unwrap();
        merge_csv_fragments(
            dir.path(),
            "out",
            &names(&["a,b", "say \"hi\""]),
            &SpecCsvMergeOptions::default(),
        )
        .unwrap();
        let c_out = fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(c_out, "\"a,b\",\"say \"\"hi\"\"\"\r\n");
    }

    #[test]
    fn test_export_csv_pages_into_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let schema = SpecExportSchema::builder()
            .column(SpecColumn::positional("id", 0))
            .column(SpecColumn::positional("name", 1))
            .build()
            .unwrap();
        let options = SpecXlsxExportOptions {
            page_size: 2,
            ..Default::default()
        };
        let page_source = |page_no: u32| -> Result<Option<Vec<Vec<EnumFieldValue>>>, BoxError> {
            Ok(Some(match page_no {
                1 => vec![
                    vec![1.into(), "a".into()],
                    vec![EnumFieldValue::Null, EnumFieldValue::Null],
                ],
                _ => vec![vec![3.into(), "c".into()]],
            }))
        };

        let report = export_csv(dir.path(), "people", &schema, &options, page_source).unwrap();
        assert_eq!(report.cnt_fragments_merged, 2);
        let c_out = fs::read_to_string(dir.path().join("people.csv")).unwrap();
        assert_eq!(c_out, "id,name\r\n1,a\r\n3,c\r\n");
        assert!(!dir.path().join("part-000001.csv").exists());
    }
}
