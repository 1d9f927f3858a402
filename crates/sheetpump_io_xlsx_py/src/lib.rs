use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{StructArray, TryExtend};
use arrow::datatypes::{ArrowDataType, ArrowSchema, Field as ArrowField};
use arrow::record_batch::RecordBatchT;
use polars::prelude::DataFrame;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::ffi as pyffi;
use pyo3::prelude::*;
use pyo3::types::{PyAny, PyDict, PyList};
use sheetpump_io_xlsx::conf::{derive_default_csv_merge_options, derive_default_xlsx_export_options};
use sheetpump_io_xlsx::frame::{TypeFrameRow, derive_rows_from_dataframe};
use sheetpump_io_xlsx::spec::{
    EnumCellKind, EnumRoundingRule, ExportError, SpecColumn, SpecExportSchema,
    SpecXlsxExportOptions, SpecXlsxExportReport,
};
use sheetpump_io_xlsx::{XlsxExporter as RsXlsxExporter, XlsxFileSink, merge_csv_fragments};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "sheetpump.xlsx.exporter.v1";
const C_BRIDGE_TRANSPORT: &str = "arrow_c_data";
const C_ARROW_ARRAY_STREAM_CAPSULE_NAME: &[u8] = b"arrow_array_stream\0";

type TypeRsExporter = RsXlsxExporter<XlsxFileSink>;

#[pyclass(name = "XlsxExporter")]
struct PyXlsxExporter {
    #[pyo3(get)]
    file_out: String,
    inner: TypeRsExporter,
    report: Option<SpecXlsxExportReport>,
}

#[pymethods]
impl PyXlsxExporter {
    #[new]
    #[pyo3(signature = (file_out, export_options = None))]
    fn new(file_out: String, export_options: Option<&Bound<'_, PyAny>>) -> PyResult<Self> {
        let cfg_export_options = parse_spec_xlsx_export_options(export_options)?
            .unwrap_or_else(derive_default_xlsx_export_options);
        let inner = RsXlsxExporter::create(PathBuf::from(&file_out), cfg_export_options)
            .map_err(convert_export_error)?;
        Ok(Self {
            file_out,
            inner,
            report: None,
        })
    }

    /// Attach a comment to zero-based `(row, col)` of the first sheet.
    fn annotate(&mut self, row: u32, col: u32, text: String) -> PyResult<()> {
        self.inner
            .annotate(row, col, text)
            .map_err(convert_export_error)
    }

    /// Pull pages from `page_source(page_no)` until a short or empty page.
    ///
    /// `page_source` returns a DataFrame (or anything `polars.DataFrame`
    /// accepts) or `None`.
    fn export(
        &mut self,
        py: Python<'_>,
        columns: &Bound<'_, PyAny>,
        page_source: &Bound<'_, PyAny>,
    ) -> PyResult<Py<PyAny>> {
        let (schema, l_fields) = parse_export_schema(columns)?;
        let source = |page_no: u32| -> Result<Option<Vec<TypeFrameRow>>, PyErr> {
            let obj_page = page_source.call1((page_no,))?;
            if obj_page.is_none() {
                return Ok(None);
            }
            let df = derive_dataframe_from_any_dataframe(py, &obj_page)?;
            derive_rows_from_dataframe(&df, &l_fields)
                .map(Some)
                .map_err(PyValueError::new_err)
        };

        let (sink, report) = self
            .inner
            .export(&schema, source)
            .map_err(convert_export_error)?;
        sink.commit().map_err(convert_export_error)?;
        self.finish_with(py, report)
    }

    /// Write the header and one row of template values.
    fn export_template(&mut self, py: Python<'_>, columns: &Bound<'_, PyAny>) -> PyResult<Py<PyAny>> {
        let (schema, _) = parse_export_schema(columns)?;
        let (sink, report) = self
            .inner
            .export_template(&schema)
            .map_err(convert_export_error)?;
        sink.commit().map_err(convert_export_error)?;
        self.finish_with(py, report)
    }

    /// Report of the finished export, or `None` before export.
    fn report(&self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        self.report
            .as_ref()
            .map(|report| create_report_object(py, report))
            .transpose()
    }
}

impl PyXlsxExporter {
    fn finish_with(&mut self, py: Python<'_>, report: SpecXlsxExportReport) -> PyResult<Py<PyAny>> {
        let obj_report = create_report_object(py, &report)?;
        self.report = Some(report);
        Ok(obj_report)
    }
}

#[pyfunction]
#[pyo3(signature = (dir_work, name_target, column_names, pattern_fragment = None, if_delete_foreign = None))]
fn merge_csv(
    py: Python<'_>,
    dir_work: String,
    name_target: &str,
    column_names: Vec<String>,
    pattern_fragment: Option<String>,
    if_delete_foreign: Option<bool>,
) -> PyResult<Py<PyAny>> {
    let mut cfg_merge_options = derive_default_csv_merge_options();
    if let Some(v) = pattern_fragment {
        cfg_merge_options.pattern_fragment = v;
    }
    if let Some(v) = if_delete_foreign {
        cfg_merge_options.if_delete_foreign = v;
    }

    let report = merge_csv_fragments(
        Path::new(&dir_work),
        name_target,
        &column_names,
        &cfg_merge_options,
    )
    .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;

    let dict_report = PyDict::new(py);
    dict_report.set_item("file_out", report.path_file_out.to_string_lossy().to_string())?;
    dict_report.set_item("cnt_fragments_merged", report.cnt_fragments_merged)?;
    dict_report.set_item("cnt_deleted", report.cnt_deleted)?;
    dict_report.set_item("warnings", report.warnings)?;
    Ok(dict_report.into_any().unbind())
}

fn create_report_object(py: Python<'_>, report: &SpecXlsxExportReport) -> PyResult<Py<PyAny>> {
    let mut l_sheet_obj = Vec::with_capacity(report.sheets.len());
    for sheet in &report.sheets {
        let dict_sheet = PyDict::new(py);
        dict_sheet.set_item("sheet_name", sheet.sheet_name.clone())?;
        dict_sheet.set_item("sheet_index", sheet.sheet_index)?;
        dict_sheet.set_item("n_rows_data", sheet.n_rows_data)?;
        l_sheet_obj.push(dict_sheet);
    }

    let dict_report = PyDict::new(py);
    dict_report.set_item("sheets", PyList::new(py, l_sheet_obj)?)?;
    dict_report.set_item("n_pages_consumed", report.n_pages_consumed)?;
    dict_report.set_item("n_rows_written", report.n_rows_written)?;
    dict_report.set_item("n_rows_suppressed", report.n_rows_suppressed)?;
    dict_report.set_item("warnings", report.warnings.clone())?;
    Ok(dict_report.into_any().unbind())
}

fn convert_export_error(err: ExportError) -> PyErr {
    match err {
        ExportError::MalformedSchema(_) | ExportError::InvalidOptions(_) => {
            PyValueError::new_err(err.to_string())
        }
        ExportError::PageSourceFailure { page_no, source } => match source.downcast::<PyErr>() {
            Ok(py_err) => *py_err,
            Err(source) => {
                PyRuntimeError::new_err(format!("Page source failed on page {page_no}: {source}"))
            }
        },
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region SchemaParsing

/// Build the schema from a sequence of column names or column spec objects.
///
/// Returns the schema plus the DataFrame field each column reads.
fn parse_export_schema(
    columns: &Bound<'_, PyAny>,
) -> PyResult<(SpecExportSchema<TypeFrameRow>, Vec<String>)> {
    let mut builder = SpecExportSchema::builder();
    let mut l_fields = Vec::new();

    for (n_idx, obj_column) in columns.try_iter()?.enumerate() {
        let obj_column = obj_column?;
        if let Ok(c_name) = obj_column.extract::<String>() {
            builder = builder.column(SpecColumn::positional(c_name.clone(), n_idx));
            l_fields.push(c_name);
            continue;
        }

        let c_name = extract_optional_attr::<String>(&obj_column, "name")?.ok_or_else(|| {
            PyValueError::new_err(format!("Column #{n_idx} must be str or have a `name`."))
        })?;
        let c_field = extract_optional_attr::<String>(&obj_column, "field")?
            .unwrap_or_else(|| c_name.clone());

        let mut column = SpecColumn::positional(c_name, n_idx);
        if let Some(n_scale) = extract_optional_attr::<u32>(&obj_column, "decimal_scale")? {
            let rule_rounding = match extract_optional_attr::<String>(&obj_column, "rounding")? {
                Some(v) => parse_rule_rounding(&v)?,
                None => EnumRoundingRule::default(),
            };
            column = column.with_decimal(n_scale, rule_rounding);
        }
        if let Some(v) = extract_optional_attr::<String>(&obj_column, "date_pattern")? {
            column = column.with_date_pattern(v);
        }
        if let Some(v) = extract_optional_attr::<String>(&obj_column, "default_value")? {
            column = column.with_default_value(v);
        }
        if let Some(v) = extract_optional_attr::<String>(&obj_column, "cell_kind")? {
            column = column.with_cell_kind(parse_cell_kind(&v)?);
        }
        if let Some(v) = extract_optional_attr::<String>(&obj_column, "comment")? {
            column = column.with_comment(v);
        }
        if let Some(v) = extract_optional_attr::<String>(&obj_column, "template_value")? {
            column = column.with_template_value(v);
        }

        builder = builder.column(column);
        l_fields.push(c_field);
    }

    let schema = builder.build().map_err(convert_export_error)?;
    Ok((schema, l_fields))
}

fn parse_rule_rounding(value: &str) -> PyResult<EnumRoundingRule> {
    match value {
        "half_even" => Ok(EnumRoundingRule::HalfEven),
        "half_up" => Ok(EnumRoundingRule::HalfUp),
        "half_down" => Ok(EnumRoundingRule::HalfDown),
        "up" => Ok(EnumRoundingRule::Up),
        "down" => Ok(EnumRoundingRule::Down),
        "ceiling" => Ok(EnumRoundingRule::Ceiling),
        "floor" => Ok(EnumRoundingRule::Floor),
        _ => Err(PyValueError::new_err(
            "rounding must be one of: 'half_even', 'half_up', 'half_down', 'up', 'down', 'ceiling', 'floor'.",
        )),
    }
}

fn parse_cell_kind(value: &str) -> PyResult<EnumCellKind> {
    match value {
        "text" => Ok(EnumCellKind::Text),
        "formula" => Ok(EnumCellKind::Formula),
        "blank" => Ok(EnumCellKind::Blank),
        _ => Err(PyValueError::new_err(
            "cell_kind must be one of: 'text', 'formula', 'blank'.",
        )),
    }
}

fn parse_spec_xlsx_export_options(
    obj: Option<&Bound<'_, PyAny>>,
) -> PyResult<Option<SpecXlsxExportOptions>> {
    let Some(obj) = obj else {
        return Ok(None);
    };
    if obj.is_none() {
        return Ok(None);
    }

    let mut cfg_export_options = derive_default_xlsx_export_options();

    if let Some(v) = extract_optional_attr::<String>(obj, "sheet_name")? {
        cfg_export_options.sheet_name = v;
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "page_size")? {
        cfg_export_options.page_size = v;
    }
    if let Some(v) = extract_optional_attr::<usize>(obj, "row_capacity_per_sheet")? {
        cfg_export_options.row_capacity_per_sheet = v;
    }
    if let Some(v) = extract_optional_attr::<bool>(obj, "if_suppress_empty_rows")? {
        cfg_export_options.if_suppress_empty_rows = v;
    }
    if let Some(v) = extract_optional_attr::<bool>(obj, "if_freeze_header")? {
        cfg_export_options.if_freeze_header = v;
    }

    if let Some(policy_width_obj) = extract_optional_attr_bound(obj, "policy_width")? {
        if let Some(v) = extract_optional_attr::<bool>(&policy_width_obj, "if_enabled")? {
            cfg_export_options.policy_width.if_enabled = v;
        }
        if let Some(v) = extract_optional_attr::<usize>(&policy_width_obj, "width_min")? {
            cfg_export_options.policy_width.width_min = v;
        }
        if let Some(v) = extract_optional_attr::<usize>(&policy_width_obj, "width_max")? {
            cfg_export_options.policy_width.width_max = v;
        }
    }

    if let Some(value_policy_obj) = extract_optional_attr_bound(obj, "value_policy")? {
        if let Some(v) = extract_optional_attr::<String>(&value_policy_obj, "nan_str")? {
            cfg_export_options.value_policy.nan_str = v;
        }
        if let Some(v) = extract_optional_attr::<String>(&value_policy_obj, "posinf_str")? {
            cfg_export_options.value_policy.posinf_str = v;
        }
        if let Some(v) = extract_optional_attr::<String>(&value_policy_obj, "neginf_str")? {
            cfg_export_options.value_policy.neginf_str = v;
        }
    }

    Ok(Some(cfg_export_options))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ArrowImport

fn derive_dataframe_from_any_dataframe(
    py: Python<'_>,
    df: &Bound<'_, PyAny>,
) -> PyResult<DataFrame> {
    let df_polars = convert_to_polars_dataframe(py, df)?;
    let obj_capsule = df_polars.call_method0("__arrow_c_stream__")?;
    derive_dataframe_from_arrow_c_stream_capsule(&obj_capsule)
}

fn derive_dataframe_from_arrow_c_stream_capsule(
    obj_capsule: &Bound<'_, PyAny>,
) -> PyResult<DataFrame> {
    let ptr_capsule = obj_capsule.as_ptr();
    let ptr_stream_name = C_ARROW_ARRAY_STREAM_CAPSULE_NAME
        .as_ptr()
        .cast::<std::os::raw::c_char>();

    // Safety: both pointers stay owned by live Python objects during the check.
    let if_valid_capsule = unsafe { pyffi::PyCapsule_IsValid(ptr_capsule, ptr_stream_name) };
    if if_valid_capsule == 0 {
        return Err(PyValueError::new_err(
            "Page source must yield a DataFrame exporting an `arrow_array_stream` PyCapsule.",
        ));
    }

    // Safety: capsule name was validated above.
    let ptr_stream = unsafe { pyffi::PyCapsule_GetPointer(ptr_capsule, ptr_stream_name) };
    if ptr_stream.is_null() {
        return Err(PyValueError::new_err(
            "Arrow C stream capsule pointer is null.",
        ));
    }

    let stream = ptr_stream.cast::<arrow::ffi::ArrowArrayStream>();
    // Safety: `stream` points to a live ArrowArrayStream owned by the capsule.
    let mut reader = unsafe { arrow::ffi::ArrowArrayStreamReader::try_new(&mut *stream) }
        .map_err(|err| PyValueError::new_err(format!("Failed to open Arrow C stream: {err}")))?;

    let schema_arrow = derive_arrow_schema_from_stream_field(reader.field())?;
    let schema_ref = Arc::new(schema_arrow.clone());
    let mut df = DataFrame::empty_with_arrow_schema(&schema_arrow);

    while let Some(res_array) = unsafe { reader.next() } {
        let array_batch = res_array.map_err(|err| {
            PyValueError::new_err(format!("Failed to read Arrow stream batch: {err}"))
        })?;
        let array_struct = array_batch
            .as_any()
            .downcast_ref::<StructArray>()
            .ok_or_else(|| {
                PyValueError::new_err("Arrow C stream must yield StructArray batches.")
            })?;

        let record_batch = RecordBatchT::try_new(
            array_struct.len(),
            schema_ref.clone(),
            array_struct.values().to_vec(),
        )
        .map_err(|err| PyValueError::new_err(format!("Failed to build record batch: {err}")))?;

        df.try_extend(std::iter::once(record_batch)).map_err(|err| {
            PyValueError::new_err(format!("Failed to append record batch to DataFrame: {err}"))
        })?;
    }

    Ok(df)
}

fn derive_arrow_schema_from_stream_field(field: &ArrowField) -> PyResult<ArrowSchema> {
    match field.dtype() {
        ArrowDataType::Struct(fields) => Ok(fields
            .iter()
            .cloned()
            .map(|field_inner| (field_inner.name.clone(), field_inner))
            .collect::<ArrowSchema>()),
        dtype => Err(PyValueError::new_err(format!(
            "Arrow stream schema must be Struct, got: {dtype:?}"
        ))),
    }
}

fn convert_to_polars_dataframe<'py>(
    py: Python<'py>,
    df: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyAny>> {
    let cls_dataframe = py.import("polars")?.getattr("DataFrame")?;
    if df.is_instance(&cls_dataframe)? {
        return Ok(df.clone());
    }
    cls_dataframe.call1((df,))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

fn extract_optional_attr<T>(obj: &Bound<'_, PyAny>, attr: &str) -> PyResult<Option<T>>
where
    for<'a> T: FromPyObject<'a>,
{
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val.extract::<T>()?))
}

fn extract_optional_attr_bound<'py>(
    obj: &Bound<'py, PyAny>,
    attr: &str,
) -> PyResult<Option<Bound<'py, PyAny>>> {
    if !obj.hasattr(attr)? {
        return Ok(None);
    }
    let val = obj.getattr(attr)?;
    if val.is_none() {
        return Ok(None);
    }
    Ok(Some(val))
}

#[pymodule]
fn _sheetpump_io_xlsx_rs(_py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyXlsxExporter>()?;
    module.add_function(wrap_pyfunction!(merge_csv, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
