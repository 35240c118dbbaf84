use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use ndarray::{Array2, Array3, ArrayView1, s};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Deserializer};

use super::model::{DataCube, FitFunction, FitResult, STATUS_NOT_FITTED};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load an observed data cube. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per spaxel with `x`, `y` and a `flux` list
///   column; `wavelength`, `width` and `height` in the file metadata
/// * `.json`    – `{ "wavelength": [...], "width", "height", "spaxels": [...] }`
pub fn load_cube(path: &Path) -> Result<DataCube> {
    let file = match extension(path).as_str() {
        "parquet" | "pq" => read_cube_parquet(path)?,
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            serde_json::from_str(&text).context("parsing cube JSON")?
        }
        other => bail!("Unsupported file extension: .{other}"),
    };
    assemble_cube(file).with_context(|| format!("loading cube {}", path.display()))
}

/// Load the result of a line fit. Dispatch by extension.
///
/// Same layouts as [`load_cube`]; each spaxel row carries `status`,
/// `solution`, `fitspec` and optionally `fitcont` and `stellar`. The
/// fit `function` and optional `components` names are file-level.
pub fn load_fit(path: &Path) -> Result<FitResult> {
    let file = match extension(path).as_str() {
        "parquet" | "pq" => read_fit_parquet(path)?,
        "json" => {
            let text = std::fs::read_to_string(path).context("reading JSON file")?;
            serde_json::from_str(&text).context("parsing fit JSON")?
        }
        other => bail!("Unsupported file extension: .{other}"),
    };
    assemble_fit(file).with_context(|| format!("loading fit {}", path.display()))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Records shared by both formats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CubeFile {
    wavelength: Vec<f64>,
    width: usize,
    height: usize,
    spaxels: Vec<CubeSpaxel>,
}

#[derive(Debug, Deserialize)]
struct CubeSpaxel {
    x: usize,
    y: usize,
    #[serde(deserialize_with = "nullable_floats")]
    flux: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct FitFile {
    function: String,
    wavelength: Vec<f64>,
    width: usize,
    height: usize,
    #[serde(default)]
    components: Vec<String>,
    spaxels: Vec<FitSpaxel>,
}

#[derive(Debug, Deserialize)]
struct FitSpaxel {
    x: usize,
    y: usize,
    status: i32,
    #[serde(deserialize_with = "nullable_floats")]
    solution: Vec<f64>,
    #[serde(deserialize_with = "nullable_floats")]
    fitspec: Vec<f64>,
    #[serde(default, deserialize_with = "nullable_floats")]
    fitcont: Vec<f64>,
    #[serde(default, deserialize_with = "nullable_floats")]
    stellar: Vec<f64>,
}

/// JSON has no NaN: `null` entries stand for values the fit did not produce.
fn nullable_floats<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
    let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Reject spaxels outside the grid and rows repeating an earlier position.
fn check_position(x: usize, y: usize, seen: &mut Array2<bool>) -> Result<()> {
    let (height, width) = seen.dim();
    if x >= width || y >= height {
        bail!("spaxel ({x}, {y}) lies outside the {width}x{height} grid");
    }
    if std::mem::replace(&mut seen[[y, x]], true) {
        bail!("spaxel ({x}, {y}) appears more than once");
    }
    Ok(())
}

/// Write `values` into the `[.., y, x]` lane of `cube`.
fn place(cube: &mut Array3<f64>, x: usize, y: usize, values: &[f64], what: &str) -> Result<()> {
    let expected = cube.dim().0;
    if values.len() != expected {
        bail!(
            "spaxel ({x}, {y}): {what} has {} values, expected {expected}",
            values.len()
        );
    }
    cube.slice_mut(s![.., y, x]).assign(&ArrayView1::from(values));
    Ok(())
}

fn assemble_cube(file: CubeFile) -> Result<DataCube> {
    if file.width == 0 || file.height == 0 {
        bail!("cube has an empty spatial grid");
    }
    if file.spaxels.is_empty() {
        bail!("cube file contains no spaxels");
    }
    let nwl = file.wavelength.len();
    let mut data = Array3::from_elem((nwl, file.height, file.width), f64::NAN);
    let mut seen = Array2::from_elem((file.height, file.width), false);
    for sp in &file.spaxels {
        check_position(sp.x, sp.y, &mut seen)?;
        place(&mut data, sp.x, sp.y, &sp.flux, "flux")?;
    }
    Ok(DataCube {
        wavelength: file.wavelength,
        data,
    })
}

fn assemble_fit(file: FitFile) -> Result<FitResult> {
    let function = FitFunction::from_name(&file.function)
        .with_context(|| format!("Unknown function name \"{}\"", file.function))?;
    let npars = function.parameters();

    let Some(first) = file.spaxels.first() else {
        bail!("fit file contains no spaxels");
    };
    if file.width == 0 || file.height == 0 {
        bail!("fit has an empty spatial grid");
    }

    // The solution may end with one reduced chi² value.
    let n_solution = first.solution.len();
    let has_chi2 = n_solution % npars == 1;
    if n_solution % npars > 1 || n_solution < npars {
        bail!("solution length {n_solution} does not fit {npars} parameters per component");
    }
    let n_components = n_solution / npars;
    let n_planes = n_components * npars;

    let component_names = if file.components.is_empty() {
        (0..n_components).map(|i| i.to_string()).collect()
    } else if file.components.len() == n_components {
        file.components
    } else {
        bail!(
            "{} component names given for {n_components} fitted components",
            file.components.len()
        );
    };

    let (w, h, nwl) = (file.width, file.height, file.wavelength.len());
    let mut fit_status = Array2::from_elem((h, w), STATUS_NOT_FITTED);
    let mut model_values = Array3::from_elem((n_planes, h, w), f64::NAN);
    let mut reduced_chi2 = has_chi2.then(|| Array2::from_elem((h, w), f64::NAN));
    let mut fitspec = Array3::from_elem((nwl, h, w), f64::NAN);
    let mut fitcont = Array3::zeros((nwl, h, w));
    let mut stellar = Array3::zeros((nwl, h, w));

    let mut seen = Array2::from_elem((h, w), false);
    for sp in &file.spaxels {
        check_position(sp.x, sp.y, &mut seen)?;
        if sp.solution.len() != n_solution {
            bail!(
                "spaxel ({}, {}): solution has {} values, expected {n_solution}",
                sp.x,
                sp.y,
                sp.solution.len()
            );
        }
        fit_status[[sp.y, sp.x]] = sp.status;
        place(&mut model_values, sp.x, sp.y, &sp.solution[..n_planes], "solution")?;
        if let Some(chi2) = reduced_chi2.as_mut() {
            chi2[[sp.y, sp.x]] = sp.solution[n_planes];
        }
        place(&mut fitspec, sp.x, sp.y, &sp.fitspec, "fitspec")?;
        if !sp.fitcont.is_empty() {
            place(&mut fitcont, sp.x, sp.y, &sp.fitcont, "fitcont")?;
        }
        if !sp.stellar.is_empty() {
            place(&mut stellar, sp.x, sp.y, &sp.stellar, "stellar")?;
        }
    }

    log::info!(
        "Fit: {} function, {n_components} component(s), {}x{} spaxels, {} fitted",
        function.name(),
        w,
        h,
        file.spaxels.len()
    );

    Ok(FitResult {
        function,
        component_names,
        wavelength: file.wavelength,
        fit_status,
        model_values,
        reduced_chi2,
        fitspec,
        fitcont,
        stellar,
    })
}

/// Spatial shapes of cube and fit must agree.
pub fn check_compatible(cube: &DataCube, fit: &FitResult) -> Result<()> {
    if cube.width() != fit.width() || cube.height() != fit.height() {
        bail!(
            "cube is {}x{} spaxels but the fit covers {}x{}",
            cube.width(),
            cube.height(),
            fit.width(),
            fit.height()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Read all record batches plus the file's key-value metadata.
fn read_parquet(path: &Path) -> Result<(Vec<RecordBatch>, HashMap<String, String>)> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let metadata: HashMap<String, String> = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| Some((kv.key.clone(), kv.value.clone()?)))
                .collect()
        })
        .unwrap_or_default();

    let reader = builder.build().context("building parquet reader")?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("reading parquet record batch")?;
    Ok((batches, metadata))
}

fn meta_json<T: serde::de::DeserializeOwned>(meta: &HashMap<String, String>, key: &str) -> Result<T> {
    let raw = meta
        .get(key)
        .with_context(|| format!("Parquet metadata missing '{key}'"))?;
    serde_json::from_str(raw).with_context(|| format!("parsing '{key}' metadata"))
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn optional_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Arc<dyn Array>> {
    let idx = batch.schema().index_of(name).ok()?;
    Some(batch.column(idx))
}

fn read_cube_parquet(path: &Path) -> Result<CubeFile> {
    let (batches, meta) = read_parquet(path)?;
    let mut spaxels = Vec::new();

    for batch in &batches {
        let x_col = column(batch, "x")?;
        let y_col = column(batch, "y")?;
        let flux_col = column(batch, "flux")?;

        for row in 0..batch.num_rows() {
            spaxels.push(CubeSpaxel {
                x: extract_index(x_col, row).with_context(|| format!("Row {row}: failed to read 'x'"))?,
                y: extract_index(y_col, row).with_context(|| format!("Row {row}: failed to read 'y'"))?,
                flux: extract_f64_list(flux_col, row)
                    .with_context(|| format!("Row {row}: failed to read 'flux'"))?,
            });
        }
    }

    Ok(CubeFile {
        wavelength: meta_json(&meta, "wavelength")?,
        width: meta_json(&meta, "width")?,
        height: meta_json(&meta, "height")?,
        spaxels,
    })
}

fn read_fit_parquet(path: &Path) -> Result<FitFile> {
    let (batches, meta) = read_parquet(path)?;
    let mut spaxels = Vec::new();

    for batch in &batches {
        let x_col = column(batch, "x")?;
        let y_col = column(batch, "y")?;
        let status_col = column(batch, "status")?;
        let solution_col = column(batch, "solution")?;
        let fitspec_col = column(batch, "fitspec")?;
        let fitcont_col = optional_column(batch, "fitcont");
        let stellar_col = optional_column(batch, "stellar");

        for row in 0..batch.num_rows() {
            let optional = |col: Option<&Arc<dyn Array>>, name: &str| -> Result<Vec<f64>> {
                match col {
                    Some(c) => extract_f64_list(c, row)
                        .with_context(|| format!("Row {row}: failed to read '{name}'")),
                    None => Ok(Vec::new()),
                }
            };
            spaxels.push(FitSpaxel {
                x: extract_index(x_col, row).with_context(|| format!("Row {row}: failed to read 'x'"))?,
                y: extract_index(y_col, row).with_context(|| format!("Row {row}: failed to read 'y'"))?,
                status: i32::try_from(extract_i64(status_col, row)?)
                    .with_context(|| format!("Row {row}: status out of range"))?,
                solution: extract_f64_list(solution_col, row)
                    .with_context(|| format!("Row {row}: failed to read 'solution'"))?,
                fitspec: extract_f64_list(fitspec_col, row)
                    .with_context(|| format!("Row {row}: failed to read 'fitspec'"))?,
                fitcont: optional(fitcont_col, "fitcont")?,
                stellar: optional(stellar_col, "stellar")?,
            });
        }
    }

    Ok(FitFile {
        function: meta
            .get("function")
            .cloned()
            .context("Parquet metadata missing 'function'")?,
        wavelength: meta_json(&meta, "wavelength")?,
        width: meta_json(&meta, "width")?,
        height: meta_json(&meta, "height")?,
        components: if meta.contains_key("components") {
            meta_json(&meta, "components")?
        } else {
            Vec::new()
        },
        spaxels,
    })
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract an integer from an Int32 or Int64 column.
fn extract_i64(col: &Arc<dyn Array>, row: usize) -> Result<i64> {
    if col.is_null(row) {
        bail!("null value in integer column");
    }
    match col.data_type() {
        DataType::Int32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int32Array>()
                .context("expected Int32Array")?;
            Ok(arr.value(row) as i64)
        }
        DataType::Int64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("expected Int64Array")?;
            Ok(arr.value(row))
        }
        other => bail!("Expected Int32 or Int64 column, got {other:?}"),
    }
}

fn extract_index(col: &Arc<dyn Array>, row: usize) -> Result<usize> {
    let v = extract_i64(col, row)?;
    usize::try_from(v).with_context(|| format!("negative coordinate {v}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Builder, ListBuilder};
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use parquet::file::metadata::KeyValue;
    use parquet::file::properties::WriterProperties;
    use std::io::Write;

    const FIT_JSON: &str = r#"{
        "function": "gaussian",
        "wavelength": [6550.0, 6560.0, 6570.0],
        "width": 2,
        "height": 2,
        "components": ["Ha"],
        "spaxels": [
            { "x": 0, "y": 0, "status": 0, "solution": [1e-16, 6561.0, 2.5, 0.9],
              "fitspec": [1.0, 2.0, 1.0], "fitcont": [0.5, 0.5, 0.5] },
            { "x": 1, "y": 1, "status": 4, "solution": [2e-16, 6562.0, 3.0, 1.4],
              "fitspec": [1.0, 3.0, 1.0] }
        ]
    }"#;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_fit_json() {
        let file = write_temp(".json", FIT_JSON);
        let fit = load_fit(file.path()).unwrap();

        assert_eq!(fit.function, FitFunction::Gaussian);
        assert_eq!(fit.components(), 1);
        assert_eq!(fit.component_names, vec!["Ha".to_string()]);
        assert_eq!(fit.model_values.dim(), (3, 2, 2));
        assert_eq!(fit.model_values[[1, 0, 0]], 6561.0);
        assert_eq!(fit.fit_status[[1, 1]], 4);
        assert_eq!(fit.fit_status[[0, 1]], STATUS_NOT_FITTED);
        assert!(fit.model_values[[0, 0, 1]].is_nan());

        let chi2 = fit.reduced_chi2.as_ref().unwrap();
        assert_eq!(chi2[[0, 0]], 0.9);
        assert_eq!(fit.fitcont[[0, 0, 0]], 0.5);
        assert_eq!(fit.fitcont[[0, 1, 1]], 0.0);
        assert_eq!(fit.stellar[[2, 0, 0]], 0.0);
    }

    #[test]
    fn test_unknown_function_rejected() {
        let text = FIT_JSON.replace("\"gaussian\"", "\"voigt\"");
        let file = write_temp(".json", &text);
        let err = load_fit(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown function name"));
    }

    #[test]
    fn test_inconsistent_solution_rejected() {
        let text = FIT_JSON.replace("[2e-16, 6562.0, 3.0, 1.4]", "[2e-16, 6562.0, 3.0]");
        let file = write_temp(".json", &text);
        assert!(load_fit(file.path()).is_err());
    }

    #[test]
    fn test_component_names_default() {
        let text = FIT_JSON.replace("\"components\": [\"Ha\"],", "");
        let file = write_temp(".json", &text);
        let fit = load_fit(file.path()).unwrap();
        assert_eq!(fit.component_names, vec!["0".to_string()]);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".fits", FIT_JSON);
        let err = load_cube(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }

    #[test]
    fn test_cube_json_and_compatibility() {
        let cube_json = r#"{
            "wavelength": [6500.0, 6600.0],
            "width": 2, "height": 2,
            "spaxels": [ { "x": 1, "y": 0, "flux": [3.0, 4.0] } ]
        }"#;
        let file = write_temp(".json", cube_json);
        let cube = load_cube(file.path()).unwrap();
        assert_eq!((cube.width(), cube.height()), (2, 2));
        assert_eq!(cube.data[[1, 0, 1]], 4.0);
        assert!(cube.data[[0, 1, 1]].is_nan());

        let fit = load_fit(write_temp(".json", FIT_JSON).path()).unwrap();
        assert!(check_compatible(&cube, &fit).is_ok());

        let bad = cube_json.replace("\"width\": 2", "\"width\": 3");
        let cube = load_cube(write_temp(".json", &bad).path()).unwrap();
        assert!(check_compatible(&cube, &fit).is_err());
    }

    #[test]
    fn test_spaxel_outside_grid() {
        let cube_json = r#"{ "wavelength": [1.0], "width": 1, "height": 1,
            "spaxels": [ { "x": 1, "y": 0, "flux": [3.0] } ] }"#;
        let file = write_temp(".json", cube_json);
        assert!(load_cube(file.path()).is_err());
    }

    #[test]
    fn test_cube_without_spaxels_rejected() {
        let cube_json = r#"{ "wavelength": [1.0, 2.0], "width": 2, "height": 2, "spaxels": [] }"#;
        let err = load_cube(write_temp(".json", cube_json).path()).unwrap_err();
        assert!(format!("{err:#}").contains("no spaxels"));
    }

    #[test]
    fn test_null_solution_is_nan() {
        let fit_json = FIT_JSON.replace("[2e-16, 6562.0, 3.0, 1.4]", "[2e-16, null, 3.0, 1.4]");
        let fit = load_fit(write_temp(".json", &fit_json).path()).unwrap();
        assert!(fit.model_values[[1, 1, 1]].is_nan());
        assert_eq!(fit.model_values[[2, 1, 1]], 3.0);
    }

    #[test]
    fn test_duplicate_spaxel_rejected() {
        let cube_json = r#"{ "wavelength": [1.0], "width": 2, "height": 1,
            "spaxels": [ { "x": 0, "y": 0, "flux": [3.0] }, { "x": 0, "y": 0, "flux": [4.0] } ] }"#;
        let err = load_cube(write_temp(".json", cube_json).path()).unwrap_err();
        assert!(format!("{err:#}").contains("more than once"));

        let fit_json = FIT_JSON.replace(r#""x": 1, "y": 1, "status": 4"#, r#""x": 0, "y": 0, "status": 5"#);
        let err = load_fit(write_temp(".json", &fit_json).path()).unwrap_err();
        assert!(format!("{err:#}").contains("more than once"));
    }

    fn list_array(rows: &[Vec<f64>]) -> arrow::array::ListArray {
        let mut builder = ListBuilder::new(Float64Builder::new());
        for row in rows {
            let values = builder.values();
            for &v in row {
                values.append_value(v);
            }
            builder.append(true);
        }
        builder.finish()
    }

    #[test]
    fn test_load_fit_parquet() {
        let item = Arc::new(Field::new("item", DataType::Float64, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("y", DataType::Int64, false),
            Field::new("status", DataType::Int32, false),
            Field::new("solution", DataType::List(item.clone()), false),
            Field::new("fitspec", DataType::List(item), false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![0, 1])),
                Arc::new(Int64Array::from(vec![0, 0])),
                Arc::new(Int32Array::from(vec![0, 2])),
                Arc::new(list_array(&[
                    vec![1.0, 6563.0, 2.0, 1.0, 6565.0, 4.0],
                    vec![2.0, 6564.0, 3.0, 1.0, 6566.0, 5.0],
                ])),
                Arc::new(list_array(&[vec![1.0, 2.0], vec![1.0, 2.0]])),
            ],
        )
        .unwrap();

        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![
                KeyValue::new("function".to_string(), "gaussian".to_string()),
                KeyValue::new("wavelength".to_string(), "[6560.0, 6570.0]".to_string()),
                KeyValue::new("width".to_string(), "2".to_string()),
                KeyValue::new("height".to_string(), "1".to_string()),
                KeyValue::new("components".to_string(), r#"["narrow", "broad"]"#.to_string()),
            ]))
            .build();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let fit = load_fit(file.path()).unwrap();
        assert_eq!(fit.components(), 2);
        assert_eq!(fit.component_names[1], "broad");
        assert!(fit.reduced_chi2.is_none());
        assert_eq!(fit.model_values[[4, 0, 1]], 6566.0);
        assert_eq!(fit.fit_status[[0, 1]], 2);
        assert_eq!(fit.fitcont[[1, 0, 0]], 0.0);
    }
}
