use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray,
};
use arrow::datatypes::DataType;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map, Value as JsonValue};

use super::grid::{LinearCalibration, CALIBRATION_CARDS};
use super::model::{HeaderValue, Spectrum};
use super::units::{DataUnit, WaveUnit};

/// Column holding the wavelength arrays (`x` is accepted as an alias).
const WAVE_COLUMNS: [&str; 2] = ["wave", "x"];
/// Column holding the flux arrays (`y` is accepted as an alias).
const DATA_COLUMNS: [&str; 2] = ["data", "y"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load every spectrum stored in a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `wave` and `data` list columns
/// * `.json`    – `[{ "wave": [...], "data": [...], ...header }, ...]`
/// * `.csv`     – columns `wave` and `data` containing semicolon-separated floats
///
/// When the `wave` column is missing, the wavelengths are rebuilt from the
/// `crpix1` / `crval1` / `cdelt1` header cards. `wave_unit` and `data_unit`
/// cards, if present, tag the spectrum's units; every other column ends up
/// in [`Spectrum::header`].
pub fn load_file(path: &Path) -> Result<Vec<Spectrum>> {
    let ext = extension(path);
    let rows = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let spectra = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| row.into_spectrum().with_context(|| format!("Row {i} of {}", path.display())))
        .collect::<Result<Vec<_>>>()?;
    debug!("loaded {} spectra from {}", spectra.len(), path.display());
    Ok(spectra)
}

/// Write spectra as `.json` or `.csv`, in the layout [`load_file`] reads.
pub fn save_file(path: &Path, spectra: &[Spectrum]) -> Result<()> {
    match extension(path).as_str() {
        "json" => save_json(path, spectra),
        "csv" => save_csv(path, spectra),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// RawRow – one record before validation
// ---------------------------------------------------------------------------

/// The (data array, wavelength array or calibration, header) of one record.
struct RawRow {
    wave: Option<Vec<f64>>,
    data: Vec<f64>,
    header: BTreeMap<String, HeaderValue>,
}

impl RawRow {
    fn header_f64(&self, key: &str) -> Option<f64> {
        self.header.get(key).and_then(HeaderValue::as_f64)
    }

    fn into_spectrum(mut self) -> Result<Spectrum> {
        let wave_unit = take_unit::<WaveUnit>(&mut self.header, "wave_unit")?;
        let data_unit = take_unit::<DataUnit>(&mut self.header, "data_unit")?;

        let spectrum = match self.wave.take() {
            Some(wave) => Spectrum::new(self.data, wave)?,
            None => {
                let [pixel_card, value_card, step_card] = CALIBRATION_CARDS;
                let calibration = match (
                    self.header_f64(pixel_card),
                    self.header_f64(value_card),
                    self.header_f64(step_card),
                ) {
                    (Some(px), Some(val), Some(step)) => LinearCalibration::new(px, val, step),
                    _ => bail!("no 'wave' column and no crpix1/crval1/cdelt1 calibration"),
                };
                Spectrum::from_calibration(self.data, &calibration)?
            }
        };

        let mut spectrum = spectrum.with_header(self.header);
        if let Some(unit) = wave_unit {
            spectrum.attach_wave_unit(unit);
        }
        if let Some(unit) = data_unit {
            spectrum.attach_data_unit(unit);
        }
        Ok(spectrum)
    }
}

fn take_unit<U>(header: &mut BTreeMap<String, HeaderValue>, key: &str) -> Result<Option<U>>
where
    U: std::str::FromStr,
    U::Err: std::error::Error + Send + Sync + 'static,
{
    match header.remove(key) {
        None | Some(HeaderValue::Null) => Ok(None),
        Some(value) => {
            let text = value.to_string();
            let unit = text
                .parse::<U>()
                .with_context(|| format!("parsing '{key}' = '{text}'"))?;
            Ok(Some(unit))
        }
    }
}

fn find_column<'a>(names: &[&'a str], candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .find_map(|c| names.iter().copied().find(|n| *n == *c))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   {
///     "wave": [6500.0, 6500.1, ...],
///     "data": [0.98,   0.97,   ...],
///     "wave_unit": "Angstrom",
///     "ra": 83.82,
///     "jd": 2457000.5
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<RawRow>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();

        let data_key = find_column(&keys, &DATA_COLUMNS)
            .with_context(|| format!("Row {i}: missing 'data' array"))?;
        let wave_key = find_column(&keys, &WAVE_COLUMNS);

        let data = json_array_to_f64(obj.get(data_key), i, data_key)?;
        let wave = wave_key
            .map(|k| json_array_to_f64(obj.get(k), i, k))
            .transpose()?;

        let mut header = BTreeMap::new();
        for (key, val) in obj {
            if Some(key.as_str()) == wave_key || key == data_key {
                continue;
            }
            header.insert(key.to_ascii_lowercase(), json_to_header(val));
        }

        rows.push(RawRow { wave, data, header });
    }

    Ok(rows)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn json_to_header(val: &JsonValue) -> HeaderValue {
    match val {
        JsonValue::String(s) => HeaderValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                HeaderValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => HeaderValue::Bool(*b),
        JsonValue::Null => HeaderValue::Null,
        other => HeaderValue::String(other.to_string()),
    }
}

fn header_to_json(val: &HeaderValue) -> JsonValue {
    match val {
        HeaderValue::String(s) => JsonValue::String(s.clone()),
        HeaderValue::Integer(i) => JsonValue::from(*i),
        HeaderValue::Float(f) => JsonValue::from(*f),
        HeaderValue::Bool(b) => JsonValue::Bool(*b),
        HeaderValue::Null => JsonValue::Null,
    }
}

fn save_json(path: &Path, spectra: &[Spectrum]) -> Result<()> {
    let records: Vec<JsonValue> = spectra
        .iter()
        .map(|sp| {
            let mut obj = Map::new();
            obj.insert("wave".into(), JsonValue::from(sp.wave().to_vec()));
            obj.insert("data".into(), JsonValue::from(sp.data().to_vec()));
            obj.insert("wave_unit".into(), JsonValue::String(sp.wave_unit().to_string()));
            obj.insert("data_unit".into(), JsonValue::String(sp.data_unit().to_string()));
            for (key, val) in &sp.header {
                obj.insert(key.clone(), header_to_json(val));
            }
            JsonValue::Object(obj)
        })
        .collect();
    let text = serde_json::to_string_pretty(&records).context("serialising JSON")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `wave` and `data` columns contain semicolon-separated floats:
///   `"6500.0;6500.1;6500.2"`, `"0.98;0.97;0.99"`
/// All other columns are treated as header cards.
fn load_csv(path: &Path) -> Result<Vec<RawRow>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let names: Vec<&str> = headers.iter().map(String::as_str).collect();

    let data_col = find_column(&names, &DATA_COLUMNS).context("CSV missing 'data' column")?;
    let data_idx = headers.iter().position(|h| h == data_col).context("CSV missing 'data' column")?;
    let wave_idx = find_column(&names, &WAVE_COLUMNS).and_then(|c| headers.iter().position(|h| h == c));

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let data = parse_semicolon_floats(record.get(data_idx).unwrap_or(""), row_no, "data")?;
        let wave = wave_idx
            .map(|idx| parse_semicolon_floats(record.get(idx).unwrap_or(""), row_no, "wave"))
            .transpose()?;

        let mut header = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == data_idx || Some(col_idx) == wave_idx {
                continue;
            }
            header.insert(headers[col_idx].to_ascii_lowercase(), guess_header_type(value));
        }

        rows.push(RawRow { wave, data, header });
    }

    Ok(rows)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn guess_header_type(s: &str) -> HeaderValue {
    if s.is_empty() {
        return HeaderValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return HeaderValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return HeaderValue::Float(f);
    }
    if s == "true" || s == "false" {
        return HeaderValue::Bool(s == "true");
    }
    HeaderValue::String(s.to_string())
}

fn join_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn save_csv(path: &Path, spectra: &[Spectrum]) -> Result<()> {
    // Union of header keys so every row has the same columns.
    let mut keys: Vec<&str> = spectra
        .iter()
        .flat_map(|sp| sp.header.keys().map(String::as_str))
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    let mut columns = vec!["wave", "data", "wave_unit", "data_unit"];
    columns.extend(keys.iter().copied());
    writer.write_record(&columns).context("writing CSV header")?;

    for sp in spectra {
        let mut record = vec![
            join_floats(sp.wave()),
            join_floats(sp.data()),
            sp.wave_unit().to_string(),
            sp.data_unit().to_string(),
        ];
        for key in &keys {
            record.push(match sp.header.get(*key) {
                Some(HeaderValue::Null) | None => String::new(),
                Some(v) => v.to_string(),
            });
        }
        writer.write_record(&record).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Load a Parquet file containing spectra.
///
/// Expected schema:
/// - `wave`: List<Float64> or LargeList<Float64> – wavelength arrays (optional
///   when the calibration cards are present)
/// - `data`: List<Float64> or LargeList<Float64> – flux arrays
/// - Any other columns are treated as header cards (strings, ints, floats, bools)
fn load_parquet(path: &Path) -> Result<Vec<RawRow>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let data_name = find_column(&names, &DATA_COLUMNS)
            .ok_or_else(|| anyhow::anyhow!("Parquet file missing 'data' column"))?;
        let data_idx = schema.index_of(data_name)?;
        let wave_idx = find_column(&names, &WAVE_COLUMNS)
            .map(|name| schema.index_of(name))
            .transpose()?;

        let data_col = batch.column(data_idx);

        // Header column indices (everything except wave, data)
        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != data_idx && Some(*i) != wave_idx)
            .map(|(i, f)| (i, f.name().to_ascii_lowercase()))
            .collect();

        for row in 0..n_rows {
            let data = extract_f64_list(data_col, row)
                .with_context(|| format!("Row {row}: failed to read 'data'"))?;
            let wave = wave_idx
                .map(|idx| extract_f64_list(batch.column(idx), row))
                .transpose()
                .with_context(|| format!("Row {row}: failed to read 'wave'"))?;

            let mut header = BTreeMap::new();
            for (col_idx, col_name) in &meta_cols {
                let value = extract_header_value(batch.column(*col_idx), row)?;
                header.insert(col_name.clone(), value);
            }

            rows.push(RawRow { wave, data, header });
        }
    }

    Ok(rows)
}

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

/// Extract a single header value from an Arrow column at a given row.
fn extract_header_value(col: &Arc<dyn Array>, row: usize) -> Result<HeaderValue> {
    if col.is_null(row) {
        return Ok(HeaderValue::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => HeaderValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => HeaderValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => {
            let arr = col.as_any().downcast_ref::<Int32Array>().context("expected Int32Array")?;
            HeaderValue::Integer(arr.value(row) as i64)
        }
        DataType::Int64 => {
            let arr = col.as_any().downcast_ref::<Int64Array>().context("expected Int64Array")?;
            HeaderValue::Integer(arr.value(row))
        }
        DataType::Float32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("expected Float32Array")?;
            HeaderValue::Float(arr.value(row) as f64)
        }
        DataType::Float64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            HeaderValue::Float(arr.value(row))
        }
        DataType::Boolean => {
            let arr = col
                .as_any()
                .downcast_ref::<BooleanArray>()
                .context("expected BooleanArray")?;
            HeaderValue::Bool(arr.value(row))
        }
        other => HeaderValue::String(format!("{other:?}")),
    };
    Ok(value)
}
