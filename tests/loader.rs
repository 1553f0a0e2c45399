//! Parquet loading, including wavelength grids rebuilt from header cards.

use std::sync::Arc;

use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use rusty_spectra::data::loader::{load_file, save_file};
use rusty_spectra::{HeaderValue, WaveUnit};

fn list_column(rows: &[Vec<f64>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn write_batch(path: &std::path::Path, batch: RecordBatch) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

fn list_field(name: &str) -> Field {
    let item = Arc::new(Field::new("item", DataType::Float64, true));
    Field::new(name, DataType::List(item), false)
}

#[test]
fn parquet_with_calibration_cards() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cal.parquet");

    let schema = Arc::new(Schema::new(vec![
        list_field("data"),
        Field::new("CRPIX1", DataType::Float64, false),
        Field::new("CRVAL1", DataType::Float64, false),
        Field::new("CDELT1", DataType::Float64, false),
        Field::new("wave_unit", DataType::Utf8, false),
        Field::new("object", DataType::Utf8, false),
        Field::new("measurement_id", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(list_column(&[vec![1.0, 0.9, 1.0], vec![0.8, 0.7]])),
            Arc::new(Float64Array::from(vec![0.0, 1.0])),
            Arc::new(Float64Array::from(vec![6270.0, 627.0])),
            Arc::new(Float64Array::from(vec![0.05, 0.01])),
            Arc::new(StringArray::from(vec!["Angstrom", "nm"])),
            Arc::new(StringArray::from(vec!["HR 1000", "HR 1001"])),
            Arc::new(Int64Array::from(vec![7, 8])),
        ],
    )
    .unwrap();
    write_batch(&path, batch);

    let spectra = load_file(&path).unwrap();
    assert_eq!(spectra.len(), 2);

    assert_eq!(spectra[0].wave(), &[6270.0, 6270.05, 6270.1]);
    assert_eq!(spectra[0].wave_unit(), WaveUnit::Angstrom);
    assert_eq!(
        spectra[0].header.get("object"),
        Some(&HeaderValue::String("HR 1000".to_string()))
    );
    assert_eq!(
        spectra[0].header.get("measurement_id"),
        Some(&HeaderValue::Integer(7))
    );
    assert!(!spectra[0].header.contains_key("wave_unit"));

    // Reference pixel 1 holds 627.0, so pixel 0 sits one step below it.
    assert_eq!(spectra[1].len(), 2);
    assert!((spectra[1].wave()[0] - 626.99).abs() < 1e-9);
    assert!((spectra[1].wave()[1] - 627.0).abs() < 1e-9);
    assert_eq!(spectra[1].wave_unit(), WaveUnit::Nanometer);
}

#[test]
fn parquet_with_wave_column_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectra.parquet");

    let schema = Arc::new(Schema::new(vec![
        list_field("wave"),
        list_field("data"),
        Field::new("jd", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(list_column(&[vec![4000.0, 4001.0, 4002.0]])),
            Arc::new(list_column(&[vec![3.0, 2.0, 1.0]])),
            Arc::new(Float64Array::from(vec![Some(2457000.5)])),
        ],
    )
    .unwrap();
    write_batch(&path, batch);

    let spectra = load_file(&path).unwrap();
    assert_eq!(spectra[0].data(), &[3.0, 2.0, 1.0]);
    assert_eq!(spectra[0].jd(), Some(2457000.5));

    let json = dir.path().join("spectra.json");
    save_file(&json, &spectra).unwrap();
    let back = load_file(&json).unwrap();
    assert_eq!(back[0].wave(), spectra[0].wave());
    assert_eq!(back[0].data(), spectra[0].data());
    assert_eq!(back[0].jd(), Some(2457000.5));
}

#[test]
fn parquet_rejects_non_monotonic_wave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.parquet");

    let schema = Arc::new(Schema::new(vec![list_field("wave"), list_field("data")]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(list_column(&[vec![4000.0, 3999.0]])),
            Arc::new(list_column(&[vec![1.0, 1.0]])),
        ],
    )
    .unwrap();
    write_batch(&path, batch);

    assert!(load_file(&path).is_err());
}

#[test]
fn resampled_output_carries_only_the_new_grid() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("cards.json");
    std::fs::write(
        &input,
        r#"[{"data": [1.0, 2.0, 3.0, 4.0], "crpix1": 0, "crval1": 4000.0, "cdelt1": 1.0, "jd": 2457000.5}]"#,
    )
    .unwrap();

    let mut spectra = load_file(&input).unwrap();
    spectra[0].resample_to(4000.5, 4002.5, 3).unwrap();

    let output = dir.path().join("out.json");
    save_file(&output, &spectra).unwrap();
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(!text.contains("crpix1"));
    assert!(!text.contains("cdelt1"));

    let back = load_file(&output).unwrap();
    assert_eq!(back[0].wave(), &[4000.5, 4001.5, 4002.5]);
    assert_eq!(back[0].jd(), Some(2457000.5));
}
