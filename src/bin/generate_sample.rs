use std::sync::Arc;

use arrow::array::{Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Pixels per spectrum.
const NPIX: usize = 1024;
/// Linear wavelength solution shared by every spectrum (Angstrom).
const CRVAL1: f64 = 6270.0;
const CDELT1: f64 = 0.05;

/// Telluric O2 lines in the region: (centre, sigma, depth).
const TELLURIC: [(f64, f64, f64); 5] = [
    (6276.0, 0.08, 0.35),
    (6278.1, 0.08, 0.45),
    (6280.6, 0.09, 0.55),
    (6284.0, 0.10, 0.30),
    (6287.6, 0.08, 0.40),
];

fn absorption(wave: f64, lines: &[(f64, f64, f64)], scale: f64) -> f64 {
    lines
        .iter()
        .map(|&(mu, sigma, depth)| 1.0 - depth * (-(wave - mu).powi(2) / (2.0 * sigma.powi(2))).exp())
        .product::<f64>()
        .powf(scale)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Rows destined for one Parquet file.
#[derive(Default)]
struct Table {
    data: Vec<Vec<f64>>,
    object: Vec<String>,
    ra: Vec<f64>,
    dec: Vec<f64>,
    jd: Vec<f64>,
    id: Vec<i64>,
}

impl Table {
    fn write(&self, path: &str) -> anyhow::Result<()> {
        let mut data_builder = ListBuilder::new(Float64Builder::new());
        for row in &self.data {
            let values = data_builder.values();
            for &v in row {
                values.append_value(v);
            }
            data_builder.append(true);
        }
        let data_array = data_builder.finish();
        let n = self.data.len();

        let item = Arc::new(Field::new("item", DataType::Float64, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new("data", DataType::List(item), false),
            Field::new("crpix1", DataType::Float64, false),
            Field::new("crval1", DataType::Float64, false),
            Field::new("cdelt1", DataType::Float64, false),
            Field::new("wave_unit", DataType::Utf8, false),
            Field::new("object", DataType::Utf8, false),
            Field::new("ra", DataType::Float64, false),
            Field::new("dec", DataType::Float64, false),
            Field::new("jd", DataType::Float64, false),
            Field::new("measurement_id", DataType::Int64, false),
        ]));

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(data_array),
                Arc::new(Float64Array::from(vec![0.0; n])),
                Arc::new(Float64Array::from(vec![CRVAL1; n])),
                Arc::new(Float64Array::from(vec![CDELT1; n])),
                Arc::new(StringArray::from(vec!["Angstrom"; n])),
                Arc::new(StringArray::from(
                    self.object.iter().map(String::as_str).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(self.ra.clone())),
                Arc::new(Float64Array::from(self.dec.clone())),
                Arc::new(Float64Array::from(self.jd.clone())),
                Arc::new(Int64Array::from(self.id.clone())),
            ],
        )?;

        let file = std::fs::File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        println!("Wrote {n} spectra ({NPIX} pixels each) to {path}");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let mut rng = SimpleRng::new(42);
    let wave: Vec<f64> = (0..NPIX).map(|i| CRVAL1 + i as f64 * CDELT1).collect();

    // Calibrations: hot, featureless stars observed at different airmasses.
    let mut calibrations = Table::default();
    for (k, airmass) in [1.0, 1.3, 1.8].into_iter().enumerate() {
        let row = wave
            .iter()
            .map(|&w| absorption(w, &TELLURIC, airmass) + rng.gauss(0.0, 0.002))
            .collect();
        calibrations.data.push(row);
        calibrations.object.push(format!("HR {}", 1000 + k));
        calibrations.ra.push(80.0 + k as f64);
        calibrations.dec.push(-5.0);
        calibrations.jd.push(2457000.5 + k as f64 * 0.01);
        calibrations.id.push(k as i64);
    }

    // Targets: a stellar line plus telluric absorption, offset by a few
    // pixels and at an airmass not in the calibration set.
    let mut targets = Table::default();
    let stellar = [(6282.2, 0.25, 0.30)];
    for (k, (shift_px, airmass)) in [(2.0, 1.2), (-3.0, 1.6), (0.0, 1.45)].into_iter().enumerate() {
        let row = wave
            .iter()
            .map(|&w| {
                let telluric = absorption(w - shift_px * CDELT1, &TELLURIC, airmass);
                absorption(w, &stellar, 1.0) * telluric + rng.gauss(0.0, 0.003)
            })
            .collect();
        targets.data.push(row);
        targets.object.push("HD 37128".to_string());
        targets.ra.push(84.05);
        targets.dec.push(-1.20);
        targets.jd.push(2457001.5 + k as f64 * 0.02);
        targets.id.push(k as i64);
    }

    calibrations.write("sample_calibrations.parquet")?;
    targets.write("sample_targets.parquet")?;
    Ok(())
}
