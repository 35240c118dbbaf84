use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int32Array, Int64Array, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde_json::json;

const C_KMS: f64 = 2.998e5;
const HALPHA: f64 = 6562.8;
const WIDTH: usize = 20;
const HEIGHT: usize = 16;

/// Gauss-Hermite line with parameters `[amplitude, centre, sigma, h3, h4]`.
fn gauss_hermite(wl: f64, p: &[f64; 5]) -> f64 {
    let w = (wl - p[1]) / p[2];
    let w2 = w * w;
    let sqrt2 = std::f64::consts::SQRT_2;
    let h3 = (2.0 * sqrt2 * w2 * w - 3.0 * sqrt2 * w) / 6f64.sqrt();
    let h4 = (4.0 * w2 * w2 - 12.0 * w2 + 3.0) / 24f64.sqrt();
    p[0] * (-w2 / 2.0).exp() * (1.0 + p[3] * h3 + p[4] * h4)
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
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
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

struct FitRow {
    x: i64,
    y: i64,
    status: i32,
    solution: Vec<f64>,
    fitspec: Vec<f64>,
    fitcont: Vec<f64>,
    stellar: Vec<f64>,
}

struct CubeRow {
    x: i64,
    y: i64,
    flux: Vec<f64>,
}

fn list_array(rows: &[&[f64]]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row.iter() {
            values.append_value(v);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn write_parquet(path: &str, batch: &RecordBatch, metadata: Vec<KeyValue>) {
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(metadata))
        .build();
    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).expect("Failed to create writer");
    writer.write(batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    let mut rng = SimpleRng::new(42);

    let cube_wl: Vec<f64> = (0..241).map(|i| 6450.0 + i as f64 * 0.5).collect();
    let fit_range = (6520.0, 6610.0);
    let fit_idx: Vec<usize> = cube_wl
        .iter()
        .enumerate()
        .filter(|(_, w)| **w >= fit_range.0 && **w <= fit_range.1)
        .map(|(i, _)| i)
        .collect();
    let fit_wl: Vec<f64> = fit_idx.iter().map(|&i| cube_wl[i]).collect();

    let (cx, cy) = (WIDTH as f64 / 2.0 - 0.5, HEIGHT as f64 / 2.0 - 0.5);

    let mut cube_rows = Vec::new();
    let mut fit_rows = Vec::new();

    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let (dx, dy) = (x as f64 - cx, y as f64 - cy);
            let r = (dx * dx + dy * dy).sqrt();

            // Rotating disc (narrow) plus a slower, broader outflow.
            let v_rot = 180.0 * (dx / 3.0).tanh();
            let narrow = [
                6e-16 * (-r * r / (2.0 * 25.0)).exp(),
                HALPHA * (1.0 + v_rot / C_KMS),
                1.6 + 0.04 * r,
                0.03 * (dx / 4.0).tanh(),
                -0.02,
            ];
            let broad = [
                1.5e-16 * (-r * r / (2.0 * 9.0)).exp(),
                HALPHA * (1.0 - 120.0 / C_KMS),
                5.5,
                -0.05,
                0.04,
            ];

            let stellar: Vec<f64> = cube_wl
                .iter()
                .map(|&w| 3e-17 * (1.0 - 0.3 * (-(w - HALPHA).powi(2) / 18.0).exp()))
                .collect();
            let continuum = 1.2e-16 * (-r / 30.0).exp();
            let noise = 4e-18;

            let flux: Vec<f64> = cube_wl
                .iter()
                .zip(&stellar)
                .map(|(&w, &st)| {
                    st + continuum
                        + gauss_hermite(w, &narrow)
                        + gauss_hermite(w, &broad)
                        + rng.gauss(0.0, noise)
                })
                .collect();

            // Outer corners are left unfitted; a ring of spaxels failed.
            if r < 10.5 {
                let status = if (8.5..9.0).contains(&r) { 2 } else { 0 };
                let fitspec: Vec<f64> = fit_idx.iter().map(|&i| flux[i]).collect();
                let fit_stellar: Vec<f64> = fit_idx.iter().map(|&i| stellar[i]).collect();
                let model_chi2 = 0.8 + 0.4 * rng.next_f64();
                let mut solution: Vec<f64> = narrow.iter().chain(broad.iter()).copied().collect();
                // A couple of fits where the broad width diverged.
                if (x, y) == (3, 8) || (x, y) == (16, 7) {
                    solution[7] = f64::NAN;
                }
                solution.push(model_chi2);

                fit_rows.push(FitRow {
                    x: x as i64,
                    y: y as i64,
                    status,
                    solution,
                    fitspec,
                    fitcont: vec![continuum; fit_wl.len()],
                    stellar: fit_stellar,
                });
            }

            cube_rows.push(CubeRow {
                x: x as i64,
                y: y as i64,
                flux,
            });
        }
    }

    // ---- JSON ----
    let cube_json = json!({
        "wavelength": cube_wl,
        "width": WIDTH,
        "height": HEIGHT,
        "spaxels": cube_rows
            .iter()
            .map(|r| json!({ "x": r.x, "y": r.y, "flux": r.flux }))
            .collect::<Vec<_>>(),
    });
    let fit_json = json!({
        "function": "gauss_hermite",
        "wavelength": fit_wl,
        "width": WIDTH,
        "height": HEIGHT,
        "components": ["narrow", "broad"],
        "spaxels": fit_rows
            .iter()
            .map(|r| json!({
                "x": r.x,
                "y": r.y,
                "status": r.status,
                "solution": r.solution,
                "fitspec": r.fitspec,
                "fitcont": r.fitcont,
                "stellar": r.stellar,
            }))
            .collect::<Vec<_>>(),
    });
    std::fs::write("sample_cube.json", cube_json.to_string()).expect("Failed to write cube JSON");
    std::fs::write("sample_fit.json", fit_json.to_string()).expect("Failed to write fit JSON");

    // ---- Parquet ----
    let cube_schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Int64, false),
        list_field("flux"),
    ]));
    let cube_batch = RecordBatch::try_new(
        cube_schema,
        vec![
            Arc::new(Int64Array::from_iter_values(cube_rows.iter().map(|r| r.x))),
            Arc::new(Int64Array::from_iter_values(cube_rows.iter().map(|r| r.y))),
            list_array(&cube_rows.iter().map(|r| r.flux.as_slice()).collect::<Vec<_>>()),
        ],
    )
    .expect("Failed to create cube RecordBatch");

    let fit_schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::Int64, false),
        Field::new("y", DataType::Int64, false),
        Field::new("status", DataType::Int32, false),
        list_field("solution"),
        list_field("fitspec"),
        list_field("fitcont"),
        list_field("stellar"),
    ]));
    let column = |f: fn(&FitRow) -> &[f64]| list_array(&fit_rows.iter().map(f).collect::<Vec<_>>());
    let fit_batch = RecordBatch::try_new(
        fit_schema,
        vec![
            Arc::new(Int64Array::from_iter_values(fit_rows.iter().map(|r| r.x))),
            Arc::new(Int64Array::from_iter_values(fit_rows.iter().map(|r| r.y))),
            Arc::new(Int32Array::from_iter_values(fit_rows.iter().map(|r| r.status))),
            column(|r| r.solution.as_slice()),
            column(|r| r.fitspec.as_slice()),
            column(|r| r.fitcont.as_slice()),
            column(|r| r.stellar.as_slice()),
        ],
    )
    .expect("Failed to create fit RecordBatch");

    let geometry = |wl: &[f64]| {
        vec![
            KeyValue::new("wavelength".to_string(), json!(wl).to_string()),
            KeyValue::new("width".to_string(), WIDTH.to_string()),
            KeyValue::new("height".to_string(), HEIGHT.to_string()),
        ]
    };
    write_parquet("sample_cube.parquet", &cube_batch, geometry(&cube_wl));

    let mut fit_meta = geometry(&fit_wl);
    fit_meta.push(KeyValue::new("function".to_string(), "gauss_hermite".to_string()));
    fit_meta.push(KeyValue::new(
        "components".to_string(),
        json!(["narrow", "broad"]).to_string(),
    ));
    write_parquet("sample_fit.parquet", &fit_batch, fit_meta);

    println!(
        "Wrote {}x{} cube ({} wavelengths) and {} fitted spaxels to sample_cube.* / sample_fit.*",
        WIDTH,
        HEIGHT,
        cube_wl.len(),
        fit_rows.len()
    );
}
