#![allow(dead_code)]

use bakery_array::{encode_source, Attrs, Dataset, Resolver, Variable};
use serde_json::json;

pub const TIME_STEPS: usize = 40;
pub const Y: usize = 3;
pub const X: usize = 4;

/// Air-temperature style dataset: `Tair(time, y, x)` plus a `time`
/// coordinate, 40 steps long.
pub fn air_temperature() -> Dataset {
    let tair: Vec<f64> = (0..TIME_STEPS * Y * X)
        .map(|i| 250.0 + (i % 97) as f64 * 0.5)
        .collect();
    let time: Vec<f64> = (0..TIME_STEPS).map(|t| t as f64).collect();

    Dataset::new()
        .with_attrs(Attrs::from([
            ("title".to_string(), json!("air temperature fixture")),
            ("source".to_string(), json!("synthetic")),
        ]))
        .with_variable(
            "Tair",
            Variable::from_shape_vec(&["time", "y", "x"], &[TIME_STEPS, Y, X], tair)
                .expect("Tair shape")
                .with_attrs(Attrs::from([("units".to_string(), json!("K"))])),
        )
        .and_then(|ds| {
            ds.with_variable(
                "time",
                Variable::from_shape_vec(&["time"], &[TIME_STEPS], time)
                    .expect("time shape")
                    .with_attrs(Attrs::from([(
                        "units".to_string(),
                        json!("days since 1980-09-01"),
                    )])),
            )
        })
        .expect("fixture dataset is consistent")
}

/// Write `dataset` as one source file per `step` rows along `time` and
/// return the source URLs in order.
pub fn write_sources(
    resolver: &Resolver,
    dataset: &Dataset,
    prefix: &str,
    step: usize,
) -> Vec<String> {
    let len = dataset.dim_len("time").expect("time dimension");
    (0..len)
        .step_by(step)
        .enumerate()
        .map(|(idx, start)| {
            let end = (start + step).min(len);
            let url = format!("{prefix}/{idx:03}.parquet");
            let slice = dataset.slice_along("time", start..end).expect("slice");
            write_source(resolver, &url, &slice);
            url
        })
        .collect()
}

pub fn write_source(resolver: &Resolver, url: &str, dataset: &Dataset) {
    let bytes = encode_source(dataset, "time").expect("encode source");
    resolver.put_bytes(url, &bytes).expect("store source");
}
