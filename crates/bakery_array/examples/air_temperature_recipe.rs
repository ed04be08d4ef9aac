//! Runs a small recipe end to end against a local directory.
//!
//! cargo run -p bakery_array --example air_temperature_recipe -- [output_dir] [batch_size]

use std::path::PathBuf;

use bakery_array::{
    encode_source, open_store, read_summary, ChunkStage, CombineAndWriteStage, Dataset,
    RecipeRunner, Resolver, Variable,
};
use tracing_subscriber::EnvFilter;

const STEPS: usize = 40;
const STEPS_PER_FILE: usize = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("bakery-demo"));
    let batch_size: usize = match args.next() {
        Some(raw) => raw.parse()?,
        None => 9,
    };

    let resolver = Resolver::new();
    let dataset = synthetic_dataset()?;
    let mut sources = Vec::new();
    for (idx, start) in (0..STEPS).step_by(STEPS_PER_FILE).enumerate() {
        let url = format!("memory://cache/{idx:03}.parquet");
        let slice = dataset.slice_along("time", start..(start + STEPS_PER_FILE).min(STEPS))?;
        resolver.put_bytes(&url, &encode_source(&slice, "time")?)?;
        sources.push(url);
    }

    let target = output_dir.join("air_temperature.zarr").display().to_string();
    resolver.mapper(&target)?.clear()?;

    let runner = RecipeRunner::new(
        ChunkStage::new(batch_size)?,
        CombineAndWriteStage::new(resolver.clone(), target.clone(), "time", "time"),
    );
    let reports = runner.run(sources)?;

    let store = resolver.mapper(&target)?;
    let summary = read_summary(&store)?;
    let round_trip = open_store(&store)? == dataset;
    println!("target: {target}");
    println!("batches written: {}", reports.len());
    println!("summary: {}", serde_json::to_string(&summary)?);
    println!("round trip matches: {round_trip}");
    Ok(())
}

fn synthetic_dataset() -> Result<Dataset, Box<dyn std::error::Error>> {
    let (y, x) = (3, 4);
    let tair = (0..STEPS * y * x)
        .map(|i| 260.0 + ((i as f64) * 0.1).sin() * 15.0)
        .collect();
    let time = (0..STEPS).map(|t| t as f64).collect();
    Ok(Dataset::new()
        .with_variable(
            "Tair",
            Variable::from_shape_vec(&["time", "y", "x"], &[STEPS, y, x], tair)?,
        )?
        .with_variable("time", Variable::from_shape_vec(&["time"], &[STEPS], time)?)?)
}
