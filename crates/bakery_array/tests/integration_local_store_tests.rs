mod support;

use bakery_array::{combine_and_write, open_store, read_summary, Resolver};
use support::fixtures::{air_temperature, write_sources};
use tempfile::TempDir;

#[test]
fn file_backend_round_trips_sources_and_target() {
    let dir = TempDir::new().expect("temp dir");
    let resolver = Resolver::new();
    let dataset = air_temperature();

    let cache = format!("file://{}", dir.path().join("cache").display());
    let sources = write_sources(&resolver, &dataset, &cache, 5);
    assert_eq!(sources.len(), 8);
    assert!(dir.path().join("cache/000.parquet").is_file());

    let target = dir.path().join("target.zarr").display().to_string();
    for batch in sources.chunks(3) {
        assert_eq!(
            combine_and_write(&resolver, batch, &target, "time", "time").expect("write"),
            target
        );
    }

    assert!(dir.path().join("target.zarr/.zgroup").is_file());
    assert!(dir.path().join("target.zarr/Tair/2.0.0").is_file());

    let store = resolver.mapper(&target).expect("mapper");
    let summary = read_summary(&store).expect("summary").expect("committed");
    assert_eq!(summary.chunk_bounds, vec![0, 15, 30, 40]);
    assert_eq!(open_store(&store).expect("open"), dataset);
}
