mod support;

use bakery_array::{
    combine_and_write, combine_and_write_report, open_store, read_summary, Dataset, Resolver,
    Variable, WriteMode,
};
use support::fixtures::{air_temperature, write_source, write_sources, TIME_STEPS, X, Y};

const TARGET: &str = "memory://bakery/target.zarr";

fn write_batch(resolver: &Resolver, sources: &[String]) -> String {
    combine_and_write(resolver, sources, TARGET, "time", "time").expect("batch should be written")
}

fn stored(resolver: &Resolver) -> Dataset {
    open_store(&resolver.mapper(TARGET).expect("mapper")).expect("store should open")
}

#[test]
fn create_on_empty_store_stores_exactly_the_batch() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    let target = write_batch(&resolver, &sources[0..9]);

    assert_eq!(target, TARGET);
    assert_eq!(
        stored(&resolver),
        dataset.slice_along("time", 0..18).expect("slice")
    );
}

#[test]
fn append_keeps_prior_content_and_extends_it() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    write_batch(&resolver, &sources[0..3]);
    let first = stored(&resolver);
    let report = combine_and_write_report(&resolver, &sources[3..5], TARGET, "time", "time")
        .expect("append");

    assert_eq!(report.write_mode, WriteMode::Append);
    assert_eq!(report.append_length, 4);
    let second = stored(&resolver);
    assert_eq!(second.dim_len("time"), Some(10));
    assert_eq!(second.slice_along("time", 0..6).expect("slice"), first);
}

#[test]
fn two_batches_round_trip_to_the_original_dataset() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    write_batch(&resolver, &sources[0..9]);
    write_batch(&resolver, &sources[9..]);

    assert_eq!(stored(&resolver), dataset);
    let summary = read_summary(&resolver.mapper(TARGET).expect("mapper"))
        .expect("summary")
        .expect("committed");
    assert_eq!(summary.append_dim, "time");
    assert_eq!(summary.chunk_bounds, vec![0, 18, TIME_STEPS]);
}

#[test]
fn repeated_append_duplicates_the_batch() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    write_batch(&resolver, &sources[0..9]);
    write_batch(&resolver, &sources[0..9]);

    let combined = stored(&resolver);
    let batch = dataset.slice_along("time", 0..18).expect("slice");
    assert_eq!(combined.dim_len("time"), Some(36));
    assert_eq!(combined.slice_along("time", 0..18).expect("slice"), batch);
    assert_eq!(combined.slice_along("time", 18..36).expect("slice"), batch);
}

#[test]
fn reversed_batch_order_is_not_corrected() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    write_batch(&resolver, &sources[9..]);
    write_batch(&resolver, &sources[0..9]);

    let combined = stored(&resolver);
    assert_ne!(combined, dataset);
    let time = combined.variable("time").expect("time").values();
    assert_eq!(time[0], 18.0);
    assert_eq!(time[22], 0.0);
}

#[test]
fn sources_within_a_batch_keep_list_order() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    let shuffled = vec![sources[1].clone(), sources[0].clone()];
    write_batch(&resolver, &shuffled);

    let time = stored(&resolver).variable("time").expect("time").values();
    assert_eq!(time, vec![2.0, 3.0, 0.0, 1.0]);
}

#[test]
fn append_with_different_variables_is_a_conflict() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);
    write_batch(&resolver, &sources[0..2]);

    let time_only = Dataset::new()
        .with_variable(
            "time",
            Variable::from_shape_vec(&["time"], &[2], vec![4.0, 5.0]).expect("shape"),
        )
        .expect("dataset");
    write_source(&resolver, "memory://odd/time_only.parquet", &time_only);

    let error = combine_and_write(
        &resolver,
        &["memory://odd/time_only.parquet".to_string()],
        TARGET,
        "time",
        "time",
    )
    .expect_err("variable sets differ");
    assert_eq!(error.code(), "dataset_conflict");
    assert_eq!(stored(&resolver).dim_len("time"), Some(4));
}

#[test]
fn append_with_mismatched_shape_is_a_conflict() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);
    write_batch(&resolver, &sources[0..2]);

    let wide = Dataset::new()
        .with_variable(
            "Tair",
            Variable::from_shape_vec(&["time", "y", "x"], &[1, Y, X + 1], vec![0.0; Y * (X + 1)])
                .expect("shape"),
        )
        .and_then(|ds| {
            ds.with_variable(
                "time",
                Variable::from_shape_vec(&["time"], &[1], vec![4.0]).expect("shape"),
            )
        })
        .expect("dataset");
    write_source(&resolver, "memory://odd/wide.parquet", &wide);

    let error = combine_and_write(
        &resolver,
        &["memory://odd/wide.parquet".to_string()],
        TARGET,
        "time",
        "time",
    )
    .expect_err("x differs");
    assert_eq!(error.code(), "dataset_conflict");
}

#[test]
fn append_dimension_must_exist_and_match_the_store() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    let missing = combine_and_write(&resolver, &sources[0..1], TARGET, "level", "time")
        .expect_err("no level dimension");
    assert_eq!(missing.code(), "dataset_conflict");
    assert!(resolver.mapper(TARGET).expect("mapper").is_empty().expect("list"));

    write_batch(&resolver, &sources[0..1]);
    let other_axis = combine_and_write(&resolver, &sources[1..2], TARGET, "y", "time")
        .expect_err("store appends along time");
    assert_eq!(other_axis.code(), "dataset_conflict");
}

#[test]
fn missing_source_is_unavailable_and_leaves_store_untouched() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);
    write_batch(&resolver, &sources[0..2]);

    let mut batch = sources[2..4].to_vec();
    batch.push("memory://cache/missing.parquet".to_string());
    let error = combine_and_write(&resolver, &batch, TARGET, "time", "time")
        .expect_err("source is missing");

    assert_eq!(error.code(), "source_unavailable");
    assert!(error.to_string().contains("memory://cache/missing.parquet"));
    assert_eq!(stored(&resolver), dataset.slice_along("time", 0..4).expect("slice"));
}

#[test]
fn unknown_schemes_are_invalid_arguments() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    let bad_source = combine_and_write(
        &resolver,
        &["ftp://host/0.parquet".to_string()],
        TARGET,
        "time",
        "time",
    )
    .expect_err("no ftp backend");
    assert_eq!(bad_source.code(), "invalid_argument");

    let bad_target = combine_and_write(&resolver, &sources[0..1], "gs://bucket/t.zarr", "time", "time")
        .expect_err("no gs backend");
    assert_eq!(bad_target.code(), "invalid_argument");
}

#[test]
fn empty_batch_is_an_invalid_argument() {
    let error = combine_and_write(&Resolver::new(), &[], TARGET, "time", "time")
        .expect_err("empty batch");
    assert_eq!(error.code(), "invalid_argument");
}
