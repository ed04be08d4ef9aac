mod support;

use bakery_array::{
    open_store, ChunkStage, CombineAndWriteStage, PipelineStage, RecipeRunner, Resolver, WriteMode,
};
use support::fixtures::{air_temperature, write_sources};

#[test]
fn runner_writes_batches_in_order_and_round_trips() {
    let resolver = Resolver::new();
    let dataset = air_temperature();
    let sources = write_sources(&resolver, &dataset, "memory://cache", 2);

    let write = CombineAndWriteStage::new(resolver.clone(), "memory://out/air.zarr", "time", "time");
    let runner = RecipeRunner::new(ChunkStage::new(9).expect("size"), write);
    let reports = runner.run(sources).expect("recipe should run");

    let modes: Vec<WriteMode> = reports.iter().map(|report| report.write_mode).collect();
    assert_eq!(modes, vec![WriteMode::Create, WriteMode::Append, WriteMode::Append]);
    assert_eq!(
        reports.last().expect("last batch").summary.chunk_bounds,
        vec![0, 18, 36, 40]
    );

    let store = resolver.mapper("memory://out/air.zarr").expect("mapper");
    assert_eq!(open_store(&store).expect("open"), dataset);
}

#[test]
fn chunk_stage_concatenation_reproduces_input() {
    let stage = ChunkStage::new(3).expect("size");
    for len in 0..10 {
        let input: Vec<String> = (0..len).map(|i| i.to_string()).collect();
        let batches = stage.run(input.clone()).expect("chunk");

        assert_eq!(batches.concat(), input);
        if let Some((last, full)) = batches.split_last() {
            assert!(full.iter().all(|batch| batch.len() == 3));
            assert!((1..=3).contains(&last.len()));
        }
    }
}

#[test]
fn combine_stage_returns_target_locator() {
    let resolver = Resolver::new();
    let sources = write_sources(&resolver, &air_temperature(), "memory://cache", 10);

    let stage = CombineAndWriteStage::new(resolver, "memory://out/one.zarr", "time", "time");
    assert_eq!(stage.name(), "combine_and_write");
    assert_eq!(
        stage.run(sources[0..2].to_vec()).expect("write"),
        "memory://out/one.zarr"
    );
}
