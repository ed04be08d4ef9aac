//! Pipeline stages and the sequential recipe runner.

use bakery_core::batching::chunk_owned;
use tracing::info;

use crate::combine::{combine_and_write_report, CombineReport};
use crate::error::{BakeryError, Result};
use crate::locator::Resolver;

pub trait PipelineStage {
    type Input;
    type Output;

    fn name(&self) -> &'static str;

    fn run(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Partition an ordered source list into batches of `size`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkStage {
    size: usize,
}

impl ChunkStage {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(BakeryError::InvalidArgument(
                "chunk size must be a positive integer".to_string(),
            ));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl PipelineStage for ChunkStage {
    type Input = Vec<String>;
    type Output = Vec<Vec<String>>;

    fn name(&self) -> &'static str {
        "chunk"
    }

    fn run(&self, input: Self::Input) -> Result<Self::Output> {
        Ok(chunk_owned(&input, self.size)?)
    }
}

/// Write one batch into a fixed target store.
#[derive(Debug, Clone)]
pub struct CombineAndWriteStage {
    resolver: Resolver,
    target: String,
    append_dim: String,
    concat_dim: String,
}

impl CombineAndWriteStage {
    pub fn new(
        resolver: Resolver,
        target: impl Into<String>,
        append_dim: impl Into<String>,
        concat_dim: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            target: target.into(),
            append_dim: append_dim.into(),
            concat_dim: concat_dim.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn run_with_report(&self, sources: &[String]) -> Result<CombineReport> {
        combine_and_write_report(
            &self.resolver,
            sources,
            &self.target,
            &self.append_dim,
            &self.concat_dim,
        )
    }
}

impl PipelineStage for CombineAndWriteStage {
    type Input = Vec<String>;
    type Output = String;

    fn name(&self) -> &'static str {
        "combine_and_write"
    }

    fn run(&self, input: Self::Input) -> Result<Self::Output> {
        self.run_with_report(&input).map(|report| report.target)
    }
}

/// Runs `chunk`, then `combine_and_write` once per batch, strictly in
/// order. The first failure stops the run; earlier batches stay committed.
#[derive(Debug, Clone)]
pub struct RecipeRunner {
    chunk: ChunkStage,
    write: CombineAndWriteStage,
}

impl RecipeRunner {
    pub fn new(chunk: ChunkStage, write: CombineAndWriteStage) -> Self {
        Self { chunk, write }
    }

    pub fn run(&self, sources: Vec<String>) -> Result<Vec<CombineReport>> {
        let batches = self.chunk.run(sources)?;
        let batch_count = batches.len();
        let mut reports = Vec::with_capacity(batch_count);

        for (batch_id, batch) in batches.iter().enumerate() {
            let report = self.write.run_with_report(batch)?;
            info!(
                component = "recipe_runner",
                event = "batch_completed",
                stage = self.write.name(),
                batch_id,
                batch_count,
                write_mode = report.write_mode.as_str(),
                "recipe batch completed"
            );
            reports.push(report);
        }

        Ok(reports)
    }
}
