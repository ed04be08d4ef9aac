use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::error::{BakeryError, Result};
use crate::locator::Resolver;
use crate::source::open_sources;
use crate::target::{select_write_mode, write_dataset, StoreSummary, WriteMode};

const COMPONENT: &str = "combine_and_write";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombineReport {
    pub target: String,
    pub write_mode: WriteMode,
    pub sources_processed: usize,
    /// Batch length along the append dimension.
    pub append_length: usize,
    pub summary: StoreSummary,
}

/// Open every source and join them along `concat_dim`, in list order.
pub fn combine_sources(resolver: &Resolver, sources: &[String], concat_dim: &str) -> Result<Dataset> {
    if sources.is_empty() {
        return Err(BakeryError::InvalidArgument(
            "a batch must contain at least one source".to_string(),
        ));
    }
    if concat_dim.trim().is_empty() {
        return Err(BakeryError::InvalidArgument(
            "concat dimension must be a non-empty string".to_string(),
        ));
    }

    let datasets = open_sources(resolver, sources)?;
    debug!(
        component = COMPONENT,
        event = "sources_opened",
        sources = sources.len(),
        "opened batch sources"
    );
    Dataset::concat(&datasets, concat_dim)
}

/// Combine one batch into the target store and return the target locator.
pub fn combine_and_write(
    resolver: &Resolver,
    sources: &[String],
    target: &str,
    append_dim: &str,
    concat_dim: &str,
) -> Result<String> {
    combine_and_write_report(resolver, sources, target, append_dim, concat_dim)
        .map(|report| report.target)
}

pub fn combine_and_write_report(
    resolver: &Resolver,
    sources: &[String],
    target: &str,
    append_dim: &str,
    concat_dim: &str,
) -> Result<CombineReport> {
    if append_dim.trim().is_empty() {
        return Err(BakeryError::InvalidArgument(
            "append dimension must be a non-empty string".to_string(),
        ));
    }
    let store = resolver.mapper(target)?;

    let combined = combine_sources(resolver, sources, concat_dim)?;
    let append_length = combined.dim_len(append_dim).ok_or_else(|| {
        BakeryError::conflict(format!(
            "append dimension '{append_dim}' is missing from the combined batch"
        ))
    })?;
    let combined = combined.rechunk(append_dim, append_length.max(1))?;

    let write_mode = select_write_mode(&store)?;
    let summary = write_dataset(&store, &combined, append_dim, write_mode)?;

    info!(
        component = COMPONENT,
        event = "batch_written",
        store = target,
        write_mode = write_mode.as_str(),
        sources = sources.len(),
        append_length,
        store_length = summary.append_len(),
        "batch written to target store"
    );

    Ok(CombineReport {
        target: target.to_string(),
        write_mode,
        sources_processed: sources.len(),
        append_length,
        summary,
    })
}
