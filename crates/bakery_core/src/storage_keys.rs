//! Object key layout for target stores and batch outcome records.

pub const GROUP_METADATA_KEY: &str = ".zgroup";
pub const GROUP_ATTRS_KEY: &str = ".zattrs";
pub const APPEND_METADATA_KEY: &str = ".zappend";
pub const ARRAY_METADATA_NAME: &str = ".zarray";
pub const ARRAY_ATTRS_NAME: &str = ".zattrs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    BatchOutcomes,
    RunContext,
}

impl DatasetKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::BatchOutcomes => "batch_outcomes",
            Self::RunContext => "run_context",
        }
    }
}

pub fn array_metadata_key(variable: &str) -> String {
    format!("{variable}/{ARRAY_METADATA_NAME}")
}

pub fn array_attrs_key(variable: &str) -> String {
    format!("{variable}/{ARRAY_ATTRS_NAME}")
}

/// Chunk key using dot-separated grid coordinates, e.g. `Tair/3.0.0`.
///
/// Scalar variables have an empty grid and map to `<variable>/0`.
pub fn chunk_key(variable: &str, grid_coords: &[usize]) -> String {
    if grid_coords.is_empty() {
        return format!("{variable}/0");
    }
    let coords = grid_coords
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(".");
    format!("{variable}/{coords}")
}

/// Join a store root and a relative key without doubling separators.
pub fn join_key(root: &str, key: &str) -> String {
    let root = root.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    if root.is_empty() {
        key.to_string()
    } else {
        format!("{root}/{key}")
    }
}

pub fn partition_prefix(
    base_prefix: &str,
    dataset: DatasetKind,
    run_date: &str,
    run_id: &str,
    status: &str,
) -> String {
    let trimmed = base_prefix.trim_matches('/');
    format!(
        "{trimmed}/dataset={}/run_date={run_date}/run_id_partition={run_id}/status_partition={status}",
        dataset.as_str(),
    )
}

pub fn success_outcome_object_key(
    base_prefix: &str,
    run_date: &str,
    run_id: &str,
    batch_id: usize,
) -> String {
    format!(
        "{}/batch_id_partition={batch_id}/part-0.parquet",
        partition_prefix(
            base_prefix,
            DatasetKind::BatchOutcomes,
            run_date,
            run_id,
            "success",
        ),
    )
}

pub fn failure_outcome_object_key(
    base_prefix: &str,
    run_date: &str,
    run_id: &str,
    batch_id: usize,
) -> String {
    format!(
        "{}/batch_id_partition={batch_id}/part-0.parquet",
        partition_prefix(
            base_prefix,
            DatasetKind::BatchOutcomes,
            run_date,
            run_id,
            "failure",
        ),
    )
}

pub fn run_context_object_key(
    base_prefix: &str,
    run_date: &str,
    run_id: &str,
    status: &str,
) -> String {
    format!(
        "{}/part-0.json",
        partition_prefix(base_prefix, DatasetKind::RunContext, run_date, run_id, status)
    )
}
