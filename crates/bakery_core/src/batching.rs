use crate::contract::{BatchAssignment, NormalizedRecipeRequest, ValidationError};

/// Partition `items` into consecutive groups of `size`.
///
/// Every group holds exactly `size` items except the last, which holds the
/// remainder when `items.len()` is not a multiple of `size`. The returned
/// iterator is lazy and borrows `items`; calling `chunk` again restarts it.
pub fn chunk<T>(items: &[T], size: usize) -> Result<std::slice::Chunks<'_, T>, ValidationError> {
    if size == 0 {
        return Err(ValidationError::new("chunk size must be a positive integer"));
    }
    Ok(items.chunks(size))
}

/// Owned variant of [`chunk`] for stages that hand batches off to other owners.
pub fn chunk_owned<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>, ValidationError> {
    Ok(chunk(items, size)?.map(<[T]>::to_vec).collect())
}

pub fn compute_batch_plan(
    request: &NormalizedRecipeRequest,
) -> Result<Vec<BatchAssignment>, ValidationError> {
    let total_sources = request.sources.len();
    if total_sources == 0 {
        return Err(ValidationError::new("No sources to process"));
    }

    let batch_count = total_sources.div_ceil(request.batch_size);
    if batch_count > request.max_batches {
        return Err(ValidationError::new(format!(
            "Computed batch count {batch_count} exceeds max_batches={}",
            request.max_batches
        )));
    }

    let mut assignments = Vec::with_capacity(batch_count);
    let mut cursor = 0usize;
    for (batch_id, group) in chunk(&request.sources, request.batch_size)?.enumerate() {
        let start_index = cursor;
        let end_index_exclusive = cursor + group.len();
        assignments.push(BatchAssignment {
            batch_id,
            start_index,
            end_index_exclusive,
        });
        cursor = end_index_exclusive;
    }

    validate_assignments(total_sources, &assignments)?;
    Ok(assignments)
}

fn validate_assignments(
    total_sources: usize,
    assignments: &[BatchAssignment],
) -> Result<(), ValidationError> {
    if assignments.is_empty() {
        return Err(ValidationError::new("No batches to process"));
    }

    if assignments[0].start_index != 0
        || assignments[assignments.len() - 1].end_index_exclusive != total_sources
    {
        return Err(ValidationError::new(
            "Batch boundaries do not cover the full source list",
        ));
    }

    for idx in 1..assignments.len() {
        if assignments[idx - 1].end_index_exclusive != assignments[idx].start_index {
            return Err(ValidationError::new(
                "Batch boundaries overlap or leave gaps",
            ));
        }
    }

    Ok(())
}
