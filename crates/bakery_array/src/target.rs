//! Chunked target store: create, append and read back.
//!
//! Layout follows the zarr v2 directory convention with a regular chunk grid.
//! The grid length along the append dimension is fixed by the batch that
//! creates the store; all other dimensions form a single chunk. Edge chunks
//! are stored full size and padded with the fill value, and an append first
//! fills the trailing partial chunk before starting new ones.
//!
//! `.zappend` records the committed write boundaries along the append
//! dimension. It is written after the chunks and array shapes of each piece,
//! and reads only trust the extent it commits, so a write that fails part way
//! leaves the previous commit intact.

use std::ops::Range;

use bakery_core::storage_keys::{
    array_attrs_key, array_metadata_key, chunk_key, APPEND_METADATA_KEY, ARRAY_METADATA_NAME,
    GROUP_ATTRS_KEY, GROUP_METADATA_KEY,
};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dataset::{Attrs, Dataset, Variable};
use crate::error::{BakeryError, Result};
use crate::store::StoreMapper;

const ZARR_FORMAT: u8 = 2;
const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
const F64_DTYPE: &str = "<f8";
const F64_BYTES: usize = std::mem::size_of::<f64>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Create,
    Append,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Append => "append",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub append_dim: String,
    /// `[0, n1, n1 + n2, ...]`: the end of every committed write along the
    /// append dimension.
    pub chunk_bounds: Vec<usize>,
}

impl StoreSummary {
    pub fn append_len(&self) -> usize {
        self.chunk_bounds.last().copied().unwrap_or(0)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_bounds.len().saturating_sub(1)
    }

    pub fn batch_ranges(&self) -> Vec<Range<usize>> {
        self.chunk_bounds
            .windows(2)
            .map(|pair| pair[0]..pair[1])
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayMetadata {
    zarr_format: u8,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    dtype: String,
    order: String,
    fill_value: Value,
    compressor: Option<Value>,
    filters: Option<Value>,
}

impl ArrayMetadata {
    fn float64(shape: Vec<usize>, chunks: Vec<usize>) -> Self {
        Self {
            zarr_format: ZARR_FORMAT,
            shape,
            chunks,
            dtype: F64_DTYPE.to_string(),
            order: "C".to_string(),
            fill_value: json!("NaN"),
            compressor: None,
            filters: None,
        }
    }
}

/// `Create` for an empty store, `Append` for anything else.
pub fn select_write_mode(store: &StoreMapper) -> Result<WriteMode> {
    if store.is_empty()? {
        Ok(WriteMode::Create)
    } else {
        Ok(WriteMode::Append)
    }
}

/// Committed layout of a store, or `None` when nothing has been committed.
pub fn read_summary(store: &StoreMapper) -> Result<Option<StoreSummary>> {
    read_json(store, APPEND_METADATA_KEY)
}

/// Write `dataset` in the given mode. Chunk boundaries along `append_dim`
/// follow the dataset's chunk length for that dimension.
pub fn write_dataset(
    store: &StoreMapper,
    dataset: &Dataset,
    append_dim: &str,
    mode: WriteMode,
) -> Result<StoreSummary> {
    if append_dim.trim().is_empty() {
        return Err(BakeryError::InvalidArgument(
            "append dimension must be a non-empty string".to_string(),
        ));
    }
    if dataset.is_empty() {
        return Err(BakeryError::InvalidArgument(
            "cannot write a dataset without variables".to_string(),
        ));
    }
    let (Some(batch_len), Some(chunk_len)) =
        (dataset.dim_len(append_dim), dataset.chunk_len(append_dim))
    else {
        return Err(BakeryError::conflict(format!(
            "append dimension '{append_dim}' is missing from the dataset"
        )));
    };

    match mode {
        WriteMode::Create => create(store, dataset, append_dim, batch_len, chunk_len),
        WriteMode::Append => append(store, dataset, append_dim, batch_len, chunk_len),
    }
}

fn create(
    store: &StoreMapper,
    dataset: &Dataset,
    append_dim: &str,
    batch_len: usize,
    chunk_len: usize,
) -> Result<StoreSummary> {
    store.clear()?;
    put_json(store, GROUP_METADATA_KEY, &json!({ "zarr_format": ZARR_FORMAT }))?;
    put_json(store, GROUP_ATTRS_KEY, dataset.attrs())?;

    for (name, variable) in dataset.variables() {
        // Append-dimension extents grow as pieces are committed.
        let (shape, chunks) = match variable.axis_of(append_dim) {
            Some(axis) => (
                with_axis(variable.shape(), axis, 0),
                with_axis(variable.shape(), axis, chunk_len.max(1)),
            ),
            None => (variable.shape().to_vec(), variable.shape().to_vec()),
        };
        put_json(store, &array_metadata_key(name), &ArrayMetadata::float64(shape, chunks))?;

        let mut attrs = variable.attrs().clone();
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!(variable.dims()));
        put_json(store, &array_attrs_key(name), &attrs)?;

        if variable.axis_of(append_dim).is_none() {
            store.put(
                &chunk_key(name, &vec![0; variable.dims().len()]),
                &encode_chunk(variable.data().view()),
            )?;
        }
    }

    let summary = StoreSummary {
        append_dim: append_dim.to_string(),
        chunk_bounds: vec![0],
    };
    if batch_len == 0 {
        put_json(store, APPEND_METADATA_KEY, &summary)?;
    }
    write_append_chunks(store, dataset, summary, batch_len, chunk_len)
}

fn append(
    store: &StoreMapper,
    dataset: &Dataset,
    append_dim: &str,
    batch_len: usize,
    chunk_len: usize,
) -> Result<StoreSummary> {
    let summary = read_summary(store)?.ok_or_else(|| {
        BakeryError::conflict(format!(
            "store '{}' is not empty but has no committed '{APPEND_METADATA_KEY}'",
            store.locator()
        ))
    })?;
    if summary.append_dim != append_dim {
        return Err(BakeryError::conflict(format!(
            "store '{}' appends along '{}', not '{append_dim}'",
            store.locator(),
            summary.append_dim
        )));
    }

    let stored = stored_variable_names(store)?;
    let incoming: Vec<String> = dataset.variables().keys().cloned().collect();
    if stored != incoming {
        return Err(BakeryError::conflict(format!(
            "batch has variables {incoming:?}, store has {stored:?}"
        )));
    }

    for (name, variable) in dataset.variables() {
        let (dims, _) = read_variable_attrs(store, name)?;
        if dims != variable.dims() {
            return Err(BakeryError::conflict(format!(
                "variable '{name}' has dimensions {:?}, store has {dims:?}",
                variable.dims()
            )));
        }
        let Some(axis) = variable.axis_of(append_dim) else {
            ensure_static_matches(store, name, variable)?;
            continue;
        };
        let metadata = read_array_metadata(store, name)?;
        let expected = with_axis(&metadata.shape, axis, batch_len);
        if expected != variable.shape() {
            return Err(BakeryError::conflict(format!(
                "variable '{name}' has shape {:?}, store expects {expected:?}",
                variable.shape()
            )));
        }
    }

    write_append_chunks(store, dataset, summary, batch_len, chunk_len)
}

fn write_append_chunks(
    store: &StoreMapper,
    dataset: &Dataset,
    mut summary: StoreSummary,
    batch_len: usize,
    chunk_len: usize,
) -> Result<StoreSummary> {
    let append_dim = summary.append_dim.clone();
    let base = summary.append_len();
    let mut start = 0;

    while start < batch_len {
        let end = (start + chunk_len).min(batch_len);

        let mut grown = Vec::new();
        for (name, variable) in dataset.variables() {
            let Some(axis) = variable.axis_of(&append_dim) else {
                continue;
            };
            let mut metadata = read_array_metadata(store, name)?;
            let rows = variable
                .data()
                .slice_axis(Axis(axis), Slice::from(start..end));
            write_grid_rows(store, name, &metadata, axis, rows, base + start)?;
            metadata.shape[axis] = base + end;
            grown.push((name, metadata));
        }
        for (name, metadata) in grown {
            put_json(store, &array_metadata_key(name), &metadata)?;
        }

        summary.chunk_bounds.push(base + end);
        put_json(store, APPEND_METADATA_KEY, &summary)?;
        start = end;
    }

    Ok(summary)
}

/// Write `rows` at `offset` along `axis` into the variable's chunk grid.
/// Rows already in a partially filled chunk are read back and rewritten
/// unchanged.
fn write_grid_rows(
    store: &StoreMapper,
    name: &str,
    metadata: &ArrayMetadata,
    axis: usize,
    rows: ArrayViewD<'_, f64>,
    offset: usize,
) -> Result<()> {
    let grid_len = metadata.chunks[axis].max(1);
    let end = offset + rows.len_of(Axis(axis));
    let mut grid_index = offset / grid_len;

    while grid_index * grid_len < end {
        let chunk_start = grid_index * grid_len;
        let lo = offset.max(chunk_start);
        let hi = end.min(chunk_start + grid_len);

        let mut coords = vec![0; metadata.chunks.len()];
        coords[axis] = grid_index;
        let key = chunk_key(name, &coords);
        let mut chunk = if lo > chunk_start {
            read_chunk(store, &key, &metadata.chunks)?
        } else {
            ArrayD::from_elem(IxDyn(&metadata.chunks), f64::NAN)
        };
        chunk
            .slice_axis_mut(Axis(axis), Slice::from(lo - chunk_start..hi - chunk_start))
            .assign(&rows.slice_axis(Axis(axis), Slice::from(lo - offset..hi - offset)));
        store.put(&key, &encode_chunk(chunk.view()))?;

        grid_index += 1;
    }
    Ok(())
}

fn ensure_static_matches(store: &StoreMapper, name: &str, variable: &Variable) -> Result<()> {
    let metadata = read_array_metadata(store, name)?;
    if metadata.shape != variable.shape() {
        return Err(BakeryError::conflict(format!(
            "variable '{name}' has shape {:?}, store has {:?}",
            variable.shape(),
            metadata.shape
        )));
    }
    let stored = read_chunk(store, &chunk_key(name, &vec![0; metadata.shape.len()]), &metadata.shape)?;
    let same = stored
        .iter()
        .zip(variable.data().iter())
        .all(|(left, right)| left == right || (left.is_nan() && right.is_nan()));
    if !same {
        return Err(BakeryError::conflict(format!(
            "variable '{name}' differs from the stored copy"
        )));
    }
    Ok(())
}

/// Read the whole store back as one dataset.
pub fn open_store(store: &StoreMapper) -> Result<Dataset> {
    let summary = read_summary(store)?.ok_or_else(|| {
        BakeryError::storage_access(store.locator(), "store has no committed data")
    })?;
    let attrs: Attrs = read_json(store, GROUP_ATTRS_KEY)?.unwrap_or_default();
    let mut dataset = Dataset::new().with_attrs(attrs);

    for name in stored_variable_names(store)? {
        let metadata = read_array_metadata(store, &name)?;
        let (dims, attrs) = read_variable_attrs(store, &name)?;
        let data = match dims.iter().position(|dim| *dim == summary.append_dim) {
            Some(axis) => read_append_variable(store, &name, &metadata, &summary, axis)?,
            None => {
                let key = chunk_key(&name, &vec![0; metadata.shape.len()]);
                read_chunk(store, &key, &metadata.shape)?
            }
        };
        let variable = Variable::new(dims, data)
            .map_err(|error| BakeryError::storage_access(store.locator(), error))?
            .with_attrs(attrs);
        dataset.insert_variable(name, variable)?;
    }

    Ok(dataset)
}

fn read_append_variable(
    store: &StoreMapper,
    name: &str,
    metadata: &ArrayMetadata,
    summary: &StoreSummary,
    axis: usize,
) -> Result<ArrayD<f64>> {
    let committed = summary.append_len();
    let grid_len = metadata.chunks[axis].max(1);
    let chunk_count = committed.div_ceil(grid_len);
    if chunk_count == 0 {
        let shape = with_axis(&metadata.shape, axis, 0);
        return Ok(ArrayD::from_elem(IxDyn(&shape), f64::NAN));
    }

    let mut pieces = Vec::with_capacity(chunk_count);
    for index in 0..chunk_count {
        let mut coords = vec![0; metadata.chunks.len()];
        coords[axis] = index;
        pieces.push(read_chunk(store, &chunk_key(name, &coords), &metadata.chunks)?);
    }

    let views: Vec<ArrayViewD<'_, f64>> = pieces.iter().map(|piece| piece.view()).collect();
    let joined = ndarray::concatenate(Axis(axis), &views).map_err(|error| {
        BakeryError::storage_access(
            format!("{}/{name}", store.locator()),
            format!("chunks do not line up: {error}"),
        )
    })?;
    // Trailing padding and anything past the commit point are not data.
    Ok(joined
        .slice_axis(Axis(axis), Slice::from(0..committed))
        .to_owned())
}

/// Missing chunks read as the fill value.
fn read_chunk(store: &StoreMapper, key: &str, shape: &[usize]) -> Result<ArrayD<f64>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(ArrayD::from_elem(IxDyn(shape), f64::NAN));
    };
    let expected: usize = shape.iter().product::<usize>() * F64_BYTES;
    if bytes.len() != expected {
        return Err(BakeryError::storage_access(
            store.locator(),
            format!("chunk '{key}' holds {} bytes, expected {expected}", bytes.len()),
        ));
    }
    let values = bytes
        .chunks_exact(F64_BYTES)
        .map(|raw| {
            let mut word = [0u8; F64_BYTES];
            word.copy_from_slice(raw);
            f64::from_le_bytes(word)
        })
        .collect();
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|error| BakeryError::storage_access(store.locator(), error))
}

fn encode_chunk(data: ArrayViewD<'_, f64>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() * F64_BYTES);
    for value in data.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn stored_variable_names(store: &StoreMapper) -> Result<Vec<String>> {
    let suffix = format!("/{ARRAY_METADATA_NAME}");
    let mut names: Vec<String> = store
        .keys()?
        .into_iter()
        .filter_map(|key| key.strip_suffix(&suffix).map(str::to_string))
        .filter(|name| !name.contains('/'))
        .collect();
    names.sort();
    Ok(names)
}

fn read_array_metadata(store: &StoreMapper, name: &str) -> Result<ArrayMetadata> {
    let key = array_metadata_key(name);
    let metadata: ArrayMetadata = read_json(store, &key)?
        .ok_or_else(|| BakeryError::storage_access(store.locator(), format!("'{key}' is missing")))?;
    if metadata.dtype != F64_DTYPE {
        return Err(BakeryError::conflict(format!(
            "variable '{name}' is stored as {}, only {F64_DTYPE} is supported",
            metadata.dtype
        )));
    }
    Ok(metadata)
}

fn read_variable_attrs(store: &StoreMapper, name: &str) -> Result<(Vec<String>, Attrs)> {
    let key = array_attrs_key(name);
    let mut attrs: Attrs = read_json(store, &key)?.unwrap_or_default();
    let dims = match attrs.remove(DIMENSIONS_ATTR) {
        Some(value) => serde_json::from_value(value).map_err(|error| {
            BakeryError::storage_access(store.locator(), format!("'{key}' is malformed: {error}"))
        })?,
        None => {
            return Err(BakeryError::storage_access(
                store.locator(),
                format!("'{key}' lacks {DIMENSIONS_ATTR}"),
            ))
        }
    };
    Ok((dims, attrs))
}

fn read_json<T: DeserializeOwned>(store: &StoreMapper, key: &str) -> Result<Option<T>> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|error| BakeryError::storage_access(store.locator(), format!("'{key}' is malformed: {error}")))
}

fn put_json(store: &StoreMapper, key: &str, value: &impl Serialize) -> Result<()> {
    let body = serde_json::to_vec(value)
        .map_err(|error| BakeryError::storage_access(store.locator(), error))?;
    store.put(key, &body)
}

fn with_axis(shape: &[usize], axis: usize, len: usize) -> Vec<usize> {
    let mut shape = shape.to_vec();
    shape[axis] = len;
    shape
}
