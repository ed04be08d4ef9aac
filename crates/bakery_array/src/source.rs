//! Parquet encoding of source files.
//!
//! A source file holds one contiguous slice of a dataset along its row
//! dimension. Every column is one variable whose leading dimension is the
//! row dimension: `Float64` for 1-D variables and `FixedSizeList<Float64>`
//! for variables with trailing dimensions. Dimension names, trailing shape
//! and attributes travel in Arrow schema and field metadata.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, FixedSizeListArray, Float64Array};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use ndarray::{ArrayD, IxDyn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::dataset::{Attrs, Dataset, Variable};
use crate::error::{BakeryError, Result};
use crate::locator::Resolver;

pub const ROW_DIM_METADATA_KEY: &str = "bakery:row_dim";
pub const ATTRS_METADATA_KEY: &str = "bakery:attrs";
pub const DIMS_METADATA_KEY: &str = "bakery:dims";
pub const SHAPE_METADATA_KEY: &str = "bakery:shape";

pub fn encode_source(dataset: &Dataset, row_dim: &str) -> Result<Vec<u8>> {
    if dataset.is_empty() {
        return Err(BakeryError::InvalidArgument(
            "cannot encode a dataset without variables".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(dataset.variables().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(dataset.variables().len());

    for (name, variable) in dataset.variables() {
        if variable.dims().first().map(String::as_str) != Some(row_dim) {
            return Err(BakeryError::InvalidArgument(format!(
                "variable '{name}' must lead with row dimension '{row_dim}', has {:?}",
                variable.dims()
            )));
        }

        let trailing_shape = &variable.shape()[1..];
        let row_width: usize = trailing_shape.iter().product();
        let values = Float64Array::from(variable.values());

        let (data_type, column): (DataType, ArrayRef) = if trailing_shape.is_empty() {
            (DataType::Float64, Arc::new(values) as ArrayRef)
        } else {
            if row_width == 0 {
                return Err(BakeryError::InvalidArgument(format!(
                    "variable '{name}' has an empty trailing shape {trailing_shape:?}"
                )));
            }
            let width = i32::try_from(row_width).map_err(|_| {
                BakeryError::InvalidArgument(format!(
                    "variable '{name}' rows are too wide to encode"
                ))
            })?;
            let item = Arc::new(Field::new("item", DataType::Float64, false));
            let list = FixedSizeListArray::try_new(item.clone(), width, Arc::new(values) as ArrayRef, None)
                .map_err(|error| {
                    BakeryError::InvalidArgument(format!(
                        "failed to build column for '{name}': {error}"
                    ))
                })?;
            (DataType::FixedSizeList(item, width), Arc::new(list) as ArrayRef)
        };

        let metadata = HashMap::from([
            (DIMS_METADATA_KEY.to_string(), to_json(variable.dims())?),
            (SHAPE_METADATA_KEY.to_string(), to_json(trailing_shape)?),
            (ATTRS_METADATA_KEY.to_string(), to_json(variable.attrs())?),
        ]);
        fields.push(Field::new(name, data_type, false).with_metadata(metadata));
        columns.push(column);
    }

    let schema = Arc::new(Schema::new_with_metadata(
        fields,
        HashMap::from([
            (ROW_DIM_METADATA_KEY.to_string(), row_dim.to_string()),
            (ATTRS_METADATA_KEY.to_string(), to_json(dataset.attrs())?),
        ]),
    ));
    let batch = RecordBatch::try_new(schema, columns).map_err(|error| {
        BakeryError::InvalidArgument(format!("failed to build source record batch: {error}"))
    })?;

    let mut buffer = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))
        .map_err(|error| BakeryError::InvalidArgument(format!("failed to create parquet writer: {error}")))?;
    writer
        .write(&batch)
        .map_err(|error| BakeryError::InvalidArgument(format!("failed to write source batch: {error}")))?;
    writer
        .close()
        .map_err(|error| BakeryError::InvalidArgument(format!("failed to close parquet writer: {error}")))?;

    Ok(buffer)
}

/// Decode a source file. `url` only labels errors.
pub fn decode_source(url: &str, bytes: Vec<u8>) -> Result<Dataset> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
        .map_err(|error| BakeryError::source_unavailable(url, format!("not a parquet source: {error}")))?;
    let schema = builder.schema().clone();

    let row_dim = schema
        .metadata()
        .get(ROW_DIM_METADATA_KEY)
        .cloned()
        .ok_or_else(|| {
            BakeryError::source_unavailable(url, format!("schema metadata lacks '{ROW_DIM_METADATA_KEY}'"))
        })?;
    let dataset_attrs: Attrs = match schema.metadata().get(ATTRS_METADATA_KEY) {
        Some(text) => from_json(url, text)?,
        None => Attrs::new(),
    };

    let reader = builder
        .build()
        .map_err(|error| BakeryError::source_unavailable(url, format!("failed to build parquet reader: {error}")))?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); schema.fields().len()];
    let mut rows = 0usize;
    for batch in reader {
        let batch = batch
            .map_err(|error| BakeryError::source_unavailable(url, format!("failed to read parquet batch: {error}")))?;
        rows += batch.num_rows();
        for (idx, column) in batch.columns().iter().enumerate() {
            append_column_values(column, &mut columns[idx])
                .map_err(|reason| BakeryError::source_unavailable(url, reason))?;
        }
    }

    let mut dataset = Dataset::new().with_attrs(dataset_attrs);
    for (field, values) in schema.fields().iter().zip(columns) {
        let metadata = field.metadata();
        let dims: Vec<String> = match metadata.get(DIMS_METADATA_KEY) {
            Some(text) => from_json(url, text)?,
            None => vec![row_dim.clone()],
        };
        let trailing_shape: Vec<usize> = match metadata.get(SHAPE_METADATA_KEY) {
            Some(text) => from_json(url, text)?,
            None => Vec::new(),
        };
        let attrs: Attrs = match metadata.get(ATTRS_METADATA_KEY) {
            Some(text) => from_json(url, text)?,
            None => Attrs::new(),
        };

        let mut shape = Vec::with_capacity(trailing_shape.len() + 1);
        shape.push(rows);
        shape.extend(trailing_shape);
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|error| {
            BakeryError::source_unavailable(
                url,
                format!("column '{}' does not fit shape {shape:?}: {error}", field.name()),
            )
        })?;
        let variable = Variable::new(dims, data)
            .map_err(|error| BakeryError::source_unavailable(url, error))?
            .with_attrs(attrs);
        dataset.insert_variable(field.name().clone(), variable)?;
    }

    Ok(dataset)
}

/// Open one source: resolve the URL to a backend, read the bytes, decode.
pub fn open_source(resolver: &Resolver, url: &str) -> Result<Dataset> {
    let bytes = resolver.open_bytes(url)?;
    decode_source(url, bytes)
}

pub fn open_sources(resolver: &Resolver, urls: &[String]) -> Result<Vec<Dataset>> {
    urls.iter().map(|url| open_source(resolver, url)).collect()
}

fn append_column_values(column: &ArrayRef, out: &mut Vec<f64>) -> Result<(), String> {
    match column.data_type() {
        DataType::Float64 => {
            let values = column
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| "Float64 column could not be read".to_string())?;
            out.extend(values.iter().map(|value| value.unwrap_or(f64::NAN)));
            Ok(())
        }
        DataType::FixedSizeList(_, width) => {
            let list = column
                .as_fixed_size_list_opt()
                .ok_or_else(|| "fixed-size list column could not be read".to_string())?;
            let width = usize::try_from(*width).map_err(|_| "negative list width".to_string())?;
            let start = usize::try_from(list.value_offset(0)).unwrap_or(0);
            let child = list.values().slice(start, list.len() * width);
            let values = child
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| format!("list items must be Float64, found {}", child.data_type()))?;
            out.extend(values.iter().map(|value| value.unwrap_or(f64::NAN)));
            Ok(())
        }
        other => Err(format!("unsupported column type {other}")),
    }
}

fn to_json(value: impl serde::Serialize) -> Result<String> {
    serde_json::to_string(&value)
        .map_err(|error| BakeryError::InvalidArgument(format!("failed to encode metadata: {error}")))
}

fn from_json<T: serde::de::DeserializeOwned>(url: &str, text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|error| BakeryError::source_unavailable(url, format!("invalid metadata: {error}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Dataset {
        Dataset::new()
            .with_attrs(Attrs::from([("title".to_string(), json!("rasm"))]))
            .with_variable(
                "time",
                Variable::from_shape_vec(&["time"], &[3], vec![0.0, 1.0, 2.0])
                    .expect("valid shape")
                    .with_attrs(Attrs::from([("units".to_string(), json!("days"))])),
            )
            .and_then(|ds| {
                ds.with_variable(
                    "Tair",
                    Variable::from_shape_vec(
                        &["time", "y", "x"],
                        &[3, 2, 2],
                        (0..12).map(f64::from).collect(),
                    )
                    .expect("valid shape"),
                )
            })
            .expect("consistent dataset")
    }

    #[test]
    fn codec_preserves_dims_attrs_and_values() {
        let bytes = encode_source(&sample(), "time").expect("encode");
        assert!(bytes.starts_with(b"PAR1"));

        let decoded = decode_source("memory://cache/0.parquet", bytes).expect("decode");
        assert_eq!(decoded, sample());
        assert_eq!(
            decoded.variable("Tair").expect("Tair exists").dims(),
            ["time".to_string(), "y".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn encode_requires_leading_row_dimension() {
        let error = encode_source(&sample(), "x").expect_err("x is not leading");
        assert_eq!(error.code(), "invalid_argument");
    }

    #[test]
    fn decode_rejects_non_parquet_bytes() {
        let error = decode_source("memory://cache/bad", b"not parquet".to_vec())
            .expect_err("garbage should fail");
        assert_eq!(error.code(), "source_unavailable");
        assert!(error.to_string().contains("memory://cache/bad"));
    }

    #[test]
    fn open_source_reads_through_resolver() {
        let resolver = Resolver::new();
        resolver
            .put_bytes(
                "memory://cache/0.parquet",
                &encode_source(&sample(), "time").expect("encode"),
            )
            .expect("put");

        let opened = open_source(&resolver, "memory://cache/0.parquet").expect("open");
        assert_eq!(opened.dim_len("time"), Some(3));
    }
}
