//! In-memory labelled N-dimensional datasets.
//!
//! A [`Dataset`] is a set of named [`Variable`]s. Each variable is an `f64`
//! array whose axes are labelled by dimension names; every variable sharing
//! a dimension name must agree on its length. Datasets also carry free-form
//! JSON attributes and per-dimension chunk lengths used when writing to a
//! target store.

use std::collections::BTreeMap;
use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde_json::Value;

use crate::error::{BakeryError, Result};

pub type Attrs = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    dims: Vec<String>,
    data: ArrayD<f64>,
    attrs: Attrs,
}

impl Variable {
    pub fn new(dims: Vec<String>, data: ArrayD<f64>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(BakeryError::InvalidArgument(format!(
                "{} dimension names given for a {}-dimensional array",
                dims.len(),
                data.ndim()
            )));
        }
        for (idx, dim) in dims.iter().enumerate() {
            if dim.trim().is_empty() {
                return Err(BakeryError::InvalidArgument(
                    "dimension names must be non-empty strings".to_string(),
                ));
            }
            if dims[..idx].contains(dim) {
                return Err(BakeryError::InvalidArgument(format!(
                    "dimension '{dim}' appears more than once"
                )));
            }
        }
        Ok(Self {
            dims,
            data,
            attrs: Attrs::new(),
        })
    }

    /// Build a variable from values laid out in row-major order.
    pub fn from_shape_vec(dims: &[&str], shape: &[usize], values: Vec<f64>) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|error| {
            BakeryError::InvalidArgument(format!("values do not fit shape {shape:?}: {error}"))
        })?;
        Self::new(dims.iter().map(|dim| dim.to_string()).collect(), data)
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|name| name == dim)
    }

    pub fn len_along(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.data.len_of(Axis(axis)))
    }

    /// Values in row-major order, independent of memory layout.
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn slice_along(&self, dim: &str, range: Range<usize>) -> Result<Self> {
        let Some(axis) = self.axis_of(dim) else {
            return Ok(self.clone());
        };
        let len = self.data.len_of(Axis(axis));
        if range.start > range.end || range.end > len {
            return Err(BakeryError::InvalidArgument(format!(
                "range {range:?} is outside dimension '{dim}' of length {len}"
            )));
        }
        Ok(Self {
            dims: self.dims.clone(),
            data: self
                .data
                .slice_axis(Axis(axis), Slice::from(range))
                .to_owned(),
            attrs: self.attrs.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: BTreeMap<String, Variable>,
    attrs: Attrs,
    chunks: BTreeMap<String, usize>,
}

// Chunk lengths are an encoding hint and do not take part in equality.
impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables && self.attrs == other.attrs
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Result<Self> {
        self.insert_variable(name, variable)?;
        Ok(self)
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn insert_variable(&mut self, name: impl Into<String>, variable: Variable) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(BakeryError::InvalidArgument(format!(
                "'{name}' is not a valid variable name"
            )));
        }

        let dims = self.dims();
        for (dim, len) in variable.dims().iter().zip(variable.shape()) {
            if let Some(existing) = dims.get(dim) {
                if existing != len {
                    return Err(BakeryError::conflict(format!(
                        "variable '{name}' has length {len} along '{dim}', dataset has {existing}"
                    )));
                }
            }
        }

        self.variables.insert(name, variable);
        Ok(())
    }

    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn dims(&self) -> BTreeMap<String, usize> {
        let mut dims = BTreeMap::new();
        for variable in self.variables.values() {
            for (dim, len) in variable.dims().iter().zip(variable.shape()) {
                dims.entry(dim.clone()).or_insert(*len);
            }
        }
        dims
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.variables
            .values()
            .find_map(|variable| variable.len_along(dim))
    }

    /// Set the chunk length along `dim`; other dimensions stay whole.
    pub fn rechunk(mut self, dim: &str, chunk_len: usize) -> Result<Self> {
        if self.dim_len(dim).is_none() {
            return Err(BakeryError::conflict(format!(
                "dimension '{dim}' is not present in the dataset"
            )));
        }
        if chunk_len == 0 {
            return Err(BakeryError::InvalidArgument(format!(
                "chunk length along '{dim}' must be positive"
            )));
        }
        self.chunks.insert(dim.to_string(), chunk_len);
        Ok(self)
    }

    /// Chunk length along `dim`, defaulting to the full dimension length.
    pub fn chunk_len(&self, dim: &str) -> Option<usize> {
        let len = self.dim_len(dim)?;
        Some(self.chunks.get(dim).copied().unwrap_or(len).min(len))
    }

    pub fn chunks(&self) -> &BTreeMap<String, usize> {
        &self.chunks
    }

    pub fn slice_along(&self, dim: &str, range: Range<usize>) -> Result<Self> {
        let mut variables = BTreeMap::new();
        for (name, variable) in &self.variables {
            variables.insert(name.clone(), variable.slice_along(dim, range.clone())?);
        }
        Ok(Self {
            variables,
            attrs: self.attrs.clone(),
            chunks: BTreeMap::new(),
        })
    }

    /// Join `datasets` along `dim` in the order given.
    ///
    /// Variables spanning `dim` are concatenated. Variables that do not span
    /// it must be identical in every dataset and are kept once. When no
    /// dataset has `dim` at all, the datasets are stacked along a new leading
    /// dimension of that name. Attributes come from the first dataset.
    pub fn concat(datasets: &[Dataset], dim: &str) -> Result<Self> {
        let Some((first, rest)) = datasets.split_first() else {
            return Err(BakeryError::InvalidArgument(
                "cannot concatenate an empty list of datasets".to_string(),
            ));
        };

        for (offset, dataset) in rest.iter().enumerate() {
            if !dataset.variables.keys().eq(first.variables.keys()) {
                return Err(BakeryError::conflict(format!(
                    "dataset {} has variables {:?}, expected {:?}",
                    offset + 1,
                    dataset.variables.keys().collect::<Vec<_>>(),
                    first.variables.keys().collect::<Vec<_>>(),
                )));
            }
        }

        let stack_new_axis = datasets.iter().all(|dataset| dataset.dim_len(dim).is_none());
        let mut combined = Dataset::new().with_attrs(first.attrs.clone());

        for (name, head) in &first.variables {
            let parts: Vec<&Variable> = datasets
                .iter()
                .map(|dataset| &dataset.variables[name])
                .collect();

            for part in &parts[1..] {
                if part.dims() != head.dims() {
                    return Err(BakeryError::conflict(format!(
                        "variable '{name}' has dimensions {:?} in one source and {:?} in another",
                        head.dims(),
                        part.dims()
                    )));
                }
            }

            let variable = if stack_new_axis {
                stack_parts(name, &parts, dim)?
            } else if let Some(axis) = head.axis_of(dim) {
                concat_parts(name, &parts, dim, axis)?
            } else if parts[1..].iter().all(|part| **part == *head) {
                head.clone()
            } else {
                return Err(BakeryError::conflict(format!(
                    "variable '{name}' does not span '{dim}' and differs between sources"
                )));
            };
            combined.insert_variable(name.clone(), variable)?;
        }

        Ok(combined)
    }
}

fn concat_parts(name: &str, parts: &[&Variable], dim: &str, axis: usize) -> Result<Variable> {
    let views: Vec<ArrayViewD<'_, f64>> = parts.iter().map(|part| part.data.view()).collect();
    let data = ndarray::concatenate(Axis(axis), &views).map_err(|error| {
        BakeryError::conflict(format!(
            "variable '{name}' cannot be concatenated along '{dim}': {error}"
        ))
    })?;
    Ok(Variable {
        dims: parts[0].dims.clone(),
        data,
        attrs: parts[0].attrs.clone(),
    })
}

fn stack_parts(name: &str, parts: &[&Variable], dim: &str) -> Result<Variable> {
    let views: Vec<ArrayViewD<'_, f64>> = parts
        .iter()
        .map(|part| part.data.view().insert_axis(Axis(0)))
        .collect();
    let data = ndarray::concatenate(Axis(0), &views).map_err(|error| {
        BakeryError::conflict(format!(
            "variable '{name}' cannot be stacked along new dimension '{dim}': {error}"
        ))
    })?;
    let mut dims = Vec::with_capacity(parts[0].dims.len() + 1);
    dims.push(dim.to_string());
    dims.extend(parts[0].dims.iter().cloned());
    Ok(Variable {
        dims,
        data,
        attrs: parts[0].attrs.clone(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn series(start: usize, len: usize) -> Dataset {
        let time: Vec<f64> = (start..start + len).map(|t| t as f64).collect();
        let tair: Vec<f64> = (start..start + len)
            .flat_map(|t| (0..2).map(move |x| (t * 10 + x) as f64))
            .collect();
        Dataset::new()
            .with_variable(
                "time",
                Variable::from_shape_vec(&["time"], &[len], time).expect("valid shape"),
            )
            .and_then(|ds| {
                ds.with_variable(
                    "Tair",
                    Variable::from_shape_vec(&["time", "x"], &[len, 2], tair).expect("valid shape"),
                )
            })
            .expect("consistent dataset")
    }

    #[test]
    fn variable_rejects_mismatched_dimension_count() {
        let error = Variable::from_shape_vec(&["time"], &[2, 2], vec![0.0; 4])
            .expect_err("dims should not match");
        assert_eq!(error.code(), "invalid_argument");
    }

    #[test]
    fn insert_rejects_inconsistent_dimension_length() {
        let error = series(0, 3)
            .with_variable(
                "other",
                Variable::from_shape_vec(&["time"], &[4], vec![0.0; 4]).expect("valid shape"),
            )
            .expect_err("time length differs");
        assert_eq!(error.code(), "dataset_conflict");
    }

    #[test]
    fn concat_joins_in_given_order() {
        let combined =
            Dataset::concat(&[series(0, 2), series(2, 3)], "time").expect("concat should pass");

        assert_eq!(combined.dim_len("time"), Some(5));
        assert_eq!(
            combined.variable("time").expect("time exists").values(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(combined, series(0, 5));
    }

    #[test]
    fn concat_does_not_reorder_sources() {
        let combined =
            Dataset::concat(&[series(2, 2), series(0, 2)], "time").expect("concat should pass");
        assert_eq!(
            combined.variable("time").expect("time exists").values(),
            vec![2.0, 3.0, 0.0, 1.0]
        );
    }

    #[test]
    fn concat_rejects_mismatched_variables() {
        let mut other = series(2, 2);
        other.variables.remove("Tair");
        let error = Dataset::concat(&[series(0, 2), other], "time").expect_err("should conflict");
        assert_eq!(error.code(), "dataset_conflict");
    }

    #[test]
    fn concat_rejects_mismatched_trailing_shape() {
        let other = Dataset::new()
            .with_variable(
                "time",
                Variable::from_shape_vec(&["time"], &[1], vec![9.0]).expect("valid shape"),
            )
            .and_then(|ds| {
                ds.with_variable(
                    "Tair",
                    Variable::from_shape_vec(&["time", "x"], &[1, 3], vec![0.0; 3])
                        .expect("valid shape"),
                )
            })
            .expect("consistent dataset");
        let error = Dataset::concat(&[series(0, 2), other], "time").expect_err("should conflict");
        assert_eq!(error.code(), "dataset_conflict");
    }

    #[test]
    fn concat_keeps_identical_static_variables_once() {
        let with_static = |ds: Dataset| {
            ds.with_variable(
                "x",
                Variable::from_shape_vec(&["x"], &[2], vec![0.5, 1.5]).expect("valid shape"),
            )
            .expect("consistent dataset")
        };
        let combined = Dataset::concat(
            &[with_static(series(0, 1)), with_static(series(1, 1))],
            "time",
        )
        .expect("concat should pass");
        assert_eq!(combined.variable("x").expect("x exists").values(), vec![0.5, 1.5]);
    }

    #[test]
    fn concat_stacks_along_new_dimension() {
        let frame = |value: f64| {
            Dataset::new()
                .with_variable(
                    "field",
                    Variable::from_shape_vec(&["x"], &[2], vec![value, value]).expect("valid shape"),
                )
                .expect("consistent dataset")
        };
        let combined =
            Dataset::concat(&[frame(1.0), frame(2.0)], "member").expect("stack should pass");
        let field = combined.variable("field").expect("field exists");
        assert_eq!(field.dims(), ["member".to_string(), "x".to_string()]);
        assert_eq!(field.values(), vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn concat_keeps_first_attrs() {
        let first = series(0, 1).with_attrs(Attrs::from([("title".to_string(), json!("a"))]));
        let second = series(1, 1).with_attrs(Attrs::from([("title".to_string(), json!("b"))]));
        let combined = Dataset::concat(&[first, second], "time").expect("concat should pass");
        assert_eq!(combined.attrs().get("title"), Some(&json!("a")));
    }

    #[test]
    fn rechunk_requires_known_dimension() {
        let error = series(0, 2).rechunk("lat", 2).expect_err("lat is missing");
        assert_eq!(error.code(), "dataset_conflict");

        let chunked = series(0, 4).rechunk("time", 4).expect("time exists");
        assert_eq!(chunked.chunk_len("time"), Some(4));
        assert_eq!(chunked.chunk_len("x"), Some(2));
    }

    #[test]
    fn slice_along_keeps_static_variables() {
        let sliced = series(0, 5).slice_along("time", 1..3).expect("range is valid");
        assert_eq!(sliced, series(1, 2));
        assert!(series(0, 5).slice_along("time", 4..6).is_err());
    }
}
