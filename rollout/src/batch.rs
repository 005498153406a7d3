use std::collections::BTreeMap;

use crate::{Result, RolloutErr};

/// A dense row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new zero filled `Tensor`.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![0.; numel],
        }
    }

    /// Creates a new `Tensor` from its flat data.
    ///
    /// # Errors
    /// `RolloutErr::ShapeMismatch` if `data` doesn't hold exactly as many values as `shape` asks for.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(RolloutErr::ShapeMismatch {
                what: format!("a tensor of shape {shape:?}"),
                got: data.len(),
                expected,
            });
        }

        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

/// A mapping of field names to tensors that share a common `batch_size` prefix.
///
/// A locked batch keeps its structure, fields can neither be inserted nor
/// removed, yet their values may still be overwritten in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    batch_size: Vec<usize>,
    fields: BTreeMap<String, Tensor>,
    locked: bool,
}

impl Batch {
    /// Creates a new empty `Batch`.
    ///
    /// # Arguments
    /// * `batch_size` - The leading dimensions every field must start with.
    pub fn new(batch_size: Vec<usize>) -> Self {
        Self {
            batch_size,
            fields: BTreeMap::new(),
            locked: false,
        }
    }

    /// Adds or replaces a field.
    ///
    /// # Errors
    /// `RolloutErr::Locked` on a locked batch, `RolloutErr::ShapeMismatch` if the
    /// tensor doesn't start with this batch's `batch_size`.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<()> {
        if self.locked {
            return Err(RolloutErr::Locked);
        }

        let name = name.into();
        let prefix = &tensor.shape()[..self.batch_size.len().min(tensor.shape().len())];
        if prefix != self.batch_size.as_slice() {
            return Err(RolloutErr::ShapeMismatch {
                what: format!("the leading dimensions of field {name}"),
                got: prefix.iter().product(),
                expected: self.numel(),
            });
        }

        self.fields.insert(name, tensor);
        Ok(())
    }

    /// Removes a field, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Result<Option<Tensor>> {
        if self.locked {
            return Err(RolloutErr::Locked);
        }

        Ok(self.fields.remove(name))
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.fields.get(name)
    }

    /// Iterates the fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.fields.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn batch_size(&self) -> &[usize] {
        &self.batch_size
    }

    /// The number of frames in this batch, the product of its `batch_size`.
    pub fn numel(&self) -> usize {
        self.batch_size.iter().product()
    }

    /// The shape of `name` past the batch dimensions.
    pub fn trailing_shape(&self, name: &str) -> Option<&[usize]> {
        self.fields
            .get(name)
            .map(|tensor| &tensor.shape()[self.batch_size.len()..])
    }

    /// A zero filled batch with the same fields, stacked `n` times along a new leading dimension.
    pub fn stacked(&self, n: usize) -> Self {
        let with_lead = |shape: &[usize]| {
            let mut stacked = Vec::with_capacity(shape.len() + 1);
            stacked.push(n);
            stacked.extend_from_slice(shape);
            stacked
        };

        let fields = self
            .fields
            .iter()
            .map(|(name, tensor)| (name.clone(), Tensor::zeros(with_lead(tensor.shape()))))
            .collect();

        Self {
            batch_size: with_lead(&self.batch_size),
            fields,
            locked: false,
        }
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// An unlocked deep copy of this batch.
    pub fn snapshot(&self) -> Self {
        Self {
            locked: false,
            ..self.clone()
        }
    }

    /// Splits every field along the leading dimension.
    ///
    /// # Returns
    /// One entry per index of the leading dimension, each holding one mutable
    /// slice per field in name order.
    pub fn worker_slices_mut(&mut self) -> Vec<Vec<&mut [f32]>> {
        let n = self.batch_size.first().copied().unwrap_or(0);
        let mut slices: Vec<Vec<&mut [f32]>> = (0..n)
            .map(|_| Vec::with_capacity(self.fields.len()))
            .collect();

        if n == 0 {
            return slices;
        }

        for tensor in self.fields.values_mut() {
            let chunk = tensor.data.len() / n;
            let mut rest = tensor.data.as_mut_slice();
            for dst in slices.iter_mut() {
                let (slice, tail) = rest.split_at_mut(chunk);
                dst.push(slice);
                rest = tail;
            }
        }

        slices
    }

    /// Copies out the `i`-th entry along the leading dimension.
    ///
    /// # Returns
    /// `None` if `i` is out of bounds.
    pub fn unbind(&self, i: usize) -> Option<Self> {
        let (&n, rest) = self.batch_size.split_first()?;
        if i >= n {
            return None;
        }

        let fields = self
            .fields
            .iter()
            .map(|(name, tensor)| {
                let chunk = tensor.numel() / n;
                let data = tensor.data[i * chunk..(i + 1) * chunk].to_vec();
                let shape = tensor.shape[1..].to_vec();
                (name.clone(), Tensor { shape, data })
            })
            .collect();

        Some(Self {
            batch_size: rest.to_vec(),
            fields,
            locked: false,
        })
    }
}
