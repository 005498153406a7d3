use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::{Result, RolloutErr, Tensor};

/// The policy's parameters, ordered by name.
///
/// The flat representation used on the wire is every tensor's data laid out
/// one after the other in that same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    params: BTreeMap<String, Tensor>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.params.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.params.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    /// The amount of named tensors.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The total amount of values across every tensor.
    pub fn numel(&self) -> usize {
        self.params.values().map(Tensor::numel).sum()
    }

    /// Appends every value, in name order, to `out`.
    pub fn flatten_into(&self, out: &mut Vec<f32>) {
        out.reserve(self.numel());
        for tensor in self.params.values() {
            out.extend_from_slice(tensor.data());
        }
    }

    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    /// Overwrites every value from its flat representation.
    ///
    /// # Errors
    /// `RolloutErr::ShapeMismatch` if `flat` doesn't hold exactly `numel` values,
    /// nothing is written in that case.
    pub fn load_flat(&mut self, flat: &[f32]) -> Result<()> {
        let expected = self.numel();
        if flat.len() != expected {
            return Err(RolloutErr::ShapeMismatch {
                what: "the flat parameters".into(),
                got: flat.len(),
                expected,
            });
        }

        let mut rest = flat;
        for tensor in self.params.values_mut() {
            let (head, tail) = rest.split_at(tensor.numel());
            tensor.data_mut().copy_from_slice(head);
            rest = tail;
        }

        Ok(())
    }

    /// Overwrites the values of `name`, its shape can't change.
    pub fn set(&mut self, name: &str, values: &[f32]) -> Result<()> {
        let tensor = self
            .params
            .get_mut(name)
            .ok_or_else(|| RolloutErr::UnknownParam(name.into()))?;

        if values.len() != tensor.numel() {
            return Err(RolloutErr::ShapeMismatch {
                what: format!("parameter {name}"),
                got: values.len(),
                expected: tensor.numel(),
            });
        }

        tensor.data_mut().copy_from_slice(values);
        Ok(())
    }
}

/// A handle to parameters shared between the training loop and the coordinator.
#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<RwLock<ParamMap>>,
}

impl SharedParams {
    pub fn new(params: ParamMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Writes new values for one parameter, picked up by the next broadcast.
    pub fn update(&self, name: &str, values: &[f32]) -> Result<()> {
        self.inner.write().set(name, values)
    }

    /// Overwrites every parameter from its flat representation.
    pub fn load_flat(&self, flat: &[f32]) -> Result<()> {
        self.inner.write().load_flat(flat)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ParamMap> {
        self.inner.read()
    }

    /// Copies the current values into `out`, replacing its contents.
    pub fn snapshot_flat(&self, out: &mut Vec<f32>) {
        out.clear();
        self.inner.read().flatten_into(out);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("weight", Tensor::from_vec(vec![1, 2], vec![1., 2.]).unwrap());
        params.insert("bias", Tensor::from_vec(vec![1], vec![3.]).unwrap());
        params
    }

    #[test]
    fn flatten_follows_name_order() {
        assert_eq!(linear().flatten(), [3., 1., 2.]);
    }

    #[test]
    fn load_flat_rejects_a_wrong_length() {
        let mut params = linear();
        let err = params.load_flat(&[0.; 4]).unwrap_err();

        assert!(matches!(err, RolloutErr::ShapeMismatch { got: 4, expected: 3, .. }));
        assert_eq!(params, linear());

        params.load_flat(&[9., 8., 7.]).unwrap();
        assert_eq!(params.get("weight").unwrap().data(), [8., 7.]);
    }

    #[test]
    fn shared_updates_keep_the_structure() {
        let shared = SharedParams::new(linear());

        shared.update("bias", &[5.]).unwrap();
        assert!(matches!(shared.update("bias", &[5., 6.]), Err(RolloutErr::ShapeMismatch { .. })));
        assert!(matches!(shared.update("gain", &[1.]), Err(RolloutErr::UnknownParam(_))));

        let mut flat = vec![0.; 10];
        shared.snapshot_flat(&mut flat);
        assert_eq!(flat, [5., 1., 2.]);
    }
}
