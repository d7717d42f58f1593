//! Parameter - Shared Tensor Wrapper
//!
//! Wraps tensors that are the weights of a module. Parameters are shared
//! handles: a layer and external code (checkpoint loaders, fusion rewrites,
//! tests) see the same storage, so `update_data` is visible everywhere the
//! parameter is held.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::sync::Arc;

use parking_lot::RwLock;
use repface_tensor::Tensor;

// =============================================================================
// Parameter
// =============================================================================

/// A named, shared weight tensor of a neural network module.
#[derive(Clone)]
pub struct Parameter {
    /// The underlying tensor.
    data: Arc<RwLock<Tensor>>,
    /// Parameter name (for debugging and state inspection).
    name: String,
}

impl Parameter {
    /// Creates a new parameter from a tensor.
    pub fn new(data: Tensor) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            name: String::new(),
        }
    }

    /// Creates a new parameter with a name.
    pub fn named(name: impl Into<String>, data: Tensor) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            name: name.into(),
        }
    }

    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the parameter name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns a clone of the tensor data.
    pub fn data(&self) -> Tensor {
        self.data.read().clone()
    }

    /// Returns the shape of the parameter.
    pub fn shape(&self) -> Vec<usize> {
        self.data.read().shape().to_vec()
    }

    /// Returns the number of elements.
    pub fn numel(&self) -> usize {
        self.data.read().numel()
    }

    /// Replaces the parameter data in-place.
    ///
    /// Used by checkpoint loaders and tests to install known weights.
    pub fn update_data(&self, new_data: Tensor) {
        *self.data.write() = new_data;
    }

    /// Applies a function to the parameter data.
    pub fn apply_update<F>(&self, f: F)
    where
        F: FnOnce(&Tensor) -> Tensor,
    {
        let current = self.data();
        let updated = f(&current);
        self.update_data(updated);
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("shape", &self.shape())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
