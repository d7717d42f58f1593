//! Module Trait - Neural Network Module Interface
//!
//! Defines the core Module trait that all RepFace layers implement. Modules
//! run directly on tensors; there is no gradient tape, so the trait surface
//! is forward computation, parameter enumeration, and train/eval switching.
//!
//! @version 0.1.0
//! @author RepFace Development Team

use std::collections::HashMap;

use repface_tensor::Tensor;

use crate::parameter::Parameter;

// =============================================================================
// Module Trait
// =============================================================================

/// Core trait for all neural network modules.
///
/// Every layer in RepFace implements this trait, which provides:
/// - Forward pass computation
/// - Parameter management
/// - Training/evaluation mode switching
/// - Module naming
pub trait Module: Send + Sync {
    /// Performs the forward pass.
    ///
    /// # Arguments
    /// * `input` - Input tensor
    ///
    /// # Returns
    /// Output tensor after applying this module's transformation.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Returns all parameters of this module.
    ///
    /// This includes parameters from all child modules.
    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    /// Returns named parameters of this module.
    fn named_parameters(&self) -> HashMap<String, Parameter> {
        HashMap::new()
    }

    /// Returns the total number of parameter elements.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Sets the module to training mode.
    fn train(&mut self) {
        self.set_training(true);
    }

    /// Sets the module to evaluation mode.
    fn eval(&mut self) {
        self.set_training(false);
    }

    /// Sets the training mode.
    fn set_training(&mut self, _training: bool) {
        // Default implementation does nothing
        // Submodules override this if they have training-specific behavior
    }

    /// Returns whether the module is in training mode.
    fn is_training(&self) -> bool {
        true // Default to training mode
    }

    /// Returns the module name for debugging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Merges child parameters into a map under a prefix.
///
/// The conventional key format is `prefix.param_name`.
pub fn prefixed_parameters(
    params: &mut HashMap<String, Parameter>,
    prefix: &str,
    child: &dyn Module,
) {
    for (name, param) in child.named_parameters() {
        params.insert(format!("{prefix}.{name}"), param);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Simple test module
    struct Doubler;

    impl Module for Doubler {
        fn forward(&self, input: &Tensor) -> Tensor {
            input.mul_scalar(2.0)
        }

        fn name(&self) -> &'static str {
            "Doubler"
        }
    }

    #[test]
    fn test_default_trait_surface() {
        let m = Doubler;
        assert!(m.parameters().is_empty());
        assert_eq!(m.num_parameters(), 0);
        assert!(m.is_training());
        assert_eq!(m.name(), "Doubler");
    }

    #[test]
    fn test_forward() {
        let m = Doubler;
        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let output = m.forward(&input);
        assert_eq!(output.to_vec(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_prefixed_parameters() {
        struct WithParam {
            w: Parameter,
        }

        impl Module for WithParam {
            fn forward(&self, input: &Tensor) -> Tensor {
                input.clone()
            }

            fn named_parameters(&self) -> HashMap<String, Parameter> {
                let mut params = HashMap::new();
                params.insert("weight".to_string(), self.w.clone());
                params
            }
        }

        let child = WithParam {
            w: Parameter::named("weight", Tensor::zeros(&[2])),
        };
        let mut params = HashMap::new();
        prefixed_parameters(&mut params, "block.0", &child);
        assert!(params.contains_key("block.0.weight"));
    }
}
