//! Neural Network Layers
//!
//! @version 0.1.0
//! @author RepFace Development Team

pub mod conv;
pub mod linear;
pub mod norm;
pub mod se;

pub use conv::Conv2d;
pub use linear::Linear;
pub use norm::{BatchNorm1d, BatchNorm2d};
pub use se::SqueezeExcite;
