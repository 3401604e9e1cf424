//! Model module for the domain-adversarial network using the Burn framework
//!
//! This module provides:
//! - 1D ResNet backbones over signal windows
//! - The convolutional + recurrent feature extractor
//! - Regression and domain-classification heads
//! - Gradient reversal for adversarial training
//!
//! ## Architecture
//!
//! ```text
//! series ─► FeatureExtractor ─► embedding ─┬─► Regressioner ─► sigmoid prediction
//!                                          └─► GradientReversal ─► Classifier ─► log p(domain)
//! ```

pub mod backbone;
pub mod config;
pub mod feature;
pub mod heads;
pub mod network;
pub mod reversal;
pub mod window;

// Re-export main types for convenience
pub use backbone::{Backbone, ResNet1d};
pub use config::{BackboneKind, CellInit, ResNetDepth, TemporalKind};
pub use feature::{FeatureExtractor, FeatureExtractorConfig, RecurrentState};
pub use heads::{
    Classifier, ClassifierConfig, RegressionOutput, Regressioner, RegressionerConfig, StageSpec,
};
pub use network::{DannNetwork, DannNetworkConfig, DannOutput};
pub use reversal::{reverse_gradient, GradientReversal};
pub use window::{WindowPlan, WindowSampler};
