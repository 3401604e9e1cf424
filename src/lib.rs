//! # signal_dann
//!
//! Domain-adversarial regression over multi-channel signal windows, built with
//! the Burn framework.
//!
//! ## Modules
//!
//! - `model`: backbone, feature extractor, heads and gradient reversal
//! - `backend`: CPU (NdArray) / CUDA backend selection
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use signal_dann::model::{DannNetworkConfig, FeatureExtractorConfig};
//!
//! let config = DannNetworkConfig::new(FeatureExtractorConfig::new(32, 3, 1));
//! let network = config.init::<signal_dann::backend::DefaultBackend>(&device)?;
//! let output = network.forward(series, 1.0, &mut config.rng())?;
//! ```

pub mod backend;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use model::{
    BackboneKind, Classifier, ClassifierConfig, DannNetwork, DannNetworkConfig, DannOutput,
    FeatureExtractor, FeatureExtractorConfig, GradientReversal, Regressioner, RegressionerConfig,
    ResNetDepth, TemporalKind,
};
pub use utils::error::{DannError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
