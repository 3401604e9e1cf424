//! Error Handling Module
//!
//! Defines the error types for building and running the domain-adversarial network.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for signal_dann operations
#[derive(Error, Debug)]
pub enum DannError {
    /// Backbone family that has no implementation
    #[error("Unsupported backbone family '{0}' (only 'resnet' is implemented)")]
    UnsupportedBackbone(String),

    /// Known backbone family with a depth it does not provide
    #[error("Current {family} arch supports depths {supported:?}, but got {depth}")]
    InvalidBackboneDepth {
        family: String,
        depth: usize,
        supported: Vec<usize>,
    },

    /// Requested component is recognised but not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Fully connected depth outside the supported range
    #[error("fc_layers must be in 1..=5, got {0}")]
    InvalidFcLayers(usize),

    /// Other invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensor with an unexpected shape
    #[error("Shape mismatch in {context}: got {shape:?}, expected {expected}")]
    ShapeMismatch {
        context: String,
        shape: Vec<usize>,
        expected: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DannError {
    /// Build a shape error from a tensor's dimensions
    pub fn shape<const D: usize>(context: &str, dims: [usize; D], expected: impl Into<String>) -> Self {
        DannError::ShapeMismatch {
            context: context.to_string(),
            shape: dims.to_vec(),
            expected: expected.into(),
        }
    }
}

impl From<serde_json::Error> for DannError {
    fn from(err: serde_json::Error) -> Self {
        DannError::Serialization(err.to_string())
    }
}

impl From<burn::config::ConfigError> for DannError {
    fn from(err: burn::config::ConfigError) -> Self {
        DannError::Serialization(err.to_string())
    }
}

/// Convenience Result type for signal_dann operations
pub type Result<T> = std::result::Result<T, DannError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DannError::InvalidFcLayers(7);
        assert_eq!(format!("{}", err), "fc_layers must be in 1..=5, got 7");
    }

    #[test]
    fn test_invalid_depth_lists_supported() {
        let err = DannError::InvalidBackboneDepth {
            family: "resnet".to_string(),
            depth: 20,
            supported: vec![18, 34, 50, 101, 152],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("resnet"));
        assert!(msg.contains("[18, 34, 50, 101, 152]"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_shape_error_carries_dims() {
        let err = DannError::shape("get_feature", [2, 4, 32], "3 channels");
        match &err {
            DannError::ShapeMismatch { shape, .. } => assert_eq!(shape, &vec![2, 4, 32]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(format!("{}", err).contains("[2, 4, 32]"));
    }
}
