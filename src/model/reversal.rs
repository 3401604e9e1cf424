//! Gradient Reversal Layer
//!
//! Identity on the forward pass; on the backward pass the incoming gradient is
//! multiplied by `-alpha`. Placed in front of the domain classifier so that the
//! shared feature extractor is pushed away from domain-discriminative features
//! while the classifier itself still learns to discriminate.
//!
//! Built from autodiff primitives: `x.detach() + (x - x.detach()) * (-alpha)`.
//! The bracket is exactly zero for finite inputs, so the output is bitwise
//! equal to the input, and its derivative with respect to `x` is `-alpha`.
//! Non-finite entries would turn the bracket into NaN, so it is zeroed there;
//! those entries pass through unchanged and receive no gradient.

use burn::tensor::{backend::Backend, Tensor};

/// Gradient reversal with a fixed coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientReversal {
    /// Scaling applied to the reversed gradient
    pub alpha: f64,
}

impl GradientReversal {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        reverse_gradient(x, self.alpha)
    }
}

/// Apply gradient reversal with coefficient `alpha`
pub fn reverse_gradient<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f64) -> Tensor<B, D> {
    let passthrough = x.clone().detach();
    let non_finite = passthrough.clone().abs().lower_elem(f32::INFINITY).bool_not();
    let tracked = (x - passthrough.clone()).mask_fill(non_finite, 0.0);

    passthrough + tracked.mul_scalar(-alpha)
}
