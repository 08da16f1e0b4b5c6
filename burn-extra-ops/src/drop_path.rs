//! # DropPath Regularization
//!
//! Stochastic depth: during training, the whole residual branch of a sample is zeroed
//! with probability `drop_prob` and the surviving branches are rescaled.

use burn::{prelude::*, tensor::Distribution};

/// Configuration for the [`DropPath`] module.
#[derive(Config, Debug)]
pub struct DropPathConfig {
    /// The probability of dropping a path.
    #[config(default = "0.0")]
    pub drop_prob: f64,
    /// Whether to scale the kept paths by `1 / (1 - drop_prob)`.
    #[config(default = "true")]
    pub scale_by_keep: bool,
}

impl DropPathConfig {
    /// Initializes a new [`DropPath`] module.
    pub const fn init(&self) -> DropPath {
        DropPath {
            drop_prob: self.drop_prob,
            scale_by_keep: self.scale_by_keep,
        }
    }
}

/// DropPath module.
///
/// Like Burn's `Dropout`, it is only active when the backend tracks gradients;
/// on inference backends it is the identity.
#[derive(Module, Clone, Debug)]
pub struct DropPath {
    drop_prob: f64,
    scale_by_keep: bool,
}

impl DropPath {
    /// Applies DropPath to the input tensor.
    ///
    /// The Bernoulli mask has shape `[batch_size, 1, ..., 1]` and is broadcast over
    /// every other dimension.
    ///
    /// # Shapes
    /// - input: `[batch_size, ...]`
    /// - output: `[batch_size, ...]`
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if !B::ad_enabled() || self.drop_prob == 0.0 {
            return x;
        }
        let keep_prob = 1.0 - self.drop_prob;

        let mut mask_shape = [1; D];
        mask_shape[0] = x.dims()[0];
        let mask = Tensor::random(mask_shape, Distribution::Bernoulli(keep_prob), &x.device());

        if self.scale_by_keep {
            x * mask / keep_prob
        } else {
            x * mask
        }
    }
}
