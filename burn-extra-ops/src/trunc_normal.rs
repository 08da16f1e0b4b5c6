//! # Truncated Normal Initialization
//!
//! Fills tensors with samples from a normal distribution restricted to `[a, b]` by
//! inverse-CDF sampling: uniform samples between the CDF values of the bounds are
//! mapped back through `erfinv`.

use burn::{prelude::*, tensor::Distribution};

use crate::erfinv::Erfinv;

fn norm_cdf(x: f64) -> f64 {
    (1.0 + libm::erf(x / core::f64::consts::SQRT_2)) / 2.0
}

/// Returns a tensor shaped like `x` with values from `N(mean, std²)` truncated to `[a, b]`.
///
/// # Arguments
///
/// * `x` - Tensor providing shape and device; its values are discarded.
/// * `mean` - The mean of the normal distribution.
/// * `std` - The standard deviation of the normal distribution.
/// * `a` - The lower bound of the truncation.
/// * `b` - The upper bound of the truncation.
pub fn trunc_normal<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    mean: f64,
    std: f64,
    a: f64,
    b: f64,
) -> Tensor<B, D> {
    let low = norm_cdf((a - mean) / std);
    let high = norm_cdf((b - mean) / std);

    x.random_like(Distribution::Uniform(2.0 * low - 1.0, 2.0 * high - 1.0))
        .erfinv()
        .mul_scalar(std * core::f64::consts::SQRT_2)
        .add_scalar(mean)
        .clamp(a, b)
}
