//! Weight initialization shared by the decoder modules.
//!
//! Linear layers draw their weights from a truncated normal (std 0.02) with zero bias;
//! convolutions use Kaiming-normal initialization in fan-out mode with zero bias.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, Linear,
    },
    prelude::*,
};
use burn_extra_ops::trunc_normal;

const LINEAR_STD: f64 = 0.02;

/// Builds a `Linear` layer with truncated-normal weights and a zero bias.
pub(crate) fn trunc_normal_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    bias: bool,
    device: &B::Device,
) -> Linear<B> {
    let weight = trunc_normal(
        Tensor::zeros([d_input, d_output], device),
        0.0,
        LINEAR_STD,
        -2.0 * LINEAR_STD,
        2.0 * LINEAR_STD,
    );
    let bias = bias.then(|| Param::from_tensor(Tensor::zeros([d_output], device)));

    Linear {
        weight: Param::from_tensor(weight),
        bias,
    }
}

/// Kaiming-normal initializer in fan-out mode for ReLU-like activations.
pub(crate) fn conv_initializer() -> Initializer {
    Initializer::KaimingNormal {
        gain: core::f64::consts::SQRT_2,
        fan_out_only: true,
    }
}

/// Builds a convolution with Kaiming-normal weights and a zero bias.
///
/// `Conv2dConfig::init` draws the bias from the same initializer as the weight, so the
/// bias is reset afterwards.
pub(crate) fn kaiming_conv2d<B: Backend>(config: Conv2dConfig, device: &B::Device) -> Conv2d<B> {
    let mut conv = config.with_initializer(conv_initializer()).init(device);
    conv.bias = conv
        .bias
        .map(|bias| Param::from_tensor(bias.val().zeros_like()));
    conv
}
