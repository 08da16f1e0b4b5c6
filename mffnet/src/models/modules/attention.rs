use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear,
    },
    prelude::*,
    tensor::activation::softmax,
};

use super::utils::{kaiming_conv2d, trunc_normal_linear};
use crate::error::{MffNetError, MffNetResult};

/// Configuration for spatially reduced multi-head self-attention.
///
/// # Arguments
/// - `dim`: Number of input channels
/// - `num_heads`: Number of attention heads
/// - `qkv_bias`: Whether to add a learnable bias to the query, key and value projections
/// - `qk_scale`: Overrides the default scale `(dim / num_heads)^-0.5`
/// - `attn_drop`: Dropout probability on the attention weights
/// - `proj_drop`: Dropout probability on the output projection
/// - `qk_ratio`: Queries and keys are projected to `dim / qk_ratio` channels
/// - `sr_ratio`: Keys and values are computed from a map downsampled by this factor
#[derive(Config, Debug)]
pub struct AttentionConfig {
    dim: usize,
    #[config(default = "8")]
    num_heads: usize,
    #[config(default = "false")]
    qkv_bias: bool,
    #[config(default = "None")]
    qk_scale: Option<f64>,
    #[config(default = "0.0")]
    attn_drop: f64,
    #[config(default = "0.0")]
    proj_drop: f64,
    #[config(default = "1")]
    qk_ratio: usize,
    #[config(default = "1")]
    sr_ratio: usize,
}

impl AttentionConfig {
    /// Initializes an [`Attention`] module.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if the head count does not divide
    /// the value or query/key widths, or if a ratio is zero.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MffNetResult<Attention<B>> {
        if self.qk_ratio == 0 || self.sr_ratio == 0 {
            return Err(MffNetError::invalid_config(
                "qk_ratio and sr_ratio must be at least 1",
            ));
        }
        let qk_dim = self.dim / self.qk_ratio;
        if self.num_heads == 0
            || self.dim % self.num_heads != 0
            || qk_dim % self.num_heads != 0
            || self.dim % self.qk_ratio != 0
        {
            return Err(MffNetError::invalid_config(format!(
                "attention width {} (qk width {qk_dim}) is not divisible by {} heads",
                self.dim, self.num_heads
            )));
        }
        let head_dim = self.dim / self.num_heads;

        let sr = (self.sr_ratio > 1).then(|| SpatialReduction {
            conv: kaiming_conv2d(
                Conv2dConfig::new([self.dim, self.dim], [self.sr_ratio, self.sr_ratio])
                    .with_stride([self.sr_ratio, self.sr_ratio])
                    .with_groups(self.dim)
                    .with_bias(true),
                device,
            ),
            norm: BatchNormConfig::new(self.dim).with_epsilon(1e-5).init(device),
        });

        Ok(Attention {
            num_heads: self.num_heads,
            qk_dim,
            scale: self
                .qk_scale
                .unwrap_or_else(|| (head_dim as f64).powf(-0.5)),
            q: trunc_normal_linear(self.dim, qk_dim, self.qkv_bias, device),
            k: trunc_normal_linear(self.dim, qk_dim, self.qkv_bias, device),
            v: trunc_normal_linear(self.dim, self.dim, self.qkv_bias, device),
            attn_drop: DropoutConfig::new(self.attn_drop).init(),
            proj: trunc_normal_linear(self.dim, self.dim, true, device),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
            sr_ratio: self.sr_ratio,
            sr,
        })
    }
}

/// Strided depth-wise convolution followed by batch normalization, shrinking the
/// key/value map by `sr_ratio` in each spatial dimension.
#[derive(Module, Debug)]
pub struct SpatialReduction<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> SpatialReduction<B> {
    /// # Shapes
    /// - x: `[batch_size, h * w, channels]`
    /// - output: `[batch_size, (h / sr_ratio) * (w / sr_ratio), channels]`
    pub fn forward(&self, x: Tensor<B, 3>, h: usize, w: usize) -> Tensor<B, 3> {
        let [b, _, c] = x.dims();
        let x = x.swap_dims(1, 2).reshape([b, c, h, w]);
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        x.flatten::<3>(2, 3).swap_dims(1, 2)
    }
}

/// Multi-head self-attention with optional key/value spatial reduction and an additive
/// relative position bias.
///
/// The bias is owned by the caller (one learned tensor per decoder stage, shared by
/// all blocks of that stage) and is added to the logits before the softmax.
#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    num_heads: usize,
    qk_dim: usize,
    scale: f64,
    q: Linear<B>,
    k: Linear<B>,
    v: Linear<B>,
    attn_drop: Dropout,
    proj: Linear<B>,
    proj_drop: Dropout,
    sr_ratio: usize,
    sr: Option<SpatialReduction<B>>,
}

impl<B: Backend> Attention<B> {
    /// Number of key/value tokens produced for an `h x w` query map.
    pub const fn kv_tokens(&self, h: usize, w: usize) -> usize {
        (h / self.sr_ratio) * (w / self.sr_ratio)
    }

    /// # Shapes
    /// - x: `[batch_size, h * w, channels]`
    /// - relative_pos: `[num_heads, h * w, kv_tokens(h, w)]`
    /// - output: `[batch_size, h * w, channels]`
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidTensorShape)` if `h * w` differs from the token
    /// count or the relative position bias does not match the attention logits.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        h: usize,
        w: usize,
        relative_pos: Tensor<B, 3>,
    ) -> MffNetResult<Tensor<B, 3>> {
        let [b, n, c] = x.dims();
        if h * w != n {
            return Err(MffNetError::shape_mismatch(
                format!("{h}x{w} = {} tokens", h * w),
                format!("{n} tokens"),
            ));
        }

        let expected_bias = [self.num_heads, n, self.kv_tokens(h, w)];
        if relative_pos.dims() != expected_bias {
            return Err(MffNetError::shape_mismatch(
                format!("relative position bias {expected_bias:?}"),
                format!("{:?}", relative_pos.dims()),
            ));
        }

        let qk_head = self.qk_dim / self.num_heads;
        let v_head = c / self.num_heads;

        let q = self
            .q
            .forward(x.clone())
            .reshape([b, n, self.num_heads, qk_head])
            .swap_dims(1, 2);

        let kv = match &self.sr {
            Some(sr) => sr.forward(x, h, w),
            None => x,
        };
        let [_, n_kv, _] = kv.dims();

        let k = self
            .k
            .forward(kv.clone())
            .reshape([b, n_kv, self.num_heads, qk_head])
            .swap_dims(1, 2);
        let v = self
            .v
            .forward(kv)
            .reshape([b, n_kv, self.num_heads, v_head])
            .swap_dims(1, 2);

        let attn = q.matmul(k.swap_dims(2, 3)) * self.scale;
        let attn = attn + relative_pos.unsqueeze::<4>();
        let attn = softmax(attn, 3);
        let attn = self.attn_drop.forward(attn);

        let x = attn.matmul(v).swap_dims(1, 2).reshape([b, n, c]);
        let x = self.proj.forward(x);

        Ok(self.proj_drop.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tolerance},
    };

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_attention_preserves_shape() {
        let device = Default::default();
        let (h, w) = (8, 8);

        for sr_ratio in [1, 2, 4] {
            let attention = AttentionConfig::new(16)
                .with_num_heads(4)
                .with_qkv_bias(true)
                .with_sr_ratio(sr_ratio)
                .init::<TestBackend>(&device)
                .unwrap();
            let kv_tokens = attention.kv_tokens(h, w);
            assert_eq!(kv_tokens, (h / sr_ratio) * (w / sr_ratio));

            let x = Tensor::<TestBackend, 3>::random([2, h * w, 16], Distribution::Default, &device);
            let bias = Tensor::<TestBackend, 3>::random(
                [4, h * w, kv_tokens],
                Distribution::Normal(0.0, 1.0),
                &device,
            );

            let output = attention.forward(x, h, w, bias).unwrap();
            assert_eq!(output.dims(), [2, h * w, 16]);
        }
    }

    #[test]
    fn test_attention_with_reduced_qk_width() {
        let device = Default::default();
        let attention = AttentionConfig::new(16)
            .with_num_heads(2)
            .with_qk_ratio(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::random([1, 16, 16], Distribution::Default, &device);
        let bias = Tensor::<TestBackend, 3>::zeros([2, 16, 16], &device);

        let output = attention.forward(x, 4, 4, bias).unwrap();
        assert_eq!(output.dims(), [1, 16, 16]);
    }

    #[test]
    fn test_attention_rejects_mismatched_bias() {
        let device = Default::default();
        let attention = AttentionConfig::new(8)
            .with_num_heads(2)
            .with_sr_ratio(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::zeros([1, 16, 8], &device);
        // Sized for the unreduced key/value map.
        let bias = Tensor::<TestBackend, 3>::zeros([2, 16, 16], &device);

        assert!(matches!(
            attention.forward(x, 4, 4, bias),
            Err(MffNetError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn test_attention_rejects_inconsistent_grid() {
        let device = Default::default();
        let attention = AttentionConfig::new(8)
            .with_num_heads(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::zeros([1, 16, 8], &device);
        let bias = Tensor::<TestBackend, 3>::zeros([2, 16, 16], &device);

        assert!(matches!(
            attention.forward(x, 2, 4, bias),
            Err(MffNetError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn test_attention_rejects_zero_ratio() {
        let device = Default::default();
        let result = AttentionConfig::new(8)
            .with_sr_ratio(0)
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(MffNetError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_attention_adds_bias_before_softmax() {
        let device = Default::default();
        let attention = AttentionConfig::new(8)
            .with_num_heads(1)
            .with_qkv_bias(true)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::random([1, 16, 8], Distribution::Normal(0.0, 1.0), &device);
        let bias =
            Tensor::<TestBackend, 3>::random([1, 16, 16], Distribution::Normal(0.0, 1.0), &device);

        let q = attention.q.forward(x.clone());
        let k = attention.k.forward(x.clone());
        let v = attention.v.forward(x.clone());
        let logits = q.matmul(k.swap_dims(1, 2)) * attention.scale + bias.clone();
        let expected = attention.proj.forward(softmax(logits, 2).matmul(v));

        let output = attention.forward(x.clone(), 4, 4, bias).unwrap();
        output
            .into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-5));

        let unbiased = attention
            .forward(x.clone(), 4, 4, Tensor::zeros([1, 16, 16], &device))
            .unwrap();
        let biased = attention
            .forward(x, 4, 4, Tensor::ones([1, 16, 16], &device) * 4.0)
            .unwrap();
        // A constant bias cancels in the softmax.
        biased
            .into_data()
            .assert_approx_eq::<f32>(&unbiased.into_data(), Tolerance::absolute(1e-5));
    }

    #[test]
    fn test_attention_applies_qk_scale_override() {
        let device = Default::default();
        let attention = AttentionConfig::new(8)
            .with_num_heads(2)
            .with_qkv_bias(true)
            .with_qk_scale(Some(0.0))
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::random([2, 16, 8], Distribution::Normal(0.0, 1.0), &device);
        let bias = Tensor::<TestBackend, 3>::zeros([2, 16, 16], &device);

        // Zero-scaled logits give uniform attention: every token receives the mean value.
        let mean_value = attention.v.forward(x.clone()).mean_dim(1);
        let expected = attention.proj.forward(mean_value).repeat_dim(1, 16);

        let output = attention.forward(x, 4, 4, bias).unwrap();
        output
            .into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-5));
    }
}
