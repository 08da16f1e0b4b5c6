use burn::{
    nn::{Dropout, DropoutConfig, Linear},
    prelude::*,
    tensor::activation::softmax,
};

use super::utils::trunc_normal_linear;
use crate::error::{MffNetError, MffNetResult};

/// Configuration for [`CrossAttention`].
///
/// # Arguments
/// - `dim1`: Channel width of the query stream (and of the output)
/// - `dim2`: Channel width of the key/value stream
/// - `dim`: Attention width, split evenly across `num_heads`
/// - `num_heads`: Number of attention heads
/// - `qkv_bias`: Whether the query, key and value projections carry a bias
/// - `qk_scale`: Overrides the default scale `(dim / num_heads)^-0.5`
/// - `attn_drop`: Dropout probability on the attention weights
/// - `proj_drop`: Dropout probability on the output projection
#[derive(Config, Debug)]
pub struct CrossAttentionConfig {
    dim1: usize,
    dim2: usize,
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
}

impl CrossAttentionConfig {
    /// Initializes a [`CrossAttention`] module.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if `num_heads` does not divide `dim`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MffNetResult<CrossAttention<B>> {
        if self.num_heads == 0 || self.dim % self.num_heads != 0 {
            return Err(MffNetError::invalid_config(format!(
                "cross-attention width {} is not divisible by {} heads",
                self.dim, self.num_heads
            )));
        }
        let head_dim = self.dim / self.num_heads;

        Ok(CrossAttention {
            dim1: self.dim1,
            dim2: self.dim2,
            dim: self.dim,
            num_heads: self.num_heads,
            scale: self
                .qk_scale
                .unwrap_or_else(|| (head_dim as f64).powf(-0.5)),
            q1: trunc_normal_linear(self.dim1, self.dim, self.qkv_bias, device),
            k2: trunc_normal_linear(self.dim2, self.dim, self.qkv_bias, device),
            v2: trunc_normal_linear(self.dim2, self.dim, self.qkv_bias, device),
            proj: trunc_normal_linear(self.dim, self.dim1, true, device),
            attn_drop: DropoutConfig::new(self.attn_drop).init(),
            proj_drop: DropoutConfig::new(self.proj_drop).init(),
        })
    }
}

/// Multi-head attention between two feature streams of different widths.
///
/// Queries come from `fea`, keys and values from `depth_fea`; the result has the token
/// count and width of `fea`. No positional term is added to the logits.
#[derive(Module, Debug)]
pub struct CrossAttention<B: Backend> {
    dim1: usize,
    dim2: usize,
    dim: usize,
    num_heads: usize,
    scale: f64,
    q1: Linear<B>,
    k2: Linear<B>,
    v2: Linear<B>,
    proj: Linear<B>,
    attn_drop: Dropout,
    proj_drop: Dropout,
}

impl<B: Backend> CrossAttention<B> {
    /// # Shapes
    /// - fea: `[batch_size, n1, dim1]`
    /// - depth_fea: `[batch_size, n2, dim2]`
    /// - output: `[batch_size, n1, dim1]`
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidTensorShape)` if the batch sizes differ or a
    /// channel width does not match the configuration.
    pub fn forward(&self, fea: Tensor<B, 3>, depth_fea: Tensor<B, 3>) -> MffNetResult<Tensor<B, 3>> {
        let [b1, n1, c1] = fea.dims();
        let [b, n2, c2] = depth_fea.dims();
        if b1 != b || c1 != self.dim1 || c2 != self.dim2 {
            return Err(MffNetError::shape_mismatch(
                format!("[{b}, _, {}] and [{b}, _, {}]", self.dim1, self.dim2),
                format!("{:?} and {:?}", fea.dims(), depth_fea.dims()),
            ));
        }
        let head_dim = self.dim / self.num_heads;

        let q = self
            .q1
            .forward(fea)
            .reshape([b, n1, self.num_heads, head_dim])
            .swap_dims(1, 2);
        let k = self
            .k2
            .forward(depth_fea.clone())
            .reshape([b, n2, self.num_heads, head_dim])
            .swap_dims(1, 2);
        let v = self
            .v2
            .forward(depth_fea)
            .reshape([b, n2, self.num_heads, head_dim])
            .swap_dims(1, 2);

        let attn = q.matmul(k.swap_dims(2, 3)) * self.scale;
        let attn = softmax(attn, 3);
        let attn = self.attn_drop.forward(attn);

        let x = attn.matmul(v).swap_dims(1, 2).reshape([b, n1, self.dim]);
        let x = self.proj.forward(x);

        Ok(self.proj_drop.forward(x))
    }
}
