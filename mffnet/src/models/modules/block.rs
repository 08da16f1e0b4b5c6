use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        LayerNorm, LayerNormConfig, PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{DropPath, DropPathConfig};

use super::{
    attention::{Attention, AttentionConfig},
    utils::kaiming_conv2d,
};
use crate::error::MffNetResult;

/// Configuration for a decoder [`Block`].
#[derive(Config, Debug)]
pub struct BlockConfig {
    dim: usize,
    num_heads: usize,
    #[config(default = "false")]
    qkv_bias: bool,
    #[config(default = "None")]
    qk_scale: Option<f64>,
    #[config(default = "0.0")]
    drop: f64,
    #[config(default = "0.0")]
    attn_drop: f64,
    #[config(default = "0.0")]
    drop_path: f64,
    #[config(default = "1")]
    qk_ratio: usize,
    #[config(default = "1")]
    sr_ratio: usize,
}

impl BlockConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MffNetResult<Block<B>> {
        let attn = AttentionConfig::new(self.dim)
            .with_num_heads(self.num_heads)
            .with_qkv_bias(self.qkv_bias)
            .with_qk_scale(self.qk_scale)
            .with_attn_drop(self.attn_drop)
            .with_proj_drop(self.drop)
            .with_qk_ratio(self.qk_ratio)
            .with_sr_ratio(self.sr_ratio)
            .init(device)?;

        Ok(Block {
            norm1: LayerNormConfig::new(self.dim).init(device),
            attn,
            drop_path: DropPathConfig::new().with_drop_prob(self.drop_path).init(),
            proj: kaiming_conv2d(
                Conv2dConfig::new([self.dim, self.dim], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_groups(self.dim),
                device,
            ),
        })
    }
}

/// Attention block of a decoder stage: a pre-norm attention residual followed by a
/// depth-wise 3x3 convolution residual in place of the usual MLP.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    norm1: LayerNorm<B>,
    attn: Attention<B>,
    drop_path: DropPath,
    proj: Conv2d<B>,
}

impl<B: Backend> Block<B> {
    /// # Shapes
    /// - x: `[batch_size, h * w, channels]`
    /// - relative_pos: `[num_heads, h * w, kv_tokens]`
    /// - output: `[batch_size, h * w, channels]`
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        h: usize,
        w: usize,
        relative_pos: Tensor<B, 3>,
    ) -> MffNetResult<Tensor<B, 3>> {
        let attn = self
            .attn
            .forward(self.norm1.forward(x.clone()), h, w, relative_pos)?;
        let x = x + self.drop_path.forward(attn);

        let [b, n, c] = x.dims();
        let cnn_feat = x.swap_dims(1, 2).reshape([b, c, h, w]);
        let x = self.proj.forward(cnn_feat.clone()) + cnn_feat;

        Ok(x.reshape([b, c, n]).swap_dims(1, 2))
    }
}
