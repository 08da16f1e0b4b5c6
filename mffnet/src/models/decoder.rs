//! # DecoderC
//!
//! The MFF-Net shadow decoder. It receives the coarsest encoder features at 1/16 of the
//! output resolution together with encoder skip features at 1/8 and 1/4, and predicts a
//! shadow mask at every scale:
//!
//! 1. an auxiliary head reads the 1/16 features directly;
//! 2. stage "d" upsamples to 1/8, fuses the 1/8 skip features and runs its blocks;
//! 3. stage "c" upsamples to 1/4, fuses the 1/4 skip features and runs its blocks;
//! 4. stage "b" upsamples to full resolution without fusion.
//!
//! Each mask head is a single linear layer over the stage tokens.

use burn::{
    module::Param,
    nn::{Initializer, LayerNorm, LayerNormConfig, Linear},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::modules::{
    trunc_normal_linear, Block, BlockConfig, Mlp, MlpConfig, PatchEmbed, PatchEmbedConfig,
};
use crate::{
    config::{DecoderCConfig, STAGE_C, STAGE_D},
    error::{MffNetError, MffNetResult},
};

impl DecoderCConfig {
    /// Initializes a [`DecoderC`] model.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if [`DecoderCConfig::validate`]
    /// rejects the record or a stage cannot be built from it.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MffNetResult<DecoderC<B>> {
        self.validate()?;

        let [e0, e1, e2, e3] = self.embed_dims;
        let [grid_16, grid_8, grid_4, _] = self.grid_sizes();

        let patch_embed_b = PatchEmbedConfig::new(grid_4, e2, e3)
            .with_patch_size(4)
            .with_kernel_size(7)
            .with_stride(4)
            .with_padding(2)
            .with_fuse(false)
            .init(device)?;
        let patch_embed_c = PatchEmbedConfig::new(grid_8, e1, e2)
            .with_cross_attn_heads(self.cross_attn_heads)
            .init(device)?;
        let patch_embed_d = PatchEmbedConfig::new(grid_16, e0, e1)
            .with_cross_attn_heads(self.cross_attn_heads)
            .init(device)?;

        let relative_pos = |num_patches: usize, stage: usize| -> Param<Tensor<B, 3>> {
            let sr = self.sr_ratios[stage];
            Initializer::Normal {
                mean: 0.0,
                std: 1.0,
            }
            .init(
                [self.num_heads[stage], num_patches, num_patches / sr / sr],
                device,
            )
        };
        let relative_pos_c = relative_pos(patch_embed_c.num_patches(), STAGE_C);
        let relative_pos_d = relative_pos(patch_embed_d.num_patches(), STAGE_D);

        let dpr = self.drop_path_rates();
        let blocks = |dim: usize, stage: usize, first: usize| -> MffNetResult<Vec<Block<B>>> {
            (0..self.depths[stage])
                .map(|i| {
                    BlockConfig::new(dim, self.num_heads[stage])
                        .with_qkv_bias(self.qkv_bias)
                        .with_qk_scale(self.qk_scale)
                        .with_drop(self.drop_rate)
                        .with_attn_drop(self.attn_drop_rate)
                        .with_drop_path(dpr[first + i])
                        .with_qk_ratio(self.qk_ratio)
                        .with_sr_ratio(self.sr_ratios[stage])
                        .init(device)
                })
                .collect()
        };
        let cur = self.depths[0] + self.depths[1];
        let blocks_c = blocks(e2, STAGE_C, cur)?;
        let blocks_d = blocks(e1, STAGE_D, cur + self.depths[STAGE_C])?;

        log::debug!(
            "DecoderC: img_size {}, grids {:?}, widths {:?}, {} stage-d blocks, {} stage-c blocks",
            self.img_size,
            self.grid_sizes(),
            self.embed_dims,
            blocks_d.len(),
            blocks_c.len()
        );

        Ok(DecoderC {
            img_size: self.img_size,
            in_dim: e0,
            norm: LayerNormConfig::new(e0).init(device),
            mlp: MlpConfig::new(e0, e0, e1).init(device),
            patch_embed_b,
            patch_embed_c,
            patch_embed_d,
            relative_pos_c,
            relative_pos_d,
            pre_1_16: Self::mask_head(e1, device),
            pre_1_8: Self::mask_head(e1, device),
            pre_1_4: Self::mask_head(e2, device),
            pre_1_1: Self::mask_head(e3, device),
            blocks_c,
            blocks_d,
        })
    }

    fn mask_head<B: Backend>(d_input: usize, device: &Device<B>) -> Linear<B> {
        trunc_normal_linear(d_input, 1, true, device)
    }
}

/// The eight predictions of [`DecoderC::forward`].
#[derive(Debug, Clone)]
pub struct DecoderCOutput<B: Backend> {
    /// Raw mask logits at 1/16, 1/8, 1/4 and full resolution.
    pub logits: [Tensor<B, 4>; 4],
    /// Sigmoid of each entry of `logits`, in the same order.
    pub probabilities: [Tensor<B, 4>; 4],
}

impl<B: Backend> DecoderCOutput<B> {
    /// Flattens the output to
    /// `[mask_1_16, mask_1_8, mask_1_4, mask_1_1, m_16, m_8, m_4, m_1]`.
    pub fn into_vec(self) -> Vec<Tensor<B, 4>> {
        self.logits
            .into_iter()
            .chain(self.probabilities)
            .collect()
    }
}

/// MFF-Net shadow decoder.
#[derive(Module, Debug)]
pub struct DecoderC<B: Backend> {
    img_size: usize,
    in_dim: usize,
    norm: LayerNorm<B>,
    mlp: Mlp<B>,
    patch_embed_b: PatchEmbed<B>,
    patch_embed_c: PatchEmbed<B>,
    patch_embed_d: PatchEmbed<B>,
    relative_pos_c: Param<Tensor<B, 3>>,
    relative_pos_d: Param<Tensor<B, 3>>,
    pre_1_16: Linear<B>,
    pre_1_8: Linear<B>,
    pre_1_4: Linear<B>,
    pre_1_1: Linear<B>,
    blocks_c: Vec<Block<B>>,
    blocks_d: Vec<Block<B>>,
}

impl<B: Backend> DecoderC<B> {
    /// Side of the full-resolution output mask.
    pub const fn img_size(&self) -> usize {
        self.img_size
    }

    /// Mask logits at every scale.
    ///
    /// # Shapes
    /// - x: `[batch_size, (img_size / 16)^2, embed_dims[0]]`
    /// - x_1_8: `[batch_size, (img_size / 8)^2, embed_dims[1]]`
    /// - x_1_4: `[batch_size, (img_size / 4)^2, embed_dims[2]]`
    /// - output: `[batch_size, 1, s, s]` for `s` in `img_size / 16`, `/ 8`, `/ 4`, `/ 1`
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidTensorShape)` if an input does not match the
    /// configured geometry.
    pub fn forward_features(
        &self,
        x: Tensor<B, 3>,
        x_1_8: Tensor<B, 3>,
        x_1_4: Tensor<B, 3>,
    ) -> MffNetResult<[Tensor<B, 4>; 4]> {
        let [_, n, c] = x.dims();
        let grid_16 = self.img_size / 16;
        if n != grid_16 * grid_16 || c != self.in_dim {
            return Err(MffNetError::shape_mismatch(
                format!("[_, {}, {}]", grid_16 * grid_16, self.in_dim),
                format!("{:?}", x.dims()),
            ));
        }

        let saliency_1_16 = self.mlp.forward(self.norm.forward(x.clone()));
        let mask_1_16 = mask_from_tokens(&self.pre_1_16, saliency_1_16, grid_16, grid_16);

        let x = tokens_to_grid(x, grid_16, grid_16);
        let (mut x, [h, w]) = self.patch_embed_d.forward(x, Some(x_1_8))?;
        let relative_pos_d = self.relative_pos_d.val();
        for block in &self.blocks_d {
            x = block.forward(x, h, w, relative_pos_d.clone())?;
        }
        let mask_1_8 = mask_from_tokens(&self.pre_1_8, x.clone(), h, w);

        let x = tokens_to_grid(x, h, w);
        let (mut x, [h, w]) = self.patch_embed_c.forward(x, Some(x_1_4))?;
        let relative_pos_c = self.relative_pos_c.val();
        for block in &self.blocks_c {
            x = block.forward(x, h, w, relative_pos_c.clone())?;
        }
        let mask_1_4 = mask_from_tokens(&self.pre_1_4, x.clone(), h, w);

        let x = tokens_to_grid(x, h, w);
        let (x, [h, w]) = self.patch_embed_b.forward(x, None)?;
        let mask_1_1 = mask_from_tokens(&self.pre_1_1, x, h, w);

        Ok([mask_1_16, mask_1_8, mask_1_4, mask_1_1])
    }

    /// Mask logits and their sigmoid at every scale.
    ///
    /// # Errors
    ///
    /// See [`DecoderC::forward_features`].
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        x_1_8: Tensor<B, 3>,
        x_1_4: Tensor<B, 3>,
    ) -> MffNetResult<DecoderCOutput<B>> {
        let logits = self.forward_features(x, x_1_8, x_1_4)?;
        let probabilities = logits.clone().map(sigmoid);

        Ok(DecoderCOutput {
            logits,
            probabilities,
        })
    }
}

/// `[batch, h * w, channels]` -> `[batch, channels, h, w]`
fn tokens_to_grid<B: Backend>(x: Tensor<B, 3>, h: usize, w: usize) -> Tensor<B, 4> {
    let [b, _, c] = x.dims();
    x.swap_dims(1, 2).reshape([b, c, h, w])
}

fn mask_from_tokens<B: Backend>(
    head: &Linear<B>,
    x: Tensor<B, 3>,
    h: usize,
    w: usize,
) -> Tensor<B, 4> {
    tokens_to_grid(head.forward(x), h, w)
}
