use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        LayerNorm, LayerNormConfig, Linear, PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{fold4d, Fold4dOptions};

use super::{
    cross_attention::{CrossAttention, CrossAttentionConfig},
    mlp::{Mlp, MlpConfig},
    utils::{kaiming_conv2d, trunc_normal_linear},
};
use crate::error::{MffNetError, MffNetResult};

/// Configuration for an upsampling [`PatchEmbed`] stage.
///
/// # Arguments
/// - `img_size`: Side of the square input grid
/// - `in_chans`: Channels of the input grid
/// - `embed_dim`: Channels of the output tokens (and of the skip features when fused)
/// - `patch_size`: Upsampling factor; must equal `stride`
/// - `kernel_size`, `stride`, `padding`: Fold geometry
/// - `fuse`: Whether encoder skip features are fused into the upsampled tokens
/// - `cross_attn_heads`: Heads of the fusion cross-attention
#[derive(Config, Debug)]
pub struct PatchEmbedConfig {
    img_size: usize,
    in_chans: usize,
    embed_dim: usize,
    #[config(default = "2")]
    patch_size: usize,
    #[config(default = "3")]
    kernel_size: usize,
    #[config(default = "2")]
    stride: usize,
    #[config(default = "1")]
    padding: usize,
    #[config(default = "true")]
    fuse: bool,
    #[config(default = "4")]
    cross_attn_heads: usize,
}

/// Square fold geometry shared by construction-time validation and `forward`.
const fn square_fold(kernel_size: usize, stride: usize, padding: usize) -> Fold4dOptions {
    Fold4dOptions::new(
        [kernel_size, kernel_size],
        [stride, stride],
        [padding, padding],
    )
}

impl PatchEmbedConfig {
    fn fold_options(&self) -> Fold4dOptions {
        square_fold(self.kernel_size, self.stride, self.padding)
    }

    /// Initializes a [`PatchEmbed`] stage.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if a size is zero, if
    /// `patch_size` differs from `stride`, if the fold does not consume exactly
    /// `img_size x img_size` blocks, or if the fusion heads do not divide `embed_dim`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MffNetResult<PatchEmbed<B>> {
        if self.img_size == 0 || self.in_chans == 0 || self.embed_dim == 0 || self.kernel_size == 0 {
            return Err(MffNetError::invalid_config(
                "patch embedding sizes must be positive",
            ));
        }
        if self.patch_size != self.stride {
            return Err(MffNetError::invalid_config(format!(
                "patch_size {} must equal the fold stride {}",
                self.patch_size, self.stride
            )));
        }

        let out_size = self.img_size * self.stride;
        let blocks = self.fold_options().num_blocks([out_size, out_size]);
        if blocks != Some([self.img_size, self.img_size]) {
            return Err(MffNetError::invalid_config(format!(
                "fold (kernel {}, stride {}, padding {}) onto {out_size}x{out_size} yields {blocks:?} blocks, expected {}x{}",
                self.kernel_size, self.stride, self.padding, self.img_size, self.img_size
            )));
        }

        let (concat_fuse, interact, norm3) = if self.fuse {
            let interact = CrossAttentionConfig::new(self.embed_dim, self.in_chans, self.embed_dim)
                .with_num_heads(self.cross_attn_heads)
                .init(device)?;
            (
                MlpConfig::new(self.in_chans + self.embed_dim, self.in_chans, self.embed_dim)
                    .init(device),
                Some(interact),
                Some(LayerNormConfig::new(self.embed_dim).init(device)),
            )
        } else {
            (
                MlpConfig::new(self.in_chans, self.in_chans, self.embed_dim).init(device),
                None,
                None,
            )
        };

        Ok(PatchEmbed {
            img_size: self.img_size,
            patch_size: self.patch_size,
            in_chans: self.in_chans,
            embed_dim: self.embed_dim,
            kernel_size: self.kernel_size,
            stride: self.stride,
            padding: self.padding,
            project: trunc_normal_linear(
                self.in_chans,
                self.in_chans * self.kernel_size * self.kernel_size,
                true,
                device,
            ),
            lpu: kaiming_conv2d(
                Conv2dConfig::new([self.in_chans, self.in_chans], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1)),
                device,
            ),
            norm: LayerNormConfig::new(self.in_chans).init(device),
            norm2: LayerNormConfig::new(self.embed_dim).init(device),
            norm3,
            concat_fuse,
            interact,
        })
    }
}

/// Upsampling stage of the decoder.
///
/// Every input token is projected to a `kernel_size x kernel_size` patch and the
/// patches are overlap-added onto a grid `patch_size` times larger. A 3x3 convolution
/// residual (local perception unit) follows, then the tokens are mapped to
/// `embed_dim` channels. Fused stages concatenate the encoder skip features first and
/// refine the result with a cross-attention back onto the upsampled tokens.
#[derive(Module, Debug)]
pub struct PatchEmbed<B: Backend> {
    img_size: usize,
    patch_size: usize,
    in_chans: usize,
    embed_dim: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    project: Linear<B>,
    lpu: Conv2d<B>,
    norm: LayerNorm<B>,
    norm2: LayerNorm<B>,
    norm3: Option<LayerNorm<B>>,
    concat_fuse: Mlp<B>,
    interact: Option<CrossAttention<B>>,
}

impl<B: Backend> PatchEmbed<B> {
    /// Number of output tokens, `(img_size * patch_size)^2`.
    pub const fn num_patches(&self) -> usize {
        let side = self.img_size * self.patch_size;
        side * side
    }

    /// Geometry of the overlap-add upsampling.
    pub const fn fold_options(&self) -> Fold4dOptions {
        square_fold(self.kernel_size, self.stride, self.padding)
    }

    /// Whether this stage consumes skip features.
    pub const fn is_fused(&self) -> bool {
        self.interact.is_some()
    }

    /// # Shapes
    /// - x: `[batch_size, in_chans, img_size, img_size]`
    /// - enc_fea: `[batch_size, num_patches, embed_dim]`, ignored when not fused
    /// - output: `[batch_size, num_patches, embed_dim]` and the output grid `[h, w]`
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidTensorShape)` if `x` or `enc_fea` does not
    /// match the configured geometry, and `Err(MffNetError::InvalidConfiguration)` if a
    /// fused stage is called without skip features.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        enc_fea: Option<Tensor<B, 3>>,
    ) -> MffNetResult<(Tensor<B, 3>, [usize; 2])> {
        let [b, c, h, w] = x.dims();
        if h != self.img_size || w != self.img_size || c != self.in_chans {
            return Err(MffNetError::shape_mismatch(
                format!("[_, {}, {}, {}]", self.in_chans, self.img_size, self.img_size),
                format!("{:?}", x.dims()),
            ));
        }

        let out_size = self.img_size * self.stride;
        let x = self.project.forward(x.flatten::<3>(2, 3).swap_dims(1, 2));
        let x = fold4d(x.swap_dims(1, 2), [out_size, out_size], self.fold_options());
        let x = self.lpu.forward(x.clone()) + x;
        let x = self.norm.forward(x.flatten::<3>(2, 3).swap_dims(1, 2));
        let grid = [h * self.patch_size, w * self.patch_size];

        let x = match (&self.interact, &self.norm3) {
            (Some(interact), Some(norm3)) => {
                let Some(enc_fea) = enc_fea else {
                    return Err(MffNetError::invalid_config(
                        "fused patch embedding requires encoder skip features",
                    ));
                };
                let expected = [b, self.num_patches(), self.embed_dim];
                if enc_fea.dims() != expected {
                    return Err(MffNetError::shape_mismatch(
                        format!("skip features {expected:?}"),
                        format!("{:?}", enc_fea.dims()),
                    ));
                }

                let x0 = x.clone();
                let x = self
                    .norm2
                    .forward(self.concat_fuse.forward(Tensor::cat(vec![x, enc_fea], 2)));
                let x = x.clone() + interact.forward(x, x0)?;
                norm3.forward(x)
            }
            _ => self.norm2.forward(self.concat_fuse.forward(x)),
        };

        Ok((x, grid))
    }
}
