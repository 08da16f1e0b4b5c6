//! Configuration of the MFF-Net decoder.
//!
//! The decoder is fixed at construction time by a single [`DecoderCConfig`] record. The
//! per-stage arrays follow the layout of the reference network: index 2 configures the
//! 1/4-scale stage ("c") and index 3 configures the 1/8-scale stage ("d"); indices 0
//! and 1 belong to stages that are not built.

use burn::prelude::*;

use crate::error::{MffNetError, MffNetResult};

/// Hyper-parameters of [`DecoderC`](crate::DecoderC).
#[derive(Config, Debug)]
pub struct DecoderCConfig {
    /// Side of the full-resolution (square) output mask. Must be divisible by 16.
    #[config(default = "224")]
    pub img_size: usize,
    /// Channel widths at 1/16, 1/8, 1/4 and full resolution.
    #[config(default = "[384, 128, 64, 16]")]
    pub embed_dims: [usize; 4],
    /// Attention heads per stage.
    #[config(default = "[1, 2, 4, 8]")]
    pub num_heads: [usize; 4],
    /// MLP expansion ratios per stage. Kept for compatibility with checkpoints of the
    /// reference network: its blocks replace the MLP with a convolutional residual, so
    /// no layer is sized from these values.
    #[config(default = "[3.6, 3.6, 3.6, 3.6]")]
    pub mlp_ratios: [f64; 4],
    /// Learnable bias on the block attention projections.
    #[config(default = "true")]
    pub qkv_bias: bool,
    /// Overrides the attention scale `head_dim^-0.5`.
    #[config(default = "None")]
    pub qk_scale: Option<f64>,
    /// Dropout after attention output projections.
    #[config(default = "0.0")]
    pub drop_rate: f64,
    /// Dropout on attention weights.
    #[config(default = "0.0")]
    pub attn_drop_rate: f64,
    /// Maximum stochastic depth rate, reached by the last block.
    #[config(default = "0.0")]
    pub drop_path_rate: f64,
    /// Number of blocks per stage.
    #[config(default = "[2, 3, 6, 3]")]
    pub depths: [usize; 4],
    /// Query/key width reduction: `qk_dim = dim / qk_ratio`.
    #[config(default = "1")]
    pub qk_ratio: usize,
    /// Key/value spatial-reduction ratios per stage.
    #[config(default = "[8, 4, 2, 1]")]
    pub sr_ratios: [usize; 4],
    /// Heads of the cross-attention in every fused upsampling stage.
    #[config(default = "4")]
    pub cross_attn_heads: usize,
}

/// Stage index of the 1/4-scale blocks in the per-stage arrays.
pub(crate) const STAGE_C: usize = 2;
/// Stage index of the 1/8-scale blocks in the per-stage arrays.
pub(crate) const STAGE_D: usize = 3;

impl DecoderCConfig {
    /// Grid sides at 1/16, 1/8, 1/4 and full resolution.
    pub const fn grid_sizes(&self) -> [usize; 4] {
        [
            self.img_size / 16,
            self.img_size / 8,
            self.img_size / 4,
            self.img_size,
        ]
    }

    /// Expected shape `[tokens, channels]` of the coarse input `x` (per batch item).
    pub const fn input_shape(&self) -> [usize; 2] {
        let grid = self.img_size / 16;
        [grid * grid, self.embed_dims[0]]
    }

    /// Expected shapes `[tokens, channels]` of the 1/8 and 1/4 skip features.
    pub const fn skip_shapes(&self) -> [[usize; 2]; 2] {
        let [_, grid_8, grid_4, _] = self.grid_sizes();
        [
            [grid_8 * grid_8, self.embed_dims[1]],
            [grid_4 * grid_4, self.embed_dims[2]],
        ]
    }

    /// Stochastic depth rate of every block, linearly increasing from 0 to
    /// `drop_path_rate` over all stages (including those that are not built).
    pub fn drop_path_rates(&self) -> Vec<f64> {
        let total: usize = self.depths.iter().sum();
        if total <= 1 {
            return vec![0.0; total];
        }
        (0..total)
            .map(|i| self.drop_path_rate * i as f64 / (total - 1) as f64)
            .collect()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(MffNetError::InvalidConfiguration)` if any rule is violated.
    pub fn validate(&self) -> MffNetResult<()> {
        if self.img_size == 0 || self.img_size % 16 != 0 {
            return Err(MffNetError::invalid_config(format!(
                "img_size must be a positive multiple of 16, got {}",
                self.img_size
            )));
        }

        if let Some(index) = self.embed_dims.iter().position(|dim| *dim == 0) {
            return Err(MffNetError::invalid_config(format!(
                "embed_dims[{index}] must be positive"
            )));
        }

        if self.mlp_ratios.iter().any(|ratio| *ratio <= 0.0) {
            return Err(MffNetError::invalid_config("mlp_ratios must be positive"));
        }

        if self.qk_ratio == 0 {
            return Err(MffNetError::invalid_config("qk_ratio must be at least 1"));
        }

        for (name, rate) in [
            ("drop_rate", self.drop_rate),
            ("attn_drop_rate", self.attn_drop_rate),
            ("drop_path_rate", self.drop_path_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(MffNetError::invalid_config(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }

        let [_, grid_8, grid_4, _] = self.grid_sizes();
        for (stage, dim, grid) in [
            (STAGE_C, self.embed_dims[2], grid_4),
            (STAGE_D, self.embed_dims[1], grid_8),
        ] {
            let heads = self.num_heads[stage];
            if heads == 0 || dim % heads != 0 {
                return Err(MffNetError::invalid_config(format!(
                    "num_heads[{stage}] = {heads} must divide the stage width {dim}"
                )));
            }
            if (dim / self.qk_ratio) % heads != 0 || dim % self.qk_ratio != 0 {
                return Err(MffNetError::invalid_config(format!(
                    "qk_ratio {} is incompatible with width {dim} and {heads} heads",
                    self.qk_ratio
                )));
            }
            let sr = self.sr_ratios[stage];
            if sr == 0 || grid % sr != 0 {
                return Err(MffNetError::invalid_config(format!(
                    "sr_ratios[{stage}] = {sr} must divide the stage resolution {grid}"
                )));
            }
        }

        let heads = self.cross_attn_heads;
        for dim in [self.embed_dims[1], self.embed_dims[2]] {
            if heads == 0 || dim % heads != 0 {
                return Err(MffNetError::invalid_config(format!(
                    "cross_attn_heads = {heads} must divide the fused width {dim}"
                )));
            }
        }

        Ok(())
    }
}
