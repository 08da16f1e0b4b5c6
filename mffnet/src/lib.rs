//! # MFF-Net Decoder for Burn
//!
//! The shadow-detection decoder of MFF-Net ("DecoderC") and, behind the `dataset`
//! feature, a loader for the ISTD/SRD shadow benchmarks.
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use burn::prelude::*;
//! use mffnet_burn::DecoderCConfig;
//!
//! # fn main() -> mffnet_burn::MffNetResult<()> {
//! let device = Default::default();
//! let config = DecoderCConfig::new();
//! let model = config.init::<NdArray>(&device)?;
//!
//! let [n, c] = config.input_shape();
//! let [[n8, c8], [n4, c4]] = config.skip_shapes();
//! let masks = model.forward(
//!     Tensor::zeros([1, n, c], &device),
//!     Tensor::zeros([1, n8, c8], &device),
//!     Tensor::zeros([1, n4, c4], &device),
//! )?;
//! assert_eq!(masks.into_vec().len(), 8);
//! # Ok(())
//! # }
//! ```

mod config;
#[cfg(feature = "dataset")]
pub mod dataset;
mod error;
mod models;
#[cfg(test)]
mod tests;

pub use config::DecoderCConfig;
pub use error::{MffNetError, MffNetResult};
pub use models::{
    Attention, AttentionConfig, Block, BlockConfig, CrossAttention, CrossAttentionConfig,
    DecoderC, DecoderCOutput, DecoderCRecord, Mlp, MlpConfig, PatchEmbed, PatchEmbedConfig,
    SpatialReduction,
};
