//! MFF-Net Demos
//!
//! Command-line programs around the `mffnet-burn` decoder.
//!
//! ## Available Demos
//!
//! - `decode`: Run `DecoderC` on synthetic encoder features and export the masks
//! - `dataset_test`: List and batch the shadow datasets
//! - `converter`: Convert a PyTorch `DecoderC` checkpoint to a Burn record
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin decode -- --output-dir masks
//! cargo run --bin dataset_test -- --data-root datasets/shadow --split train
//! cargo run --bin converter -- decoder.pth decoder --config decoder.json
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use burn::{config::Config, prelude::*, tensor::cast::ToElement};
use cfg_if::cfg_if;
use mffnet_burn::DecoderCConfig;
use tracing_subscriber::EnvFilter;

cfg_if! {
    if #[cfg(feature = "cuda")] {
        /// Backend the demos run the decoder on.
        pub type SelectedBackend = burn::backend::Cuda;
        const BACKEND_NAME: &str = "CUDA (NVIDIA GPU)";
    } else if #[cfg(feature = "wgpu")] {
        /// Backend the demos run the decoder on.
        pub type SelectedBackend = burn::backend::Wgpu;
        const BACKEND_NAME: &str = "WGPU (GPU)";
    } else {
        /// Backend the demos run the decoder on.
        pub type SelectedBackend = burn::backend::NdArray;
        const BACKEND_NAME: &str = "NdArray (CPU)";
    }
}

/// Device of [`SelectedBackend`].
pub type SelectedDevice = Device<SelectedBackend>;

/// Default device of the backend chosen by the cargo features.
pub fn create_device() -> SelectedDevice {
    SelectedDevice::default()
}

/// Human-readable name of [`SelectedBackend`].
pub const fn get_backend_name() -> &'static str {
    BACKEND_NAME
}

/// Installs the formatting subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Loads a decoder configuration from JSON, or the default configuration.
pub fn load_decoder_config(path: Option<&Path>) -> Result<DecoderCConfig> {
    let config = match path {
        Some(path) => DecoderCConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => DecoderCConfig::new(),
    };
    config.validate().context("Invalid decoder configuration")?;
    Ok(config)
}

/// `(min, max, mean)` of a tensor.
pub fn tensor_stats<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> (f32, f32, f32) {
    let min_val = tensor.clone().min().into_scalar().to_f32();
    let max_val = tensor.clone().max().into_scalar().to_f32();
    let mean_val = tensor.mean().into_scalar().to_f32();

    (min_val, max_val, mean_val)
}
