//! Decoder Demo
//!
//! Runs `DecoderC` on synthetic encoder features, prints the shape and value range of
//! every prediction and optionally writes the probability masks as PNG files.
//!
//! ## Usage
//!
//! ```bash
//! # Default configuration, random weights
//! cargo run --bin decode
//!
//! # Converted weights and exported masks
//! cargo run --bin decode -- --weights decoder --output-dir masks
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::Distribution,
};
use clap::Parser;
use image::GrayImage;
use mffnet_demos::{
    create_device, get_backend_name, init_logging, load_decoder_config, tensor_stats,
    SelectedBackend,
};

const SCALE_NAMES: [&str; 4] = ["1_16", "1_8", "1_4", "1_1"];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Decoder configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Burn record to load (NamedMpk, without extension)
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Number of synthetic samples
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Seed of the synthetic features
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Directory for the probability masks
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_decoder_config(args.config.as_deref())?;
    let device = create_device();
    println!("Using backend: {}", get_backend_name());

    let model = config
        .init::<SelectedBackend>(&device)
        .context("Failed to initialize decoder")?;
    let model = match &args.weights {
        Some(path) => {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            let model = model
                .load_file(path.clone(), &recorder, &device)
                .with_context(|| format!("Failed to load weights: {}", path.display()))?;
            println!("Loaded weights from {}", path.display());
            model
        }
        None => {
            println!("Using randomly initialized weights");
            model
        }
    };

    SelectedBackend::seed(args.seed);
    let [n, c] = config.input_shape();
    let [[n8, c8], [n4, c4]] = config.skip_shapes();
    let features = |tokens: usize, channels: usize| {
        Tensor::<SelectedBackend, 3>::random(
            [args.batch_size, tokens, channels],
            Distribution::Normal(0.0, 1.0),
            &device,
        )
    };

    let output = model
        .forward(features(n, c), features(n8, c8), features(n4, c4))
        .context("Decoder forward pass failed")?;

    println!("\n=== Predictions ===");
    for (name, (logits, probabilities)) in SCALE_NAMES
        .iter()
        .zip(output.logits.iter().zip(output.probabilities.iter()))
    {
        let (l_min, l_max, l_mean) = tensor_stats(logits.clone());
        let (p_min, p_max, p_mean) = tensor_stats(probabilities.clone());
        println!("mask_{name}: {:?}", logits.dims());
        println!("  logits: min={l_min:.4}, max={l_max:.4}, mean={l_mean:.4}");
        println!("  sigmoid: min={p_min:.4}, max={p_max:.4}, mean={p_mean:.4}");
    }

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        for (name, probabilities) in SCALE_NAMES.iter().zip(output.probabilities) {
            save_masks(probabilities, dir, name)?;
        }
        println!("\nMasks written to {}", dir.display());
    }

    Ok(())
}

/// Writes every mask of a `[batch, 1, h, w]` probability tensor as an 8-bit PNG.
fn save_masks<B: Backend>(probabilities: Tensor<B, 4>, dir: &Path, name: &str) -> Result<()> {
    let [batch, _, height, width] = probabilities.dims();
    let values = probabilities
        .mul_scalar(255.0)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read mask data: {e:?}"))?;

    for (index, mask) in values.chunks(height * width).take(batch).enumerate() {
        let pixels = mask.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();
        let image = GrayImage::from_raw(width as u32, height as u32, pixels)
            .context("Mask buffer does not match its dimensions")?;
        let path = dir.join(format!("sample{index}_m_{name}.png"));
        image
            .save(&path)
            .with_context(|| format!("Failed to save mask: {}", path.display()))?;
    }
    Ok(())
}
