//! Model Converter Demo
//!
//! Converts a PyTorch `state_dict` of the reference DecoderC network into a Burn
//! `NamedMpk` record.
//!
//! ## Usage
//!
//! ```bash
//! # Default configuration
//! cargo run --bin converter -- decoder.pth decoder
//!
//! # Custom configuration, checkpoint nested under a key
//! cargo run --bin converter -- model.pth decoder --config decoder.json --top-level-key decoder
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use clap::Parser;
use mffnet_burn::DecoderCRecord;
use mffnet_demos::{
    create_device, get_backend_name, init_logging, load_decoder_config, SelectedBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PyTorch checkpoint (.pth file)
    input: PathBuf,

    /// Output Burn record path (the recorder adds the extension)
    output: PathBuf,

    /// Decoder configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Key of the state dict inside the checkpoint
    #[arg(long)]
    top_level_key: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Maps the `nn.Sequential` containers of the PyTorch network onto named fields.
fn load_args(args: &Args) -> LoadArgs {
    let load_args = LoadArgs::new(args.input.clone())
        // PatchEmbed.concatFuse
        .with_key_remap("(.+)\\.concatFuse\\.0\\.(.+)", "$1.concat_fuse.fc1.$2")
        .with_key_remap("(.+)\\.concatFuse\\.2\\.(.+)", "$1.concat_fuse.fc2.$2")
        // Auxiliary 1/16 head
        .with_key_remap("^mlp\\.0\\.(.+)", "mlp.fc1.$1")
        .with_key_remap("^mlp\\.2\\.(.+)", "mlp.fc2.$1")
        // Attention.sr
        .with_key_remap("(.+)\\.attn\\.sr\\.0\\.(.+)", "$1.attn.sr.conv.$2")
        .with_key_remap("(.+)\\.attn\\.sr\\.1\\.(.+)", "$1.attn.sr.norm.$2");

    match &args.top_level_key {
        Some(key) => load_args.with_top_level_key(key),
        None => load_args,
    }
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if !args.input.exists() {
        anyhow::bail!("Input checkpoint does not exist: {}", args.input.display());
    }

    let config = load_decoder_config(args.config.as_deref())?;
    let device = create_device();

    if args.verbose {
        println!("Using backend: {}", get_backend_name());
        println!("Input file: {}", args.input.display());
        println!("Output file: {}", args.output.display());
    }

    let record: DecoderCRecord<SelectedBackend> =
        PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(load_args(&args), &device)
            .context("Failed to decode PyTorch checkpoint")?;

    let model = config
        .init::<SelectedBackend>(&device)
        .context("Failed to initialize decoder")?
        .load_record(record);

    if args.verbose {
        println!("Checkpoint mapped onto DecoderC ({} parameters)", model.num_params());
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(args.output.clone(), &recorder)
        .context("Failed to save converted model")?;

    println!("Model conversion completed successfully!");
    Ok(())
}
