//! # Model Architecture
//!
//! - `decoder`: the `DecoderC` model and its initialization from [`DecoderCConfig`](crate::DecoderCConfig).
//! - `modules`: building blocks shared by the decoder stages (patch embedding,
//!   self- and cross-attention, attention blocks, MLP heads).

pub mod decoder;
pub mod modules;

pub use decoder::{DecoderC, DecoderCOutput, DecoderCRecord};
pub use modules::*;
