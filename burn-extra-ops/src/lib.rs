//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that the MFF-Net decoder needs but that are not
//! available in the core Burn framework:
//!
//! - [`fold4d`]: overlap-add reconstruction of a spatial grid from sliding-window columns,
//!   the inverse of Burn's `unfold4d`.
//! - [`DropPath`]: stochastic depth regularization.
//! - [`trunc_normal`]: truncated normal initialization, built on [`erfinv`].

mod drop_path;
mod erfinv;
mod fold;
mod trunc_normal;

pub use drop_path::{DropPath, DropPathConfig};
pub use erfinv::{erfinv, Erfinv};
pub use fold::{fold4d, Fold4dOptions};
pub use trunc_normal::trunc_normal;
