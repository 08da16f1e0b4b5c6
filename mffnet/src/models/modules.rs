mod attention;
mod block;
mod cross_attention;
mod mlp;
mod patch_embed;
mod utils;

pub use attention::*;
pub use block::*;
pub use cross_attention::*;
pub use mlp::*;
pub use patch_embed::*;

pub(crate) use utils::trunc_normal_linear;
