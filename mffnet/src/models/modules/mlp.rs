use burn::{nn::Gelu, nn::Linear, prelude::*};

use super::utils::trunc_normal_linear;

/// Configuration for a two-layer projection `Linear -> GELU -> Linear`.
///
/// The decoder uses it for the auxiliary 1/16-scale head and for the concatenation
/// fusion of every upsampling stage.
#[derive(Config, Debug)]
pub struct MlpConfig {
    in_features: usize,
    hidden_features: usize,
    out_features: usize,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Mlp<B> {
        Mlp {
            fc1: trunc_normal_linear(self.in_features, self.hidden_features, true, device),
            act: Gelu::new(),
            fc2: trunc_normal_linear(self.hidden_features, self.out_features, true, device),
        }
    }
}

/// Two-layer projection with a GELU in between.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Linear<B>,
    act: Gelu,
    fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    /// # Shapes
    /// - x: `[batch_size, tokens, in_features]`
    /// - output: `[batch_size, tokens, out_features]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.fc1.forward(x);
        let x = self.act.forward(x);
        self.fc2.forward(x)
    }
}
