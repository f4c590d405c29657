//! MLP value network.

use tch::{nn, nn::Module, Tensor};

use super::init::init_linear;
use crate::config::ModelConfig;
use crate::types::Activation;

/// Per-agent state-value network `V(o_i)`.
///
/// Architecture: `input → hid → hid → output` with the configured hidden
/// activation after both hidden layers. Layer-norm is a policy-only option.
pub struct MlpCritic {
    fc1: nn::Linear,
    fc2: nn::Linear,
    fc3: nn::Linear,
    activation: Activation,
}

impl MlpCritic {
    /// Creates a new critic under `p`.
    pub fn new(p: &nn::Path, input_dim: usize, output_dim: usize, config: &ModelConfig) -> Self {
        let hid = config.hid_size as i64;
        let mut fc1 = nn::linear(p / "fc1", input_dim as i64, hid, Default::default());
        let mut fc2 = nn::linear(p / "fc2", hid, hid, Default::default());
        let mut fc3 = nn::linear(p / "fc3", hid, output_dim as i64, Default::default());
        for layer in [&mut fc1, &mut fc2, &mut fc3] {
            init_linear(layer, config);
        }
        Self {
            fc1,
            fc2,
            fc3,
            activation: config.hid_activation,
        }
    }

    /// Forward pass: returns `(value, hidden)` with shapes
    /// `(batch, output_dim)` and `(batch, hid)`.
    pub fn forward(&self, inputs: &Tensor) -> (Tensor, Tensor) {
        let x = self.activation.apply(&self.fc1.forward(inputs));
        let h = self.activation.apply(&self.fc2.forward(&x));
        (self.fc3.forward(&h), h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn critic_forward_shape() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cfg = ModelConfig {
            hid_size: 32,
            ..ModelConfig::default()
        };
        let critic = MlpCritic::new(&vs.root(), 10, 1, &cfg);
        let inputs = Tensor::randn([7, 10], (Kind::Float, Device::Cpu));
        let (value, hidden) = critic.forward(&inputs);
        assert_eq!(value.size(), &[7, 1]);
        assert_eq!(hidden.size(), &[7, 32]);
    }

    #[test]
    fn layernorm_option_does_not_reach_the_critic() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cfg = ModelConfig {
            layernorm: true,
            ..ModelConfig::default()
        };
        let _critic = MlpCritic::new(&vs.root(), 4, 1, &cfg);
        // 3 linear layers (weight + bias) only
        assert_eq!(vs.trainable_variables().len(), 6);
    }
}
