//! Small enums shared by the configuration, networks and model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Architecture of a per-agent policy network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Feed-forward agent; the hidden state is recomputed every step.
    #[default]
    Mlp,
    /// GRU agent carrying its hidden state across steps.
    Rnn,
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentType::Mlp => write!(f, "mlp"),
            AgentType::Rnn => write!(f, "rnn"),
        }
    }
}

/// Nonlinearity used after the hidden layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
}

impl Activation {
    /// Applies the activation element-wise.
    pub fn apply(&self, xs: &tch::Tensor) -> tch::Tensor {
        match self {
            Activation::Relu => xs.relu(),
            Activation::Tanh => xs.tanh(),
        }
    }

    /// Recommended init gain, matching `torch.nn.init.calculate_gain`.
    pub fn gain(&self) -> f64 {
        match self {
            Activation::Relu => std::f64::consts::SQRT_2,
            Activation::Tanh => 5.0 / 3.0,
        }
    }
}

/// Weight initialisation scheme for linear layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitType {
    #[default]
    Normal,
    Orthogonal,
}

/// Whether actions are drawn for learning or for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Train,
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Tensor;

    #[test]
    fn agent_type_parses_lowercase() {
        let t: AgentType = serde_json::from_str("\"rnn\"").unwrap();
        assert_eq!(t, AgentType::Rnn);
        assert_eq!(t.to_string(), "rnn");
    }

    #[test]
    fn activation_apply() {
        let xs = Tensor::from_slice(&[-1.0f32, 0.5]);
        let relu: Vec<f32> = Vec::try_from(&Activation::Relu.apply(&xs)).unwrap();
        assert_eq!(relu, vec![0.0, 0.5]);
        let tanh: Vec<f32> = Vec::try_from(&Activation::Tanh.apply(&xs)).unwrap();
        assert!((tanh[0] + 0.7616).abs() < 1e-4);
    }

    #[test]
    fn gains_match_torch() {
        assert!((Activation::Relu.gain() - 1.41421).abs() < 1e-4);
        assert!((Activation::Tanh.gain() - 1.66667).abs() < 1e-4);
    }
}
