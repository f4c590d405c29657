//! Configuration for the IPPO model, the PPO objective and the trainer.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tch::Device;

use crate::error::{IppoError, Result};
use crate::types::{Activation, AgentType, InitType};

/// Configuration of the actor-critic model.
///
/// Controls network geometry, parameter sharing, the action head and
/// exploration behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    // --- Problem geometry ---
    /// Number of agents `n`.
    pub n_agents: usize,
    /// Per-agent observation size.
    pub obs_dim: usize,
    /// Per-agent action size (number of choices for discrete heads).
    pub action_dim: usize,
    /// Width of the hidden layers.
    pub hid_size: usize,

    // --- Architecture ---
    /// Append a one-hot agent id to every network input.
    pub agent_id: bool,
    /// Share a single policy and a single critic between all agents.
    pub shared_params: bool,
    /// Policy network architecture.
    pub agent_type: AgentType,
    /// Layer-norm after the first policy layer.
    pub layernorm: bool,
    /// Hidden activation.
    pub hid_activation: Activation,
    /// Weight initialisation scheme.
    pub init_type: InitType,
    /// Standard deviation for [`InitType::Normal`].
    pub init_std: f64,

    // --- Action head ---
    /// Gaussian head instead of a categorical one.
    pub continuous: bool,
    /// Learn a state-dependent log-std head (continuous only).
    pub gaussian_policy: bool,
    /// Standard deviation used when no log-std head is learned.
    pub fixed_policy_std: f64,
    /// Squash continuous actions into `[-1, 1]` with `tanh`.
    pub action_enforcebound: bool,

    // --- Discrete exploration ---
    /// Mix the softmax with a uniform distribution.
    pub epsilon_softmax: bool,
    /// Uniform mixing weight ε.
    pub softmax_eps: f64,
    /// Straight-through Gumbel-softmax sampling.
    pub gumbel_softmax: bool,

    // --- Target network ---
    /// Keep a slowly-updated target copy of the model.
    pub target: bool,
    /// Soft update rate τ.
    pub target_lr: f64,

    /// Use CUDA when it is available.
    pub cuda: bool,
}

impl ModelConfig {
    /// Input size of every policy network.
    pub fn policy_input_dim(&self) -> usize {
        if self.agent_id {
            self.obs_dim + self.n_agents
        } else {
            self.obs_dim
        }
    }

    /// Input size of every value network. It is `V(s)`, not `Q(s, a)`.
    pub fn value_input_dim(&self) -> usize {
        self.policy_input_dim()
    }

    /// Number of distinct policy (and value) networks.
    pub fn n_networks(&self) -> usize {
        if self.shared_params {
            1
        } else {
            self.n_agents
        }
    }

    /// Device the model lives on.
    pub fn device(&self) -> Device {
        if self.cuda {
            Device::cuda_if_available()
        } else {
            Device::Cpu
        }
    }

    /// Rejects configurations the model cannot be built from.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("n_agents", self.n_agents),
            ("obs_dim", self.obs_dim),
            ("action_dim", self.action_dim),
            ("hid_size", self.hid_size),
        ] {
            if value == 0 {
                return Err(IppoError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.init_std <= 0.0 {
            return Err(IppoError::InvalidConfig("init_std must be positive".into()));
        }
        if self.fixed_policy_std <= 0.0 {
            return Err(IppoError::InvalidConfig(
                "fixed_policy_std must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.softmax_eps) {
            return Err(IppoError::InvalidConfig(
                "softmax_eps must lie in [0, 1]".into(),
            ));
        }
        if self.epsilon_softmax && self.gumbel_softmax {
            return Err(IppoError::InvalidConfig(
                "epsilon_softmax and gumbel_softmax are mutually exclusive".into(),
            ));
        }
        if self.target_lr <= 0.0 || self.target_lr > 1.0 {
            return Err(IppoError::InvalidConfig(
                "target_lr must lie in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_agents: 2,
            obs_dim: 8,
            action_dim: 4,
            hid_size: 64,
            agent_id: false,
            shared_params: true,
            agent_type: AgentType::Mlp,
            layernorm: false,
            hid_activation: Activation::Relu,
            init_type: InitType::Normal,
            init_std: 0.1,
            continuous: false,
            gaussian_policy: false,
            fixed_policy_std: 1.0,
            action_enforcebound: false,
            epsilon_softmax: false,
            softmax_eps: 0.1,
            gumbel_softmax: false,
            target: false,
            target_lr: 0.1,
            cuda: false,
        }
    }
}

/// Hyperparameters of the PPO objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    /// Discount factor γ.
    pub gamma: f64,
    /// PPO clip parameter ε.
    pub eps_clip: f64,
    /// GAE λ. `None` uses one-step TD returns.
    pub gae_lambda: Option<f64>,
    /// Normalise advantages over the batch.
    pub normalize_advantages: bool,
    /// Clip the value update around the stored value estimate.
    pub value_clip: Option<f64>,
    /// Entropy bonus coefficient.
    pub entropy_coef: f64,
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(IppoError::InvalidConfig("gamma must lie in [0, 1]".into()));
        }
        if self.eps_clip <= 0.0 {
            return Err(IppoError::InvalidConfig("eps_clip must be positive".into()));
        }
        if let Some(lambda) = self.gae_lambda {
            if !(0.0..=1.0).contains(&lambda) {
                return Err(IppoError::InvalidConfig(
                    "gae_lambda must lie in [0, 1]".into(),
                ));
            }
        }
        if matches!(self.value_clip, Some(c) if c <= 0.0) {
            return Err(IppoError::InvalidConfig("value_clip must be positive".into()));
        }
        Ok(())
    }
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            eps_clip: 0.2,
            gae_lambda: None,
            normalize_advantages: true,
            value_clip: None,
            entropy_coef: 0.0,
        }
    }
}

/// Optimisation schedule for [`crate::training::Trainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Policy learning rate.
    pub policy_lrate: f64,
    /// Value learning rate.
    pub value_lrate: f64,
    /// Maximum gradient norm for clipping.
    pub max_grad_norm: f64,
    /// Number of PPO optimisation epochs per update.
    pub epochs: u32,
    /// Mini-batch size. `None` uses the whole batch.
    pub minibatch_size: Option<usize>,
    /// Soft target update every this many optimiser steps.
    pub target_update_freq: u32,
    /// Number of episodes collected per update.
    pub episodes_per_update: u32,
    /// Log every this many updates.
    pub log_interval: u32,
    /// Seed for tensor sampling and mini-batch shuffling.
    pub seed: u64,
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.policy_lrate <= 0.0 || self.value_lrate <= 0.0 {
            return Err(IppoError::InvalidConfig(
                "learning rates must be positive".into(),
            ));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(IppoError::InvalidConfig(
                "max_grad_norm must be positive".into(),
            ));
        }
        if self.epochs == 0 || self.episodes_per_update == 0 {
            return Err(IppoError::InvalidConfig(
                "epochs and episodes_per_update must be positive".into(),
            ));
        }
        if self.minibatch_size == Some(0) {
            return Err(IppoError::InvalidConfig(
                "minibatch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            policy_lrate: 1e-4,
            value_lrate: 1e-3,
            max_grad_norm: 1.0,
            epochs: 4,
            minibatch_size: None,
            target_update_freq: 1,
            episodes_per_update: 1,
            log_interval: 10,
            seed: 0,
        }
    }
}

/// Full run configuration, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub ppo: PpoConfig,
    pub train: TrainConfig,
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.ppo.validate()?;
        self.train.validate()
    }
}
