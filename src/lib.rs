//! ippo - Independent Proximal Policy Optimization for multi-agent control
//!
//! An actor-critic model for `n` agents in a shared environment. Policy and
//! value networks are either shared across agents or owned per agent,
//! actions are sampled under configurable exploration with action masking,
//! and losses are produced by a pluggable learning algorithm (PPO).

pub mod algorithms;
pub mod config;
pub mod error;
pub mod exploration;
pub mod model;
pub mod network;
pub mod policy;
pub mod training;
pub mod types;

pub use algorithms::{LearningAlgorithm, Loss, Ppo};
pub use config::{Config, ModelConfig, PpoConfig, TrainConfig};
pub use error::{IppoError, Result};
pub use exploration::{select_action, ActionOut};
pub use model::{ActionSelection, IppoModel, PolicyOutput};
pub use policy::{NeuralPolicy, Policy, RandomPolicy};
pub use training::{Batch, MultiAgentEnv, RolloutBuffer, Trainer};
pub use types::{Activation, AgentType, InitType, Status};
