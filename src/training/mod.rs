//! Training infrastructure for IPPO.
//!
//! Provides the rollout buffer, GAE computation, the environment interface
//! and the trainer driving collection and optimisation.

pub mod buffer;
pub mod env;
pub mod gae;
pub mod trainer;

pub use buffer::{Batch, RolloutBuffer, Transition};
pub use env::{AgentObservations, MultiAgentEnv, StepResult};
pub use trainer::{TrainStats, Trainer};
