//! Per-agent policy and value networks built with tch-rs.
//!
//! Every network is created under a [`tch::nn::Path`] so that a model can
//! place all its policy networks in one variable store and all its value
//! networks in another.

pub mod agent;
pub mod critic;
pub mod init;

use tch::Tensor;

pub use agent::{MlpAgent, RnnAgent};
pub use critic::MlpCritic;

/// Output of one forward pass of a policy network.
#[derive(Debug)]
pub struct AgentOutput {
    /// Action logits (discrete) or Gaussian means (continuous), `(batch, action_dim)`.
    pub means: Tensor,
    /// Learned log standard deviations, when the network has a log-std head.
    pub log_stds: Option<Tensor>,
    /// Hidden representation to feed back on the next step, `(batch, hid_size)`.
    pub hidden: Tensor,
}

/// A policy network driving one agent (or all agents when parameters are shared).
pub trait AgentNetwork {
    /// Runs the network on `inputs (batch, input_dim)` given the previous
    /// hidden state `(batch, hid_size)`.
    fn forward(&self, inputs: &Tensor, hidden: &Tensor) -> AgentOutput;

    /// Zero hidden state for `batch` rows.
    fn init_hidden(&self, batch: i64) -> Tensor;
}
