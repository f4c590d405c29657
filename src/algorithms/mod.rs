//! Learning algorithms that turn a batch of experience into losses.

pub mod ppo;

pub use ppo::Ppo;

use tch::Tensor;

use crate::error::Result;
use crate::exploration::ActionOut;
use crate::model::IppoModel;
use crate::training::buffer::Batch;

/// Losses produced by a [`LearningAlgorithm`].
#[derive(Debug)]
pub struct Loss {
    /// Scalar loss for the policy parameters.
    pub policy_loss: Tensor,
    /// Scalar loss for the value parameters.
    pub value_loss: Tensor,
    /// Action head evaluated on the batch, detached.
    pub action_out: ActionOut,
}

/// Strategy computing policy and value losses for an [`IppoModel`].
///
/// The model is passed in as the behaviour network; its target network,
/// when one is attached, is reachable through [`IppoModel::target_value`].
pub trait LearningAlgorithm: Send + Sync {
    /// Computes the losses for `batch`.
    fn get_loss(&self, batch: &Batch, behaviour: &IppoModel) -> Result<Loss>;

    /// Returns that must be computed over the whole time-ordered batch
    /// before it is split into minibatches, `(b, n)`. `None` when every
    /// row can be handled on its own.
    fn compute_returns(&self, _batch: &Batch, _behaviour: &IppoModel) -> Result<Option<Tensor>> {
        Ok(None)
    }

    /// Returns a human-readable name for this algorithm.
    fn name(&self) -> &str;
}
