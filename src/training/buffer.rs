//! Rollout buffer and the batched view consumed by the learning algorithm.

use tch::{Device, Tensor};

use crate::config::ModelConfig;
use crate::error::{ensure_shape, IppoError, Result};

/// A single environment step for all agents. Every tensor is `(n, ·)`.
#[derive(Debug)]
pub struct Transition {
    /// Per-agent observations `(n, obs_dim)`.
    pub state: Tensor,
    /// Per-agent actions `(n, action_dim)`, one-hot for discrete heads.
    pub actions: Tensor,
    /// Log-probabilities of `actions` at collection time `(n, 1)`.
    pub log_prob_a: Tensor,
    /// Value estimates at collection time `(n, 1)`.
    pub values: Tensor,
    /// Per-agent rewards `(n)`.
    pub rewards: Tensor,
    /// Observations after the step `(n, obs_dim)`.
    pub next_state: Tensor,
    /// Episode terminated `(n)`.
    pub done: Tensor,
    /// Episode truncated or ended at this step `(n)`.
    pub last_step: Tensor,
    /// Action availability mask `(n, action_dim)`; zero marks unavailable.
    pub actions_avail: Tensor,
    /// Hidden state fed into the policy `(n, hid_size)`.
    pub last_hids: Tensor,
    /// Hidden state produced by the policy `(n, hid_size)`.
    pub hids: Tensor,
}

/// A batch of transitions. Every tensor is `(b, n, ·)`.
#[derive(Debug)]
pub struct Batch {
    /// Returns computed over the whole time-ordered batch `(b, n)`, carried
    /// through [`Batch::minibatch`] so shuffled rows keep them.
    pub returns: Option<Tensor>,
    pub state: Tensor,
    pub actions: Tensor,
    pub old_log_prob_a: Tensor,
    pub old_values: Tensor,
    pub rewards: Tensor,
    pub next_state: Tensor,
    pub done: Tensor,
    pub last_step: Tensor,
    pub actions_avail: Tensor,
    pub last_hids: Tensor,
    pub hids: Tensor,
}

impl Batch {
    /// Number of steps in the batch.
    pub fn len(&self) -> usize {
        self.state.size().first().copied().unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks every tensor against the shapes implied by `config`.
    pub fn validate(&self, config: &ModelConfig) -> Result<()> {
        let b = self.len() as i64;
        if b == 0 {
            return Err(IppoError::EmptyBatch);
        }
        let n = config.n_agents as i64;
        let o = config.obs_dim as i64;
        let a = config.action_dim as i64;
        let h = config.hid_size as i64;

        ensure_shape("state", &self.state, &[b, n, o])?;
        ensure_shape("actions", &self.actions, &[b, n, a])?;
        ensure_shape("old_log_prob_a", &self.old_log_prob_a, &[b, n, 1])?;
        ensure_shape("old_values", &self.old_values, &[b, n, 1])?;
        ensure_shape("rewards", &self.rewards, &[b, n])?;
        ensure_shape("next_state", &self.next_state, &[b, n, o])?;
        ensure_shape("done", &self.done, &[b, n])?;
        ensure_shape("last_step", &self.last_step, &[b, n])?;
        ensure_shape("actions_avail", &self.actions_avail, &[b, n, a])?;
        ensure_shape("last_hids", &self.last_hids, &[b, n, h])?;
        ensure_shape("hids", &self.hids, &[b, n, h])?;
        match &self.returns {
            Some(returns) => ensure_shape("returns", returns, &[b, n]),
            None => Ok(()),
        }
    }

    /// Selects the rows at `indices` (an `Int64` tensor).
    pub fn minibatch(&self, indices: &Tensor) -> Batch {
        let pick = |t: &Tensor| t.index_select(0, indices);
        Batch {
            returns: self.returns.as_ref().map(pick),
            state: pick(&self.state),
            actions: pick(&self.actions),
            old_log_prob_a: pick(&self.old_log_prob_a),
            old_values: pick(&self.old_values),
            rewards: pick(&self.rewards),
            next_state: pick(&self.next_state),
            done: pick(&self.done),
            last_step: pick(&self.last_step),
            actions_avail: pick(&self.actions_avail),
            last_hids: pick(&self.last_hids),
            hids: pick(&self.hids),
        }
    }

    /// Moves every tensor to `device`.
    pub fn to_device(&self, device: Device) -> Batch {
        let mv = |t: &Tensor| t.to_device(device);
        Batch {
            returns: self.returns.as_ref().map(mv),
            state: mv(&self.state),
            actions: mv(&self.actions),
            old_log_prob_a: mv(&self.old_log_prob_a),
            old_values: mv(&self.old_values),
            rewards: mv(&self.rewards),
            next_state: mv(&self.next_state),
            done: mv(&self.done),
            last_step: mv(&self.last_step),
            actions_avail: mv(&self.actions_avail),
            last_hids: mv(&self.last_hids),
            hids: mv(&self.hids),
        }
    }
}

/// Rollout buffer that stores transitions for PPO updates.
///
/// Transitions are kept in collection order, which GAE relies on.
#[derive(Debug, Default)]
pub struct RolloutBuffer {
    pub transitions: Vec<Transition>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Stacks the stored transitions into a [`Batch`].
    pub fn to_batch(&self) -> Result<Batch> {
        if self.transitions.is_empty() {
            return Err(IppoError::EmptyBatch);
        }
        let stack = |f: fn(&Transition) -> &Tensor| -> Result<Tensor> {
            let parts: Vec<&Tensor> = self.transitions.iter().map(f).collect();
            Ok(Tensor::f_stack(&parts, 0)?)
        };
        Ok(Batch {
            returns: None,
            state: stack(|t| &t.state)?,
            actions: stack(|t| &t.actions)?,
            old_log_prob_a: stack(|t| &t.log_prob_a)?,
            old_values: stack(|t| &t.values)?,
            rewards: stack(|t| &t.rewards)?,
            next_state: stack(|t| &t.next_state)?,
            done: stack(|t| &t.done)?,
            last_step: stack(|t| &t.last_step)?,
            actions_avail: stack(|t| &t.actions_avail)?,
            last_hids: stack(|t| &t.last_hids)?,
            hids: stack(|t| &t.hids)?,
        })
    }
}
