//! Action selection under exploration, and the log-densities PPO needs.
//!
//! Discrete actions are one-hot vectors over the last dimension. All
//! per-agent log-probabilities and entropies keep a trailing dimension of
//! size 1, so a `(b, n, a)` action head yields `(b, n, 1)` densities.

use std::f64::consts::PI;

use tch::{Kind, Tensor};

use crate::config::ModelConfig;
use crate::types::Status;

const BOUND_EPS: f64 = 1e-6;

/// Logit given to unavailable discrete actions.
pub(crate) const MASKED_LOGIT: f64 = -9_999_999.0;

/// Raw output of the policy's action head.
#[derive(Debug)]
pub enum ActionOut {
    /// Masked logits of a categorical head.
    Discrete { logits: Tensor },
    /// Mean and log standard deviation of a Gaussian head.
    Continuous { means: Tensor, log_stds: Tensor },
}

impl ActionOut {
    /// Detached shallow copy, cheap to hand back to callers.
    pub fn detach(&self) -> ActionOut {
        match self {
            ActionOut::Discrete { logits } => ActionOut::Discrete {
                logits: logits.detach(),
            },
            ActionOut::Continuous { means, log_stds } => ActionOut::Continuous {
                means: means.detach(),
                log_stds: log_stds.detach(),
            },
        }
    }

    /// Log-probability of `actions` under this distribution.
    pub fn log_prob(&self, actions: &Tensor, config: &ModelConfig) -> Tensor {
        match self {
            ActionOut::Discrete { logits } => multinomials_log_density(actions, logits),
            ActionOut::Continuous { means, log_stds } if config.action_enforcebound => {
                tanh_normal_log_density(actions, means, log_stds)
            }
            ActionOut::Continuous { means, log_stds } => {
                normal_log_density(actions, means, log_stds)
            }
        }
    }

    /// Entropy of the distribution (of the pre-squash Gaussian when bounded).
    pub fn entropy(&self) -> Tensor {
        match self {
            ActionOut::Discrete { logits } => {
                let log_probs = logits.log_softmax(-1, Kind::Float);
                -(log_probs.exp() * log_probs).sum_dim_intlist([-1].as_slice(), true, Kind::Float)
            }
            ActionOut::Continuous { log_stds, .. } => (log_stds + 0.5 + 0.5 * (2.0 * PI).ln())
                .sum_dim_intlist([-1].as_slice(), true, Kind::Float),
        }
    }
}

/// Draws actions from the head's distribution.
///
/// Returns the actions and, when they were sampled for learning, their
/// log-probabilities. Evaluation (`Status::Test`) and deterministic
/// training (`exploration == false`) on a continuous head return no
/// log-probability.
pub fn select_action(
    config: &ModelConfig,
    out: &ActionOut,
    status: Status,
    exploration: bool,
) -> (Tensor, Option<Tensor>) {
    match out {
        ActionOut::Continuous { means, log_stds } => {
            select_continuous(config, means, log_stds, status, exploration)
        }
        ActionOut::Discrete { logits } => select_discrete(config, logits, status, exploration),
    }
}

fn select_continuous(
    config: &ModelConfig,
    means: &Tensor,
    log_stds: &Tensor,
    status: Status,
    exploration: bool,
) -> (Tensor, Option<Tensor>) {
    match (status, exploration) {
        (Status::Train, true) if config.action_enforcebound => {
            let x = means + log_stds.exp() * means.randn_like();
            let y = x.tanh();
            // Scored from the stored action so re-evaluation sees the same clamp.
            let log_prob = tanh_normal_log_density(&y, means, log_stds);
            (y, Some(log_prob))
        }
        (Status::Train, true) => {
            let noise = log_stds.exp() * means.randn_like();
            let log_prob = normal_log_density(&noise, &noise.zeros_like(), log_stds);
            (means + noise, Some(log_prob))
        }
        (Status::Train, false) => (means.shallow_clone(), None),
        (Status::Test, _) if config.action_enforcebound => (means.tanh(), None),
        (Status::Test, _) => (means.shallow_clone(), None),
    }
}

fn select_discrete(
    config: &ModelConfig,
    logits: &Tensor,
    status: Status,
    exploration: bool,
) -> (Tensor, Option<Tensor>) {
    match (status, exploration) {
        (Status::Train, true) if config.epsilon_softmax => {
            // The uniform share only covers available actions.
            let avail = logits.gt(MASKED_LOGIT / 2.0).to_kind(Kind::Float);
            let n_avail = avail
                .sum_dim_intlist([-1].as_slice(), true, Kind::Float)
                .clamp_min(1.0);
            let uniform = &avail / n_avail;
            let probs = logits.softmax(-1, Kind::Float) * (1.0 - config.softmax_eps)
                + uniform * config.softmax_eps;
            let actions = sample_one_hot(&probs);
            let log_prob = multinomials_log_density(&actions, logits);
            (actions, Some(log_prob))
        }
        (Status::Train, true) if config.gumbel_softmax => {
            let actions = gumbel_softmax(logits, 1.0, true);
            let log_prob = multinomials_log_density(&actions, logits);
            (actions, Some(log_prob))
        }
        (Status::Train, true) => {
            let actions = sample_one_hot(&logits.softmax(-1, Kind::Float));
            let log_prob = multinomials_log_density(&actions, logits);
            (actions, Some(log_prob))
        }
        (Status::Train, false) => {
            let actions = logits.softmax(-1, Kind::Float);
            let log_prob = multinomials_log_density(&actions, logits);
            (actions, Some(log_prob))
        }
        (Status::Test, _) => (argmax_one_hot(logits), None),
    }
}

/// Samples one-hot actions from probabilities over the last dimension.
fn sample_one_hot(probs: &Tensor) -> Tensor {
    let shape = probs.size();
    let n_actions = shape[shape.len() - 1];
    probs
        .reshape([-1, n_actions])
        .multinomial(1, true)
        .squeeze_dim(-1)
        .one_hot(n_actions)
        .to_kind(Kind::Float)
        .reshape(shape.as_slice())
}

fn argmax_one_hot(logits: &Tensor) -> Tensor {
    let index = logits.argmax(-1, true);
    logits.zeros_like().scatter_value(-1, &index, 1.0)
}

/// Gumbel-softmax relaxation. With `hard`, the forward value is one-hot and
/// gradients flow through the soft sample.
pub fn gumbel_softmax(logits: &Tensor, temperature: f64, hard: bool) -> Tensor {
    let u = logits.rand_like();
    let gumbel = -(-(u + 1e-20).log() + 1e-20).log();
    let y = ((logits + gumbel) / temperature).softmax(-1, Kind::Float);
    if hard {
        let y_hard = argmax_one_hot(&y);
        (y_hard - y.detach()) + y
    } else {
        y
    }
}

/// `Σ actions · log_softmax(logits)` over the last dimension.
pub fn multinomials_log_density(actions: &Tensor, logits: &Tensor) -> Tensor {
    (actions * logits.log_softmax(-1, Kind::Float)).sum_dim_intlist(
        [-1].as_slice(),
        true,
        Kind::Float,
    )
}

/// Diagonal Gaussian log-density summed over the last dimension.
pub fn normal_log_density(x: &Tensor, means: &Tensor, log_stds: &Tensor) -> Tensor {
    let var = (log_stds * 2.0).exp();
    let density = -(x - means).pow_tensor_scalar(2) / (var * 2.0) - log_stds - 0.5 * (2.0 * PI).ln();
    density.sum_dim_intlist([-1].as_slice(), true, Kind::Float)
}

/// Log-density of `tanh`-squashed Gaussian actions `y ∈ (-1, 1)`.
pub fn tanh_normal_log_density(y: &Tensor, means: &Tensor, log_stds: &Tensor) -> Tensor {
    let y = y.clamp(-1.0 + BOUND_EPS, 1.0 - BOUND_EPS);
    normal_log_density(&y.atanh(), means, log_stds) - squash_correction(&y)
}

fn squash_correction(y: &Tensor) -> Tensor {
    (-y.pow_tensor_scalar(2) + 1.0 + BOUND_EPS)
        .log()
        .sum_dim_intlist([-1].as_slice(), true, Kind::Float)
}

/// Normalises a tensor to zero mean and unit standard deviation.
pub fn batchnorm(x: &Tensor) -> Tensor {
    let centered = x - x.mean(Kind::Float);
    if x.numel() < 2 {
        return centered;
    }
    centered / (x.std(true) + 1e-6)
}
