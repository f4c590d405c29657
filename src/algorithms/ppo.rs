//! Proximal Policy Optimization with independent per-agent critics.
//!
//! Each agent's advantage is computed from its own value estimate; the
//! clipped surrogate is averaged over every `(step, agent)` pair.

use tch::{Kind, Tensor};

use super::{LearningAlgorithm, Loss};
use crate::config::PpoConfig;
use crate::error::Result;
use crate::exploration::batchnorm;
use crate::model::IppoModel;
use crate::training::buffer::Batch;
use crate::training::gae::gae_returns;
use crate::types::Status;

/// PPO loss computation.
#[derive(Debug, Clone, Default)]
pub struct Ppo {
    config: PpoConfig,
}

impl Ppo {
    pub fn new(config: PpoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Detached `V(s')` from the target network when one is attached, `(b, n)`.
    fn next_values(&self, batch: &Batch, behaviour: &IppoModel) -> Result<Tensor> {
        let (b, n) = (batch.len() as i64, behaviour.config().n_agents as i64);
        let next_values = tch::no_grad(|| {
            if behaviour.has_target() {
                behaviour.target_value(&batch.next_state)
            } else {
                behaviour.value(&batch.next_state)
            }
        })?;
        Ok(next_values.reshape([b, n]).detach())
    }

    /// Discounted targets for `values`, `(b, n)`.
    fn returns(&self, batch: &Batch, values: &Tensor, next_values: &Tensor) -> Result<Tensor> {
        let gamma = self.config.gamma;
        match self.config.gae_lambda {
            Some(lambda) => gae_returns(
                &batch.rewards,
                &values.detach(),
                next_values,
                &batch.done,
                &batch.last_step,
                gamma,
                lambda,
            ),
            None => Ok(&batch.rewards + (-&batch.done + 1.0) * next_values * gamma),
        }
    }
}

impl LearningAlgorithm for Ppo {
    fn get_loss(&self, batch: &Batch, behaviour: &IppoModel) -> Result<Loss> {
        let config = behaviour.config();
        batch.validate(config)?;
        let b = batch.len() as i64;
        let n = config.n_agents as i64;

        let selection = behaviour.get_actions(
            &batch.state,
            Status::Train,
            false,
            &batch.actions_avail,
            false,
            Some(&batch.last_hids),
        )?;
        let log_prob_a = selection
            .action_out
            .log_prob(&batch.actions, config)
            .reshape([b, n]);

        let values = behaviour.value(&batch.state)?.reshape([b, n]);
        let returns = match &batch.returns {
            Some(returns) => returns.detach(),
            None => {
                let next_values = self.next_values(batch, behaviour)?;
                self.returns(batch, &values, &next_values)?
            }
        };
        let advantages = (&returns - &values).detach();
        let advantages = if self.config.normalize_advantages {
            batchnorm(&advantages)
        } else {
            advantages
        };

        let old_log_prob_a = batch.old_log_prob_a.reshape([b, n]).detach();
        let ratios = (log_prob_a - old_log_prob_a).exp();
        let surr1 = &ratios * &advantages;
        let surr2 = ratios.clamp(1.0 - self.config.eps_clip, 1.0 + self.config.eps_clip)
            * &advantages;
        let mut policy_loss = -surr1.min_other(&surr2).mean(Kind::Float);
        if self.config.entropy_coef != 0.0 {
            let entropy = selection.action_out.entropy().mean(Kind::Float);
            policy_loss = policy_loss - entropy * self.config.entropy_coef;
        }

        let value_loss = match self.config.value_clip {
            None => (&returns - &values).pow_tensor_scalar(2).mean(Kind::Float),
            Some(clip) => {
                let old_values = batch.old_values.reshape([b, n]).detach();
                let clipped = &old_values + (&values - &old_values).clamp(-clip, clip);
                let unclipped_loss = (&returns - &values).pow_tensor_scalar(2);
                let clipped_loss = (&returns - clipped).pow_tensor_scalar(2);
                unclipped_loss.max_other(&clipped_loss).mean(Kind::Float)
            }
        };

        Ok(Loss {
            policy_loss,
            value_loss,
            action_out: selection.action_out.detach(),
        })
    }

    /// GAE traces run along the time axis, so they are computed once here.
    fn compute_returns(&self, batch: &Batch, behaviour: &IppoModel) -> Result<Option<Tensor>> {
        if self.config.gae_lambda.is_none() {
            return Ok(None);
        }
        batch.validate(behaviour.config())?;
        let (b, n) = (batch.len() as i64, behaviour.config().n_agents as i64);
        let values = tch::no_grad(|| behaviour.value(&batch.state))?.reshape([b, n]);
        let next_values = self.next_values(batch, behaviour)?;
        Ok(Some(self.returns(batch, &values, &next_values)?))
    }

    fn name(&self) -> &str {
        "ppo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::training::buffer::{RolloutBuffer, Transition};
    use crate::types::AgentType;
    use tch::Device;

    fn model_config() -> ModelConfig {
        ModelConfig {
            n_agents: 2,
            obs_dim: 4,
            action_dim: 3,
            hid_size: 8,
            ..ModelConfig::default()
        }
    }

    /// Collects `steps` transitions from random observations with the
    /// model's own exploration policy.
    fn rollout(model: &IppoModel, steps: usize) -> Batch {
        let cfg = model.config().clone();
        let n = cfg.n_agents as i64;
        let opts = (Kind::Float, Device::Cpu);
        let mut buffer = RolloutBuffer::new();
        let mut hid = model.init_hidden(1);
        for step in 0..steps {
            let state = Tensor::randn([1, n, cfg.obs_dim as i64], opts);
            let avail = Tensor::ones([1, n, cfg.action_dim as i64], opts);
            let sel = tch::no_grad(|| {
                model.get_actions(&state, Status::Train, true, &avail, false, Some(&hid))
            })
            .unwrap();
            let values = tch::no_grad(|| model.value(&state)).unwrap();
            let last = if step + 1 == steps { 1.0 } else { 0.0 };
            buffer.add(Transition {
                state: state.squeeze_dim(0),
                actions: sel.actions.squeeze_dim(0),
                log_prob_a: sel.log_prob_a.unwrap().squeeze_dim(0),
                values: values.squeeze_dim(0),
                rewards: Tensor::ones([n], opts),
                next_state: Tensor::randn([n, cfg.obs_dim as i64], opts),
                done: Tensor::full([n], last, opts),
                last_step: Tensor::full([n], last, opts),
                actions_avail: avail.squeeze_dim(0),
                last_hids: hid.squeeze_dim(0),
                hids: sel.hiddens.squeeze_dim(0),
            });
            hid = sel.hiddens.detach();
        }
        buffer.to_batch().unwrap()
    }

    #[test]
    fn losses_are_finite_scalars() {
        let model = IppoModel::new(model_config(), PpoConfig::default()).unwrap();
        let batch = rollout(&model, 6);
        let loss = model.get_loss(&batch).unwrap();
        assert_eq!(loss.policy_loss.dim(), 0);
        assert_eq!(loss.value_loss.dim(), 0);
        assert!(loss.policy_loss.double_value(&[]).is_finite());
        assert!(loss.value_loss.double_value(&[]) >= 0.0);
    }

    #[test]
    fn unchanged_policy_has_unit_ratio() {
        // With identical parameters the ratio is 1 and the surrogate is the
        // mean of normalised advantages, i.e. zero.
        let model = IppoModel::new(model_config(), PpoConfig::default()).unwrap();
        let batch = rollout(&model, 8);
        let loss = model.get_loss(&batch).unwrap();
        assert!(loss.policy_loss.double_value(&[]).abs() < 1e-4);
    }

    #[test]
    fn epsilon_softmax_exploration_has_unit_ratio() {
        let cfg = ModelConfig {
            epsilon_softmax: true,
            softmax_eps: 0.5,
            ..model_config()
        };
        let model = IppoModel::new(cfg, PpoConfig::default()).unwrap();
        let batch = rollout(&model, 8);
        let loss = model.get_loss(&batch).unwrap();
        assert!(loss.policy_loss.double_value(&[]).abs() < 1e-4);
    }

    #[test]
    fn saturated_bounded_actions_have_unit_ratio() {
        let cfg = ModelConfig {
            continuous: true,
            gaussian_policy: true,
            action_enforcebound: true,
            init_std: 3.0,
            ..model_config()
        };
        let model = IppoModel::new(cfg, PpoConfig::default()).unwrap();
        let batch = rollout(&model, 8);
        // Large weights push many pre-squash samples far past tanh saturation.
        let saturated = batch.actions.abs().ge(0.999999).to_kind(Kind::Float).sum(Kind::Float);
        assert!(saturated.double_value(&[]) > 0.0);
        let loss = model.get_loss(&batch).unwrap();
        assert!(loss.policy_loss.double_value(&[]).abs() < 1e-3);
    }

    #[test]
    fn continuous_rnn_unit_ratio() {
        let cfg = ModelConfig {
            continuous: true,
            gaussian_policy: true,
            agent_type: AgentType::Rnn,
            ..model_config()
        };
        let model = IppoModel::new(cfg, PpoConfig::default()).unwrap();
        let batch = rollout(&model, 5);
        let loss = model.get_loss(&batch).unwrap();
        assert!(loss.policy_loss.double_value(&[]).abs() < 1e-3);
        assert!(matches!(
            loss.action_out,
            crate::exploration::ActionOut::Continuous { .. }
        ));
    }

    #[test]
    fn policy_loss_only_reaches_policy_parameters() {
        let model = IppoModel::new(model_config(), PpoConfig::default()).unwrap();
        let batch = rollout(&model, 4);
        let loss = model.get_loss(&batch).unwrap();
        loss.policy_loss.backward();

        let policy_grads = model
            .policy_var_store()
            .trainable_variables()
            .iter()
            .filter(|v| v.grad().defined())
            .count();
        assert!(policy_grads > 0);
        let value_grads = model
            .value_var_store()
            .trainable_variables()
            .iter()
            .filter(|v| v.grad().defined())
            .count();
        assert_eq!(value_grads, 0);
    }

    #[test]
    fn td_returns_bootstrap_until_done() {
        let model = IppoModel::new(model_config(), PpoConfig::default()).unwrap();
        let ppo = Ppo::new(PpoConfig {
            gamma: 0.5,
            ..PpoConfig::default()
        });
        let batch = rollout(&model, 2);
        let values = Tensor::zeros([2, 2], (Kind::Float, Device::Cpu));
        let next_values = Tensor::full([2, 2], 4.0, (Kind::Float, Device::Cpu));
        let returns = ppo.returns(&batch, &values, &next_values).unwrap();
        // Step 0 continues: 1 + 0.5 * 4. Step 1 is terminal: 1.
        assert!((returns.double_value(&[0, 0]) - 3.0).abs() < 1e-6);
        assert!((returns.double_value(&[1, 1]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shuffled_minibatch_keeps_time_ordered_gae_returns() {
        let ppo = PpoConfig {
            gae_lambda: Some(0.95),
            ..PpoConfig::default()
        };
        let model = IppoModel::new(model_config(), ppo).unwrap();
        let mut batch = rollout(&model, 6);
        let full = model.compute_returns(&batch).unwrap().unwrap();
        assert_eq!(full.size(), &[6, 2]);

        let idx = Tensor::from_slice(&[5i64, 0, 3]);
        // Without precomputed returns the trace would run over the shuffled rows.
        let unordered = model
            .compute_returns(&batch.minibatch(&idx))
            .unwrap()
            .unwrap();
        let expected = full.index_select(0, &idx);
        assert!(!unordered.allclose(&expected, 1e-4, 1e-4, false));

        batch.returns = Some(full);
        let mb = batch.minibatch(&idx);
        let loss = model.get_loss(&mb).unwrap();
        let values = model.value(&mb.state).unwrap().reshape([3, 2]);
        let value_loss = (&expected - &values)
            .pow_tensor_scalar(2)
            .mean(Kind::Float)
            .double_value(&[]);
        assert!((loss.value_loss.double_value(&[]) - value_loss).abs() < 1e-5);
    }

    #[test]
    fn td_returns_need_no_precomputation() {
        let model = IppoModel::new(model_config(), PpoConfig::default()).unwrap();
        let batch = rollout(&model, 3);
        assert!(model.compute_returns(&batch).unwrap().is_none());
    }

    #[test]
    fn gae_and_clipping_options() {
        let ppo = PpoConfig {
            gae_lambda: Some(0.95),
            value_clip: Some(0.2),
            entropy_coef: 0.01,
            ..PpoConfig::default()
        };
        let cfg = ModelConfig {
            target: true,
            ..model_config()
        };
        let model = IppoModel::new(cfg, ppo).unwrap();
        let batch = rollout(&model, 6);
        let loss = model.get_loss(&batch).unwrap();
        assert!(loss.policy_loss.double_value(&[]).is_finite());
        assert!(loss.value_loss.double_value(&[]).is_finite());
    }
}
