//! IPPO trainer: rollout collection and PPO optimisation.
//!
//! Policy and value parameters are optimised by separate Adam optimisers,
//! each step clipping gradients to `max_grad_norm`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};
use tracing::{debug, info};

use super::buffer::{Batch, RolloutBuffer, Transition};
use super::env::{rows_to_tensor, tensor_to_rows, MultiAgentEnv};
use crate::config::TrainConfig;
use crate::error::{IppoError, Result};
use crate::model::IppoModel;
use crate::types::Status;

/// Mean losses of one [`Trainer::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainStats {
    pub policy_loss: f64,
    pub value_loss: f64,
    /// Number of optimiser steps taken.
    pub n_minibatches: usize,
}

/// Drives an [`IppoModel`] through collect/update cycles.
pub struct Trainer {
    model: IppoModel,
    policy_opt: nn::Optimizer,
    value_opt: nn::Optimizer,
    config: TrainConfig,
    rng: StdRng,
    n_steps: u64,
}

impl Trainer {
    /// Creates a trainer; seeds both the tensor RNG and the shuffling RNG.
    pub fn new(model: IppoModel, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        tch::manual_seed(config.seed as i64);
        let policy_opt = nn::Adam::default().build(model.policy_var_store(), config.policy_lrate)?;
        let value_opt = nn::Adam::default().build(model.value_var_store(), config.value_lrate)?;
        Ok(Self {
            model,
            policy_opt,
            value_opt,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            n_steps: 0,
        })
    }

    pub fn model(&self) -> &IppoModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut IppoModel {
        &mut self.model
    }

    pub fn into_model(self) -> IppoModel {
        self.model
    }

    /// Runs one episode with the exploration policy, appending every step
    /// to `buffer`.
    ///
    /// Returns the episode reward summed over steps and averaged over agents.
    pub fn collect_episode<E: MultiAgentEnv>(
        &self,
        env: &mut E,
        buffer: &mut RolloutBuffer,
    ) -> Result<f64> {
        let model = &self.model;
        let n = model.config().n_agents;
        if env.n_agents() != n {
            return Err(IppoError::AgentCountMismatch {
                expected: n,
                actual: env.n_agents(),
            });
        }
        let cfg = model.config();
        if env.obs_dim() != cfg.obs_dim || env.action_dim() != cfg.action_dim {
            return Err(IppoError::ShapeMismatch {
                name: "env",
                expected: vec![cfg.obs_dim as i64, cfg.action_dim as i64],
                actual: vec![env.obs_dim() as i64, env.action_dim() as i64],
            });
        }
        let device = model.device();
        let opts = (Kind::Float, device);
        let flag = |set: bool| Tensor::full([n as i64], if set { 1.0 } else { 0.0 }, opts);

        let mut obs = env.reset();
        let mut hid = model.init_hidden(1);
        let mut episode_reward = 0.0;

        loop {
            let state = rows_to_tensor(&obs.observations, device)?.unsqueeze(0);
            let avail = rows_to_tensor(&obs.avail_actions, device)?.unsqueeze(0);
            let (selection, values) = tch::no_grad(|| -> Result<_> {
                let selection =
                    model.get_actions(&state, Status::Train, true, &avail, false, Some(&hid))?;
                Ok((selection, model.value(&state)?))
            })?;

            let env_actions = tensor_to_rows(&selection.restore_actions.squeeze_dim(0))?;
            let result = env.step(&env_actions);
            if result.rewards.len() != n {
                return Err(IppoError::AgentCountMismatch {
                    expected: n,
                    actual: result.rewards.len(),
                });
            }
            episode_reward += result.rewards.iter().map(|&r| r as f64).sum::<f64>() / n as f64;

            let ended = result.done || result.truncated;
            let log_prob_a = selection
                .log_prob_a
                .unwrap_or_else(|| Tensor::zeros([1, n as i64, 1], opts));
            buffer.add(Transition {
                state: state.squeeze_dim(0),
                actions: selection.actions.squeeze_dim(0),
                log_prob_a: log_prob_a.squeeze_dim(0),
                values: values.squeeze_dim(0),
                rewards: Tensor::from_slice(&result.rewards).to_device(device),
                next_state: rows_to_tensor(&result.next.observations, device)?,
                done: flag(result.done),
                last_step: flag(ended),
                actions_avail: avail.squeeze_dim(0),
                last_hids: hid.squeeze_dim(0),
                hids: selection.hiddens.squeeze_dim(0),
            });

            hid = selection.hiddens;
            obs = result.next;
            if ended {
                break;
            }
        }

        Ok(episode_reward)
    }

    /// Runs `epochs` passes of PPO over `batch`.
    ///
    /// With a mini-batch size set, steps are shuffled before being split.
    /// Returns that depend on time order are computed beforehand over the
    /// whole batch.
    pub fn update(&mut self, batch: &Batch) -> Result<TrainStats> {
        let mut batch = batch.to_device(self.model.device());
        batch.validate(self.model.config())?;
        if batch.returns.is_none() {
            batch.returns = self.model.compute_returns(&batch)?;
        }
        let b = batch.len();
        let chunk = self.config.minibatch_size.unwrap_or(b).min(b);

        let mut total_policy_loss = 0.0;
        let mut total_value_loss = 0.0;
        let mut n_minibatches = 0;

        for _ in 0..self.config.epochs {
            let mut order: Vec<i64> = (0..b as i64).collect();
            if self.config.minibatch_size.is_some() {
                order.shuffle(&mut self.rng);
            }
            for rows in order.chunks(chunk) {
                let indices = Tensor::from_slice(rows).to_device(self.model.device());
                let loss = self.model.get_loss(&batch.minibatch(&indices))?;

                self.policy_opt.zero_grad();
                loss.policy_loss.backward();
                self.policy_opt.clip_grad_norm(self.config.max_grad_norm);
                self.policy_opt.step();

                self.value_opt.zero_grad();
                loss.value_loss.backward();
                self.value_opt.clip_grad_norm(self.config.max_grad_norm);
                self.value_opt.step();

                self.n_steps += 1;
                if self.model.has_target()
                    && self.config.target_update_freq > 0
                    && self.n_steps % self.config.target_update_freq as u64 == 0
                {
                    self.model.update_target()?;
                }

                total_policy_loss += loss.policy_loss.double_value(&[]);
                total_value_loss += loss.value_loss.double_value(&[]);
                n_minibatches += 1;
            }
        }

        let denom = n_minibatches.max(1) as f64;
        let stats = TrainStats {
            policy_loss: total_policy_loss / denom,
            value_loss: total_value_loss / denom,
            n_minibatches,
        };
        debug!(?stats, steps = self.n_steps, "ppo update");
        Ok(stats)
    }

    /// Runs the full collect/update loop.
    ///
    /// Returns `(update_index, mean_episode_reward)` pairs for the learning curve.
    pub fn train<E: MultiAgentEnv>(&mut self, env: &mut E, n_updates: u32) -> Result<Vec<(u32, f64)>> {
        let mut learning_curve = Vec::with_capacity(n_updates as usize);

        for update in 0..n_updates {
            let mut buffer = RolloutBuffer::new();
            let mut episode_rewards = Vec::with_capacity(self.config.episodes_per_update as usize);
            for _ in 0..self.config.episodes_per_update {
                episode_rewards.push(self.collect_episode(env, &mut buffer)?);
            }

            let stats = self.update(&buffer.to_batch()?)?;
            let mean_reward = episode_rewards.iter().sum::<f64>() / episode_rewards.len() as f64;
            learning_curve.push((update, mean_reward));

            if self.config.log_interval > 0 && update % self.config.log_interval == 0 {
                info!(
                    update,
                    n_updates,
                    mean_reward,
                    policy_loss = stats.policy_loss,
                    value_loss = stats.value_loss,
                    "training progress"
                );
            }
        }

        Ok(learning_curve)
    }
}
