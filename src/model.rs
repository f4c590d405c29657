//! Independent PPO actor-critic model.
//!
//! Each agent acts on its own observation through a policy network and is
//! judged by its own value network `V(o_i)`. With `shared_params` all
//! agents run through the same pair of networks, optionally told apart by
//! a one-hot agent id appended to the observation.

use std::path::Path;

use tch::{nn, Device, Kind, Tensor};
use tracing::debug;

use crate::algorithms::{LearningAlgorithm, Loss, Ppo};
use crate::config::{ModelConfig, PpoConfig};
use crate::error::{IppoError, Result};
use crate::exploration::{select_action, ActionOut, MASKED_LOGIT};
use crate::network::{AgentNetwork, MlpAgent, MlpCritic, RnnAgent};
use crate::training::buffer::Batch;
use crate::types::{AgentType, Status};

const POLICY_FILE: &str = "policy.ot";
const VALUE_FILE: &str = "value.ot";

/// Output of [`IppoModel::policy`]. Every tensor is `(b, n, ·)`.
#[derive(Debug)]
pub struct PolicyOutput {
    /// Logits (discrete) or Gaussian means (continuous), `(b, n, a)`.
    pub means: Tensor,
    /// Log standard deviations, `(b, n, a)`.
    pub log_stds: Tensor,
    /// New hidden states, `(b, n, h)`.
    pub hiddens: Tensor,
}

/// Result of [`IppoModel::get_actions`].
#[derive(Debug)]
pub struct ActionSelection {
    /// Sampled actions `(b, n, a)`.
    pub actions: Tensor,
    /// Actions to send to the environment. Continuous actions have their
    /// unavailable dimensions zeroed.
    pub restore_actions: Tensor,
    /// Log-probabilities `(b, n, 1)`, when the sampling mode yields them.
    pub log_prob_a: Option<Tensor>,
    /// Distribution parameters the actions were drawn from.
    pub action_out: ActionOut,
    /// New hidden states `(b, n, h)`.
    pub hiddens: Tensor,
}

/// Policy and value networks of one model copy, each family in its own
/// variable store so they can be optimised separately.
struct Networks {
    policy_vs: nn::VarStore,
    value_vs: nn::VarStore,
    policy_dicts: Vec<Box<dyn AgentNetwork>>,
    value_dicts: Vec<MlpCritic>,
}

impl Networks {
    fn new(config: &ModelConfig, device: Device) -> Self {
        let value_vs = nn::VarStore::new(device);
        let value_dicts = Self::construct_value_net(config, &value_vs);
        let policy_vs = nn::VarStore::new(device);
        let policy_dicts = Self::construct_policy_net(config, &policy_vs);
        Self {
            policy_vs,
            value_vs,
            policy_dicts,
            value_dicts,
        }
    }

    fn construct_value_net(config: &ModelConfig, vs: &nn::VarStore) -> Vec<MlpCritic> {
        let input_dim = config.value_input_dim();
        let root = vs.root();
        (0..config.n_networks())
            .map(|i| MlpCritic::new(&(&root / i), input_dim, 1, config))
            .collect()
    }

    fn construct_policy_net(config: &ModelConfig, vs: &nn::VarStore) -> Vec<Box<dyn AgentNetwork>> {
        let input_dim = config.policy_input_dim();
        let root = vs.root();
        (0..config.n_networks())
            .map(|i| -> Box<dyn AgentNetwork> {
                let p = &root / i;
                match config.agent_type {
                    AgentType::Mlp => Box::new(MlpAgent::new(&p, input_dim, config)),
                    AgentType::Rnn => Box::new(RnnAgent::new(&p, input_dim, config)),
                }
            })
            .collect()
    }

    fn value(&self, config: &ModelConfig, obs: &Tensor) -> Tensor {
        let (b, n) = (obs.size()[0], config.n_agents as i64);
        let obs = with_agent_ids(config, obs);

        if config.shared_params {
            let inputs = obs.reshape([b * n, -1]);
            let (values, _) = self.value_dicts[0].forward(&inputs);
            values.reshape([b, n, -1])
        } else {
            let values: Vec<Tensor> = self
                .value_dicts
                .iter()
                .enumerate()
                .map(|(i, critic)| critic.forward(&obs.select(1, i as i64)).0)
                .collect();
            Tensor::stack(&values, 1)
        }
    }

    fn policy(&self, config: &ModelConfig, obs: &Tensor, last_hid: &Tensor) -> PolicyOutput {
        let (b, n) = (obs.size()[0], config.n_agents as i64);
        let obs = with_agent_ids(config, obs);

        let (means, log_stds, hiddens) = if config.shared_params {
            let out = self.policy_dicts[0].forward(
                &obs.reshape([b * n, -1]),
                &last_hid.reshape([b * n, -1]),
            );
            (
                out.means.reshape([b, n, -1]),
                out.log_stds.map(|t| t.reshape([b, n, -1])),
                out.hidden.reshape([b, n, -1]),
            )
        } else {
            let outs: Vec<_> = self
                .policy_dicts
                .iter()
                .enumerate()
                .map(|(i, agent)| {
                    let i = i as i64;
                    agent.forward(&obs.select(1, i), &last_hid.select(1, i))
                })
                .collect();
            let means: Vec<&Tensor> = outs.iter().map(|o| &o.means).collect();
            let hiddens: Vec<&Tensor> = outs.iter().map(|o| &o.hidden).collect();
            let log_stds: Option<Vec<&Tensor>> =
                outs.iter().map(|o| o.log_stds.as_ref()).collect();
            (
                Tensor::stack(&means, 1),
                log_stds.map(|l| Tensor::stack(&l, 1)),
                Tensor::stack(&hiddens, 1),
            )
        };

        let log_stds =
            log_stds.unwrap_or_else(|| means.ones_like() * config.fixed_policy_std.ln());

        PolicyOutput {
            means,
            log_stds,
            hiddens,
        }
    }
}

/// Appends `eye(n)` to `(b, n, o)` observations when agent ids are enabled.
fn with_agent_ids(config: &ModelConfig, obs: &Tensor) -> Tensor {
    if !config.agent_id {
        return obs.shallow_clone();
    }
    let b = obs.size()[0];
    let n = config.n_agents as i64;
    let agent_ids = Tensor::eye(n, (Kind::Float, obs.device()))
        .unsqueeze(0)
        .repeat([b, 1, 1]);
    Tensor::cat(&[obs.shallow_clone(), agent_ids], -1)
}

/// IPPO model: decentralised policies and per-agent critics for `n` agents.
pub struct IppoModel {
    config: ModelConfig,
    device: Device,
    nets: Networks,
    target_net: Option<Networks>,
    rl: Box<dyn LearningAlgorithm>,
}

impl IppoModel {
    /// Builds the model with a PPO learning algorithm. A target copy is
    /// created when `config.target` is set.
    pub fn new(config: ModelConfig, ppo: PpoConfig) -> Result<Self> {
        ppo.validate()?;
        Self::with_algorithm(config, Box::new(Ppo::new(ppo)))
    }

    /// Builds the model around an arbitrary learning algorithm.
    pub fn with_algorithm(config: ModelConfig, rl: Box<dyn LearningAlgorithm>) -> Result<Self> {
        config.validate()?;
        let device = config.device();
        let nets = Networks::new(&config, device);

        debug!(
            n_agents = config.n_agents,
            shared_params = config.shared_params,
            agent_type = %config.agent_type,
            continuous = config.continuous,
            algorithm = rl.name(),
            "constructed IPPO model"
        );

        let mut model = Self {
            config,
            device,
            nets,
            target_net: None,
            rl,
        };
        if model.config.target {
            model.build_target()?;
        }
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Variable store holding every policy parameter.
    pub fn policy_var_store(&self) -> &nn::VarStore {
        &self.nets.policy_vs
    }

    /// Variable store holding every value parameter.
    pub fn value_var_store(&self) -> &nn::VarStore {
        &self.nets.value_vs
    }

    pub fn has_target(&self) -> bool {
        self.target_net.is_some()
    }

    fn networks(&self, target: bool) -> Result<&Networks> {
        if target {
            self.target_net.as_ref().ok_or(IppoError::MissingTarget)
        } else {
            Ok(&self.nets)
        }
    }

    fn check_obs(&self, obs: &Tensor) -> Result<i64> {
        let (b, n, o) = obs.size3()?;
        if n != self.config.n_agents as i64 || o != self.config.obs_dim as i64 {
            return Err(IppoError::ShapeMismatch {
                name: "obs",
                expected: vec![b, self.config.n_agents as i64, self.config.obs_dim as i64],
                actual: vec![b, n, o],
            });
        }
        Ok(b)
    }

    /// Per-agent state values: `(b, n, o)` observations to `(b, n, 1)`.
    pub fn value(&self, obs: &Tensor) -> Result<Tensor> {
        self.check_obs(obs)?;
        Ok(self.nets.value(&self.config, obs))
    }

    /// Per-agent state values computed by the target network.
    pub fn target_value(&self, obs: &Tensor) -> Result<Tensor> {
        self.check_obs(obs)?;
        Ok(self.networks(true)?.value(&self.config, obs))
    }

    /// Runs the policy networks on `(b, n, o)` observations.
    ///
    /// `last_hid` is `(b, n, h)`; zeros are used when it is `None`.
    pub fn policy(&self, obs: &Tensor, last_hid: Option<&Tensor>, target: bool) -> Result<PolicyOutput> {
        let b = self.check_obs(obs)?;
        let last_hid = match last_hid {
            Some(h) => {
                let n = self.config.n_agents as i64;
                crate::error::ensure_shape("last_hid", h, &[b, n, self.config.hid_size as i64])?;
                h.shallow_clone()
            }
            None => self.init_hidden(b),
        };
        Ok(self.networks(target)?.policy(&self.config, obs, &last_hid))
    }

    /// Zero hidden state `(batch, n, h)`.
    pub fn init_hidden(&self, batch: i64) -> Tensor {
        Tensor::zeros(
            [batch, self.config.n_agents as i64, self.config.hid_size as i64],
            (Kind::Float, self.device),
        )
    }

    /// Samples actions for every agent.
    ///
    /// `actions_avail` is `(b, n, a)`; a zero entry marks an unavailable
    /// action. Discrete heads never select masked actions; continuous heads
    /// zero the masked dimensions in `restore_actions`.
    pub fn get_actions(
        &self,
        state: &Tensor,
        status: Status,
        exploration: bool,
        actions_avail: &Tensor,
        target: bool,
        last_hid: Option<&Tensor>,
    ) -> Result<ActionSelection> {
        let PolicyOutput {
            means,
            log_stds,
            hiddens,
        } = self.policy(state, last_hid, target)?;
        crate::error::ensure_shape("actions_avail", actions_avail, &means.size())?;
        let unavailable = actions_avail.eq(0.0);

        if self.config.continuous {
            let action_out = ActionOut::Continuous { means, log_stds };
            let (actions, log_prob_a) = select_action(&self.config, &action_out, status, exploration);
            let restore_mask = unavailable.logical_not().to_kind(Kind::Float);
            let restore_actions = &restore_mask * &actions;
            Ok(ActionSelection {
                actions,
                restore_actions,
                log_prob_a,
                action_out,
                hiddens,
            })
        } else {
            let logits = means.masked_fill(&unavailable, MASKED_LOGIT);
            let action_out = ActionOut::Discrete { logits };
            let (actions, log_prob_a) = select_action(&self.config, &action_out, status, exploration);
            Ok(ActionSelection {
                restore_actions: actions.shallow_clone(),
                actions,
                log_prob_a,
                action_out,
                hiddens,
            })
        }
    }

    /// Delegates the loss computation to the learning algorithm.
    pub fn get_loss(&self, batch: &Batch) -> Result<Loss> {
        self.rl.get_loss(batch, self)
    }

    /// Returns the learning algorithm needs over the full, unshuffled batch.
    pub fn compute_returns(&self, batch: &Batch) -> Result<Option<Tensor>> {
        self.rl.compute_returns(batch, self)
    }

    /// Creates (or refreshes) the target network as a copy of this model.
    pub fn build_target(&mut self) -> Result<()> {
        if self.target_net.is_none() {
            self.target_net = Some(Networks::new(&self.config, self.device));
        }
        self.reload_params_to_target()
    }

    /// Takes over the networks of `target` as this model's target copy and
    /// syncs them to the current parameters.
    pub fn attach_target(&mut self, target: IppoModel) -> Result<()> {
        if target.config != self.config {
            return Err(IppoError::TargetMismatch);
        }
        self.target_net = Some(target.nets);
        self.reload_params_to_target()
    }

    /// Hard copy of every parameter into the target network.
    pub fn reload_params_to_target(&mut self) -> Result<()> {
        let target = self.target_net.as_mut().ok_or(IppoError::MissingTarget)?;
        target.policy_vs.copy(&self.nets.policy_vs)?;
        target.value_vs.copy(&self.nets.value_vs)?;
        Ok(())
    }

    /// Soft update `θ' ← (1 - τ)θ' + τθ` with `τ = target_lr`.
    pub fn update_target(&mut self) -> Result<()> {
        let tau = self.config.target_lr;
        let target = self.target_net.as_ref().ok_or(IppoError::MissingTarget)?;
        for (dst, src) in [
            (&target.policy_vs, &self.nets.policy_vs),
            (&target.value_vs, &self.nets.value_vs),
        ] {
            let src_vars = src.variables();
            tch::no_grad(|| -> Result<()> {
                for (name, mut var) in dst.variables() {
                    let source = src_vars.get(&name).ok_or(IppoError::TargetMismatch)?;
                    let mixed = &var * (1.0 - tau) + source * tau;
                    var.f_copy_(&mixed)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Writes policy and value parameters into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        self.nets.policy_vs.save(dir.join(POLICY_FILE))?;
        self.nets.value_vs.save(dir.join(VALUE_FILE))?;
        debug!(path = %dir.display(), "saved IPPO parameters");
        Ok(())
    }

    /// Loads parameters written by [`IppoModel::save`]. The target network,
    /// if any, is reset to the loaded parameters.
    pub fn load(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        self.nets.policy_vs.load(dir.join(POLICY_FILE))?;
        self.nets.value_vs.load(dir.join(VALUE_FILE))?;
        if self.target_net.is_some() {
            self.reload_params_to_target()?;
        }
        debug!(path = %dir.display(), "loaded IPPO parameters");
        Ok(())
    }
}
