//! Policy networks: a feed-forward agent and a GRU agent.

use tch::{nn, nn::Module, nn::RNN, Device, Kind, Tensor};

use super::init::init_linear;
use super::{AgentNetwork, AgentOutput};
use crate::config::ModelConfig;
use crate::types::Activation;

const LOG_STD_MIN: f64 = -20.0;
const LOG_STD_MAX: f64 = 2.0;

/// Layers shared by both agent kinds: input projection and optional log-std head.
struct Encoder {
    fc1: nn::Linear,
    layernorm: Option<nn::LayerNorm>,
    activation: Activation,
}

impl Encoder {
    fn new(p: &nn::Path, input_dim: i64, config: &ModelConfig) -> Self {
        let hid = config.hid_size as i64;
        let mut fc1 = nn::linear(p / "fc1", input_dim, hid, Default::default());
        init_linear(&mut fc1, config);
        let layernorm = config
            .layernorm
            .then(|| nn::layer_norm(p / "layernorm", vec![hid], Default::default()));
        Self {
            fc1,
            layernorm,
            activation: config.hid_activation,
        }
    }

    fn forward(&self, inputs: &Tensor) -> Tensor {
        let x = self.fc1.forward(inputs);
        let x = match &self.layernorm {
            Some(ln) => ln.forward(&x),
            None => x,
        };
        self.activation.apply(&x)
    }
}

fn log_std_head(p: &nn::Path, config: &ModelConfig) -> Option<nn::Linear> {
    (config.continuous && config.gaussian_policy).then(|| {
        let mut head = nn::linear(
            p / "log_std",
            config.hid_size as i64,
            config.action_dim as i64,
            Default::default(),
        );
        init_linear(&mut head, config);
        head
    })
}

/// Feed-forward policy agent.
///
/// Architecture: `input → hid → hid → action_dim`. The second hidden
/// layer is returned as the agent's hidden state; the incoming hidden
/// state is ignored.
pub struct MlpAgent {
    encoder: Encoder,
    fc2: nn::Linear,
    fc3: nn::Linear,
    log_std: Option<nn::Linear>,
    hid_size: i64,
    device: Device,
}

impl MlpAgent {
    /// Creates the agent's layers under `p`.
    pub fn new(p: &nn::Path, input_dim: usize, config: &ModelConfig) -> Self {
        let hid = config.hid_size as i64;
        let encoder = Encoder::new(p, input_dim as i64, config);
        let mut fc2 = nn::linear(p / "fc2", hid, hid, Default::default());
        let mut fc3 = nn::linear(p / "fc3", hid, config.action_dim as i64, Default::default());
        init_linear(&mut fc2, config);
        init_linear(&mut fc3, config);

        Self {
            encoder,
            fc2,
            fc3,
            log_std: log_std_head(p, config),
            hid_size: hid,
            device: p.device(),
        }
    }
}

impl AgentNetwork for MlpAgent {
    fn forward(&self, inputs: &Tensor, _hidden: &Tensor) -> AgentOutput {
        let x = self.encoder.forward(inputs);
        let h = self.fc2.forward(&x).relu();
        let means = self.fc3.forward(&h);
        let log_stds = self
            .log_std
            .as_ref()
            .map(|head| head.forward(&h).clamp(LOG_STD_MIN, LOG_STD_MAX));
        AgentOutput {
            means,
            log_stds,
            hidden: h,
        }
    }

    fn init_hidden(&self, batch: i64) -> Tensor {
        Tensor::zeros([batch, self.hid_size], (Kind::Float, self.device))
    }
}

/// Recurrent policy agent built around a single-layer GRU.
///
/// Architecture: `input → hid → GRU(hid) → action_dim`.
pub struct RnnAgent {
    encoder: Encoder,
    gru: nn::GRU,
    fc2: nn::Linear,
    log_std: Option<nn::Linear>,
    hid_size: i64,
    device: Device,
}

impl RnnAgent {
    /// Creates the agent's layers under `p`.
    pub fn new(p: &nn::Path, input_dim: usize, config: &ModelConfig) -> Self {
        let hid = config.hid_size as i64;
        let encoder = Encoder::new(p, input_dim as i64, config);
        let gru = nn::gru(p / "rnn", hid, hid, Default::default());
        let mut fc2 = nn::linear(p / "fc2", hid, config.action_dim as i64, Default::default());
        init_linear(&mut fc2, config);

        Self {
            encoder,
            gru,
            fc2,
            log_std: log_std_head(p, config),
            hid_size: hid,
            device: p.device(),
        }
    }
}

impl AgentNetwork for RnnAgent {
    fn forward(&self, inputs: &Tensor, hidden: &Tensor) -> AgentOutput {
        let x = self.encoder.forward(inputs);
        // GRU state is (num_layers, batch, hid).
        let state = nn::GRUState(hidden.reshape([1, -1, self.hid_size]));
        let h = self.gru.step(&x, &state).0.squeeze_dim(0);
        let means = self.fc2.forward(&h);
        let log_stds = self
            .log_std
            .as_ref()
            .map(|head| head.forward(&h).clamp(LOG_STD_MIN, LOG_STD_MAX));
        AgentOutput {
            means,
            log_stds,
            hidden: h,
        }
    }

    fn init_hidden(&self, batch: i64) -> Tensor {
        Tensor::zeros([batch, self.hid_size], (Kind::Float, self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfig {
        ModelConfig {
            obs_dim: 6,
            action_dim: 3,
            hid_size: 16,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn mlp_agent_forward_shape() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cfg = config();
        let agent = MlpAgent::new(&(vs.root() / "agent"), 6, &cfg);
        let obs = Tensor::randn([5, 6], (Kind::Float, Device::Cpu));
        let out = agent.forward(&obs, &agent.init_hidden(5));
        assert_eq!(out.means.size(), &[5, 3]);
        assert_eq!(out.hidden.size(), &[5, 16]);
        assert!(out.log_stds.is_none());
    }

    #[test]
    fn mlp_agent_with_layernorm_and_log_std() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cfg = ModelConfig {
            layernorm: true,
            continuous: true,
            gaussian_policy: true,
            ..config()
        };
        let agent = MlpAgent::new(&vs.root(), 6, &cfg);
        let obs = Tensor::randn([2, 6], (Kind::Float, Device::Cpu)) * 1000.0;
        let out = agent.forward(&obs, &agent.init_hidden(2));
        let log_stds = out.log_stds.expect("gaussian policy has a log-std head");
        assert_eq!(log_stds.size(), &[2, 3]);
        assert!(log_stds.max().double_value(&[]) <= LOG_STD_MAX);
        assert!(log_stds.min().double_value(&[]) >= LOG_STD_MIN);
    }

    #[test]
    fn rnn_agent_hidden_state_evolves() {
        let vs = nn::VarStore::new(Device::Cpu);
        let cfg = config();
        let agent = RnnAgent::new(&vs.root(), 6, &cfg);
        let obs = Tensor::ones([4, 6], (Kind::Float, Device::Cpu));

        let first = agent.forward(&obs, &agent.init_hidden(4));
        assert_eq!(first.means.size(), &[4, 3]);
        assert_eq!(first.hidden.size(), &[4, 16]);

        let second = agent.forward(&obs, &first.hidden);
        let diff = (&second.hidden - &first.hidden).abs().sum(Kind::Float);
        assert!(diff.double_value(&[]) > 0.0);
    }
}
