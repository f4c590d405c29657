//! Multi-agent environment interface used by the trainer.

use tch::{Device, Kind, Tensor};

use crate::error::{IppoError, Result};

/// Per-agent observations together with their action availability masks.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentObservations {
    /// One observation vector per agent.
    pub observations: Vec<Vec<f32>>,
    /// One mask per agent; `0.0` marks an unavailable action.
    pub avail_actions: Vec<Vec<f32>>,
}

/// Result of stepping the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Observations after the step.
    pub next: AgentObservations,
    /// One reward per agent.
    pub rewards: Vec<f32>,
    /// The episode terminated; the next state has no value.
    pub done: bool,
    /// The episode was cut short; the next state is bootstrapped.
    pub truncated: bool,
}

/// A shared environment in which every agent acts simultaneously.
pub trait MultiAgentEnv {
    /// Number of agents.
    fn n_agents(&self) -> usize;

    /// Per-agent observation size.
    fn obs_dim(&self) -> usize;

    /// Per-agent action size.
    fn action_dim(&self) -> usize;

    /// Starts a new episode.
    fn reset(&mut self) -> AgentObservations;

    /// Applies one action vector per agent.
    fn step(&mut self, actions: &[Vec<f32>]) -> StepResult;
}

/// Packs equally sized rows into an `(rows, width)` float tensor.
pub fn rows_to_tensor(rows: &[Vec<f32>], device: Device) -> Result<Tensor> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(IppoError::ShapeMismatch {
            name: "rows",
            expected: vec![rows.len() as i64, width as i64],
            actual: vec![rows.len() as i64, bad.len() as i64],
        });
    }
    let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Ok(Tensor::from_slice(&flat)
        .reshape([rows.len() as i64, width as i64])
        .to_device(device))
}

/// Unpacks a 2-D tensor into rows of `f32`.
pub fn tensor_to_rows(t: &Tensor) -> Result<Vec<Vec<f32>>> {
    let t = t
        .detach()
        .to_kind(Kind::Float)
        .to_device(Device::Cpu)
        .contiguous();
    Ok(Vec::<Vec<f32>>::try_from(&t)?)
}
