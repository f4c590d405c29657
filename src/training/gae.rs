//! Generalized Advantage Estimation (GAE-λ).
//!
//! Computes per-agent returns from a time-ordered batch using bootstrapped
//! next-state values.

use tch::{Kind, Tensor};

use crate::error::Result;

/// Computes GAE-λ advantages and returns for a single agent.
///
/// # Arguments
///
/// * `rewards` - Per-step rewards
/// * `values` - Per-step value estimates `V(s_t)`
/// * `next_values` - Per-step value estimates `V(s_{t+1})`
/// * `dones` - Episode terminated at this step (no bootstrap)
/// * `last_steps` - Episode ended at this step (traces are cut, bootstrap kept)
/// * `gamma` - Discount factor
/// * `gae_lambda` - GAE λ parameter (0 = TD(0), 1 = Monte Carlo)
///
/// # Returns
///
/// `(advantages, returns)` where `returns = advantages + values`.
pub fn compute_gae(
    rewards: &[f64],
    values: &[f64],
    next_values: &[f64],
    dones: &[bool],
    last_steps: &[bool],
    gamma: f64,
    gae_lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = rewards.len();
    assert_eq!(values.len(), n);
    assert_eq!(next_values.len(), n);
    assert_eq!(dones.len(), n);
    assert_eq!(last_steps.len(), n);

    let mut advantages = vec![0.0; n];
    let mut gae = 0.0;

    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let continues = if dones[t] || last_steps[t] { 0.0 } else { 1.0 };

        let delta = rewards[t] + gamma * next_values[t] * not_done - values[t];
        gae = delta + gamma * gae_lambda * continues * gae;
        advantages[t] = gae;
    }

    let returns: Vec<f64> = advantages
        .iter()
        .zip(values.iter())
        .map(|(a, v)| a + v)
        .collect();

    (advantages, returns)
}

/// Applies [`compute_gae`] to every agent column of `(b, n)` tensors and
/// returns the `(b, n)` returns tensor on the device of `values`.
pub fn gae_returns(
    rewards: &Tensor,
    values: &Tensor,
    next_values: &Tensor,
    done: &Tensor,
    last_step: &Tensor,
    gamma: f64,
    gae_lambda: f64,
) -> Result<Tensor> {
    let (_, n) = values.size2()?;
    let columns = |t: &Tensor| -> Result<Vec<Vec<f64>>> {
        let t = t.detach().to_kind(Kind::Double).to_device(tch::Device::Cpu).tr();
        Ok(Vec::<Vec<f64>>::try_from(&t.contiguous())?)
    };
    let flags = |t: &Tensor| -> Result<Vec<Vec<bool>>> {
        Ok(columns(t)?
            .into_iter()
            .map(|col| col.into_iter().map(|x| x != 0.0).collect())
            .collect())
    };

    let rewards = columns(rewards)?;
    let values_cols = columns(values)?;
    let next_values = columns(next_values)?;
    let dones = flags(done)?;
    let last_steps = flags(last_step)?;

    let mut per_agent = Vec::with_capacity(n as usize);
    for i in 0..n as usize {
        let (_, returns) = compute_gae(
            &rewards[i],
            &values_cols[i],
            &next_values[i],
            &dones[i],
            &last_steps[i],
            gamma,
            gae_lambda,
        );
        per_agent.push(Tensor::from_slice(&returns).to_kind(Kind::Float));
    }
    Ok(Tensor::f_stack(&per_agent, 1)?.to_device(values.device()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gae_basic() {
        let rewards = vec![1.0, 1.0, 1.0];
        let values = vec![0.5, 0.5, 0.5];
        let next_values = vec![0.5, 0.5, 0.0];
        let dones = vec![false, false, true];
        let last = vec![false, false, true];
        let (advantages, returns) =
            compute_gae(&rewards, &values, &next_values, &dones, &last, 0.99, 0.95);

        assert_eq!(advantages.len(), 3);
        assert_eq!(returns.len(), 3);

        // Last step (done=true): delta = 1.0 + 0 - 0.5 = 0.5, gae = 0.5
        assert!((advantages[2] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn gae_with_lambda_zero_is_td_error() {
        let rewards = vec![1.0, 2.0];
        let values = vec![0.5, 1.0];
        let next_values = vec![1.0, 3.0];
        let dones = vec![false, true];
        let last = vec![false, true];
        let (advantages, _) =
            compute_gae(&rewards, &values, &next_values, &dones, &last, 0.99, 0.0);

        // t=1 (done=true): delta = 2.0 + 0 - 1.0 = 1.0
        assert!((advantages[1] - 1.0).abs() < 1e-10);
        // t=0: delta = 1.0 + 0.99*1.0 - 0.5 = 1.49
        assert!((advantages[0] - 1.49).abs() < 1e-10);
    }

    #[test]
    fn truncation_bootstraps_but_cuts_trace() {
        let rewards = vec![0.0, 1.0, 0.0];
        let values = vec![0.0, 0.0, 0.0];
        let next_values = vec![0.0, 2.0, 0.0];
        let dones = vec![false, false, false];
        let last = vec![false, true, false];
        let (advantages, _) =
            compute_gae(&rewards, &values, &next_values, &dones, &last, 0.5, 1.0);

        // Truncated step keeps the bootstrap: 1 + 0.5 * 2 = 2.
        assert!((advantages[1] - 2.0).abs() < 1e-10);
        // Step 0 sees step 1 through the trace: 0 + 0.5 * 1.0 * 2 = 1.
        assert!((advantages[0] - 1.0).abs() < 1e-10);
        // Step 2 belongs to the next episode and does not leak backwards.
        assert!(advantages[2].abs() < 1e-10);
    }

    #[test]
    fn gae_returns_per_agent_columns() {
        // 2 steps, 2 agents; agent 1 earns twice the reward.
        let rewards = Tensor::from_slice(&[1.0f32, 2.0, 1.0, 2.0]).reshape([2, 2]);
        let zeros = rewards.zeros_like();
        let done = Tensor::from_slice(&[0.0f32, 0.0, 1.0, 1.0]).reshape([2, 2]);
        let returns = gae_returns(&rewards, &zeros, &zeros, &done, &done, 1.0, 1.0).unwrap();
        assert_eq!(returns.size(), &[2, 2]);
        assert!((returns.double_value(&[0, 0]) - 2.0).abs() < 1e-6);
        assert!((returns.double_value(&[0, 1]) - 4.0).abs() < 1e-6);
        assert!((returns.double_value(&[1, 1]) - 2.0).abs() < 1e-6);
    }
}
