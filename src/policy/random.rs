//! Random policy for testing and baselines.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::trait_::Policy;
use crate::error::Result;

/// Uniformly random discrete action selection.
///
/// Each agent independently picks one of its available actions and
/// returns it one-hot. Used for sanity checks and as a lower-bound
/// baseline.
pub struct RandomPolicy {
    action_dim: usize,
    rng: StdRng,
}

impl RandomPolicy {
    /// Creates a new random policy over `action_dim` choices.
    pub fn new(action_dim: usize, seed: u64) -> Self {
        Self {
            action_dim,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn select_actions(
        &mut self,
        observations: &[Vec<f32>],
        avail_actions: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>> {
        let mut actions = Vec::with_capacity(observations.len());
        for i in 0..observations.len() {
            let available: Vec<usize> = match avail_actions.get(i) {
                Some(mask) => (0..self.action_dim)
                    .filter(|&a| mask.get(a).copied().unwrap_or(0.0) != 0.0)
                    .collect(),
                None => (0..self.action_dim).collect(),
            };
            let mut one_hot = vec![0.0; self.action_dim];
            if let Some(&a) = available.choose(&mut self.rng) {
                one_hot[a] = 1.0;
            }
            actions.push(one_hot);
        }
        Ok(actions)
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_policy_returns_correct_count() {
        let mut policy = RandomPolicy::new(6, 0);
        let obs = vec![vec![0.0; 10]; 4]; // 4 agents
        let actions = policy.select_actions(&obs, &[]).unwrap();
        assert_eq!(actions.len(), 4);
        for a in &actions {
            assert_eq!(a.iter().sum::<f32>(), 1.0);
        }
    }

    #[test]
    fn random_policy_respects_mask() {
        let mut policy = RandomPolicy::new(3, 7);
        let obs = vec![vec![0.0; 2]; 100];
        let avail = vec![vec![0.0, 1.0, 0.0]; 100];
        let actions = policy.select_actions(&obs, &avail).unwrap();
        for a in actions {
            assert_eq!(a, vec![0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn fully_masked_agent_gets_no_op() {
        let mut policy = RandomPolicy::new(2, 1);
        let actions = policy
            .select_actions(&[vec![0.0]], &[vec![0.0, 0.0]])
            .unwrap();
        assert_eq!(actions, vec![vec![0.0, 0.0]]);
    }
}
