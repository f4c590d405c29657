//! Policy trait for decentralised execution.

use crate::error::Result;

/// A policy that selects actions for agents based on observations.
///
/// Discrete actions are returned one-hot; continuous actions as raw
/// vectors with unavailable dimensions zeroed.
pub trait Policy {
    /// Selects one action per agent.
    ///
    /// # Arguments
    ///
    /// * `observations` - Per-agent observation vectors
    /// * `avail_actions` - Per-agent availability masks (`0.0` = unavailable)
    ///
    /// # Returns
    ///
    /// A vector of actions, one per agent.
    fn select_actions(
        &mut self,
        observations: &[Vec<f32>],
        avail_actions: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>>;

    /// Clears any per-episode state.
    fn reset(&mut self) {}

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}
