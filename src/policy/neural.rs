//! Neural policy backed by a trained [`IppoModel`].

use tch::Tensor;

use super::trait_::Policy;
use crate::error::Result;
use crate::model::IppoModel;
use crate::training::env::{rows_to_tensor, tensor_to_rows};
use crate::types::Status;

/// Executes an [`IppoModel`] one environment step at a time.
///
/// Can operate in greedy (evaluation) or stochastic (exploration) mode.
/// Recurrent hidden state is carried between calls until [`Policy::reset`].
pub struct NeuralPolicy {
    model: IppoModel,
    greedy: bool,
    hidden: Tensor,
}

impl NeuralPolicy {
    pub fn new(model: IppoModel) -> Self {
        let hidden = model.init_hidden(1);
        Self {
            model,
            greedy: true,
            hidden,
        }
    }

    /// Sets greedy mode (evaluation vs exploration).
    pub fn set_greedy(&mut self, greedy: bool) {
        self.greedy = greedy;
    }

    pub fn model(&self) -> &IppoModel {
        &self.model
    }

    pub fn into_model(self) -> IppoModel {
        self.model
    }
}

impl Policy for NeuralPolicy {
    fn select_actions(
        &mut self,
        observations: &[Vec<f32>],
        avail_actions: &[Vec<f32>],
    ) -> Result<Vec<Vec<f32>>> {
        let device = self.model.device();
        let state = rows_to_tensor(observations, device)?.unsqueeze(0);
        let avail = rows_to_tensor(avail_actions, device)?.unsqueeze(0);
        let (status, exploration) = if self.greedy {
            (Status::Test, false)
        } else {
            (Status::Train, true)
        };

        let selection = tch::no_grad(|| {
            self.model
                .get_actions(&state, status, exploration, &avail, false, Some(&self.hidden))
        })?;
        self.hidden = selection.hiddens;
        tensor_to_rows(&selection.restore_actions.squeeze_dim(0))
    }

    fn reset(&mut self) {
        self.hidden = self.model.init_hidden(1);
    }

    fn name(&self) -> &str {
        "neural"
    }
}
