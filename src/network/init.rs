//! Weight initialisation for linear layers.

use tch::{nn, Kind, Tensor};

use crate::config::ModelConfig;
use crate::types::InitType;

/// Re-initialises the weight matrix of `linear` according to `config`.
///
/// Biases keep tch's default initialisation.
pub fn init_linear(linear: &mut nn::Linear, config: &ModelConfig) {
    match config.init_type {
        InitType::Normal => normal_(&mut linear.ws, config.init_std),
        InitType::Orthogonal => orthogonal_(&mut linear.ws, config.hid_activation.gain()),
    }
}

fn normal_(ws: &mut Tensor, std: f64) {
    tch::no_grad(|| {
        let _ = ws.normal_(0.0, std);
    });
}

/// Fills a 2-D weight with a (semi-)orthogonal matrix scaled by `gain`.
fn orthogonal_(ws: &mut Tensor, gain: f64) {
    let size = ws.size();
    let (rows, cols) = (size[0], size[1]);
    tch::no_grad(|| {
        let flat = Tensor::randn([rows, cols], (Kind::Float, ws.device()));
        let flat = if rows < cols { flat.tr() } else { flat };
        let (q, r) = Tensor::linalg_qr(&flat, "reduced");
        // Sign correction makes the decomposition unique.
        let q = q * r.diagonal(0, 0, 1).sign();
        let q = if rows < cols { q.tr() } else { q };
        let _ = ws.copy_(&(q * gain));
    });
}
