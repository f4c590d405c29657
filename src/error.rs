use thiserror::Error;

/// Errors raised while building, running or training an IPPO model.
#[derive(Debug, Error)]
pub enum IppoError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },

    #[error("Target network requested but none is attached")]
    MissingTarget,

    #[error("Target network configuration does not match the behaviour network")]
    TargetMismatch,

    #[error("Batch is empty")]
    EmptyBatch,

    #[error("Environment returned {actual} agents, model expects {expected}")]
    AgentCountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IppoError>;

/// Checks that `tensor` has exactly the `expected` shape.
pub(crate) fn ensure_shape(
    name: &'static str,
    tensor: &tch::Tensor,
    expected: &[i64],
) -> Result<()> {
    let actual = tensor.size();
    if actual.as_slice() != expected {
        return Err(IppoError::ShapeMismatch {
            name,
            expected: expected.to_vec(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    #[test]
    fn ensure_shape_accepts_matching_tensor() {
        let t = Tensor::zeros([2, 3, 4], (Kind::Float, Device::Cpu));
        assert!(ensure_shape("t", &t, &[2, 3, 4]).is_ok());
    }

    #[test]
    fn ensure_shape_reports_both_shapes() {
        let t = Tensor::zeros([2, 3], (Kind::Float, Device::Cpu));
        let err = ensure_shape("obs", &t, &[2, 4]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("obs"));
        assert!(msg.contains("[2, 4]"));
        assert!(msg.contains("[2, 3]"));
    }
}
