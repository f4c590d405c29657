//! Policy trait and implementations.

pub mod neural;
pub mod random;
pub mod trait_;

pub use neural::NeuralPolicy;
pub use random::RandomPolicy;
pub use trait_::Policy;
