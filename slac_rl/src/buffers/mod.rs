//! Experience storage for sequence-based latent training.
//!
//! - `SequenceStore`: circular store of episode records serving fixed-length
//!   windows to the latent model and the actor-critic learner
//! - `ObservationHistory`: zero-padded rolling history used to act

pub mod observation_history;
pub mod sequence_store;

pub use observation_history::ObservationHistory;
pub use sequence_store::{SequenceStore, WindowBatch};

#[cfg(test)]
mod tests;
