// src/evolution/mod.rs — Darwinian skill evolution

pub mod experiments;
pub mod fitness;
pub mod versioning;

pub use ab_test::{AbTest, EvolutionEngine};
pub use experiments::{Experiment, ExperimentManager, ExperimentStatus};
pub use fitness::{compute_fitness, should_deprecate, FitnessWeights};
pub use versioning::{Change, ChangeStatus, ChangeType, VersionController};
