pub mod agent;
pub mod cycle;
pub mod operators;
pub mod outcome;
pub mod population;
pub mod selection;
pub mod snapshot;
pub mod traits;

pub use agent::{Agent, Blueprint, Provenance};
pub use cycle::{CycleResult, CycleStatus, ForgeCycle};
pub use operators::{architect_task, recombine_task, OperatorContext, OperatorSet, Recombination};
pub use outcome::TaskOutcome;
pub use population::Population;
pub use snapshot::SnapshotWriter;
pub use traits::{
    ArchitectOperator, ArchitectRequest, CrossoverOperator, CrossoverRequest, Ecosystem, Forge,
    MutationOperator, MutationRequest,
};
