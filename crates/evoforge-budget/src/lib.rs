//! Budget tokens: a master ceiling per run and child ceilings per task.

pub mod manager;

pub use manager::BudgetManager;
