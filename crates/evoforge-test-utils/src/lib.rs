//! Mocks and fixtures shared by the integration tests.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
