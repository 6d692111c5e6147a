//! Shared test utilities for meshsync integration tests.
//!
//! - In-memory fakes for the cluster, the config evaluator and the mesh
//! - Builders for workloads and config objects
//! - `OperatorHarness` wiring an operator over the fakes

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::{settings, OperatorHarness};
