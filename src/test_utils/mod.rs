//! Test utilities.
//!
//! - In-memory repository implementations for mocking persistence
//! - Test data factories for creating valid fixtures

pub mod factories;
pub mod mocks;
