//! Testing utilities and mock implementations
//!
//! Lets the session be exercised without a broker.

pub mod mocks;

pub use mocks::*;
