//! Shared components for unit tests.
mod common;
mod fake_engine;

pub use common::*;
pub use fake_engine::*;
