//! File-backed stand-in for provider APIs.

pub mod resource_source;

pub use resource_source::{FixtureResourceSource, FixtureSet};
