//! Adapters implementing the domain ports.

pub mod fixture;
pub mod memory;
pub mod sqlite;
