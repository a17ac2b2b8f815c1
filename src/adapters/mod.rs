//! Adapters implementing the domain ports.

pub mod instruments;
pub mod limits;
