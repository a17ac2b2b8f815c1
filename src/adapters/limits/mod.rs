//! Limits provider implementations.

pub mod memory;
pub mod yaml;

pub use memory::InMemoryLimitsProvider;
pub use yaml::YamlLimitsProvider;
