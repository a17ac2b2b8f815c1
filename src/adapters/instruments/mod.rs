//! Instrument facade implementations and the factory that selects them.

pub mod factory;
pub mod sim;

pub use factory::{InstrumentFactory, InstrumentModel};
pub use sim::{SimBench, SimCounters, SimDut, SimFaults, SimKind};
