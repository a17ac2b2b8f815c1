//! Instrument factory: resolves configured model names to facades.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::sim::{SimBench, SimDut};
use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::InstrumentsConfig;
use crate::domain::ports::{
    Dmm, ElectronicLoad, FunctionGenerator, InstrumentRack, Oscilloscope, PowerSupply,
    RelayMatrix, TemperatureController,
};

/// Instrument models this build knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentModel {
    /// Facade over the shared simulated bench.
    Sim,
}

impl FromStr for InstrumentModel {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" | "simulated" => Ok(Self::Sim),
            other => Err(StationError::Config(format!("unknown instrument model '{other}'"))),
        }
    }
}

impl fmt::Display for InstrumentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sim => f.write_str("sim"),
        }
    }
}

/// Builds an [`InstrumentRack`] from [`InstrumentsConfig`].
pub struct InstrumentFactory {
    bench: SimBench,
}

impl InstrumentFactory {
    /// Factory whose simulated instruments share a bench laid out per `config`.
    pub fn new(config: &InstrumentsConfig) -> Self {
        Self {
            bench: SimBench::with_layout(
                SimDut::default(),
                config.load_channels,
                config.aux_supplies.len(),
            ),
        }
    }

    /// Factory over an existing bench, so callers can inject faults.
    pub const fn with_bench(bench: SimBench) -> Self {
        Self { bench }
    }

    pub const fn bench(&self) -> &SimBench {
        &self.bench
    }

    fn model(kind: &str, name: &str) -> StationResult<InstrumentModel> {
        name.parse().map_err(|_| {
            StationError::Config(format!("unknown model '{name}' for {kind}"))
        })
    }

    /// Resolve every configured instrument and assemble the rack.
    pub fn build(&self, config: &InstrumentsConfig) -> StationResult<InstrumentRack> {
        if config.load_channels == 0 {
            return Err(StationError::Config(
                "instruments.load_channels must be at least 1".to_string(),
            ));
        }

        let line: Box<dyn PowerSupply> = match Self::model("line_supply", &config.line_supply)? {
            InstrumentModel::Sim => Box::new(self.bench.line_supply()),
        };

        let mut aux: Vec<Box<dyn PowerSupply>> = Vec::with_capacity(config.aux_supplies.len());
        for (index, name) in config.aux_supplies.iter().enumerate() {
            match Self::model("aux_supplies", name)? {
                InstrumentModel::Sim => aux.push(Box::new(self.bench.aux_supply(index))),
            }
        }

        let dmm: Box<dyn Dmm> = match Self::model("dmm", &config.dmm)? {
            InstrumentModel::Sim => Box::new(self.bench.dmm()),
        };
        let load: Box<dyn ElectronicLoad> = match Self::model("load", &config.load)? {
            InstrumentModel::Sim => Box::new(self.bench.load()),
        };
        let scope: Box<dyn Oscilloscope> = match Self::model("scope", &config.scope)? {
            InstrumentModel::Sim => Box::new(self.bench.scope()),
        };
        let relays: Box<dyn RelayMatrix> = match Self::model("relay_matrix", &config.relay_matrix)? {
            InstrumentModel::Sim => Box::new(self.bench.relay_matrix()),
        };
        let fgen: Box<dyn FunctionGenerator> =
            match Self::model("function_generator", &config.function_generator)? {
                InstrumentModel::Sim => Box::new(self.bench.function_generator()),
            };
        let chamber: Option<Box<dyn TemperatureController>> = match &config.temperature_controller {
            Some(name) => match Self::model("temperature_controller", name)? {
                InstrumentModel::Sim => Some(Box::new(self.bench.chamber())),
            },
            None => None,
        };

        info!(
            line = %config.line_supply,
            aux = aux.len(),
            load_channels = config.load_channels,
            chamber = chamber.is_some(),
            "instrument rack assembled"
        );

        Ok(InstrumentRack {
            line,
            aux,
            dmm,
            load,
            scope,
            relays,
            fgen,
            chamber,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_config() {
        let config = InstrumentsConfig::default();
        let factory = InstrumentFactory::new(&config);
        let rack = factory.build(&config).unwrap();
        assert_eq!(rack.aux.len(), 1);
        assert_eq!(rack.load.channels(), 2);
        assert!(rack.chamber.is_none());
    }

    #[test]
    fn test_build_with_chamber() {
        let config = InstrumentsConfig {
            temperature_controller: Some("SIM".to_string()),
            ..InstrumentsConfig::default()
        };
        let rack = InstrumentFactory::new(&config).build(&config).unwrap();
        assert!(rack.chamber.is_some());
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let config = InstrumentsConfig {
            scope: "keysight-dsox".to_string(),
            ..InstrumentsConfig::default()
        };
        let err = InstrumentFactory::new(&config).build(&config).err().unwrap();
        assert!(matches!(err, StationError::Config(ref msg) if msg.contains("keysight-dsox")));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_zero_load_channels_rejected() {
        let config = InstrumentsConfig {
            load_channels: 0,
            ..InstrumentsConfig::default()
        };
        assert!(InstrumentFactory::new(&config).build(&config).is_err());
    }

    #[test]
    fn test_model_parse() {
        assert_eq!("Sim".parse::<InstrumentModel>().unwrap(), InstrumentModel::Sim);
        assert_eq!(InstrumentModel::Sim.to_string(), "sim");
        assert!("agilent".parse::<InstrumentModel>().is_err());
    }
}
