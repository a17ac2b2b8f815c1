//! Measurement strategy registry and factory.

use std::collections::BTreeMap;

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::TestName;
use crate::services::measurement::{
    CrossRegulationMeasurement, EfficiencyMeasurement, FrequencyMeasurement,
    InhibitCurrentMeasurement, InputCurrentMeasurement, InputPowerMeasurement,
    LineRegulationMeasurement, LoadRegulationMeasurement, LoadTransientMeasurement, Measurement,
    OutputVoltageMeasurement, RippleMeasurement, RiseTimeMeasurement,
    ShortCircuitCurrentMeasurement, TurnOnDelayMeasurement,
};

/// Constructor for a strategy instance.
pub type MeasurementFactory = fn() -> Box<dyn Measurement>;

const BUILTINS: &[(&str, MeasurementFactory)] = &[
    ("VOUTDC", || Box::new(OutputVoltageMeasurement)),
    ("IIN", || Box::new(InputCurrentMeasurement)),
    ("INPUTPOWER", || Box::new(InputPowerMeasurement)),
    ("EFFICIENCY", || Box::new(EfficiencyMeasurement)),
    ("LINEREGULATION", || Box::new(LineRegulationMeasurement)),
    ("LOADREGULATION", || Box::new(LoadRegulationMeasurement)),
    ("CROSSREGULATION", || Box::new(CrossRegulationMeasurement)),
    ("RIPPLE", || Box::new(RippleMeasurement)),
    ("FREQUENCY", || Box::new(FrequencyMeasurement)),
    ("LOADTRANSIENTRESPONSE", || Box::new(LoadTransientMeasurement)),
    ("TURNONDELAY", || Box::new(TurnOnDelayMeasurement)),
    ("RISETIME", || Box::new(RiseTimeMeasurement)),
    ("INHIBITCURRENT", || Box::new(InhibitCurrentMeasurement)),
    ("SHORTCIRCUITCURRENT", || Box::new(ShortCircuitCurrentMeasurement)),
];

/// Name-keyed factory of measurement strategies.
///
/// Names are stored upper-case. Lookups accept any case and the
/// `SOFTWARE = Display Name` form, which resolves to `SOFTWARE`.
#[derive(Default)]
pub struct MeasurementRegistry {
    factories: BTreeMap<String, MeasurementFactory>,
}

impl MeasurementRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy.
    ///
    /// # Panics
    ///
    /// Panics if two built-ins share a name.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for &(name, factory) in BUILTINS {
            assert!(
                registry.register(name, factory),
                "measurement type {name} registered twice"
            );
        }
        registry
    }

    fn canonical(name: &str) -> String {
        TestName::parse(name).software
    }

    /// Register `factory` under `name`. Returns `false` if the name is taken.
    pub fn register(&mut self, name: &str, factory: MeasurementFactory) -> bool {
        let key = Self::canonical(name);
        if key.is_empty() || self.factories.contains_key(&key) {
            return false;
        }
        self.factories.insert(key, factory);
        true
    }

    /// Like [`Self::register`] but reports a duplicate as an error.
    pub fn try_register(&mut self, name: &str, factory: MeasurementFactory) -> StationResult<()> {
        if self.register(name, factory) {
            Ok(())
        } else {
            Err(StationError::DuplicateMeasurementType(Self::canonical(name)))
        }
    }

    /// Build the strategy for a test type.
    pub fn create(&self, name: &str) -> StationResult<Box<dyn Measurement>> {
        let key = Self::canonical(name);
        self.factories
            .get(&key)
            .map(|factory| factory())
            .ok_or(StationError::NoMeasurementType(key))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&Self::canonical(name))
    }

    /// Registered test types, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
