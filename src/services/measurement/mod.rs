//! Measurement strategies.
//!
//! A strategy knows which physical axes it needs set up and how to take its
//! reading once they are. Strategies report in base SI units; conversion into
//! the step's units and precision happens in the protocol.

mod context;
mod dynamic;
mod regulation;
mod static_dc;

pub use context::{AppliedSetpoints, LoadState, MeasureContext};
pub use dynamic::{
    FrequencyMeasurement, LoadTransientMeasurement, RippleMeasurement, RiseTimeMeasurement,
    TurnOnDelayMeasurement,
};
pub use regulation::{
    CrossRegulationMeasurement, LineRegulationMeasurement, LoadRegulationMeasurement,
};
pub use static_dc::{
    EfficiencyMeasurement, InhibitCurrentMeasurement, InputCurrentMeasurement,
    InputPowerMeasurement, OutputVoltageMeasurement, ShortCircuitCurrentMeasurement,
};

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{Measured, OutputChannel, TestStep};
use crate::domain::ports::InstrumentRack;

/// Physical axes pushed to the instruments before a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Axes {
    pub line: bool,
    pub loads: bool,
    pub aux: bool,
    pub relays: bool,
    pub inhibit: bool,
    pub short: bool,
    pub sync: bool,
    pub temperature: bool,
}

impl Axes {
    /// Every axis.
    pub const ALL: Self = Self {
        line: true,
        loads: true,
        aux: true,
        relays: true,
        inhibit: true,
        short: true,
        sync: true,
        temperature: true,
    };

    /// Every axis except the load short, for strategies that drive it themselves.
    pub const WITHOUT_SHORT: Self = Self {
        short: false,
        ..Self::ALL
    };
}

/// One kind of measurement, looked up by its software test type.
pub trait Measurement {
    /// Canonical, upper-case test type.
    fn name(&self) -> &'static str;

    fn axes(&self) -> Axes {
        Axes::ALL
    }

    /// Whether the reading comes from the oscilloscope, which enables the
    /// rescale-and-retry rule and bandwidth setup.
    fn uses_scope(&self) -> bool {
        false
    }

    /// Whether a reading may be reused for another step with an identical setup.
    fn supports_speedup(&self) -> bool {
        true
    }

    /// Whether the line supply must be stepped rather than jumped.
    fn ramps_line(&self) -> bool {
        false
    }

    /// Reject steps missing something this strategy needs.
    fn validate(&self, _step: &TestStep) -> StationResult<()> {
        Ok(())
    }

    /// Take the reading. Instruments are already set to the step's conditions.
    fn measure(
        &self,
        rack: &mut InstrumentRack,
        step: &TestStep,
        ctx: &mut MeasureContext<'_>,
    ) -> StationResult<Measured>;
}

pub(crate) fn require_next_line(name: &str, step: &TestStep) -> StationResult<f64> {
    step.conditions().line.next.ok_or_else(|| {
        StationError::FileError(format!("{name} test '{}' needs VIN_NEXT", step.display_name()))
    })
}

pub(crate) fn require_next_load(name: &str, step: &TestStep, channel: OutputChannel) -> StationResult<(f64, f64)> {
    step.conditions()
        .load(channel)
        .and_then(|load| load.next.map(|next| (load.value, next)))
        .ok_or_else(|| {
            StationError::FileError(format!(
                "{name} test '{}' needs LOAD and LOAD_NEXT for output {channel}",
                step.display_name()
            ))
        })
}

/// Signed deviation of `after` from `before`, in percent of `before`.
pub(crate) fn percent_change(before: f64, after: f64) -> StationResult<f64> {
    if before.abs() < f64::EPSILON {
        return Err(StationError::Measurement(
            "reference reading is zero, regulation is undefined".to_string(),
        ));
    }
    Ok((after - before) / before * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_change() {
        let pct = percent_change(5.0, 4.95).unwrap();
        assert!((pct + 1.0).abs() < 1e-9);
        assert!(percent_change(0.0, 1.0).is_err());
    }

    #[test]
    fn test_axes_without_short() {
        assert!(!Axes::WITHOUT_SHORT.short);
        assert!(Axes::WITHOUT_SHORT.line);
    }
}
