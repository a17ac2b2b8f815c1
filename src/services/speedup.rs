//! Speed-up cache: reuse raw readings across steps with an identical setup.

use std::collections::{BTreeMap, HashMap};

use crate::domain::models::{Conditions, Measured, OutputChannel, SetupKey};

/// Raw measurements keyed by test type and instrument-visible setup.
///
/// Only raw values are kept. Limits, units and precision are applied fresh
/// by every step that reads an entry, so steps sharing a setup but not
/// limits still get independent verdicts.
#[derive(Debug, Default)]
pub struct SpeedupCache {
    entries: HashMap<(String, SetupKey), BTreeMap<OutputChannel, Measured>>,
    hits: u32,
}

impl SpeedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Previously measured raw value for this test type, setup and output.
    pub fn lookup(&mut self, test_type: &str, conditions: &Conditions, output: OutputChannel) -> Option<Measured> {
        let found = self
            .entries
            .get(&(test_type.to_string(), conditions.setup_key()))
            .and_then(|by_output| by_output.get(&output))
            .cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    pub fn store(&mut self, test_type: &str, conditions: &Conditions, output: OutputChannel, raw: Measured) {
        self.entries
            .entry((test_type.to_string(), conditions.setup_key()))
            .or_default()
            .insert(output, raw);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
    }

    /// Number of stored readings.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache since the last clear.
    pub const fn hits(&self) -> u32 {
        self.hits
    }
}
