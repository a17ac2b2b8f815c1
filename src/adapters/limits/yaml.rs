//! YAML limits file.
//!
//! ```yaml
//! parts:
//!   "1234-01":
//!     FINAL:
//!       - name: VOUTDC = Main Output
//!         parameters:
//!           OUTPUT: 1
//!           VIN: 48
//!           LOAD: "2.0, 0.5"
//!           MIN: "4.950"
//!           MAX: "5.050"
//!           UNITS: V
//! ```
//!
//! Parameter values may be scalars of any type. Quote limits that end in
//! zeros; the digits after the decimal point set the comparison precision.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::memory::InMemoryLimitsProvider;
use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::TestRecord;
use crate::domain::ports::LimitsProvider;

#[derive(Debug, Deserialize)]
struct LimitsDocument {
    #[serde(default)]
    parts: BTreeMap<String, BTreeMap<String, Vec<RawRecord>>>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    name: String,
    #[serde(default)]
    parameters: BTreeMap<String, serde_yaml::Value>,
}

impl RawRecord {
    fn into_record(self) -> StationResult<TestRecord> {
        let mut record = TestRecord::new(self.name);
        for (key, value) in self.parameters {
            let text = match value {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(flag) => flag.to_string(),
                serde_yaml::Value::Number(number) => number.to_string(),
                serde_yaml::Value::String(text) => text,
                serde_yaml::Value::Sequence(items) => items
                    .iter()
                    .map(scalar_text)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| nested_value(&record.name, &key))?
                    .join(","),
                _ => return Err(nested_value(&record.name, &key)),
            };
            record = record.param(&key, text);
        }
        Ok(record)
    }
}

fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

fn nested_value(test: &str, key: &str) -> StationError {
    StationError::FileError(format!("test '{test}' has a non-scalar {key} value"))
}

/// Limits provider backed by a YAML file, parsed once at open.
#[derive(Debug, Clone)]
pub struct YamlLimitsProvider {
    source: Option<PathBuf>,
    inner: InMemoryLimitsProvider,
}

impl YamlLimitsProvider {
    /// Read and parse `path`.
    pub fn open(path: impl AsRef<Path>) -> StationResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            StationError::FileError(format!("cannot read limits file {}: {err}", path.display()))
        })?;
        let mut provider = Self::parse(&text).map_err(|err| match err {
            StationError::FileError(msg) => {
                StationError::FileError(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        provider.source = Some(path.to_path_buf());
        debug!(path = %path.display(), "limits file loaded");
        Ok(provider)
    }

    /// Parse a limits document held in memory.
    pub fn parse(text: &str) -> StationResult<Self> {
        let document: LimitsDocument = serde_yaml::from_str(text)
            .map_err(|err| StationError::FileError(format!("malformed limits file: {err}")))?;

        let mut inner = InMemoryLimitsProvider::new();
        for (dash, types) in document.parts {
            for (test_type, raw) in types {
                let records = raw
                    .into_iter()
                    .map(RawRecord::into_record)
                    .collect::<StationResult<Vec<_>>>()?;
                inner.insert(&dash, &test_type, records);
            }
        }
        Ok(Self {
            source: None,
            inner,
        })
    }

    /// File this provider was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.parts()
    }
}

impl LimitsProvider for YamlLimitsProvider {
    fn get_tests(&self, dash: &str, test_type: &str) -> StationResult<Vec<TestRecord>> {
        self.inner.get_tests(dash, test_type)
    }
}
