//! In-memory limits provider.

use std::collections::BTreeMap;

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::TestRecord;
use crate::domain::ports::LimitsProvider;

/// Test lists held in memory, keyed by dash and test type.
///
/// Test types match case-insensitively; dash numbers match exactly after
/// trimming.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLimitsProvider {
    parts: BTreeMap<(String, String), Vec<TestRecord>>,
}

impl InMemoryLimitsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(dash: &str, test_type: &str) -> (String, String) {
        (dash.trim().to_string(), test_type.trim().to_ascii_uppercase())
    }

    /// Replace the test list for `dash` / `test_type`.
    pub fn insert(&mut self, dash: &str, test_type: &str, records: Vec<TestRecord>) {
        self.parts.insert(Self::key(dash, test_type), records);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with_tests(mut self, dash: &str, test_type: &str, records: Vec<TestRecord>) -> Self {
        self.insert(dash, test_type, records);
        self
    }

    /// Every (dash, test type) pair held, sorted.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.keys().map(|(dash, ty)| (dash.as_str(), ty.as_str()))
    }
}

impl LimitsProvider for InMemoryLimitsProvider {
    fn get_tests(&self, dash: &str, test_type: &str) -> StationResult<Vec<TestRecord>> {
        self.parts
            .get(&Self::key(dash, test_type))
            .cloned()
            .ok_or_else(|| StationError::NoFileFound {
                dash: dash.to_string(),
                test_type: test_type.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_on_type() {
        let provider = InMemoryLimitsProvider::new().with_tests(
            "1234-01",
            "final",
            vec![TestRecord::new("VOUTDC"), TestRecord::new("IIN")],
        );

        let tests = provider.get_tests("1234-01", "FINAL").unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].name, "VOUTDC");
    }

    #[test]
    fn test_missing_combination() {
        let provider = InMemoryLimitsProvider::new().with_tests("1234-01", "FINAL", vec![]);

        let err = provider.get_tests("1234-02", "FINAL").unwrap_err();
        assert!(matches!(err, StationError::NoFileFound { ref dash, .. } if dash == "1234-02"));
        assert!(provider.get_tests("1234-01", "BURNIN").is_err());
    }

    #[test]
    fn test_parts_listing() {
        let provider = InMemoryLimitsProvider::new()
            .with_tests("B", "FINAL", vec![])
            .with_tests("A", "burnin", vec![]);
        let parts: Vec<_> = provider.parts().collect();
        assert_eq!(parts, vec![("A", "BURNIN"), ("B", "FINAL")]);
    }
}
