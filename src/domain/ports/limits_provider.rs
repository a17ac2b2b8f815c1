//! Limits/variables provider port.

use crate::domain::errors::StationResult;
use crate::domain::models::TestRecord;

/// Source of the ordered test list for a part.
pub trait LimitsProvider {
    /// Test records for `dash` and `test_type`, in execution order.
    ///
    /// Must fail with `NoFileFound` when the combination is absent rather
    /// than return an empty list.
    fn get_tests(&self, dash: &str, test_type: &str) -> StationResult<Vec<TestRecord>>;
}
