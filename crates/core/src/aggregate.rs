//! Aggregate stream versioning.

use crate::error::{StoreError, StoreResult};

/// Optimistic concurrency expectation for an aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation implied by the first event of an append batch.
    ///
    /// A batch starting at version `n` can only follow a stream stored at `n - 1`.
    /// Version 0 is never a valid event version, so it expects an impossible
    /// stream position and always conflicts.
    pub fn preceding(first_version: u64) -> Self {
        match first_version.checked_sub(1) {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Exact(u64::MAX),
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        let ExpectedVersion::Exact(v) = self;
        v == actual
    }

    pub fn check(self, actual: u64) -> StoreResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(StoreError::concurrency(format!(
                "expected stream at {self:?}, found {actual}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preceding_expects_previous_version() {
        assert_eq!(ExpectedVersion::preceding(1), ExpectedVersion::Exact(0));
        assert_eq!(ExpectedVersion::preceding(7), ExpectedVersion::Exact(6));
    }

    #[test]
    fn version_zero_never_matches() {
        let expected = ExpectedVersion::preceding(0);
        assert!(!expected.matches(0));
        assert!(expected.check(0).is_err());
    }

    #[test]
    fn check_reports_concurrency() {
        let err = ExpectedVersion::Exact(3).check(4).unwrap_err();
        assert!(err.is_retryable());
        assert!(ExpectedVersion::Exact(42).check(42).is_ok());
    }
}
