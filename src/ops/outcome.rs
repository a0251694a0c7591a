//! Per-item and per-sub-path result accumulators.
//!
//! Batch and recursive operations never stop at the first failure; they
//! collect every outcome and let the caller tell "all succeeded", "all failed"
//! and "partial" apart.

use serde::Serialize;

use crate::error::{FsError, Result};

/// Serializable `code` + `message` pair for a single failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
}

impl From<&FsError> for ErrorReport {
    fn from(err: &FsError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathFailure {
    pub path: String,
    #[serde(flatten)]
    pub error: ErrorReport,
}

/// Result of a depth-first copy or delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecursiveOutcome {
    /// Files and directories handled successfully.
    pub processed: usize,
    pub failures: Vec<PathFailure>,
}

impl RecursiveOutcome {
    pub fn record_success(&mut self) {
        self.processed += 1;
    }

    pub fn record_failure(&mut self, path: impl Into<String>, err: &FsError) {
        self.failures.push(PathFailure {
            path: path.into(),
            error: ErrorReport::from(err),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(processed)` when nothing failed, otherwise a `PartialFailure`
    /// counting every failed sub-path.
    pub fn into_result(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.processed)
        } else {
            Err(FsError::PartialFailure {
                succeeded: self.processed,
                failed: self.failures.len(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Empty,
    AllSucceeded,
    AllFailed,
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub name: String,
    /// Logical path the item ended up at, when it moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Sub-path failures from a recursive copy or delete of this item.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PathFailure>,
}

impl ItemOutcome {
    pub fn ok(name: impl Into<String>, target: Option<String>) -> Self {
        Self {
            name: name.into(),
            target,
            error: None,
            failures: Vec::new(),
        }
    }

    pub fn failed(name: impl Into<String>, err: &FsError) -> Self {
        Self {
            name: name.into(),
            target: None,
            error: Some(ErrorReport::from(err)),
            failures: Vec::new(),
        }
    }

    /// Item whose recursive work finished with the given sub-path outcome.
    pub fn from_recursive(
        name: impl Into<String>,
        target: Option<String>,
        outcome: RecursiveOutcome,
    ) -> Self {
        let failures = outcome.failures.clone();
        match outcome.into_result() {
            Ok(_) => Self::ok(name, target),
            Err(err) => Self {
                name: name.into(),
                target,
                error: Some(ErrorReport::from(&err)),
                failures,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn push(&mut self, item: ItemOutcome) {
        self.items.push(item);
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn status(&self) -> BatchStatus {
        match (self.succeeded(), self.failed()) {
            (0, 0) => BatchStatus::Empty,
            (_, 0) => BatchStatus::AllSucceeded,
            (0, _) => BatchStatus::AllFailed,
            _ => BatchStatus::Partial,
        }
    }

    /// Aggregate error for callers that only want pass/fail.
    pub fn to_error(&self) -> Option<FsError> {
        match self.status() {
            BatchStatus::Empty | BatchStatus::AllSucceeded => None,
            _ => Some(FsError::PartialFailure {
                succeeded: self.succeeded(),
                failed: self.failed(),
            }),
        }
    }

    /// Human-readable summary, e.g. `Moved 2 item(s) to trash, Failed 1 item(s)`.
    pub fn summary(&self, verb: &str) -> String {
        let failed = self.failed();
        if failed > 0 {
            format!(
                "{} {} item(s), Failed {} item(s)",
                verb,
                self.succeeded(),
                failed
            )
        } else {
            format!("{} {} item(s)", verb, self.succeeded())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> FsError {
        FsError::NotFound("/gone".to_string())
    }

    #[test]
    fn test_batch_status_distinguishes_all_cases() {
        let mut batch = BatchOutcome::default();
        assert_eq!(batch.status(), BatchStatus::Empty);

        batch.push(ItemOutcome::ok("a", None));
        assert_eq!(batch.status(), BatchStatus::AllSucceeded);
        assert!(batch.to_error().is_none());

        batch.push(ItemOutcome::failed("b", &not_found()));
        assert_eq!(batch.status(), BatchStatus::Partial);
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.to_error().unwrap().code(), "PARTIAL_FAILURE");

        let mut failed = BatchOutcome::default();
        failed.push(ItemOutcome::failed("c", &not_found()));
        assert_eq!(failed.status(), BatchStatus::AllFailed);
    }

    #[test]
    fn test_recursive_outcome_reports_every_failure() {
        let mut outcome = RecursiveOutcome::default();
        outcome.record_success();
        outcome.record_failure("/a", &not_found());
        outcome.record_success();
        outcome.record_failure("/b", &not_found());

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failures.len(), 2);

        let item = ItemOutcome::from_recursive("dir", None, outcome.clone());
        assert!(!item.is_ok());
        assert_eq!(item.failures.len(), 2);

        match outcome.into_result() {
            Err(FsError::PartialFailure { succeeded, failed }) => {
                assert_eq!(succeeded, 2);
                assert_eq!(failed, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_summary() {
        let mut batch = BatchOutcome::default();
        batch.push(ItemOutcome::ok("a", None));
        assert_eq!(batch.summary("Restored"), "Restored 1 item(s)");
        batch.push(ItemOutcome::failed("b", &not_found()));
        assert_eq!(
            batch.summary("Restored"),
            "Restored 1 item(s), Failed 1 item(s)"
        );
    }
}
