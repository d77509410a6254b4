//! Failure list shared by the workers of one parallel run.

use std::mem::take;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::report::{ExecutionReport, TaskFailure};

/// Append-only list of task failures, cloned into every worker.
///
/// Workers catch task panics before touching the list, but a poisoned lock
/// must still not lose failures recorded by other workers.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureLog {
    entries: Arc<Mutex<Vec<TaskFailure>>>,
}

impl FailureLog {
    /// Record one failure.
    pub(crate) fn push(&self, failure: TaskFailure) {
        self.entries().push(failure);
    }

    /// Take every recorded failure, leaving the log empty.
    pub(crate) fn drain(&self) -> ExecutionReport {
        take(&mut *self.entries()).into_iter().collect()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<TaskFailure>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FailureKind;
    use std::thread;

    #[test]
    fn test_drain_empties_the_log() {
        let log = FailureLog::default();
        log.push(TaskFailure::new("a", "first", FailureKind::Error));
        log.clone()
            .push(TaskFailure::new("b", "second", FailureKind::Panic));

        let report = log.drain();
        assert_eq!(report.messages(), vec!["first", "second"]);
        assert!(log.drain().is_empty());
    }

    #[test]
    fn test_poisoned_log_still_records() {
        let log = FailureLog::default();
        log.push(TaskFailure::new("before", "kept", FailureKind::Error));

        let poisoner = log.clone();
        let joined = thread::spawn(move || {
            let _guard = poisoner.entries();
            panic!("poison the failure log");
        })
        .join();
        assert!(joined.is_err());
        assert!(log.entries.is_poisoned());

        log.push(TaskFailure::new("after", "also kept", FailureKind::Panic));
        assert_eq!(log.drain().messages(), vec!["kept", "also kept"]);
    }
}
