//! State - 起動したタスクの状態

use serde::{Deserialize, Serialize};

/// TaskState is the lifecycle of one launched unit of work.
///
/// State transitions:
/// - Running -> Succeeded
/// - Running -> Faulted -> Observed            (someone joined the handle)
/// - Running -> Faulted -> ReportedUnobserved  (a sweep got there first)
///
/// A record is dropped from the supervisor at the first sweep after it leaves
/// `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Work is still executing.
    Running,

    /// Work returned normally.
    Succeeded,

    /// Work failed and nobody has looked at the fault yet.
    Faulted,

    /// The fault was handed to the owner of the handle.
    Observed,

    /// The fault was delivered to the unobserved-failure handlers.
    ReportedUnobserved,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Running, false)]
    #[case(TaskState::Succeeded, true)]
    #[case(TaskState::Faulted, true)]
    #[case(TaskState::Observed, true)]
    #[case(TaskState::ReportedUnobserved, true)]
    fn only_running_is_unfinished(#[case] state: TaskState, #[case] finished: bool) {
        assert_eq!(state.is_finished(), finished);
    }
}
