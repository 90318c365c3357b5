//! Events - 障害イベント
//!
//! FaultEvent は handler に渡される唯一のイベント型です。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::UnhandledFault;
use super::ids::{FaultId, TaskId};

/// Which registry a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// A thread of execution hit a panic outside supervised work.
    Fault,

    /// A supervised task failed and nobody looked at the result.
    UnobservedFailure,
}

impl FaultKind {
    pub fn as_label(self) -> &'static str {
        match self {
            FaultKind::Fault => "fault",
            FaultKind::UnobservedFailure => "unobserved_failure",
        }
    }
}

/// Where a fault came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultOrigin {
    /// A unit of work started through the launcher.
    Task(TaskId),

    /// A plain thread, identified by its name when it has one.
    Thread { name: Option<String> },
}

/// FaultEvent はタスク（またはスレッド）の異常終了を表す
///
/// # 所有権
/// - 生成: work が panic / Err で終了したとき
/// - 保持: タスクのスロット（観測されるか回収されるまで）
/// - 未観測のまま回収されたら unobserved-failure handler に一度だけ渡される
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub id: FaultId,
    pub origin: FaultOrigin,
    pub fault: UnhandledFault,
    pub occurred_at: DateTime<Utc>,
    pub observed: bool,
}

impl FaultEvent {
    pub fn new(
        id: FaultId,
        origin: FaultOrigin,
        fault: UnhandledFault,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            origin,
            fault,
            occurred_at,
            observed: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.fault.message
    }

    pub fn trace(&self) -> &str {
        &self.fault.trace
    }

    /// The task this fault belongs to, if it came from supervised work.
    pub fn task_id(&self) -> Option<TaskId> {
        match self.origin {
            FaultOrigin::Task(id) => Some(id),
            FaultOrigin::Thread { .. } => None,
        }
    }

    pub(crate) fn mark_observed(mut self) -> Self {
        self.observed = true;
        self
    }
}
