//! Errors - 障害と実行時エラーの型

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UnhandledFault は唯一の障害分類
///
/// A unit of work that panicked or returned `Err` ends up as one of these.
/// `message` is the original text, untouched; `trace` is whatever diagnostic
/// trace could be captured at the fault site (may be empty when backtraces are
/// disabled).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct UnhandledFault {
    pub message: String,
    pub trace: String,
}

impl UnhandledFault {
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
        }
    }

    /// Extract the message from a panic payload.
    ///
    /// `panic!("literal")` carries a `&'static str`, formatted panics carry a
    /// `String`. Anything else is reported the way std's default hook does.
    pub fn message_from_panic(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        }
    }
}

/// SupervisorError はスーパーバイザ起動時のエラー
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor must be started from within a tokio runtime")]
    NoRuntime,
}
