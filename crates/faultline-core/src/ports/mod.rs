//! Ports - 抽象化レイヤー
//!
//! 時刻・ID 生成・障害通知の差し替えポイントを定義します。

pub mod clock;
pub mod fault_handler;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::fault_handler::FaultHandler;
pub use self::id_generator::{IdGenerator, UlidGenerator};
