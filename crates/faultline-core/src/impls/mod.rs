//! Impls - FaultHandler の実装
//!
//! # 含まれる実装
//! - **LoggingHandler**: tracing にイベントを流す
//! - **RecordingHandler**: イベントをメモリに溜める（テスト・デモ用）

pub mod logging;
pub mod recording;

pub use self::logging::LoggingHandler;
pub use self::recording::RecordingHandler;
