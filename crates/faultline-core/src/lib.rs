//! faultline-core
//!
//! Fire-and-forget task supervision with explicit fault reporting.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, events, state, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, FaultHandler）
//! - **app**: FaultContext, Launcher, Supervisor, SweepLoop, panic hook
//! - **impls**: FaultHandler の実装（LoggingHandler, RecordingHandler）
//!
//! # 使用例
//! ```no_run
//! use faultline_core::{FaultContext, FaultEvent, Supervisor, SupervisorConfig};
//!
//! async fn fail() {
//!     panic!("Hello World!");
//! }
//!
//! # async fn demo() -> Result<(), faultline_core::SupervisorError> {
//! let context = FaultContext::new();
//! context.on_unobserved_failure(|event: &FaultEvent| eprintln!("lost: {}", event.message()));
//! context.install_panic_hook();
//!
//! let supervisor = Supervisor::start(context, SupervisorConfig::default())?;
//! supervisor.launcher().fire_and_forget(fail());
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{
    FaultContext, Launcher, Supervisor, SupervisorConfig, SupervisorStatus, SweepReport,
    TaskHandle,
};
pub use domain::{FaultEvent, FaultKind, FaultOrigin, SupervisorError, TaskId, UnhandledFault};
