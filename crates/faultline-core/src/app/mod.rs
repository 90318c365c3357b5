//! App - アプリケーション層
//!
//! ports と domain を組み合わせて、障害通知のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **FaultContext**: handler 登録の入口（起動時に作って下に渡す）
//! - **CallbackRegistry**: FaultKind ごとの handler リスト
//! - **Launcher / TaskHandle**: fire-and-forget 起動と観測
//! - **Supervisor**: detach されたタスクの追跡と回収パス（sweep）
//! - **SweepLoop**: 定期的な sweep
//! - **panic_hook**: スレッドの unhandled fault を拾う

pub mod config;
pub mod context;
pub mod launcher;
pub mod panic_hook;
pub mod registry;
pub mod scope;
pub mod status;
pub mod supervisor;
pub mod sweep_loop;

// 主要な型を再エクスポート
pub use self::config::{ConfigError, SupervisorConfig};
pub use self::context::FaultContext;
pub use self::launcher::{Launcher, TaskHandle};
pub use self::registry::{CallbackRegistry, DispatchReport};
pub use self::status::SupervisorStatus;
pub use self::supervisor::{Supervisor, SweepReport};
pub use self::sweep_loop::SweepLoop;
