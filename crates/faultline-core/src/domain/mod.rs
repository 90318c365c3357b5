//! Domain model (IDs, fault events, task state, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod state;

pub use self::errors::{SupervisorError, UnhandledFault};
pub use self::events::{FaultEvent, FaultKind, FaultOrigin};
pub use self::ids::{FaultId, TaskId};
pub use self::state::TaskState;
