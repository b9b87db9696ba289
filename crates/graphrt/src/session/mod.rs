//! Session construction and per-run execution.

mod executor;
mod frame;
mod inference;
mod options;
mod state;

pub use executor::SequentialExecutor;
pub use frame::{AllocationEvent, ExecutionFrame, ReleaseEvent};
pub use inference::InferenceSession;
pub use options::{OptimizationLevel, SessionOptions};
pub use state::{ExecutionStep, SessionState, SlotInfo, SlotKind};
