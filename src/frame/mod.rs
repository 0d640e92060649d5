//! Frame identity, lifecycle, and adaptation state.

pub mod model;
pub mod objective;
pub mod registry;
pub mod stack;
pub mod state;

pub use model::{Caller, CallerFn, ExecFrame, Model};
pub use objective::{Objective, ObjectiveKind};
pub use registry::{FrameKind, FrameRegistry, FrameStatus};
pub use state::FrameState;
