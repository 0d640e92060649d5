//! Fatal error kinds surfaced by the engine.
//!
//! Every kind here is fatal to the caller per the engine's error handling
//! contract: the invariants the core protects cannot be restored once
//! violated, so there is no retry path. The one exception is
//! [`crate::stats::StatisticsFacade::refresh`], which never returns an error.

use crate::FrameId;
use std::fmt;

/// A fatal engine error.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// `frame_id` is out of range or its slot is null.
    UnknownFrame(FrameId),
    /// `Enter` called on a frame that is currently `Executing`.
    ReEnter(FrameId),
    /// The chosen parent is not currently `Executing`.
    ParentNotExecuting(FrameId),
    /// `Resume` requested under a different parent than recorded.
    ParentMismatch(FrameId),
    /// `Suspend` requested while a child is still `Executing`.
    NonLeafSuspend(FrameId),
    /// A `Bind` leaf was invoked with no work-item bound.
    UnboundCaller(FrameId),
    /// Two `Select` nodes share a `var_id` but disagree on shape.
    ModelSchemaError { var_id: usize, reason: &'static str },
    /// `execframe_run` (or equivalent) called on a non-`ExecFrame` id.
    TypeMismatch(FrameId),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownFrame(id) => write!(f, "unknown frame #{id}"),
            EngineError::ReEnter(id) => write!(f, "re-enter on already-executing frame #{id}"),
            EngineError::ParentNotExecuting(id) => {
                write!(f, "chosen parent #{id} is not currently executing")
            }
            EngineError::ParentMismatch(id) => {
                write!(f, "resume of frame #{id} under a different parent than recorded")
            }
            EngineError::NonLeafSuspend(id) => {
                write!(f, "cannot suspend frame #{id}: a child is still executing")
            }
            EngineError::UnboundCaller(id) => {
                write!(f, "bind leaf under frame #{id} has no bound work-item")
            }
            EngineError::ModelSchemaError { var_id, reason } => {
                write!(f, "model schema conflict for var #{var_id}: {reason}")
            }
            EngineError::TypeMismatch(id) => write!(f, "frame #{id} is not an exec frame"),
        }
    }
}

impl std::error::Error for EngineError {}
