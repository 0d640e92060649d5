//! Process-wide dense table of live frames keyed by a stable integer id.
//!
//! Arena-over-`Vec<Option<_>>`, mirroring the teacher's arena-backed tree:
//! no pointer graph, ids are never reused, a destroyed frame leaves a
//! permanent null slot (spec.md I7).

use crate::frame::model::ExecFrame;
use crate::frame::objective::Objective;
use crate::frame::state::FrameState;
use crate::{EngineError, FrameId, Seconds};

pub enum FrameKind {
    Measured(Objective),
    Exec(ExecFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Inactive,
    Suspended,
    Executing,
}

pub struct FrameRecord<I> {
    pub kind: FrameKind,
    pub state: FrameState,
    pub status: FrameStatus,
    pub parent: Option<FrameId>,
    pub active_children: Vec<FrameId>,
    pub enter_time: Option<I>,
    pub current_invocation_exec_time: Seconds,
}

impl<I> FrameRecord<I> {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            state: FrameState::default(),
            status: FrameStatus::Inactive,
            parent: None,
            active_children: Vec::new(),
            enter_time: None,
            current_invocation_exec_time: 0.0,
        }
    }
}

/// Dense table of registered frames. A `None` slot is either never-allocated
/// past the table's current length or a destroyed frame's tombstone.
#[derive(Default)]
pub struct FrameRegistry<I> {
    slots: Vec<Option<FrameRecord<I>>>,
}

impl<I> FrameRegistry<I> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Allocate the next free id (monotonic, never reused — spec.md I7/P10).
    pub fn register(&mut self, kind: FrameKind) -> FrameId {
        let id = self.slots.len();
        self.slots.push(Some(FrameRecord::new(kind)));
        id
    }

    pub fn deregister(&mut self, id: FrameId) {
        if let Some(slot) = self.slots.get_mut(id) {
            *slot = None;
        }
    }

    pub fn get(&self, id: FrameId) -> Result<&FrameRecord<I>, EngineError> {
        self.slots.get(id).and_then(Option::as_ref).ok_or(EngineError::UnknownFrame(id))
    }

    pub fn get_mut(&mut self, id: FrameId) -> Result<&mut FrameRecord<I>, EngineError> {
        self.slots.get_mut(id).and_then(Option::as_mut).ok_or(EngineError::UnknownFrame(id))
    }

    pub fn contains(&self, id: FrameId) -> bool {
        matches!(self.slots.get(id), Some(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotone_and_never_reused_p10() {
        let mut reg: FrameRegistry<()> = FrameRegistry::new();
        let a = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        let b = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        assert!(b > a);
        reg.deregister(a);
        let c = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        assert!(c > b);
        assert!(!reg.contains(a));
    }
}
