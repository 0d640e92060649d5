//! Plain-C bridge surface (feature `capi`), matching spec.md §6's symbol
//! names verbatim.
//!
//! Scope note: this is the symbol surface only. Marshaling of arbitrary
//! opaque C caller state beyond a raw function pointer is out of scope (see
//! `SPEC_FULL.md` §1), so `rebind_func` accepts an `extern "C" fn()` and
//! nothing richer. Every entry point operates on a single process-wide
//! [`Engine`] guarded by a plain (non-reentrant) lock, matching the core's
//! single-threaded, no-internal-locking contract from §5 — a host that needs
//! concurrent access must serialize its own calls.

use crate::clock::SystemClock;
use crate::frame::model::CallerFn;
use crate::frame::stack::ParentChoice;
use crate::{Engine, FrameId};
use std::sync::Mutex;
use std::sync::OnceLock;

static ENGINE: OnceLock<Mutex<Engine<SystemClock>>> = OnceLock::new();

fn engine() -> &'static Mutex<Engine<SystemClock>> {
    ENGINE.get_or_init(|| Mutex::new(Engine::new(SystemClock)))
}

/// Enter `frame_id` under the innermost currently-executing frame. Returns
/// `0` on success, nonzero on error.
#[no_mangle]
pub extern "C" fn frame_enter(frame_id: usize) -> i32 {
    match engine().lock().unwrap().enter(frame_id as FrameId, ParentChoice::Innermost) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Enter `frame_id` under an explicit parent.
#[no_mangle]
pub extern "C" fn frame_enter_with_parent(frame_id: usize, parent_id: usize) -> i32 {
    match engine().lock().unwrap().enter(frame_id as FrameId, ParentChoice::Explicit(parent_id as FrameId)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Complete `frame_id`: suspend if executing, recursively complete any still
/// active children, run the statistics update pipeline, and unlink it.
/// Returns the elapsed execution time in seconds, or a negative value on
/// error.
#[no_mangle]
pub extern "C" fn frame_exit_complete(frame_id: usize) -> f64 {
    match engine().lock().unwrap().exit_complete(frame_id as FrameId) {
        Ok(dt) => dt,
        Err(_) => -1.0,
    }
}

/// Suspend `frame_id` without completing it. Returns the elapsed execution
/// time in seconds, or a negative value on error.
#[no_mangle]
pub extern "C" fn frame_exit_suspend(frame_id: usize) -> f64 {
    match engine().lock().unwrap().exit_suspend(frame_id as FrameId) {
        Ok(dt) => dt,
        Err(_) => -1.0,
    }
}

/// Pick a decision tag for an ExecFrame and run its Model. Returns `0` on
/// success, nonzero on error.
#[no_mangle]
pub extern "C" fn execframe_run(frame_id: usize) -> i32 {
    match engine().lock().unwrap().execframe_run(frame_id as FrameId) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Bind a work-item to one of `frame_id`'s `Bind` leaves. `func` must not be
/// null. Returns `0` on success, nonzero on error.
///
/// # Safety
/// `func` must be a valid, callable function pointer for the lifetime of the
/// binding (until the leaf next executes).
#[no_mangle]
pub extern "C" fn rebind_func(frame_id: usize, caller_idx: usize, func: extern "C" fn()) -> i32 {
    match engine().lock().unwrap().bind(frame_id as FrameId, caller_idx, CallerFn::Extern(func)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop() {}

    #[test]
    fn lifecycle_round_trip_through_the_c_surface() {
        let mut e = engine().lock().unwrap();
        let exec = e.register_exec(crate::frame::model::Model::Bind(0), 1, 0).unwrap();
        drop(e);

        assert_eq!(frame_enter(exec), 0);
        assert_eq!(rebind_func(exec, 0, noop), 0);
        assert_eq!(execframe_run(exec), 0);
        assert!(frame_exit_complete(exec) >= 0.0);
    }
}
