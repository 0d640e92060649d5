//! Soft real-time adaptation engine.
//!
//! An application marks repeatedly-executing code regions ("frames") with
//! target execution times, and for each region declares alternative
//! implementations of equivalent-but-variable-fidelity operations
//! ("models"). On every invocation the engine selects which alternatives to
//! run so that the measured execution time of the enclosing frames converges
//! toward the declared mean within a tolerance window. Targets are
//! hierarchical: an outer frame's objective can override inner frames.
//!
//! The engine is single-threaded and holds no internal locking — see
//! [`Engine`] for the entry point and `SPEC_FULL.md` for the full design.
#![allow(clippy::too_many_arguments)]

pub mod binning;
pub mod cache;
pub mod clock;
pub mod constraint;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod decision;
pub mod engine;
pub mod error;
#[cfg(feature = "capi")]
pub mod ffi;
pub mod frame;
pub mod spread;
pub mod stats;

pub use engine::Engine;
pub use error::EngineError;

/// Wall-clock measurement, in seconds.
pub type Seconds = f64;
/// Integer tag carried by a [`Parameter`](frame::model) stream: an
/// execution-time bin index or an encoded decision vector.
pub type Tag = i64;
/// Weighted occurrence count kept by a [`cache::TagCountCache`].
pub type Count = f64;
/// Index of an execution-time bin within a [`binning::BinningScheme`].
pub type BinIndex = usize;
/// Stable, monotonically assigned identifier for a registered frame.
pub type FrameId = usize;

/// Generate a uniformly random instance, mainly for property tests.
pub trait Arbitrary {
    fn random() -> Self;
}
