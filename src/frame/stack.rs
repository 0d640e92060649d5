//! The Enter/Exit/Suspend/Resume state machine, piecewise timing, and the
//! per-Complete statistics update pipeline (spec.md §4.G).

use crate::clock::Clock;
use crate::frame::registry::{FrameKind, FrameRegistry, FrameStatus};
use crate::{BinIndex, EngineError, FrameId, Seconds};

/// Who a frame should be linked under when entered.
#[derive(Debug, Clone, Copy)]
pub enum ParentChoice {
    /// Link under the current innermost Executing frame.
    Innermost,
    /// Top-level: no parent.
    TopLevel,
    /// Link under a specific, already-Executing frame.
    Explicit(FrameId),
}

/// Feature toggles from spec.md §6's "feature-control interface".
#[derive(Debug, Clone, Copy)]
pub struct Features {
    pub magnify_count_by_deviation: bool,
    pub deemphasize_history: bool,
    pub deemphasize_alpha: f64,
    pub forget_history: bool,
    pub forget_beta: f64,
}

impl Default for Features {
    fn default() -> Self {
        Self { magnify_count_by_deviation: true, deemphasize_history: true, deemphasize_alpha: 0.99, forget_history: true, forget_beta: 0.001 }
    }
}

/// Owns the frame registry, the stable push-order stack, and the single
/// currently-Executing frame (I1).
pub struct FrameStack<C: Clock> {
    pub registry: FrameRegistry<C::Instant>,
    stack: Vec<Option<FrameId>>,
    executing: Option<FrameId>,
    clock: C,
    pub features: Features,
}

impl<C: Clock> FrameStack<C> {
    pub fn new(clock: C) -> Self {
        Self { registry: FrameRegistry::new(), stack: Vec::new(), executing: None, clock, features: Features::default() }
    }

    pub fn register(&mut self, kind: FrameKind) -> FrameId {
        self.registry.register(kind)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Parent chain from immediate parent outward to the root.
    pub fn ancestors(&self, frame_id: FrameId) -> Result<Vec<FrameId>, EngineError> {
        let mut out = Vec::new();
        let mut cur = self.registry.get(frame_id)?.parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.registry.get(p)?.parent;
        }
        Ok(out)
    }

    pub fn enter(&mut self, frame_id: FrameId, parent: ParentChoice) -> Result<(), EngineError> {
        let resolved_parent = match parent {
            ParentChoice::Innermost => self.executing,
            ParentChoice::TopLevel => None,
            ParentChoice::Explicit(p) => Some(p),
        };

        let status = self.registry.get(frame_id)?.status;
        match status {
            FrameStatus::Inactive => {
                if let Some(p) = resolved_parent {
                    if self.registry.get(p)?.status != FrameStatus::Executing {
                        return Err(EngineError::ParentNotExecuting(p));
                    }
                }
                let now = self.clock.now();
                {
                    let record = self.registry.get_mut(frame_id)?;
                    record.status = FrameStatus::Executing;
                    record.enter_time = Some(now);
                    record.current_invocation_exec_time = 0.0;
                    record.parent = resolved_parent;
                }
                if let Some(p) = resolved_parent {
                    self.registry.get_mut(p)?.active_children.push(frame_id);
                }
                self.stack.push(Some(frame_id));
                self.executing = Some(frame_id);

                if !self.registry.get(frame_id)?.state.activated {
                    self.activate(frame_id, resolved_parent)?;
                }
                Ok(())
            }
            FrameStatus::Suspended => {
                let recorded_parent = self.registry.get(frame_id)?.parent;
                if recorded_parent != resolved_parent {
                    return Err(EngineError::ParentMismatch(frame_id));
                }
                self.registry.get_mut(frame_id)?.status = FrameStatus::Executing;
                self.registry.get_mut(frame_id)?.enter_time = Some(self.clock.now());
                self.executing = Some(frame_id);
                Ok(())
            }
            FrameStatus::Executing => Err(EngineError::ReEnter(frame_id)),
        }
    }

    /// Local objective resolution and FOR/AGAINST derivation (component F),
    /// run exactly once per activation (the Start edge, never Resume).
    fn activate(&mut self, frame_id: FrameId, parent: Option<FrameId>) -> Result<(), EngineError> {
        let _ = parent;
        let resolved_mean = match &self.registry.get(frame_id)?.kind {
            FrameKind::Measured(obj) => Some(crate::frame::objective::resolve_mean(obj, &self.registry)),
            FrameKind::Exec(_) => None,
        };
        let record = self.registry.get_mut(frame_id)?;
        let objective = match &record.kind {
            FrameKind::Measured(obj) => Some(*obj),
            FrameKind::Exec(_) => None,
        };
        record.state.activate(objective.as_ref(), resolved_mean);
        Ok(())
    }

    pub fn exit_suspend(&mut self, frame_id: FrameId) -> Result<Seconds, EngineError> {
        let record = self.registry.get(frame_id)?;
        if record.status != FrameStatus::Executing {
            return Ok(0.0);
        }
        let has_executing_child = record
            .active_children
            .iter()
            .filter_map(|c| self.registry.get(*c).ok())
            .any(|c| c.status == FrameStatus::Executing);
        if has_executing_child {
            return Err(EngineError::NonLeafSuspend(frame_id));
        }

        let now = self.clock.now();
        let record = self.registry.get_mut(frame_id)?;
        let enter_time = record.enter_time.expect("Executing frame always has an enter_time");
        let dt = self.clock.elapsed(enter_time, now);
        record.current_invocation_exec_time += dt;
        record.status = FrameStatus::Suspended;
        if self.executing == Some(frame_id) {
            self.executing = None;
        }
        Ok(dt)
    }

    /// Complete `frame_id`: suspend if Executing, recursively complete
    /// still-Active children post-order, run the update pipeline, unlink.
    pub fn exit_complete(&mut self, frame_id: FrameId) -> Result<Seconds, EngineError> {
        let status = self.registry.get(frame_id)?.status;
        if status == FrameStatus::Inactive {
            return Ok(0.0); // P9: idempotent no-op.
        }
        if status == FrameStatus::Executing {
            self.exit_suspend(frame_id)?;
        }

        let children = self.registry.get(frame_id)?.active_children.clone();
        for child in children {
            if self.registry.contains(child) && self.registry.get(child)?.status != FrameStatus::Inactive {
                self.exit_complete(child)?;
            }
        }

        let elapsed = self.registry.get(frame_id)?.current_invocation_exec_time;
        self.run_update_pipeline(frame_id)?;

        if let Some(parent) = self.registry.get(frame_id)?.parent {
            if let Ok(p) = self.registry.get_mut(parent) {
                p.active_children.retain(|c| *c != frame_id);
            }
        }
        {
            let record = self.registry.get_mut(frame_id)?;
            record.status = FrameStatus::Inactive;
            record.parent = None;
            record.enter_time = None;
        }

        if let Some(pos) = self.stack.iter().position(|s| *s == Some(frame_id)) {
            self.stack[pos] = None;
        }
        while matches!(self.stack.last(), Some(None)) {
            self.stack.pop();
        }

        Ok(elapsed)
    }

    fn run_update_pipeline(&mut self, frame_id: FrameId) -> Result<(), EngineError> {
        let kind_is_measured = matches!(self.registry.get(frame_id)?.kind, FrameKind::Measured(_));
        let raw_t = self.registry.get(frame_id)?.current_invocation_exec_time;

        // 1. sliding window + impact rescaler.
        let rescaler: fn(Seconds) -> Seconds = match &self.registry.get(frame_id)?.kind {
            FrameKind::Measured(obj) => obj.impact_rescaler,
            FrameKind::Exec(_) => identity,
        };
        let window_avg = self.registry.get_mut(frame_id)?.state.push_window(raw_t);
        let t = rescaler(window_avg);

        // 2. unbinned statistics + satisfaction, only for objectives.
        if kind_is_measured {
            let record = self.registry.get_mut(frame_id)?;
            let in_specified = record.state.specified_for.contains(
                record.state.binning.as_ref().map(|b| b.bin(t, record.state.resolved_mean)).unwrap_or(0),
            );
            record.state.unbinned.observe(t, in_specified);
        }

        // 3-4. bin, notify enclosing consumers, record own histogram.
        let mean = self.registry.get(frame_id)?.state.resolved_mean;
        let b: BinIndex = {
            let record = self.registry.get(frame_id)?;
            record.state.binning.as_ref().expect("activated frames always have a binning scheme").bin(t, mean)
        };
        self.registry.get_mut(frame_id)?.state.histogram.as_mut().expect("activated").note(b as i64, 1.0);

        // Measured frames report their own execution-time bin as the Parameter
        // value; ExecFrames report the decision tag their strategy just chose,
        // since that is what a consumer is actually discriminating over.
        let own_tag: crate::Tag = if kind_is_measured {
            b as i64
        } else {
            self.registry.get(frame_id)?.state.last_decision_tag.unwrap_or(b as i64)
        };

        let ancestors = self.ancestors(frame_id)?;
        for a in ancestors {
            if let Ok(ancestor) = self.registry.get_mut(a) {
                if let Some(cr) = ancestor.state.current_records.get_mut(&frame_id) {
                    cr.note(own_tag, 1.0);
                }
            }
        }

        // 5-6. success/failure classification and sample-weight magnification.
        let (active_success, active_failure, magnified) = {
            let record = self.registry.get(frame_id)?;
            let for_active = &record.state.active_for;
            let against_active = &record.state.active_against;
            let active_success = for_active.contains(b);
            let active_failure = !for_active.contains(b) && against_active.contains(b);
            let magnified = if !self.features.magnify_count_by_deviation {
                1.0
            } else if active_success {
                magnify_success(t, record.state.resolved_mean.unwrap_or(t), &for_active.0, record.state.binning.as_ref())
            } else if active_failure && !for_active.is_empty() {
                magnify_failure(t, &for_active.0, record.state.binning.as_ref())
            } else {
                1.0
            };
            (active_success, active_failure, magnified)
        };

        // 7. flush current-records into this frame's own spreads at bin b.
        let parameter_ids: Vec<FrameId> = self.registry.get(frame_id)?.state.current_records.keys().copied().collect();
        for source in parameter_ids {
            let record = self.registry.get_mut(frame_id)?;
            let total = record.state.spreads.get(&source).map(|s| s.current_total()).unwrap_or(0.0);
            let count_update = if magnified >= 0.0 { magnified } else { magnified.abs() * if total > 0.0 { total } else { 1.0 } };
            let entries: Vec<(crate::Tag, crate::Count)> = {
                let cr = record.state.current_records.get_mut(&source).expect("key from this map");
                cr.rescale_total(count_update);
                cr.entries().collect()
            };
            if let Some(spread) = record.state.spreads.get_mut(&source) {
                for (tag, c) in entries {
                    spread.note(b, tag, c);
                }
            }
            record.state.current_records.get_mut(&source).expect("key from this map").clear();
        }

        // 8. failure run-lengths.
        {
            let record = self.registry.get_mut(frame_id)?;
            let specified_failure = !record.state.specified_for.contains(b);
            let active_failure_for_runlength = active_failure || (!active_success && !record.state.active_for.is_empty());
            let starting_new_run = specified_failure && record.state.failures_specified.current_run() == 0;
            record.state.failures_specified.observe(specified_failure);
            record.state.failures_active.observe(active_failure_for_runlength);
            if starting_new_run {
                #[cfg(feature = "diagnostics")]
                log::warn!("frame #{frame_id} missed its specified objective (bin {b})");
            }
        }

        // 9. history de-emphasis.
        if self.features.deemphasize_history {
            let alpha = self.features.deemphasize_alpha;
            let record = self.registry.get_mut(frame_id)?;
            for spread in record.state.spreads.values_mut() {
                for i in 0..spread.num_bins() {
                    let sample = spread.bin(i).sample_count();
                    spread.bin_mut(i).rescale_total(sample * alpha);
                }
            }
        }

        // 10. history forgetting.
        if self.features.forget_history {
            let beta = self.features.forget_beta;
            let record = self.registry.get_mut(frame_id)?;
            for spread in record.state.spreads.values_mut() {
                for i in 0..spread.num_bins() {
                    let bin = spread.bin_mut(i);
                    let threshold = beta * bin.sample_count();
                    bin.delete_below(threshold);
                }
            }
        }

        // 11. store previous invocation time.
        self.registry.get_mut(frame_id)?.state.previous_invocation_exec_time = t;
        self.registry.get_mut(frame_id)?.current_invocation_exec_time = 0.0;

        Ok(())
    }

    /// Declare that `consumer` tracks `source`'s Parameter, allocating the
    /// current-record and spread if this is the first time. The spread is
    /// indexed by `consumer`'s own execution-time bins, since that is the
    /// axis `DecisionSetSolver` later slices on.
    pub fn track_parameter(&mut self, consumer: FrameId, source: FrameId) -> Result<(), EngineError> {
        let num_bins = self.registry.get(consumer)?.state.binning.as_ref().map(|b| b.num_bins()).unwrap_or(22);
        let record = self.registry.get_mut(consumer)?;
        record.state.current_records.entry(source).or_insert_with(|| crate::cache::TagCountCache::new(10, 1000.0));
        record.state.spreads.entry(source).or_insert_with(|| crate::spread::ParamExecSpread::new(num_bins));
        Ok(())
    }
}

fn identity(t: Seconds) -> Seconds {
    t
}

fn magnify_success(t: Seconds, mean: Seconds, for_set: &[BinIndex], binning: Option<&crate::frame::state::Binning>) -> f64 {
    let binning = match binning {
        Some(b) => b,
        None => return 1.0,
    };
    let (lo, hi) = match (for_set.iter().min(), for_set.iter().max()) {
        (Some(lo), Some(hi)) => (*lo, *hi),
        _ => return 1.0,
    };
    let range = binning.upper_edge(hi) - binning.lower_edge(lo);
    if range <= 0.0 {
        return 1.0;
    }
    let deviation = ((t - mean) / range).abs().min(1.0);
    1.5 / (1.0 + 2.0 * deviation)
}

fn magnify_failure(t: Seconds, for_set: &[BinIndex], binning: Option<&crate::frame::state::Binning>) -> f64 {
    let binning = match binning {
        Some(b) => b,
        None => return 1.0,
    };
    let (lo, hi) = match (for_set.iter().min(), for_set.iter().max()) {
        (Some(lo), Some(hi)) => (*lo, *hi),
        _ => return 1.0,
    };
    let range = binning.upper_edge(hi) - binning.lower_edge(lo);
    if range <= 0.0 {
        return 1.0;
    }
    let lower_edge = binning.lower_edge(lo);
    let upper_edge = binning.upper_edge(hi);
    let deviation = (t - lower_edge).abs().min((t - upper_edge).abs()) / range;
    if deviation < 0.2 {
        1.0
    } else if deviation < 0.4 {
        2.0
    } else {
        -1.0 / (2.0 + 1.0 / deviation)
    }
}
