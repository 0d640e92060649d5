//! Top-level facade: owns the frame stack, a reinforcement-ranking strategy
//! per ExecFrame, and dispatches to the fast-reaction strategy when a frame
//! is nested under a Measured parent (spec.md §4.I/§4.J, §6).

use crate::clock::Clock;
use crate::decision::fastreact;
use crate::decision::ranking::RankingStrategy;
use crate::decision::solver::{self, DecisionSet};
use crate::frame::model::{CallerFn, ExecFrame, Model};
use crate::frame::objective::Objective;
use crate::frame::registry::FrameKind;
use crate::frame::stack::{FrameStack, ParentChoice};
use crate::frame::state::FrsState;
use crate::{EngineError, FrameId, Seconds, Tag};
use std::collections::BTreeMap;

/// The engine's public entry point. Generic over the clock so tests can
/// drive it with [`crate::clock::VirtualClock`] instead of wall time.
pub struct Engine<C: Clock> {
    stack: FrameStack<C>,
    rankers: BTreeMap<FrameId, RankingStrategy>,
    probability_of_exploration: f64,
    use_fast_reaction_strategy: bool,
    next_seed: u64,
}

impl<C: Clock> Engine<C> {
    pub fn new(clock: C) -> Self {
        Self {
            stack: FrameStack::new(clock),
            rankers: BTreeMap::new(),
            probability_of_exploration: 0.0,
            use_fast_reaction_strategy: false,
            next_seed: 1,
        }
    }

    pub fn register_measured(&mut self, objective: Objective) -> FrameId {
        self.stack.register(FrameKind::Measured(objective))
    }

    pub fn register_exec(&mut self, model: Model, num_callers: usize, stickiness_length: u32) -> Result<FrameId, EngineError> {
        let exec = ExecFrame::new(model, num_callers, stickiness_length)?;
        Ok(self.stack.register(FrameKind::Exec(exec)))
    }

    pub fn enter(&mut self, frame_id: FrameId, parent: ParentChoice) -> Result<(), EngineError> {
        self.stack.enter(frame_id, parent)
    }

    pub fn exit_suspend(&mut self, frame_id: FrameId) -> Result<Seconds, EngineError> {
        self.stack.exit_suspend(frame_id)
    }

    pub fn exit_complete(&mut self, frame_id: FrameId) -> Result<Seconds, EngineError> {
        self.stack.exit_complete(frame_id)
    }

    /// Declare that `consumer`'s objective should react to `source`'s
    /// Parameter stream (its decision tags, if `source` is an ExecFrame; its
    /// own execution-time bin otherwise).
    pub fn track_parameter(&mut self, consumer: FrameId, source: FrameId) -> Result<(), EngineError> {
        self.stack.track_parameter(consumer, source)
    }

    /// Bind a work-item to one of `frame_id`'s `Bind` leaves. Single-shot:
    /// cleared the moment it is invoked by [`Engine::execframe_run`].
    pub fn bind(&mut self, frame_id: FrameId, caller_idx: usize, f: CallerFn) -> Result<(), EngineError> {
        match &mut self.stack.registry.get_mut(frame_id)?.kind {
            FrameKind::Exec(exec) => {
                let caller = exec.callers.get_mut(caller_idx).ok_or(EngineError::UnboundCaller(frame_id))?;
                caller.bind(f);
                Ok(())
            }
            FrameKind::Measured(_) => Err(EngineError::TypeMismatch(frame_id)),
        }
    }

    /// Pick a decision tag for `frame_id` (an ExecFrame), run its Model, and
    /// record the choice for any ancestor tracking it as a Parameter.
    pub fn execframe_run(&mut self, frame_id: FrameId) -> Result<(), EngineError> {
        let force_default = match &self.stack.registry.get(frame_id)?.kind {
            FrameKind::Exec(e) => e.force_default_choice,
            FrameKind::Measured(_) => return Err(EngineError::TypeMismatch(frame_id)),
        };

        let tag = if force_default {
            let schema = match &self.stack.registry.get(frame_id)?.kind {
                FrameKind::Exec(e) => e.schema.clone(),
                FrameKind::Measured(_) => unreachable!("checked above"),
            };
            let choices: Vec<usize> = schema.vars.iter().map(|v| v.default_index).collect();
            schema.encode(&choices)
        } else {
            let parent_with_mean = self.stack.registry.get(frame_id)?.parent.filter(|&p| {
                matches!(self.stack.registry.get(p).map(|r| r.state.resolved_mean), Ok(Some(_)))
            });
            match (self.use_fast_reaction_strategy, parent_with_mean) {
                (true, Some(parent)) => self.fast_reaction_pick(frame_id, parent)?,
                _ => self.ranking_pick(frame_id)?,
            }
        };

        self.stack.registry.get_mut(frame_id)?.state.last_decision_tag = Some(tag);

        match &mut self.stack.registry.get_mut(frame_id)?.kind {
            FrameKind::Exec(exec) => exec.run(frame_id, tag),
            FrameKind::Measured(_) => unreachable!("checked above"),
        }
    }

    fn decision_set(&self, frame_id: FrameId) -> Option<DecisionSet> {
        let parent = self.stack.registry.get(frame_id).ok()?.parent?;
        Some(solver::solve(&self.stack.registry, parent, frame_id))
    }

    fn ranking_pick(&mut self, frame_id: FrameId) -> Result<Tag, EngineError> {
        let decision = self.decision_set(frame_id);
        let (schema, stickiness) = match &self.stack.registry.get(frame_id)?.kind {
            FrameKind::Exec(e) => (e.schema.clone(), e.stickiness_length),
            FrameKind::Measured(_) => return Err(EngineError::TypeMismatch(frame_id)),
        };

        let probability_of_exploration = self.probability_of_exploration;
        if !self.rankers.contains_key(&frame_id) {
            let seed = self.next_seed;
            self.next_seed = self.next_seed.wrapping_add(1);
            self.rankers.insert(frame_id, RankingStrategy::new(seed));
        }
        let ranker = self.rankers.get_mut(&frame_id).expect("just inserted if missing");
        ranker.probability_of_exploration = probability_of_exploration;
        Ok(ranker.pick(&schema, decision.as_ref(), stickiness))
    }

    fn fast_reaction_pick(&mut self, frame_id: FrameId, parent_id: FrameId) -> Result<Tag, EngineError> {
        let (radices, initial_coeffs, force_fixed) = match &self.stack.registry.get(frame_id)?.kind {
            FrameKind::Exec(e) => {
                let radices: Vec<usize> = e.schema.vars.iter().map(|v| v.num_children).collect();
                let coeffs: Vec<f64> = e
                    .schema
                    .vars
                    .iter()
                    .map(|v| if v.initial_frs_coeff != 0.0 { v.initial_frs_coeff } else { fastreact::INITIAL_COEFFICIENT })
                    .collect();
                (radices, coeffs, e.force_fixed_frs_coefficient)
            }
            FrameKind::Measured(_) => return Err(EngineError::TypeMismatch(frame_id)),
        };

        let (mean, window_len, window_height, y, success) = {
            let parent = self.stack.registry.get(parent_id)?;
            let mean = parent.state.resolved_mean.unwrap_or(0.0);
            let window_len = parent.state.window_len.max(1);
            let window_height = match &parent.state.binning {
                Some(binning) if !parent.state.active_for.0.is_empty() => {
                    let lo = *parent.state.active_for.0.iter().min().unwrap();
                    let hi = *parent.state.active_for.0.iter().max().unwrap();
                    (binning.upper_edge(hi) - binning.lower_edge(lo)).abs()
                }
                _ => 0.0,
            };
            let y = parent.state.previous_invocation_exec_time;
            let bin = parent.state.binning.as_ref().map(|b| b.bin(y, parent.state.resolved_mean)).unwrap_or(0);
            let success = parent.state.active_for.contains(bin);
            (mean, window_len, window_height, y, success)
        };

        let record = self.stack.registry.get_mut(frame_id)?;
        if record.state.frs.is_none() {
            record.state.frs = Some(FrsState::new(radices.len(), &initial_coeffs));
        }
        let frs = record.state.frs.as_mut().expect("just initialized");
        let choices = fastreact::step(frs, &radices, y, mean, window_len, window_height, success, force_fixed);
        let schema = match &record.kind {
            FrameKind::Exec(e) => &e.schema,
            FrameKind::Measured(_) => unreachable!("checked above"),
        };
        Ok(schema.encode(&choices))
    }

    // --- feature-control interface (spec.md §6) ---

    pub fn set_magnify_count_by_deviation(&mut self, on: bool) {
        self.stack.features.magnify_count_by_deviation = on;
    }

    pub fn set_probability_of_exploration(&mut self, p: f64) {
        self.probability_of_exploration = p;
        for ranker in self.rankers.values_mut() {
            ranker.probability_of_exploration = p;
        }
    }

    pub fn set_deemphasize_history(&mut self, on: bool, alpha: f64) {
        self.stack.features.deemphasize_history = on;
        self.stack.features.deemphasize_alpha = alpha;
    }

    pub fn set_forget_history(&mut self, on: bool, beta: f64) {
        self.stack.features.forget_history = on;
        self.stack.features.forget_beta = beta;
    }

    pub fn set_use_fast_reaction_strategy(&mut self, on: bool) {
        self.use_fast_reaction_strategy = on;
    }

    pub fn clock(&self) -> &C {
        self.stack.clock()
    }

    pub fn registry(&self) -> &crate::frame::registry::FrameRegistry<C::Instant> {
        &self.stack.registry
    }

    pub fn frame_statistics(&self, frame_id: FrameId) -> crate::stats::FrameStatistics {
        crate::stats::frame_statistics(&self.stack.registry, frame_id)
    }

    pub fn execframe_statistics(&self, frame_id: FrameId) -> crate::stats::ExecFrameStatistics {
        crate::stats::execframe_statistics(&self.stack.registry, frame_id)
    }

    pub fn render_report(&self, frame_id: FrameId) -> String {
        crate::stats::render_report(&self.frame_statistics(frame_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn select(var_id: usize, n: usize) -> Model {
        Model::Select { var_id, children: (0..n).map(|_| Model::Nop).collect(), priorities: None, default_index: None, initial_frs_coeff: None }
    }

    #[test]
    fn top_level_execframe_runs_without_parent() {
        let mut engine = Engine::new(VirtualClock::new());
        let exec = engine.register_exec(select(0, 3), 0, 0).unwrap();
        engine.enter(exec, ParentChoice::TopLevel).unwrap();
        engine.execframe_run(exec).unwrap();
        engine.exit_complete(exec).unwrap();
    }

    #[test]
    fn nested_execframe_tracks_parent_objective() {
        let mut engine = Engine::new(VirtualClock::new());
        let outer = engine.register_measured(Objective::absolute(0.01, 0.2, 0.2, 1));
        let inner = engine.register_exec(select(0, 2), 0, 0).unwrap();
        engine.enter(outer, ParentChoice::TopLevel).unwrap();
        engine.enter(inner, ParentChoice::Innermost).unwrap();
        engine.track_parameter(outer, inner).unwrap();
        engine.execframe_run(inner).unwrap();
        engine.exit_complete(inner).unwrap();
        engine.exit_complete(outer).unwrap();
        let stats = engine.frame_statistics(outer);
        assert_eq!(stats.frame_id, outer);
    }

    #[test]
    fn force_default_choice_bypasses_strategy() {
        let mut engine = Engine::new(VirtualClock::new());
        let exec = engine.register_exec(select(0, 3), 0, 0).unwrap();
        engine.enter(exec, ParentChoice::TopLevel).unwrap();
        if let FrameKind::Exec(e) = &mut engine.stack.registry.get_mut(exec).unwrap().kind {
            e.force_default_choice = true;
        }
        engine.execframe_run(exec).unwrap();
        assert_eq!(engine.stack.registry.get(exec).unwrap().state.last_decision_tag, Some(0));
    }
}
