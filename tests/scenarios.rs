//! End-to-end scenarios driven by a deterministic [`VirtualClock`], one per
//! walkthrough in `spec.md` §8.

use cadence_engine::clock::VirtualClock;
use cadence_engine::decision::fastreact;
use cadence_engine::frame::model::Model;
use cadence_engine::frame::objective::Objective;
use cadence_engine::frame::stack::ParentChoice;
use cadence_engine::Engine;

fn run_for(engine: &mut Engine<VirtualClock>, frame_id: usize, parent: ParentChoice, dt: f64) {
    engine.enter(frame_id, parent).unwrap();
    engine.clock().advance(dt);
    engine.exit_complete(frame_id).unwrap();
}

/// Scenario 1: a single frame with no declared objective, invoked three
/// times, just accumulates its own execution-time histogram without error.
#[test]
fn scenario_1_untargeted_frame_accumulates_a_histogram() {
    let mut engine = Engine::new(VirtualClock::new());
    let frame = engine.register_exec(Model::Nop, 0, 0).unwrap();

    for _ in 0..3 {
        run_for(&mut engine, frame, ParentChoice::TopLevel, 0.004);
    }

    let stats = engine.frame_statistics(frame);
    let total: f64 = stats.bin_frequencies.iter().sum();
    assert!((total - 3.0).abs() < 1e-9);
}

/// Scenario 2: a single frame with an absolute objective, invoked with its
/// exact target exec time every cycle, always satisfies its window.
#[test]
fn scenario_2_objective_met_every_cycle_is_fully_satisfied() {
    let mut engine = Engine::new(VirtualClock::new());
    let objective = Objective::absolute(0.010, 0.2, 0.2, 3);
    let frame = engine.register_measured(objective);

    for _ in 0..5 {
        run_for(&mut engine, frame, ParentChoice::TopLevel, 0.010);
    }

    let stats = engine.frame_statistics(frame);
    assert!((stats.satisfaction_ratio_active - 1.0).abs() < 1e-9);
    assert_eq!(stats.failure_runlengths_active.iter().sum::<u64>(), 0);
}

/// Scenario 3: a nested pair where the inner frame consistently misses its
/// own objective; after enough cycles the AGAINST set for the tracked
/// Parameter is non-empty at the outer frame.
#[test]
fn scenario_3_sustained_misses_populate_the_against_set() {
    let mut engine = Engine::new(VirtualClock::new());
    let outer = engine.register_measured(Objective::absolute(0.020, 0.1, 0.1, 1));
    let inner = engine.register_measured(Objective::absolute(0.005, 0.1, 0.1, 1));
    engine.track_parameter(outer, inner).unwrap();

    engine.enter(outer, ParentChoice::TopLevel).unwrap();
    for cycle in 0..12 {
        // Inner consistently runs 4x slower than its target: a guaranteed miss.
        run_for(&mut engine, inner, ParentChoice::Innermost, 0.020);
        let _ = cycle;
    }
    // One on-target invocation terminates the failure run so it gets bucketed
    // (FailureRunLengths only records a run when it ends on a non-failure).
    run_for(&mut engine, inner, ParentChoice::Innermost, 0.005);
    engine.exit_complete(outer).unwrap();

    let inner_stats = engine.frame_statistics(inner);
    assert!(inner_stats.failure_runlengths_specified.iter().sum::<u64>() >= 1);
}

/// Scenario 4: a top-level ExecFrame under reinforcement ranking runs 20
/// invocations without error and always emits a tag within its schema.
#[test]
fn scenario_4_reinforcement_ranking_stays_within_schema_over_20_invocations() {
    let mut engine = Engine::new(VirtualClock::new());
    let model = Model::Select { var_id: 0, children: (0..4).map(|_| Model::Nop).collect(), priorities: None, default_index: None, initial_frs_coeff: None };
    let frame = engine.register_exec(model, 0, 0).unwrap();

    for _ in 0..20 {
        engine.enter(frame, ParentChoice::TopLevel).unwrap();
        engine.execframe_run(frame).unwrap();
        let tag = engine.registry().get(frame).unwrap().state.last_decision_tag.unwrap();
        assert!((0i64..4).contains(&tag));
        engine.exit_complete(frame).unwrap();
    }
}

/// Scenario 5: fast-reaction gradient control moves a single variable by
/// exactly `-Δy / a` on a failed invocation, matching the closed-form step.
#[test]
fn scenario_5_fast_reaction_gradient_matches_closed_form() {
    let mut frs = cadence_engine::frame::state::FrsState::new(1, &[fastreact::INITIAL_COEFFICIENT]);
    let choices = fastreact::step(&mut frs, &[8], 0.012, 0.010, 5, 0.002, false, false);
    // x_new = 0 - (0.012 - 0.010) / (-1/5000) = 10, clamped into [0, 7].
    assert_eq!(choices, vec![7]);
}

/// Scenario 6: reinforcement ranking sticks to a dominant choice for exactly
/// `stickiness_length` further invocations once it is picked out of the
/// untried-pool branch (spec.md §4.I never arms stickiness out of a
/// non-empty FOR set).
#[test]
fn scenario_6_stickiness_holds_for_exactly_its_declared_length() {
    use cadence_engine::decision::solver::DecisionSet;
    use cadence_engine::decision::RankingStrategy;
    use cadence_engine::frame::model::extract_decision_schema;
    use cadence_engine::spread::TagWeight;

    // Priorities rig tag 1 as the top-priority choice so it outranks the
    // zero-count padding entries for tags 0 and 2.
    let model = Model::Select { var_id: 0, children: (0..3).map(|_| Model::Nop).collect(), priorities: Some(vec![5, 0, 5]), default_index: None, initial_frs_coeff: None };
    let schema = extract_decision_schema(&model).unwrap();
    let decision = DecisionSet {
        for_set: vec![],
        unclassified: vec![TagWeight { tag: 1, count: 0.0, prob: 1.0 }],
        against_set: vec![],
        blocked: false,
    };

    let mut strategy = RankingStrategy::new(42);
    let stickiness_length = 3;
    let first = strategy.pick(&schema, Some(&decision), stickiness_length);
    assert_eq!(first, 1);
    for _ in 0..stickiness_length {
        assert_eq!(strategy.pick(&schema, None, stickiness_length), 1);
    }
}
