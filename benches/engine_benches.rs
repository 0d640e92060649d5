criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        noting_a_tag_into_a_cache,
        ranking_strategy_pick,
        solving_a_decision_set,
        running_the_update_pipeline,
}

fn noting_a_tag_into_a_cache(c: &mut criterion::Criterion) {
    c.bench_function("TagCountCache::note with a full cache", |b| {
        let mut cache = TagCountCache::new(10, 1000.0);
        for tag in 0..10 {
            cache.note(tag, 5.0);
        }
        b.iter(|| cache.note(11, 3.0))
    });
}

fn ranking_strategy_pick(c: &mut criterion::Criterion) {
    let model = Model::Select { var_id: 0, children: (0..6).map(|_| Model::Nop).collect(), priorities: None, default_index: None, initial_frs_coeff: None };
    let schema = extract_decision_schema(&model).unwrap();
    let decision = DecisionSet {
        for_set: vec![],
        unclassified: (0..6).map(|t| TagWeight { tag: t, count: t as f64, prob: 0.5 }).collect(),
        against_set: vec![],
        blocked: false,
    };
    c.bench_function("RankingStrategy::pick over an unclassified pool", |b| {
        let mut strategy = RankingStrategy::new(7);
        b.iter(|| strategy.pick(&schema, Some(&decision), 0))
    });
}

fn solving_a_decision_set(c: &mut criterion::Criterion) {
    let mut registry: FrameRegistry<()> = FrameRegistry::new();
    let source = registry.register(FrameKind::Measured(Objective::absolute(0.01, 0.1, 0.1, 1)));
    let consumer = registry.register(FrameKind::Measured(Objective::absolute(0.01, 0.1, 0.1, 1)));
    registry.get_mut(consumer).unwrap().status = FrameStatus::Executing;
    registry.get_mut(consumer).unwrap().state.active_for = BinSet(vec![0, 1, 2]);
    registry.get_mut(consumer).unwrap().state.active_against = BinSet(vec![3, 4, 5]);
    let mut spread = ParamExecSpread::new(6);
    for tag in 0..20usize {
        spread.note(tag % 6, tag as i64, 1.0);
    }
    registry.get_mut(consumer).unwrap().state.spreads.insert(source, spread);

    c.bench_function("DecisionSetSolver::solve over a two-frame chain", |b| {
        b.iter(|| solve(&registry, consumer, source))
    });
}

fn running_the_update_pipeline(c: &mut criterion::Criterion) {
    c.bench_function("enter/execframe_run/exit_complete for a top-level ExecFrame", |b| {
        b.iter(|| {
            let mut engine = Engine::new(VirtualClock::new());
            let model = Model::Select { var_id: 0, children: (0..4).map(|_| Model::Nop).collect(), priorities: None, default_index: None, initial_frs_coeff: None };
            let exec = engine.register_exec(model, 0, 0).unwrap();
            engine.enter(exec, ParentChoice::TopLevel).unwrap();
            engine.execframe_run(exec).unwrap();
            engine.exit_complete(exec).unwrap();
        })
    });
}

use cadence_engine::cache::TagCountCache;
use cadence_engine::clock::VirtualClock;
use cadence_engine::decision::solver::{solve, DecisionSet};
use cadence_engine::decision::RankingStrategy;
use cadence_engine::frame::model::{extract_decision_schema, Model};
use cadence_engine::frame::objective::Objective;
use cadence_engine::frame::registry::{FrameKind, FrameRegistry, FrameStatus};
use cadence_engine::frame::stack::ParentChoice;
use cadence_engine::frame::state::BinSet;
use cadence_engine::spread::{ParamExecSpread, TagWeight};
use cadence_engine::Engine;
