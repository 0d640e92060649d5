//! Per-frame adaptation state: objective resolution, histograms, sliding
//! window, FOR/AGAINST bin sets, failure run-lengths, and Fast-Reaction
//! bookkeeping.

use crate::binning::{AbsoluteBinning, ExecTimeBinning, MeanRelativeBinning};
use crate::cache::TagCountCache;
use crate::frame::objective::Objective;
use crate::spread::{ParamExecSpread, TagWeight};
use crate::{BinIndex, Count, FrameId, Seconds};
use std::collections::{BTreeMap, VecDeque};

const HISTOGRAM_MAX_COUNT: Count = 100_000.0;
/// Buckets for `floor(log2(run_length))`; a run can plausibly run for a very
/// long time before the process is restarted, so allocate generously.
const LOG2_BUCKETS: usize = 48;

/// The binning scheme attached to a frame: mean-relative when it has an
/// objective, absolute otherwise (spec.md §4.F).
pub enum Binning {
    MeanRelative(MeanRelativeBinning),
    Absolute(AbsoluteBinning),
}

impl Binning {
    pub fn num_bins(&self) -> usize {
        match self {
            Binning::MeanRelative(b) => b.num_bins(),
            Binning::Absolute(b) => b.num_bins(),
        }
    }

    pub fn bin(&self, exec: Seconds, mean: Option<Seconds>) -> BinIndex {
        match self {
            Binning::MeanRelative(b) => b.bin(exec, mean.expect("mean-relative binning requires a resolved mean")),
            Binning::Absolute(b) => b.bin(exec),
        }
    }

    pub fn center(&self, i: BinIndex) -> f64 {
        match self {
            Binning::MeanRelative(b) => b.center(i),
            Binning::Absolute(b) => b.center(i),
        }
    }

    pub fn lower_edge(&self, i: BinIndex) -> f64 {
        match self {
            Binning::MeanRelative(b) => b.lower_edge(i),
            Binning::Absolute(b) => b.lower_edge(i),
        }
    }

    pub fn upper_edge(&self, i: BinIndex) -> f64 {
        match self {
            Binning::MeanRelative(b) => b.upper_edge(i),
            Binning::Absolute(b) => b.upper_edge(i),
        }
    }
}

/// Contiguous-range or explicit decision set over bin indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinSet(pub Vec<BinIndex>);

impl BinSet {
    pub fn range(lo: BinIndex, hi: BinIndex) -> Self {
        Self((lo..=hi).collect())
    }

    pub fn complement(&self, num_bins: usize) -> Self {
        let mut set: Vec<BinIndex> = (0..num_bins).filter(|b| !self.0.contains(b)).collect();
        set.sort_unstable();
        Self(set)
    }

    pub fn contains(&self, b: BinIndex) -> bool {
        self.0.contains(&b)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UnbinnedStats {
    pub count: u64,
    pub mean: f64,
    pub sum_sq: f64,
    pub satisfied: u64,
}

impl UnbinnedStats {
    pub fn observe(&mut self, t: Seconds, satisfied: bool) {
        self.count += 1;
        let delta = t - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_sq += delta * (t - self.mean);
        if satisfied {
            self.satisfied += 1;
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.sum_sq / (self.count - 1) as f64
        }
    }

    pub fn satisfaction_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.satisfied as f64 / self.count as f64
        }
    }
}

/// Run-length histogram bucketed by `floor(log2(length))`, per spec.md §3/§6.
#[derive(Debug, Clone)]
pub struct FailureRunLengths {
    buckets: [u64; LOG2_BUCKETS],
    current_run: u64,
}

impl Default for FailureRunLengths {
    fn default() -> Self {
        Self { buckets: [0; LOG2_BUCKETS], current_run: 0 }
    }
}

impl FailureRunLengths {
    pub fn observe(&mut self, failed: bool) {
        if failed {
            self.current_run += 1;
        } else if self.current_run > 0 {
            let bucket = (self.current_run as f64).log2().floor().max(0.0) as usize;
            self.buckets[bucket.min(LOG2_BUCKETS - 1)] += 1;
            self.current_run = 0;
        }
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    pub fn current_run(&self) -> u64 {
        self.current_run
    }
}

/// Half-cycle and per-variable bookkeeping for `FastReactionStrategy`
/// (spec.md §4.J). One instance per ExecFrame using the strategy.
#[derive(Debug, Clone)]
pub struct FrsState {
    pub coefficients: Vec<f64>,
    pub prev_bounded: Vec<usize>,
    pub prev_unbounded: Vec<f64>,
    pub ewma_deviation: Vec<f64>,
    pub avg_deviation: Vec<f64>,
    pub window_deviation_sum: Vec<f64>,
    pub window_samples: usize,

    pub half_cycle_sign: Option<bool>,
    pub crossed_mean: bool,
    pub half_cycle_max_pos: f64,
    pub half_cycle_max_neg: f64,
    pub half_cycle_length: u64,
    pub half_cycle_ewma: f64,

    pub one_sided_run_length: u64,
    pub one_sided_abs_dx: Vec<f64>,
    pub one_sided_snapshot: Vec<f64>,
    pub stuck_at_boundary_run: u64,

    pub previous_y: Option<f64>,
    pub initialized: bool,
}

impl FrsState {
    pub fn new(num_vars: usize, initial_coeffs: &[f64]) -> Self {
        Self {
            coefficients: initial_coeffs.to_vec(),
            prev_bounded: vec![0; num_vars],
            prev_unbounded: vec![0.0; num_vars],
            ewma_deviation: vec![0.0; num_vars],
            avg_deviation: vec![0.0; num_vars],
            window_deviation_sum: vec![0.0; num_vars],
            window_samples: 0,
            half_cycle_sign: None,
            crossed_mean: false,
            half_cycle_max_pos: 0.0,
            half_cycle_max_neg: 0.0,
            half_cycle_length: 0,
            half_cycle_ewma: 0.0,
            one_sided_run_length: 0,
            one_sided_abs_dx: vec![0.0; num_vars],
            one_sided_snapshot: vec![0.0; num_vars],
            stuck_at_boundary_run: 0,
            previous_y: None,
            initialized: false,
        }
    }

    pub fn clear_rescale_window(&mut self) {
        self.ewma_deviation.iter_mut().for_each(|v| *v = 0.0);
        self.avg_deviation.iter_mut().for_each(|v| *v = 0.0);
        self.window_deviation_sum.iter_mut().for_each(|v| *v = 0.0);
        self.window_samples = 0;
        self.half_cycle_sign = None;
        self.crossed_mean = false;
        self.half_cycle_max_pos = 0.0;
        self.half_cycle_max_neg = 0.0;
        self.half_cycle_length = 0;
        self.one_sided_run_length = 0;
        self.one_sided_abs_dx.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// The full adaptation record owned by a registered Frame.
pub struct FrameState {
    pub resolved_mean: Option<Seconds>,
    pub binning: Option<Binning>,
    pub histogram: Option<TagCountCache>,

    pub sliding_window: VecDeque<Seconds>,
    pub window_len: usize,

    pub unbinned: UnbinnedStats,

    pub current_records: BTreeMap<FrameId, TagCountCache>,
    pub spreads: BTreeMap<FrameId, ParamExecSpread>,

    pub specified_for: BinSet,
    pub specified_against: BinSet,
    pub active_for: BinSet,
    pub active_against: BinSet,

    pub failures_specified: FailureRunLengths,
    pub failures_active: FailureRunLengths,

    pub frs: Option<FrsState>,

    pub previous_invocation_exec_time: Seconds,
    pub activated: bool,

    /// The most recent decision tag this frame's ExecFrame chose, if any.
    /// Measured frames report their own execution-time bin to consumers
    /// instead (see `FrameStack::run_update_pipeline` step 3-4).
    pub last_decision_tag: Option<crate::Tag>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            resolved_mean: None,
            binning: None,
            histogram: None,
            sliding_window: VecDeque::new(),
            window_len: 1,
            unbinned: UnbinnedStats::default(),
            current_records: BTreeMap::new(),
            spreads: BTreeMap::new(),
            specified_for: BinSet::default(),
            specified_against: BinSet::default(),
            active_for: BinSet::default(),
            active_against: BinSet::default(),
            failures_specified: FailureRunLengths::default(),
            failures_active: FailureRunLengths::default(),
            frs: None,
            previous_invocation_exec_time: 0.0,
            activated: false,
            last_decision_tag: None,
        }
    }
}

impl FrameState {
    /// Push a measurement into the sliding window and return its average.
    pub fn push_window(&mut self, t: Seconds) -> Seconds {
        self.sliding_window.push_back(t);
        while self.sliding_window.len() > self.window_len {
            self.sliding_window.pop_front();
        }
        self.sliding_window.iter().sum::<Seconds>() / self.sliding_window.len() as Seconds
    }

    pub fn activate(&mut self, objective: Option<&Objective>, resolved_mean: Option<Seconds>) {
        if self.activated {
            return;
        }
        self.activated = true;
        self.window_len = objective.map(|o| o.window_len).unwrap_or(1);
        self.resolved_mean = resolved_mean;
        let binning = match resolved_mean {
            Some(_) => Binning::MeanRelative(MeanRelativeBinning),
            None => Binning::Absolute(AbsoluteBinning::new()),
        };
        self.histogram = Some(TagCountCache::new(binning.num_bins(), HISTOGRAM_MAX_COUNT));

        if let (Some(mean), Some(obj)) = (resolved_mean, objective) {
            let lower_bound = mean * (1.0 - obj.window_frac_lower);
            let upper_bound = mean * (1.0 + obj.window_frac_upper);
            let lo = binning.bin(lower_bound, resolved_mean);
            let hi = binning.bin(upper_bound, resolved_mean);
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            self.specified_for = BinSet::range(lo, hi);
            self.specified_against = self.specified_for.complement(binning.num_bins());
            self.active_for = self.specified_for.clone();
            self.active_against = self.specified_against.clone();
        }
        self.binning = Some(binning);
    }

    pub fn discriminating_in(&self, source: FrameId, bins: &[BinIndex], threshold: f64) -> Vec<TagWeight> {
        self.spreads.get(&source).map(|s| s.discriminating(bins, threshold)).unwrap_or_default()
    }
}
