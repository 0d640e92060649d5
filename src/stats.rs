//! Read-only, point-in-time snapshots of a frame's statistics, and the
//! verbatim text report external plotting tooling expects (spec.md §4.L,
//! §6).

use crate::frame::registry::FrameRegistry;
use crate::{BinIndex, Count, FrameId, Tag};
use std::fmt::Write as _;

#[derive(Debug, Clone, Default)]
pub struct FrameStatistics {
    pub frame_id: FrameId,
    pub bin_centers: Vec<f64>,
    pub bin_frequencies: Vec<Count>,
    pub specified_for_indices: Vec<BinIndex>,
    pub satisfaction_ratio_specified: f64,
    pub failure_runlengths_specified: Vec<u64>,
    pub active_for_indices: Vec<BinIndex>,
    pub satisfaction_ratio_active: f64,
    pub failure_runlengths_active: Vec<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecFrameStatistics {
    pub exec_frame_id: FrameId,
    /// `consumer_frame_id -> [(exec_time_bin, tag, count), ...]`.
    pub per_consumer: std::collections::BTreeMap<FrameId, Vec<(BinIndex, Tag, Count)>>,
}

/// Allocates its own buffers synchronously; a destroyed/unknown frame id
/// yields an empty snapshot rather than an error (the one infallible
/// operation per spec.md §7).
pub fn frame_statistics<I>(registry: &FrameRegistry<I>, frame_id: FrameId) -> FrameStatistics {
    let record = match registry.get(frame_id) {
        Ok(r) => r,
        Err(_) => return FrameStatistics { frame_id, ..Default::default() },
    };
    let state = &record.state;
    let (bin_centers, bin_frequencies) = match &state.histogram {
        Some(hist) => match &state.binning {
            Some(binning) => {
                let mut centers = vec![0.0; binning.num_bins()];
                let mut freqs = vec![0.0; binning.num_bins()];
                for i in 0..binning.num_bins() {
                    centers[i] = binning.center(i);
                }
                for (tag, count) in hist.entries() {
                    if let Some(slot) = freqs.get_mut(tag as usize) {
                        *slot = count;
                    }
                }
                (centers, freqs)
            }
            None => (Vec::new(), Vec::new()),
        },
        None => (Vec::new(), Vec::new()),
    };

    let total: Count = bin_frequencies.iter().sum();
    let ratio_over = |indices: &[BinIndex]| -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        indices.iter().filter_map(|&i| bin_frequencies.get(i)).sum::<Count>() / total
    };

    let satisfaction_ratio_specified = ratio_over(&state.specified_for.0);
    let satisfaction_ratio_active = ratio_over(&state.active_for.0);

    FrameStatistics {
        frame_id,
        bin_centers,
        bin_frequencies,
        specified_for_indices: state.specified_for.0.clone(),
        satisfaction_ratio_specified,
        failure_runlengths_specified: state.failures_specified.buckets().to_vec(),
        active_for_indices: state.active_for.0.clone(),
        satisfaction_ratio_active,
        failure_runlengths_active: state.failures_active.buckets().to_vec(),
    }
}

pub fn execframe_statistics<I>(registry: &FrameRegistry<I>, exec_frame_id: FrameId) -> ExecFrameStatistics {
    let mut out = ExecFrameStatistics { exec_frame_id, per_consumer: Default::default() };
    for consumer_id in 0..registry.len() {
        let Ok(record) = registry.get(consumer_id) else { continue };
        let Some(spread) = record.state.spreads.get(&exec_frame_id) else { continue };
        let mut cells = Vec::new();
        for bin in 0..spread.num_bins() {
            for (tag, count) in spread.bin(bin).entries() {
                cells.push((bin, tag, count));
            }
        }
        if !cells.is_empty() {
            out.per_consumer.insert(consumer_id, cells);
        }
    }
    out
}

fn fmt_list<T: std::fmt::Display>(items: &[T]) -> String {
    let mut s = String::from("[");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        write!(s, "{item}").expect("writing to a String never fails");
    }
    s.push(']');
    s
}

/// Reproduces the `$$ Frame #<id> : Statistics` block verbatim (spec.md §6)
/// — external plotting tooling depends on this exact shape.
pub fn render_report(stats: &FrameStatistics) -> String {
    let mut out = String::new();
    writeln!(out, "$$ Frame #{} : Statistics", stats.frame_id).unwrap();
    writeln!(out, "$$   vExecTime_bin_centers     = {}", fmt_list(&stats.bin_centers)).unwrap();
    writeln!(out, "$$   vExecTime_bin_frequencies = {}", fmt_list(&stats.bin_frequencies)).unwrap();
    writeln!(out, "$$   vSpecified_Objective_bin_indices = {}", fmt_list(&stats.specified_for_indices)).unwrap();
    writeln!(out, "$$   satisfaction_ratio_wrt_specified_objective = {}", stats.satisfaction_ratio_specified).unwrap();
    writeln!(out, "$$   vFailure_Runlengths_wrt_specified_objective = {}", fmt_list(&stats.failure_runlengths_specified)).unwrap();
    writeln!(out, "$$   vActive_Objective_bin_indices = {}", fmt_list(&stats.active_for_indices)).unwrap();
    writeln!(out, "$$   satisfaction_ratio_wrt_active_objective = {}", stats.satisfaction_ratio_active).unwrap();
    write!(out, "$$   vFailure_Runlengths_wrt_active_objective = {}", fmt_list(&stats.failure_runlengths_active)).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::objective::Objective;
    use crate::frame::registry::FrameKind;

    #[test]
    fn unknown_frame_yields_empty_snapshot_never_raises() {
        let reg: FrameRegistry<()> = FrameRegistry::new();
        let stats = frame_statistics(&reg, 42);
        assert_eq!(stats.frame_id, 42);
        assert!(stats.bin_centers.is_empty());
    }

    #[test]
    fn report_contains_dollar_markers() {
        let mut reg: FrameRegistry<()> = FrameRegistry::new();
        let f = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        let stats = frame_statistics(&reg, f);
        let report = render_report(&stats);
        assert!(report.starts_with("$$ Frame #0 : Statistics"));
        assert!(report.contains("satisfaction_ratio_wrt_active_objective"));
    }
}
