//! Gradient control over a decision vector, with three self-rescaling
//! triggers (spec.md §4.J).
//!
//! The model: `y = Σ (1/a_i)·x_i`, separable per-variable inverse-gain. Each
//! `FastReactionStrategy` owns one `FrsState` per ExecFrame (see
//! `frame::state::FrsState` for the accumulators).

use crate::frame::state::FrsState;
use crate::Seconds;

pub const INITIAL_COEFFICIENT: f64 = -1.0 / 5000.0;
const DEVIATION_EWMA_WEIGHT: f64 = 0.9;
const HALF_CYCLE_EWMA_WEIGHT: f64 = 0.6;
/// Gain multiplier applied by the responsiveness trigger. Not numerically
/// specified in the source this was distilled from; preserved as a named
/// constant rather than derived, analogous to `UNCLASSIFIED_PRIORITY_WEIGHT`.
const RESPONSIVENESS_SCALE: f64 = 2.0;
const CONTROL_LAG_MULTIPLIER: f64 = 2.5;
const CONTROL_LAG_HYSTERESIS: f64 = 1.2;
const RANGE_PRECISION_EWMA_THRESHOLD: f64 = 10.0;

/// One gradient-control step. Returns the new (bounded) per-variable
/// integer choices.
pub fn step(frs: &mut FrsState, radices: &[usize], y: Seconds, mean: Seconds, window_len: usize, window_height: Seconds, success: bool, force_fixed_coeff: bool) -> Vec<usize> {
    if !frs.initialized {
        frs.initialized = true;
        frs.prev_bounded = vec![0; radices.len()];
        frs.prev_unbounded = vec![0.0; radices.len()];
    }

    let dy = y - mean;
    update_half_cycle(frs, dy, window_len);

    if success {
        if frs.one_sided_run_length > 0 {
            frs.one_sided_snapshot = std::mem::take(&mut frs.one_sided_abs_dx);
            frs.one_sided_abs_dx = vec![0.0; radices.len()];
            frs.one_sided_run_length = 0;
        }
        frs.stuck_at_boundary_run = 0;
        return frs.prev_bounded.clone();
    }

    frs.one_sided_run_length += 1;
    frs.window_samples += 1;

    let mut new_bounded = vec![0usize; radices.len()];
    let mut stuck = true;
    for i in 0..radices.len() {
        let x_new_unbounded = frs.prev_unbounded[i] - dy / frs.coefficients[i];
        let k = radices[i] as f64;
        let bounded = x_new_unbounded.clamp(0.0, k - 1.0).round();

        let abs_dx = (bounded - frs.prev_bounded[i] as f64).abs();
        frs.one_sided_abs_dx[i] += abs_dx;
        frs.window_deviation_sum[i] += abs_dx;
        let samples = frs.window_samples as f64;
        frs.avg_deviation[i] = frs.window_deviation_sum[i] / samples.max(1.0);
        frs.ewma_deviation[i] = DEVIATION_EWMA_WEIGHT * frs.ewma_deviation[i] + (1.0 - DEVIATION_EWMA_WEIGHT) * abs_dx;

        let was_out_of_range = frs.prev_unbounded[i] < 0.0 || frs.prev_unbounded[i] > k - 1.0;
        let still_out_same_side = (x_new_unbounded < 0.0 && frs.prev_unbounded[i] < 0.0) || (x_new_unbounded > k - 1.0 && frs.prev_unbounded[i] > k - 1.0);
        if !(was_out_of_range && still_out_same_side) {
            stuck = false;
        }

        new_bounded[i] = bounded as usize;
        frs.prev_unbounded[i] = x_new_unbounded;
    }
    frs.stuck_at_boundary_run = if stuck { frs.stuck_at_boundary_run + 1 } else { 0 };
    frs.prev_bounded = new_bounded.clone();

    if !force_fixed_coeff && frs.window_samples >= window_len {
        apply_rescaling_triggers(frs, window_height, window_len);
    }

    new_bounded
}

fn update_half_cycle(frs: &mut FrsState, dy: Seconds, window_len: usize) {
    let sign = dy >= 0.0;
    match frs.half_cycle_sign {
        None => {
            frs.half_cycle_sign = Some(sign);
            frs.half_cycle_max_pos = dy.max(0.0);
            frs.half_cycle_max_neg = (-dy).max(0.0);
            frs.half_cycle_length = 1;
            frs.crossed_mean = false;
        }
        Some(prev_sign) if prev_sign == sign => {
            frs.half_cycle_max_pos = frs.half_cycle_max_pos.max(dy.max(0.0));
            frs.half_cycle_max_neg = frs.half_cycle_max_neg.max((-dy).max(0.0));
            frs.half_cycle_length += 1;
        }
        Some(_) => {
            let contribution = (frs.half_cycle_max_pos - frs.half_cycle_max_neg) / (frs.half_cycle_length as f64 / window_len.max(1) as f64).max(1e-9);
            frs.half_cycle_ewma = HALF_CYCLE_EWMA_WEIGHT * contribution + (1.0 - HALF_CYCLE_EWMA_WEIGHT) * frs.half_cycle_ewma;
            frs.half_cycle_sign = Some(sign);
            frs.half_cycle_max_pos = dy.max(0.0);
            frs.half_cycle_max_neg = (-dy).max(0.0);
            frs.half_cycle_length = 1;
            frs.crossed_mean = true;
        }
    }
    frs.previous_y = Some(dy);
}

fn apply_rescaling_triggers(frs: &mut FrsState, window_height: Seconds, window_len: usize) {
    // Range-precision: shrink the gain of any variable converging slowly.
    let mut fired = false;
    for i in 0..frs.coefficients.len() {
        if frs.ewma_deviation[i] > RANGE_PRECISION_EWMA_THRESHOLD && frs.avg_deviation[i] >= 1.0 {
            frs.coefficients[i] *= frs.avg_deviation[i];
            fired = true;
        }
    }

    // Responsiveness: the one-sided run outlasted a full window and every
    // variable is moving less than one bin per window on average — raise
    // the gain of the least-active variable.
    if !fired && frs.one_sided_run_length as usize > window_len && frs.avg_deviation.iter().all(|&d| d < 1.0) {
        if let Some((min_idx, _)) = frs.avg_deviation.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).expect("not NaN")) {
            frs.coefficients[min_idx] *= RESPONSIVENESS_SCALE;
            fired = true;
        }
    }

    // Control-lag: oscillation amplitude is dampened across every variable.
    if !fired && window_height > 0.0 {
        let threshold = CONTROL_LAG_MULTIPLIER * window_height;
        if frs.half_cycle_ewma > threshold {
            let ratio = frs.half_cycle_ewma / threshold;
            if ratio >= CONTROL_LAG_HYSTERESIS {
                for c in &mut frs.coefficients {
                    *c *= ratio;
                }
                fired = true;
            }
        }
    }

    if fired {
        #[cfg(feature = "diagnostics")]
        log::debug!("fast-reaction coefficients rescaled: {:?}", frs.coefficients);
        frs.clear_rescale_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_moves_choice_by_gradient() {
        let mut frs = FrsState::new(1, &[INITIAL_COEFFICIENT]);
        let choices = step(&mut frs, &[4], 0.010, 0.005, 5, 0.001, false, false);
        // x_new = 0 - (0.010-0.005)/(-1/5000) = 0 - (0.005 * -5000) = 25, clamped to 3.
        assert_eq!(choices, vec![3]);
    }

    #[test]
    fn success_reuses_previous_choice() {
        let mut frs = FrsState::new(1, &[INITIAL_COEFFICIENT]);
        frs.prev_bounded = vec![2];
        frs.initialized = true;
        frs.prev_unbounded = vec![2.0];
        let choices = step(&mut frs, &[4], 0.005, 0.005, 5, 0.001, true, false);
        assert_eq!(choices, vec![2]);
    }
}
