//! Hierarchical FOR/AGAINST/UNCLASSIFIED computation across the active
//! ancestor chain for a Parameter (spec.md §4.H).

use crate::frame::registry::FrameRegistry;
use crate::spread::{difference, intersect, union, TagWeight};
use crate::{BinIndex, FrameId};

const DISCRIMINATING_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionSet {
    pub for_set: Vec<TagWeight>,
    pub unclassified: Vec<TagWeight>,
    pub against_set: Vec<TagWeight>,
    pub blocked: bool,
}

struct Level {
    most: Vec<TagWeight>,
    unclassified: Vec<TagWeight>,
    least: Vec<TagWeight>,
}

fn per_frame_sets(spread: &crate::spread::ParamExecSpread, for_active: &[BinIndex], against_active: &[BinIndex]) -> (Vec<TagWeight>, Vec<TagWeight>, Vec<TagWeight>) {
    let most = spread.discriminating(for_active, DISCRIMINATING_THRESHOLD);
    let least = spread.discriminating(against_active, DISCRIMINATING_THRESHOLD);
    let all_for = spread.discriminating(for_active, 0.0);
    let unclassified = difference(&difference(&all_for, &most), &least);
    (most, unclassified, least)
}

/// Walk the active-parent chain for `source`'s Parameter starting at
/// `start` (included), outermost first, and compute the hierarchical
/// decision set.
pub fn solve<I>(registry: &FrameRegistry<I>, start: FrameId, source: FrameId) -> DecisionSet {
    let mut chain = vec![start];
    let mut cur = registry.get(start).ok().and_then(|r| r.parent);
    while let Some(p) = cur {
        chain.push(p);
        cur = registry.get(p).ok().and_then(|r| r.parent);
    }
    chain.reverse(); // outermost first

    let consuming: Vec<FrameId> = chain.iter().copied().filter(|f| registry.get(*f).map(|r| r.state.spreads.contains_key(&source)).unwrap_or(false)).collect();

    let mut levels: Vec<Level> = Vec::new();
    let mut accumulator: Vec<TagWeight> = Vec::new();
    for (idx, &f) in consuming.iter().enumerate() {
        let record = match registry.get(f) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let spread = match record.state.spreads.get(&source) {
            Some(s) => s,
            None => continue,
        };
        let (most, unclassified, least) = per_frame_sets(spread, &record.state.active_for.0, &record.state.active_against.0);
        accumulator = union(&accumulator, &unclassified);

        let is_outermost = idx == 0;
        if most.is_empty() && least.is_empty() && !is_outermost {
            continue;
        }
        levels.push(Level { most, unclassified: std::mem::take(&mut accumulator), least });
    }

    let k = levels.len();
    if k == 0 {
        return DecisionSet::default();
    }

    let mut for_by_level = Vec::with_capacity(k);
    let mut against_by_level = Vec::with_capacity(k);
    let mut unc_by_level = Vec::with_capacity(k);
    let (mut for_acc, mut against_acc, mut unc_acc) = (Vec::new(), Vec::new(), Vec::new());
    for level in &levels {
        for_acc = if for_by_level.is_empty() { level.most.clone() } else { intersect(&for_acc, &level.most) };
        against_acc = union(&against_acc, &level.least);
        unc_acc = union(&unc_acc, &level.unclassified);
        for_by_level.push(for_acc.clone());
        against_by_level.push(against_acc.clone());
        unc_by_level.push(unc_acc.clone());
    }

    // Monotonic intersection can only shrink to empty and stay empty; the
    // deepest level at which agreement across the whole chain still holds
    // is the largest index whose FOR set is non-empty.
    let dec_index = (0..k).rev().find(|&i| !for_by_level[i].is_empty()).unwrap_or(0);

    if k == 1 || dec_index == 0 {
        return DecisionSet { for_set: for_by_level[0].clone(), unclassified: unc_by_level[0].clone(), against_set: against_by_level[0].clone(), blocked: false };
    }

    let unc = difference(&unc_by_level[dec_index], &against_by_level[dec_index]);
    DecisionSet { for_set: for_by_level[dec_index].clone(), unclassified: unc, against_set: against_by_level[dec_index].clone(), blocked: true }
}

/// Integrate a starting frame's own local objective (its own discriminating
/// sets over the same Parameter) into an ancestor-derived decision set.
pub fn integrate_local(ancestor: DecisionSet, local_most: &[TagWeight], local_least: &[TagWeight]) -> DecisionSet {
    if ancestor.blocked {
        return ancestor;
    }
    if ancestor.for_set.is_empty() && ancestor.against_set.is_empty() {
        return DecisionSet { for_set: local_most.to_vec(), unclassified: ancestor.unclassified, against_set: local_least.to_vec(), blocked: false };
    }
    let intersected = intersect(&ancestor.for_set, local_most);
    if intersected.is_empty() {
        ancestor
    } else {
        DecisionSet { for_set: intersected, against_set: union(&ancestor.against_set, local_least), ..ancestor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::objective::Objective;
    use crate::frame::registry::{FrameKind, FrameStatus};

    #[test]
    fn empty_chain_returns_empty_sets() {
        let mut reg: FrameRegistry<()> = FrameRegistry::new();
        let f = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        let result = solve(&reg, f, 999);
        assert!(result.for_set.is_empty());
        assert!(!result.blocked);
    }

    #[test]
    fn disjoint_for_against_p6() {
        let mut reg: FrameRegistry<()> = FrameRegistry::new();
        let source = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        let consumer = reg.register(FrameKind::Measured(Objective::absolute(1.0, 0.1, 0.1, 1)));
        reg.get_mut(consumer).unwrap().status = FrameStatus::Executing;
        reg.get_mut(consumer).unwrap().state.active_for = crate::frame::state::BinSet(vec![0, 1]);
        reg.get_mut(consumer).unwrap().state.active_against = crate::frame::state::BinSet(vec![2, 3]);
        let mut spread = crate::spread::ParamExecSpread::new(4);
        spread.note(0, 5, 10.0);
        spread.note(2, 9, 10.0);
        reg.get_mut(consumer).unwrap().state.spreads.insert(source, spread);

        let result = solve(&reg, consumer, source);
        let for_tags: std::collections::HashSet<_> = result.for_set.iter().map(|w| w.tag).collect();
        let against_tags: std::collections::HashSet<_> = result.against_set.iter().map(|w| w.tag).collect();
        assert!(for_tags.is_disjoint(&against_tags));
    }
}
