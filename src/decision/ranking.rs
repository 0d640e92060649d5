//! Reinforcement ranking over the hierarchical decision set, with stickiness
//! and probabilistic exploration (spec.md §4.I).

use crate::decision::solver::DecisionSet;
use crate::frame::model::DecisionSchema;
use crate::spread::TagWeight;
use crate::Tag;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Weight given to normalised priority over measured probability when
/// ranking unclassified candidates. Named per spec.md §9: "justified only by
/// an inline comment" in the source this was distilled from — preserved as a
/// constant rather than derived.
pub const UNCLASSIFIED_PRIORITY_WEIGHT: f64 = 0.6;

fn priority_tuple(schema: &DecisionSchema, tag: Tag) -> Vec<i64> {
    let choices = schema.decode(tag);
    schema.vars.iter().zip(choices).map(|(v, c)| v.priorities.get(c).copied().unwrap_or(0)).collect()
}

fn all_tags_by_priority(schema: &DecisionSchema) -> Vec<Tag> {
    let n = schema.tag_space();
    let mut tags: Vec<Tag> = (0..n).collect();
    tags.sort_by(|&a, &b| priority_tuple(schema, a).cmp(&priority_tuple(schema, b)).then(a.cmp(&b)));
    tags
}

fn rank_for(w: &TagWeight, n: f64) -> f64 {
    w.prob * 100.0 + w.count * 10.0 - w.tag as f64 / n
}

fn rank_unclassified(w: &TagWeight, total_count: f64, priority_rank: f64, n: f64) -> f64 {
    let count_ratio = if total_count > 0.0 { w.count / total_count } else { 0.0 };
    w.prob * (1.0 - count_ratio) + UNCLASSIFIED_PRIORITY_WEIGHT * (1.0 - priority_rank / n)
}

fn rank_against(w: &TagWeight, n: f64) -> f64 {
    -w.prob * 100.0 - w.count * 10.0 - w.tag as f64 / n
}

/// Per-ExecFrame reinforcement ranking state.
pub struct RankingStrategy {
    rng: SmallRng,
    pub probability_of_exploration: f64,
    sticky_tag: Option<Tag>,
    sticky_remaining: u32,
}

impl RankingStrategy {
    pub fn new(seed: u64) -> Self {
        Self { rng: SmallRng::seed_from_u64(seed), probability_of_exploration: 0.0, sticky_tag: None, sticky_remaining: 0 }
    }

    fn arm_stickiness(&mut self, tag: Tag, observed_count: f64, stickiness_length: u32) {
        if observed_count < stickiness_length as f64 {
            self.sticky_tag = Some(tag);
            self.sticky_remaining = stickiness_length;
        }
    }

    /// Choose a tag. `decision` is `None` when the ExecFrame has no parent
    /// (top-level): in that case the highest-priority vector wins outright.
    pub fn pick(&mut self, schema: &DecisionSchema, decision: Option<&DecisionSet>, stickiness_length: u32) -> Tag {
        if self.sticky_remaining > 0 {
            self.sticky_remaining -= 1;
            return self.sticky_tag.expect("sticky_remaining > 0 implies a remembered tag");
        }

        let n = schema.tag_space().max(1) as f64;

        let decision = match decision {
            None => return *all_tags_by_priority(schema).first().unwrap_or(&0),
            Some(d) => d,
        };

        if !decision.for_set.is_empty() {
            let best = decision.for_set.iter().max_by(|a, b| rank_for(a, n).partial_cmp(&rank_for(b, n)).expect("not NaN")).expect("non-empty");
            return best.tag;
        }

        let excluded: std::collections::HashSet<Tag> =
            decision.unclassified.iter().chain(decision.against_set.iter()).map(|w| w.tag).collect();
        let priority_order = all_tags_by_priority(schema);
        let priority_rank_of = |tag: Tag| -> f64 { priority_order.iter().position(|&t| t == tag).unwrap_or(0) as f64 };

        let mut pool: Vec<TagWeight> = decision.unclassified.clone();
        for &tag in &priority_order {
            if !excluded.contains(&tag) {
                pool.push(TagWeight { tag, count: 0.0, prob: 1.0 });
            }
        }

        if !pool.is_empty() {
            let total_count: f64 = pool.iter().map(|w| w.count).sum();
            pool.sort_by(|a, b| {
                rank_unclassified(b, total_count, priority_rank_of(b.tag), n)
                    .partial_cmp(&rank_unclassified(a, total_count, priority_rank_of(a.tag), n))
                    .expect("not NaN")
            });

            let mut fallback: Option<TagWeight> = None;
            for candidate in &pool {
                if self.probability_of_exploration > 0.0 {
                    let u: f64 = self.rng.random();
                    if u < self.probability_of_exploration {
                        fallback.get_or_insert(*candidate);
                        continue;
                    }
                }
                self.arm_stickiness(candidate.tag, candidate.count, stickiness_length);
                return candidate.tag;
            }
            if let Some(candidate) = fallback {
                self.arm_stickiness(candidate.tag, candidate.count, stickiness_length);
                return candidate.tag;
            }
        }

        // Only AGAINST remains: pick the least harmful.
        if let Some(best) = decision.against_set.iter().max_by(|a, b| rank_against(a, n).partial_cmp(&rank_against(b, n)).expect("not NaN")) {
            self.arm_stickiness(best.tag, best.count, stickiness_length);
            return best.tag;
        }

        *priority_order.first().unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::model::{extract_decision_schema, Model};

    fn schema() -> DecisionSchema {
        let model = Model::Select { var_id: 0, children: vec![Model::Nop, Model::Nop, Model::Nop], priorities: None, default_index: None, initial_frs_coeff: None };
        extract_decision_schema(&model).unwrap()
    }

    fn schema_with_priorities(priorities: Vec<i64>) -> DecisionSchema {
        let model = Model::Select { var_id: 0, children: vec![Model::Nop, Model::Nop, Model::Nop], priorities: Some(priorities), default_index: None, initial_frs_coeff: None };
        extract_decision_schema(&model).unwrap()
    }

    #[test]
    fn no_parent_picks_highest_priority() {
        let schema = schema();
        let mut strategy = RankingStrategy::new(1);
        let tag = strategy.pick(&schema, None, 0);
        assert_eq!(tag, 0);
    }

    #[test]
    fn for_set_ranking_prefers_higher_prob_and_count() {
        let schema = schema();
        let mut strategy = RankingStrategy::new(1);
        let decision = DecisionSet {
            for_set: vec![TagWeight { tag: 0, count: 1.0, prob: 0.8 }, TagWeight { tag: 1, count: 5.0, prob: 0.95 }],
            unclassified: vec![],
            against_set: vec![],
            blocked: false,
        };
        let tag = strategy.pick(&schema, Some(&decision), 0);
        assert_eq!(tag, 1);
    }

    #[test]
    fn stickiness_holds_for_exact_length() {
        // Stickiness is only armed out of the untried-pool branch (spec.md
        // §4.I), never out of a non-empty FOR set. Priorities are rigged so
        // tag 2 outranks the zero-count padding entries for tags 0 and 1.
        let schema = schema_with_priorities(vec![5, 5, 0]);
        let mut strategy = RankingStrategy::new(1);
        let decision = DecisionSet {
            for_set: vec![],
            unclassified: vec![TagWeight { tag: 2, count: 0.0, prob: 1.0 }],
            against_set: vec![],
            blocked: false,
        };
        let first = strategy.pick(&schema, Some(&decision), 3);
        assert_eq!(first, 2);
        for _ in 0..3 {
            assert_eq!(strategy.pick(&schema, None, 3), 2);
        }
    }
}
