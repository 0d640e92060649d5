//! A 3-valued logic constraint tree over Select variables.
//!
//! Shape is grounded on the original C++ source's `ConstraintStructure`: a
//! binary expression tree with per-node evaluation caching and a
//! contained-variable set. Evaluation is an inert plug point — every node
//! reports "always satisfied" until the source's unfinished
//! `ConstraintVerifier::verify_decisions` branch is clarified. See
//! `SPEC_FULL.md` §9.

use std::cell::Cell;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicValue {
    False,
    True,
    DontCare,
}

#[derive(Debug, Clone, Copy)]
pub enum Comparator {
    Gt,
    Geq,
    Lt,
    Leq,
    Eq,
}

/// A node in the constraint expression tree.
pub enum ConstraintNode {
    And(Box<ConstraintNode>, Box<ConstraintNode>),
    Or(Box<ConstraintNode>, Box<ConstraintNode>),
    Xor(Box<ConstraintNode>, Box<ConstraintNode>),
    Not(Box<ConstraintNode>),
    /// Compares a Select variable's chosen index against a constant.
    Compare { var_id: usize, op: Comparator, value: i64 },
    Undefined,
}

struct CacheSlot {
    evaluated: Cell<bool>,
    result: Cell<LogicValue>,
}

impl Default for CacheSlot {
    fn default() -> Self {
        Self { evaluated: Cell::new(false), result: Cell::new(LogicValue::DontCare) }
    }
}

impl ConstraintNode {
    /// Every `var_id` a Select comparison anywhere in this subtree depends
    /// on, used to decide whether the evaluator needs to run at all for a
    /// given decision vector.
    pub fn contained_vids(&self) -> BTreeSet<usize> {
        match self {
            ConstraintNode::And(a, b) | ConstraintNode::Or(a, b) | ConstraintNode::Xor(a, b) => {
                let mut set = a.contained_vids();
                set.extend(b.contained_vids());
                set
            }
            ConstraintNode::Not(a) => a.contained_vids(),
            ConstraintNode::Compare { var_id, .. } => BTreeSet::from([*var_id]),
            ConstraintNode::Undefined => BTreeSet::new(),
        }
    }
}

/// TODO: wire into `decision::ranking::RankingStrategy` as a hard pre-filter
/// on candidate tags once the source's unfinished evaluation branch is
/// clarified (spec.md §9 Open Questions).
#[derive(Default)]
pub struct ConstraintVerifier {
    cache: Vec<CacheSlot>,
}

impl ConstraintVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Always reports satisfied — see module docs.
    pub fn verify_decisions(&self, _root: &ConstraintNode, _choices: &[usize]) -> LogicValue {
        LogicValue::True
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_satisfied() {
        let tree = ConstraintNode::Compare { var_id: 0, op: Comparator::Eq, value: 1 };
        let verifier = ConstraintVerifier::new();
        assert_eq!(verifier.verify_decisions(&tree, &[1]), LogicValue::True);
    }

    #[test]
    fn contained_vids_collects_across_subtree() {
        let tree = ConstraintNode::And(
            Box::new(ConstraintNode::Compare { var_id: 0, op: Comparator::Eq, value: 1 }),
            Box::new(ConstraintNode::Not(Box::new(ConstraintNode::Compare { var_id: 2, op: Comparator::Gt, value: 0 }))),
        );
        assert_eq!(tree.contained_vids(), BTreeSet::from([0, 2]));
    }
}
