//! Picking a decision tag: the hierarchical solver both strategies consult,
//! and the two strategies themselves.

pub mod fastreact;
pub mod ranking;
pub mod solver;

pub use ranking::RankingStrategy;
pub use solver::{solve, DecisionSet};
