//! Bounded tag→count histograms.

mod tagcount;

pub use tagcount::TagCountCache;
