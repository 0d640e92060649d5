//! Per-consumer histogram indexed by execution-time bin, correlating a
//! consumer's own timing with the decision tags emitted by inner choices.

use crate::cache::TagCountCache;
use crate::{BinIndex, Count, Tag};

/// Default per-bin cache shape (spec.md §3, "ParamExecSpread").
pub const DEFAULT_BIN_CAPACITY: usize = 10;
pub const DEFAULT_BIN_MAX_COUNT: Count = 1000.0;

/// A tag's standing within some bin subset: how much mass it carries
/// relative to the whole spread, and how discriminating that mass is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagWeight {
    pub tag: Tag,
    /// `count_in_subset / spread_total_count`.
    pub count: f64,
    /// `count_in_subset / total_count_for_tag`.
    pub prob: f64,
}

/// Vector of `TagCountCache`s, one per execution-time bin.
#[derive(Debug, Clone)]
pub struct ParamExecSpread {
    bins: Vec<TagCountCache>,
}

impl ParamExecSpread {
    pub fn new(num_bins: usize) -> Self {
        Self::with_shape(num_bins, DEFAULT_BIN_CAPACITY, DEFAULT_BIN_MAX_COUNT)
    }

    pub fn with_shape(num_bins: usize, capacity: usize, max_count: Count) -> Self {
        Self { bins: (0..num_bins).map(|_| TagCountCache::new(capacity, max_count)).collect() }
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin(&self, i: BinIndex) -> &TagCountCache {
        &self.bins[i]
    }

    pub fn bin_mut(&mut self, i: BinIndex) -> &mut TagCountCache {
        &mut self.bins[i]
    }

    pub fn note(&mut self, bin: BinIndex, tag: Tag, weight: Count) {
        self.bins[bin].note(tag, weight);
    }

    pub fn current_total(&self) -> Count {
        self.bins.iter().map(TagCountCache::sample_count).sum()
    }

    fn total_count_for_tag(&self, tag: Tag) -> Count {
        self.bins.iter().map(|b| b.count_of(tag)).sum()
    }

    fn count_in_bins(&self, tag: Tag, bins: &[BinIndex]) -> Count {
        bins.iter().map(|&b| self.bins[b].count_of(tag)).sum()
    }

    fn all_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.bins.iter().flat_map(|b| b.entries().map(|(t, _)| t)).collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Tags whose mass in `bins` is at least `threshold` of their total mass
    /// across every bin, sorted ascending by tag.
    pub fn discriminating(&self, bins: &[BinIndex], threshold: f64) -> Vec<TagWeight> {
        let total = self.current_total();
        let mut out = Vec::new();
        for tag in self.all_tags() {
            let total_for_tag = self.total_count_for_tag(tag);
            if total_for_tag <= 0.0 {
                continue;
            }
            let in_set = self.count_in_bins(tag, bins);
            let ratio = in_set / total_for_tag;
            if ratio >= threshold {
                out.push(TagWeight {
                    tag,
                    count: if total > 0.0 { in_set / total } else { 0.0 },
                    prob: ratio,
                });
            }
        }
        out.sort_by_key(|w| w.tag);
        out
    }
}

/// Merge two ascending, tag-unique `TagWeight` lists: a tag passes only if
/// present in both; counts sum, probability takes the more conservative
/// (minimum) of the two claims.
pub fn intersect(a: &[TagWeight], b: &[TagWeight]) -> Vec<TagWeight> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].tag.cmp(&b[j].tag) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(TagWeight { tag: a[i].tag, count: a[i].count + b[j].count, prob: a[i].prob.min(b[j].prob) });
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Merge two ascending, tag-unique `TagWeight` lists: a tag passes if present
/// in either; counts sum when present in both, probability takes the
/// stronger (maximum) of the two claims.
pub fn union(a: &[TagWeight], b: &[TagWeight]) -> Vec<TagWeight> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) if x.tag == y.tag => {
                out.push(TagWeight { tag: x.tag, count: x.count + y.count, prob: x.prob.max(y.prob) });
                i += 1;
                j += 1;
            }
            (Some(x), Some(y)) if x.tag < y.tag => {
                out.push(*x);
                i += 1;
            }
            (Some(_), Some(y)) => {
                out.push(*y);
                j += 1;
            }
            (Some(x), None) => {
                out.push(*x);
                i += 1;
            }
            (None, Some(y)) => {
                out.push(*y);
                j += 1;
            }
            (None, None) => unreachable!(),
        }
    }
    out
}

/// Tags in `a` whose tag value is not present in `b` (both ascending,
/// tag-unique).
pub fn difference(a: &[TagWeight], b: &[TagWeight]) -> Vec<TagWeight> {
    a.iter().filter(|x| b.binary_search_by_key(&x.tag, |w| w.tag).is_err()).copied().collect()
}
