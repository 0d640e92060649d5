//! Fixed-capacity mapping from integer tag to a positive real occurrence
//! count, with LRU-by-minimum-count eviction and proportional rescaling.
//!
//! A plain `Vec<Option<Entry>>` rather than a `HashMap`: capacity stays in
//! the single digits to low hundreds for every cache this engine builds, and
//! a linear scan over a small contiguous `Vec` beats hashing at that size —
//! the same tradeoff the teacher's `Policy<E>` makes for per-infoset action
//! distributions.

use crate::{Count, Tag};

#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: Tag,
    count: Count,
}

/// A bounded tag→count histogram. See module docs.
#[derive(Debug, Clone)]
pub struct TagCountCache {
    entries: Vec<Option<Entry>>,
    capacity: usize,
    max_count: Count,
    sample_count: Count,
}

impl TagCountCache {
    pub fn new(capacity: usize, max_count: Count) -> Self {
        Self { entries: vec![None; capacity], capacity, max_count, sample_count: 0.0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_count(&self) -> Count {
        self.max_count
    }

    pub fn sample_count(&self) -> Count {
        self.sample_count
    }

    /// True once every slot has been claimed by some tag.
    pub fn is_full(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    fn index_of(&self, tag: Tag) -> Option<usize> {
        self.entries.iter().position(|e| matches!(e, Some(e) if e.tag == tag))
    }

    fn first_empty(&self) -> Option<usize> {
        self.entries.iter().position(Option::is_none)
    }

    /// Index of the minimum-count occupied entry, ties broken by first-found.
    fn min_count_index(&self) -> usize {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|e| (i, e.count)))
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).expect("count is never NaN"))
            .map(|(i, _)| i)
            .expect("cache has at least one occupied slot when full")
    }

    pub fn count_of(&self, tag: Tag) -> Count {
        self.index_of(tag).and_then(|i| self.entries[i]).map(|e| e.count).unwrap_or(0.0)
    }

    pub fn delete(&mut self, index: usize) {
        if let Some(e) = self.entries[index].take() {
            self.sample_count -= e.count;
        }
    }

    pub fn clear(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
        self.sample_count = 0.0;
    }

    /// Valid (tag, count) pairs currently held, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = (Tag, Count)> + '_ {
        self.entries.iter().filter_map(|e| e.map(|e| (e.tag, e.count)))
    }

    /// Accumulate `add` against `tag`, evicting and rescaling as needed.
    pub fn note(&mut self, tag: Tag, add: Count) {
        let index = match self.index_of(tag) {
            Some(i) => i,
            None => match self.first_empty() {
                Some(i) => {
                    self.entries[i] = Some(Entry { tag, count: 0.0 });
                    i
                }
                None => {
                    let victim = self.min_count_index();
                    let evicted = self.entries[victim].take().expect("min_count_index is occupied");
                    self.sample_count -= evicted.count;
                    self.entries[victim] = Some(Entry { tag, count: 0.0 });
                    victim
                }
            },
        };

        let cur = {
            let e = self.entries[index].as_mut().expect("index just populated");
            e.count += add;
            e.count
        };
        self.sample_count += add;

        if self.sample_count > self.max_count {
            let sample = self.sample_count;
            let max = self.max_count;
            if cur < max {
                let ratio = (max - cur) / (sample - cur);
                for (i, e) in self.entries.iter_mut().enumerate() {
                    if i == index {
                        continue;
                    }
                    if let Some(e) = e {
                        e.count *= ratio;
                    }
                }
            } else {
                self.entries[index].as_mut().expect("index just populated").count = max;
                for (i, e) in self.entries.iter_mut().enumerate() {
                    if i == index {
                        continue;
                    }
                    if let Some(e) = e {
                        e.count = 0.0;
                    }
                }
            }
            self.sample_count = max;
        }
    }

    /// Delete every valid entry whose count falls below `threshold`
    /// ("history forgetting", spec.md §4.G step 10).
    pub fn delete_below(&mut self, threshold: Count) {
        for e in &mut self.entries {
            if let Some(entry) = e {
                if entry.count < threshold {
                    self.sample_count -= entry.count;
                    *e = None;
                }
            }
        }
    }

    /// Scale every valid count so the total becomes `min(new_total, max_count)`.
    pub fn rescale_total(&mut self, new_total: Count) {
        if self.sample_count == 0.0 {
            return;
        }
        let target = new_total.min(self.max_count);
        let ratio = target / self.sample_count;
        for e in self.entries.iter_mut().flatten() {
            e.count *= ratio;
        }
        self.sample_count = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_accumulates_and_evicts_minimum() {
        let mut cache = TagCountCache::new(2, 1000.0);
        cache.note(1, 5.0);
        cache.note(2, 1.0);
        assert!(cache.is_full());
        cache.note(3, 2.0); // evicts tag 2 (min count 1.0)
        assert_eq!(cache.count_of(2), 0.0);
        assert_eq!(cache.count_of(1), 5.0);
        assert_eq!(cache.count_of(3), 2.0);
    }

    #[test]
    fn note_clamps_to_max_count_p4_p5() {
        let mut cache = TagCountCache::new(4, 10.0);
        for t in 0..4 {
            cache.note(t, 4.0);
        }
        assert!(cache.sample_count() <= 10.0 + 1e-9);
        let sum: Count = cache.entries().map(|(_, c)| c).sum();
        assert!((sum - cache.sample_count()).abs() <= 1e-9 * cache.max_count());
    }

    #[test]
    fn note_overflow_branch_where_touched_exceeds_max() {
        let mut cache = TagCountCache::new(2, 5.0);
        cache.note(1, 1.0);
        cache.note(2, 1.0);
        cache.note(1, 10.0); // touched entry alone exceeds max
        assert_eq!(cache.count_of(1), 5.0);
        assert_eq!(cache.count_of(2), 0.0);
        assert_eq!(cache.sample_count(), 5.0);
    }

    #[test]
    fn rescale_total_is_noop_when_empty() {
        let mut cache = TagCountCache::new(2, 10.0);
        cache.rescale_total(5.0);
        assert_eq!(cache.sample_count(), 0.0);
    }

    #[test]
    fn rescale_total_scales_proportionally() {
        let mut cache = TagCountCache::new(2, 100.0);
        cache.note(1, 4.0);
        cache.note(2, 6.0);
        cache.rescale_total(5.0);
        assert!((cache.sample_count() - 5.0).abs() < 1e-9);
        assert!((cache.count_of(1) - 2.0).abs() < 1e-9);
        assert!((cache.count_of(2) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn delete_and_clear() {
        let mut cache = TagCountCache::new(2, 10.0);
        cache.note(1, 3.0);
        cache.delete(0);
        assert_eq!(cache.count_of(1), 0.0);
        assert_eq!(cache.sample_count(), 0.0);
        cache.note(2, 4.0);
        cache.clear();
        assert_eq!(cache.sample_count(), 0.0);
        assert_eq!(cache.entries().count(), 0);
    }
}
