//! Filter pairs and buckets
//!
//! Filters sharing a category and token escalate from a single filter to a
//! pair, then to a bucket. A bucket moves same-shaped literal filters
//! (prefix-1 and hostname-anchored) into prefix tries once enough of them
//! accumulate, and promotes hot filters toward the front of its list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::filters::{Filter, MatchContext};
use crate::selfie::BucketSelfie;
use crate::trie::{PrefixTrie, TrieError};

/// Number of same-shaped literals a bucket holds in its list before the
/// next one moves them all into a trie.
pub const BUCKET_TRIE_THRESHOLD: usize = 3;

/// Longest literal moved into a bucket trie.
pub const MAX_TRIEABLE_LEN: usize = 255;

/// List position from which a hit gets promoted.
pub const PROMOTION_START: usize = 16;

// =============================================================================
// Pair
// =============================================================================

/// Two filters tried in order.
#[derive(Debug, Clone)]
pub struct FilterPair {
    pub f1: Arc<Filter>,
    pub f2: Arc<Filter>,
}

impl FilterPair {
    pub fn new(f1: Arc<Filter>, f2: Arc<Filter>) -> Self {
        Self { f1, f2 }
    }

    /// Returns the filter which matched.
    pub fn matches(&self, cx: &MatchContext<'_>, token_beg: usize) -> Option<Arc<Filter>> {
        if self.f1.matches(cx, token_beg) {
            return Some(Arc::clone(&self.f1));
        }
        if self.f2.matches(cx, token_beg) {
            return Some(Arc::clone(&self.f2));
        }
        None
    }

    /// Upgrade to a bucket holding both filters plus `f3`.
    pub fn upgrade(self, f3: Arc<Filter>) -> FilterBucket {
        FilterBucket::from_filters(vec![self.f1, self.f2, f3])
    }
}

// =============================================================================
// Bucket
// =============================================================================

/// Which bucket trie a filter is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trieable {
    Prefix1,
    HnAnchored,
}

impl Trieable {
    /// Literals longer than [`MAX_TRIEABLE_LEN`] stay in the list and are
    /// not counted toward the trie threshold.
    fn of(filter: &Filter) -> Option<(Self, &str)> {
        let (kind, s) = match filter {
            Filter::PlainPrefix1 { s } => (Self::Prefix1, s),
            Filter::PlainHnAnchored { s } => (Self::HnAnchored, s),
            _ => return None,
        };
        (s.len() <= MAX_TRIEABLE_LEN).then_some((kind, s.as_str()))
    }
}

/// Open list of filters plus up to two literal tries.
#[derive(Debug, Default)]
pub struct FilterBucket {
    filters: RwLock<Vec<Arc<Filter>>>,
    promoted: AtomicUsize,
    prefix1_count: usize,
    hn_anchored_count: usize,
    prefix1_trie: Option<PrefixTrie>,
    hn_anchored_trie: Option<PrefixTrie>,
}

impl FilterBucket {
    /// Bucket over an initial list of filters. No trie is built yet.
    pub fn from_filters(filters: Vec<Arc<Filter>>) -> Self {
        let mut bucket = Self::default();
        for filter in &filters {
            match Trieable::of(filter) {
                Some((Trieable::Prefix1, _)) => bucket.prefix1_count += 1,
                Some((Trieable::HnAnchored, _)) => bucket.hn_anchored_count += 1,
                None => {}
            }
        }
        bucket.filters = RwLock::new(filters);
        bucket
    }

    fn filters_mut(&mut self) -> &mut Vec<Arc<Filter>> {
        self.filters.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a filter while the bucket is being built.
    pub fn add(&mut self, filter: Filter) {
        if let Some((kind, s)) = Trieable::of(&filter) {
            if self.add_trieable(kind, s) {
                return;
            }
        }
        self.filters_mut().push(Arc::new(filter));
    }

    /// Returns true if the literal went into a trie.
    fn add_trieable(&mut self, kind: Trieable, s: &str) -> bool {
        let (count, trie) = match kind {
            Trieable::Prefix1 => (&mut self.prefix1_count, &mut self.prefix1_trie),
            Trieable::HnAnchored => (&mut self.hn_anchored_count, &mut self.hn_anchored_trie),
        };
        if let Some(trie) = trie.as_mut() {
            trie.add(s);
            return true;
        }
        if *count == BUCKET_TRIE_THRESHOLD {
            let mut new_trie = PrefixTrie::new();
            new_trie.add(s);
            *trie = Some(new_trie);
            self.transfer_trieable(kind);
            return true;
        }
        *count += 1;
        false
    }

    /// Move every eligible literal of `kind` from the list into its trie.
    fn transfer_trieable(&mut self, kind: Trieable) {
        let mut moved = Vec::new();
        self.filters_mut().retain(|f| match Trieable::of(f) {
            Some((k, s)) if k == kind => {
                moved.push(s.to_string());
                false
            }
            _ => true,
        });
        let trie = match kind {
            Trieable::Prefix1 => &mut self.prefix1_trie,
            Trieable::HnAnchored => &mut self.hn_anchored_trie,
        };
        if let Some(trie) = trie {
            for s in &moved {
                trie.add(s);
            }
        }
    }

    /// Total number of filters, including trie entries.
    pub fn size(&self) -> usize {
        let listed = self.filters.read().unwrap_or_else(PoisonError::into_inner).len();
        listed
            + self.prefix1_trie.as_ref().map_or(0, PrefixTrie::len)
            + self.hn_anchored_trie.as_ref().map_or(0, PrefixTrie::len)
    }

    /// Returns the filter which matched. Trie hits are reported as the
    /// literal filter they stand for.
    pub fn matches(&self, cx: &MatchContext<'_>, token_beg: usize) -> Option<Arc<Filter>> {
        if let (Some(trie), Some(beg)) = (&self.prefix1_trie, token_beg.checked_sub(1)) {
            if let Some(s) = trie.matches(cx.url, beg).and_then(|end| cx.url.get(beg..end)) {
                return Some(Arc::new(Filter::PlainPrefix1 { s: s.to_string() }));
            }
        }
        if let Some(trie) = &self.hn_anchored_trie {
            if cx.is_hn_anchored(token_beg) {
                if let Some(s) = trie
                    .matches(cx.url, token_beg)
                    .and_then(|end| cx.url.get(token_beg..end))
                {
                    return Some(Arc::new(Filter::PlainHnAnchored { s: s.to_string() }));
                }
            }
        }

        let (i, hit) = {
            let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
            let i = filters.iter().position(|f| f.matches(cx, token_beg))?;
            (i, Arc::clone(&filters[i]))
        };
        if i >= PROMOTION_START {
            self.promote(i);
        }
        Some(hit)
    }

    /// Swap a hit filter toward the front of the list. Skipped when
    /// another thread holds the list.
    fn promote(&self, i: usize) {
        let Ok(mut filters) = self.filters.try_write() else {
            return;
        };
        let mut pivot = filters.len() >> 1;
        while i < pivot {
            pivot >>= 1;
            if pivot < PROMOTION_START {
                break;
            }
        }
        if i <= pivot || i >= filters.len() {
            return;
        }
        let j = self.promoted.fetch_add(1, Ordering::Relaxed) % pivot;
        filters.swap(i, j);
        log::trace!("promoted bucket filter {i} to {j}");
    }

    /// Compact storage after the build phase.
    pub fn optimize(&mut self) {
        self.filters_mut().shrink_to_fit();
        if let Some(trie) = &mut self.prefix1_trie {
            trie.optimize();
        }
        if let Some(trie) = &mut self.hn_anchored_trie {
            trie.optimize();
        }
    }

    pub fn to_selfie(&self) -> BucketSelfie {
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        BucketSelfie {
            filters: filters.iter().map(|f| f.compile()).collect(),
            prefix1_trie: self.prefix1_trie.as_ref().map(PrefixTrie::to_bytes),
            hn_anchored_trie: self.hn_anchored_trie.as_ref().map(PrefixTrie::to_bytes),
        }
    }

    pub fn from_selfie(selfie: BucketSelfie) -> Result<Self, TrieError> {
        let filters = selfie
            .filters
            .into_iter()
            .map(|c| Arc::new(Filter::from_compiled(c)))
            .collect();
        let mut bucket = Self::from_filters(filters);
        bucket.prefix1_trie = selfie.prefix1_trie.as_deref().map(PrefixTrie::from_bytes).transpose()?;
        bucket.hn_anchored_trie = selfie
            .hn_anchored_trie
            .as_deref()
            .map(PrefixTrie::from_bytes)
            .transpose()?;
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx(url: &str) -> MatchContext<'_> {
        MatchContext::new(url, "", crate::url::extract_host(url))
    }

    fn prefix1(s: &str) -> Filter {
        Filter::PlainPrefix1 { s: s.to_string() }
    }

    #[test]
    fn test_pair_reports_hit() {
        let pair = FilterPair::new(
            Arc::new(prefix1("/ads/")),
            Arc::new(Filter::PlainRightAnchored { s: ".gif".to_string() }),
        );
        let hit = pair.matches(&cx("http://x.com/a.gif"), 14).unwrap();
        assert!(matches!(*hit, Filter::PlainRightAnchored { .. }));
        assert!(pair.matches(&cx("http://x.com/a.png"), 14).is_none());
    }

    #[test]
    fn test_trie_created_after_threshold() {
        let mut bucket = FilterPair::new(Arc::new(prefix1("/ads/")), Arc::new(prefix1("/adv/")))
            .upgrade(Arc::new(prefix1("/adx/")));
        assert!(bucket.prefix1_trie.is_none());
        assert_eq!(bucket.prefix1_count, 3);

        bucket.add(prefix1("/adz/"));
        assert!(bucket.prefix1_trie.is_some());
        assert_eq!(bucket.filters.read().unwrap().len(), 0);
        assert_eq!(bucket.size(), 4);

        let hit = bucket.matches(&cx("http://x.com/adx/1.js"), 13).unwrap();
        assert!(matches!(&*hit, Filter::PlainPrefix1 { s } if s == "/adx/"));
    }

    #[test]
    fn test_long_literals_not_counted_for_trie() {
        let long = |c: char| prefix1(&format!("/{}/", c.to_string().repeat(MAX_TRIEABLE_LEN)));
        let mut bucket =
            FilterPair::new(Arc::new(long('a')), Arc::new(long('b'))).upgrade(Arc::new(long('c')));
        assert_eq!(bucket.prefix1_count, 0);

        bucket.add(long('d'));
        bucket.add(prefix1("/ads/"));
        bucket.add(prefix1("/adv/"));
        bucket.add(prefix1("/adw/"));
        assert!(bucket.prefix1_trie.is_none());
        assert_eq!(bucket.prefix1_count, 3);

        bucket.add(prefix1("/adx/"));
        assert_eq!(bucket.prefix1_trie.as_ref().map(PrefixTrie::len), Some(4));
        assert_eq!(bucket.filters.read().unwrap().len(), 4);
        assert_eq!(bucket.size(), 8);
    }

    #[test]
    fn test_hn_anchored_trie_requires_label_boundary() {
        let mut bucket = FilterBucket::default();
        for s in ["ads.a.com", "ads.b.com", "ads.c.com", "ads.d.com"] {
            bucket.add(Filter::PlainHnAnchored { s: s.to_string() });
        }
        assert!(bucket.hn_anchored_trie.is_some());
        assert!(bucket.matches(&cx("http://ads.c.com/"), 7).is_some());
        assert!(bucket.matches(&cx("http://x.ads.c.com/"), 9).is_some());
        assert!(bucket.matches(&cx("http://xads.c.com/"), 8).is_none());
    }

    #[test]
    fn test_escalation_keeps_match_outcomes() {
        let url = "http://x.com/banner/ad.png";
        let filters = [
            Filter::PlainRightAnchored { s: ".gif".to_string() },
            Filter::PlainRightAnchored { s: "ad.png".to_string() },
            Filter::PlainLeftAnchored { s: "https://".to_string() },
        ];
        let pair = FilterPair::new(Arc::new(filters[0].clone()), Arc::new(filters[1].clone()));
        assert!(pair.matches(&cx(url), 14).is_some());
        let bucket = pair.upgrade(Arc::new(filters[2].clone()));
        assert!(bucket.matches(&cx(url), 14).is_some());
        assert!(bucket.matches(&cx("http://x.com/other.png"), 14).is_none());
    }

    #[test]
    fn test_hot_filter_moves_forward() {
        let mut bucket = FilterBucket::default();
        for i in 0..40 {
            bucket.add(Filter::ExactMatch { s: format!("http://x.com/{i}") });
        }
        let url = "http://x.com/39";
        let hit_pos = |b: &FilterBucket| {
            b.filters
                .read()
                .unwrap()
                .iter()
                .position(|f| matches!(&**f, Filter::ExactMatch { s } if s == url))
                .unwrap()
        };
        assert_eq!(hit_pos(&bucket), 39);
        assert!(bucket.matches(&cx(url), 0).is_some());
        assert!(hit_pos(&bucket) < 39);
        assert_eq!(bucket.size(), 40);
    }

    #[test]
    fn test_selfie_roundtrip() {
        let mut bucket = FilterBucket::default();
        for s in ["/a1/", "/a2/", "/a3/", "/a4/"] {
            bucket.add(prefix1(s));
        }
        bucket.add(Filter::True);
        let restored = FilterBucket::from_selfie(bucket.to_selfie()).unwrap();
        assert_eq!(restored.size(), 5);
        assert!(restored.matches(&cx("http://x.com/a3/"), 13).is_some());
    }
}
