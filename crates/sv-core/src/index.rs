//! Category index
//!
//! Filters are grouped by [`CategoryBits`] and, inside a category, by the
//! hash of their token. Each token owns one slot in an arena. A slot
//! escalates in place as filters arrive:
//!
//! ```text
//! Single --(2nd filter)--> Pair --(3rd filter)--> Bucket
//! ```
//!
//! Hostname-pure filters with no token of their own share the dot-token
//! slot of their category, which holds a hostname trie.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bucket::{FilterBucket, FilterPair};
use crate::filters::{Filter, MatchContext};
use crate::hash::{DOT_TOKEN_HASH, NO_TOKEN_HASH};
use crate::selfie::{CategorySelfie, SelfieError, SlotSelfie};
use crate::trie::HostnameTrie;
use crate::types::CategoryBits;
use crate::url::UrlToken;

/// Handle into the slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

/// Matcher slot for one category/token pair.
#[derive(Debug)]
pub enum Slot {
    Single(Arc<Filter>),
    Pair(FilterPair),
    Bucket(FilterBucket),
    HostnameDict(HostnameTrie),
}

impl Slot {
    fn matches(&self, cx: &MatchContext<'_>, token_beg: usize) -> Option<Arc<Filter>> {
        match self {
            Self::Single(filter) => filter.matches(cx, token_beg).then(|| Arc::clone(filter)),
            Self::Pair(pair) => pair.matches(cx, token_beg),
            Self::Bucket(bucket) => bucket.matches(cx, token_beg),
            Self::HostnameDict(dict) => dict.matches(cx.request_hostname).map(|pos| {
                Arc::new(Filter::HostnameDict {
                    hostname: cx.request_hostname[pos..].to_string(),
                })
            }),
        }
    }

    /// Number of filters held by this slot.
    pub fn size(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Pair(_) => 2,
            Self::Bucket(bucket) => bucket.size(),
            Self::HostnameDict(dict) => dict.len(),
        }
    }

    fn to_selfie(&self) -> SlotSelfie {
        match self {
            Self::Single(filter) => SlotSelfie::Single(filter.compile()),
            Self::Pair(pair) => SlotSelfie::Pair(pair.f1.compile(), pair.f2.compile()),
            Self::Bucket(bucket) => SlotSelfie::Bucket(bucket.to_selfie()),
            Self::HostnameDict(dict) => SlotSelfie::HostnameDict(dict.to_bytes()),
        }
    }

    fn from_selfie(selfie: SlotSelfie) -> Result<Self, SelfieError> {
        let arc = |c| Arc::new(Filter::from_compiled(c));
        Ok(match selfie {
            SlotSelfie::Single(c) => Self::Single(arc(c)),
            SlotSelfie::Pair(c1, c2) => Self::Pair(FilterPair::new(arc(c1), arc(c2))),
            SlotSelfie::Bucket(bucket) => Self::Bucket(FilterBucket::from_selfie(bucket)?),
            SlotSelfie::HostnameDict(bytes) => Self::HostnameDict(HostnameTrie::from_bytes(&bytes)?),
        })
    }
}

/// A filter which matched, with the key it was found under.
#[derive(Debug, Clone)]
pub struct MatchedFilter {
    pub category: CategoryBits,
    pub token_hash: u32,
    pub filter: Arc<Filter>,
}

/// Size of one slot, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SlotStat {
    pub category: CategoryBits,
    pub token_hash: u32,
    pub size: usize,
}

// =============================================================================
// Index
// =============================================================================

/// Two-level index: category bits, then token hash, then slot.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    categories: HashMap<CategoryBits, HashMap<u32, SlotId>>,
    slots: Vec<Slot>,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of categories holding at least one slot.
    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.categories.clear();
        self.slots.clear();
    }

    fn push_slot(&mut self, slot: Slot) -> SlotId {
        let id = SlotId(self.slots.len() as u32);
        self.slots.push(slot);
        id
    }

    /// Add a filter under `bits` and `token_hash`, escalating the slot.
    pub fn insert(&mut self, bits: CategoryBits, token_hash: u32, filter: Filter) {
        if token_hash == DOT_TOKEN_HASH {
            self.insert_hostname(bits, filter);
            return;
        }

        let existing = self
            .categories
            .get(&bits)
            .and_then(|tokens| tokens.get(&token_hash))
            .copied();
        let Some(id) = existing else {
            let id = self.push_slot(Slot::Single(Arc::new(filter)));
            self.categories.entry(bits).or_default().insert(token_hash, id);
            return;
        };

        let slot = &mut self.slots[id.0 as usize];
        let escalated = match slot {
            Slot::Single(f1) => Slot::Pair(FilterPair::new(Arc::clone(f1), Arc::new(filter))),
            Slot::Pair(pair) => Slot::Bucket(pair.clone().upgrade(Arc::new(filter))),
            Slot::Bucket(bucket) => {
                bucket.add(filter);
                return;
            }
            Slot::HostnameDict(_) => {
                log::warn!("Token {token_hash:#x} collides with a hostname slot, filter dropped");
                return;
            }
        };
        *slot = escalated;
    }

    fn insert_hostname(&mut self, bits: CategoryBits, filter: Filter) {
        let hostname = match &filter {
            Filter::HostnameDict { hostname } | Filter::PlainHostname { s: hostname } => hostname,
            other => {
                log::warn!("Non-hostname filter under the hostname token: {other:?}");
                return;
            }
        };

        let existing = self
            .categories
            .get(&bits)
            .and_then(|tokens| tokens.get(&DOT_TOKEN_HASH))
            .copied();
        match existing {
            Some(id) => {
                if let Slot::HostnameDict(dict) = &mut self.slots[id.0 as usize] {
                    dict.add(hostname);
                }
            }
            None => {
                let mut dict = HostnameTrie::new();
                dict.add(hostname);
                let id = self.push_slot(Slot::HostnameDict(dict));
                self.categories.entry(bits).or_default().insert(DOT_TOKEN_HASH, id);
            }
        }
    }

    /// Find the first filter of one category matching the request.
    ///
    /// The hostname slot is tried first, then each URL token at its
    /// offset, then the token-less slot at offset 0.
    pub fn match_tokens(
        &self,
        bits: CategoryBits,
        cx: &MatchContext<'_>,
        tokens: &[UrlToken],
    ) -> Option<MatchedFilter> {
        let slots = self.categories.get(&bits)?;
        let hit = |token_hash: u32, token_beg: usize| {
            let id = slots.get(&token_hash)?;
            let filter = self.slots[id.0 as usize].matches(cx, token_beg)?;
            Some(MatchedFilter {
                category: bits,
                token_hash,
                filter,
            })
        };

        if let Some(found) = hit(DOT_TOKEN_HASH, 0) {
            return Some(found);
        }
        for token in tokens {
            if let Some(found) = hit(token.hash, token.start) {
                return Some(found);
            }
        }
        hit(NO_TOKEN_HASH, 0)
    }

    /// Build bucket and hostname tries and compact them.
    pub fn optimize(&mut self) {
        for slot in &mut self.slots {
            match slot {
                Slot::Bucket(bucket) => bucket.optimize(),
                Slot::HostnameDict(dict) => dict.optimize(),
                Slot::Single(_) | Slot::Pair(_) => {}
            }
        }
    }

    /// Slots holding more than one filter, largest first.
    pub fn histogram(&self) -> Vec<SlotStat> {
        let mut out: Vec<SlotStat> = self
            .categories
            .iter()
            .flat_map(|(&category, tokens)| {
                tokens.iter().map(move |(&token_hash, id)| (category, token_hash, *id))
            })
            .filter_map(|(category, token_hash, id)| {
                let size = self.slots[id.0 as usize].size();
                (size > 1).then_some(SlotStat {
                    category,
                    token_hash,
                    size,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then(a.category.cmp(&b.category))
                .then(a.token_hash.cmp(&b.token_hash))
        });
        out
    }

    // =========================================================================
    // Selfie
    // =========================================================================

    /// Persisted form, sorted by category then token.
    pub fn to_selfie(&self) -> Vec<CategorySelfie> {
        let mut categories: Vec<CategorySelfie> = self
            .categories
            .iter()
            .map(|(&bits, tokens)| {
                let mut slots: Vec<(u32, SlotSelfie)> = tokens
                    .iter()
                    .map(|(&token_hash, id)| (token_hash, self.slots[id.0 as usize].to_selfie()))
                    .collect();
                slots.sort_by_key(|(token_hash, _)| *token_hash);
                CategorySelfie { bits, slots }
            })
            .collect();
        categories.sort_by_key(|c| c.bits);
        categories
    }

    pub fn from_selfie(categories: Vec<CategorySelfie>) -> Result<Self, SelfieError> {
        let mut index = Self::new();
        for category in categories {
            for (token_hash, slot) in category.slots {
                let id = index.push_slot(Slot::from_selfie(slot)?);
                index
                    .categories
                    .entry(category.bits)
                    .or_default()
                    .insert(token_hash, id);
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::token_hash;
    use crate::url::{Tokenizer, UrlTokenizer};

    fn plain_hn(s: &str) -> Filter {
        Filter::PlainHnAnchored { s: s.to_string() }
    }

    fn find(index: &CategoryIndex, url: &str) -> Option<MatchedFilter> {
        let tokenized = UrlTokenizer.tokenize(url);
        let host = crate::url::extract_host(&tokenized.url);
        let cx = MatchContext::new(&tokenized.url, "page.com", host);
        index.match_tokens(CategoryBits::BLOCK, &cx, &tokenized.tokens)
    }

    #[test]
    fn test_escalation_single_pair_bucket() {
        let mut index = CategoryIndex::new();
        let th = token_hash("ads");
        index.insert(CategoryBits::BLOCK, th, plain_hn("ads.a.com"));
        assert!(matches!(index.slots[0], Slot::Single(_)));
        index.insert(CategoryBits::BLOCK, th, plain_hn("ads.b.com"));
        assert!(matches!(index.slots[0], Slot::Pair(_)));
        index.insert(CategoryBits::BLOCK, th, plain_hn("ads.c.com"));
        assert!(matches!(index.slots[0], Slot::Bucket(_)));
        index.insert(CategoryBits::BLOCK, th, plain_hn("ads.d.com"));
        assert_eq!(index.slot_count(), 1);
        assert_eq!(index.slots[0].size(), 4);

        for host in ["ads.a.com", "ads.b.com", "ads.c.com", "ads.d.com"] {
            let found = find(&index, &format!("https://{host}/x")).unwrap();
            assert_eq!(found.token_hash, th);
        }
        assert!(find(&index, "https://ads.e.com/x").is_none());
    }

    #[test]
    fn test_hostname_slot() {
        let mut index = CategoryIndex::new();
        index.insert(
            CategoryBits::BLOCK,
            DOT_TOKEN_HASH,
            Filter::HostnameDict { hostname: "tracker.net".to_string() },
        );
        index.insert(
            CategoryBits::BLOCK,
            DOT_TOKEN_HASH,
            Filter::HostnameDict { hostname: "ads.org".to_string() },
        );
        assert_eq!(index.slot_count(), 1);

        let found = find(&index, "https://cdn.tracker.net/a.js").unwrap();
        assert_eq!(found.token_hash, DOT_TOKEN_HASH);
        assert!(matches!(&*found.filter, Filter::HostnameDict { hostname } if hostname == "tracker.net"));
        assert!(find(&index, "https://nottracker.net/").is_none());
    }

    #[test]
    fn test_no_token_slot() {
        let mut index = CategoryIndex::new();
        index.insert(CategoryBits::BLOCK, NO_TOKEN_HASH, Filter::True);
        let found = find(&index, "https://a.b/").unwrap();
        assert_eq!(found.token_hash, NO_TOKEN_HASH);
    }

    #[test]
    fn test_histogram_and_selfie() {
        let mut index = CategoryIndex::new();
        let th = token_hash("ads");
        for host in ["ads.a.com", "ads.b.com", "ads.c.com"] {
            index.insert(CategoryBits::BLOCK, th, plain_hn(host));
        }
        index.insert(CategoryBits::ALLOW, token_hash("x"), plain_hn("x.com"));
        index.optimize();

        let histogram = index.histogram();
        assert_eq!(histogram.len(), 1);
        assert_eq!(histogram[0].size, 3);

        let restored = CategoryIndex::from_selfie(index.to_selfie()).unwrap();
        assert_eq!(restored.category_count(), 2);
        assert!(find(&restored, "https://ads.b.com/").is_some());
    }
}
