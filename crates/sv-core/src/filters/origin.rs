//! Origin (`domain=`) tests against the document hostname

use once_cell::sync::OnceCell;

use crate::trie::HostnameTrie;

/// Whether `haystack` equals `hostname` or is one of its subdomains.
#[inline]
pub fn is_hostname_or_subdomain(haystack: &str, hostname: &str) -> bool {
    let Some(offset) = haystack.len().checked_sub(hostname.len()) else {
        return false;
    };
    // First-byte peek: most visits are a miss
    if haystack.as_bytes().get(offset) != hostname.as_bytes().first() {
        return false;
    }
    haystack.ends_with(hostname) && (offset == 0 || haystack.as_bytes()[offset - 1] == b'.')
}

/// Kind of origin hostname set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginSetKind {
    /// Document must be in the set
    Hit,
    /// Document must not be in the set (every entry negated)
    Miss,
    /// Document must be in the positive subset and not in the negated one
    Mixed,
}

/// A `|`-separated `domain=` list with tries built on first use.
#[derive(Debug)]
pub struct OriginSet {
    pub domain_opt: String,
    pub kind: OriginSetKind,
    one_of: OnceCell<HostnameTrie>,
    none_of: OnceCell<HostnameTrie>,
}

impl OriginSet {
    pub fn new(domain_opt: String, kind: OriginSetKind) -> Self {
        Self {
            domain_opt,
            kind,
            one_of: OnceCell::new(),
            none_of: OnceCell::new(),
        }
    }

    fn one_of(&self) -> &HostnameTrie {
        self.one_of.get_or_init(|| {
            self.domain_opt
                .split('|')
                .filter(|hn| !hn.starts_with('~'))
                .collect()
        })
    }

    fn none_of(&self) -> &HostnameTrie {
        self.none_of.get_or_init(|| {
            self.domain_opt
                .split('|')
                .filter_map(|hn| hn.strip_prefix('~'))
                .collect()
        })
    }

    /// Test the document hostname against the set.
    pub fn accepts(&self, page_hostname: &str) -> bool {
        match self.kind {
            OriginSetKind::Hit => self.one_of().matches(page_hostname).is_some(),
            OriginSetKind::Miss => self.none_of().matches(page_hostname).is_none(),
            OriginSetKind::Mixed => {
                self.one_of().matches(page_hostname).is_some()
                    && self.none_of().matches(page_hostname).is_none()
            }
        }
    }
}

impl Clone for OriginSet {
    fn clone(&self) -> Self {
        Self::new(self.domain_opt.clone(), self.kind)
    }
}
