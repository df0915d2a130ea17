//! Matcher variant family
//!
//! Every static network filter compiles to one [`Filter`] variant. All
//! variants share one contract:
//!
//! - [`Filter::matches`] tests a request at a token offset
//! - [`Filter::compile`] produces the serialized [`CompiledFilter`]
//! - [`Filter::log_data`] describes the filter for explanations
//!
//! Derived state (compiled regexes, origin tries) is built on first use
//! behind a once-cell, so a frozen filter can be shared across threads.

mod origin;
mod pattern;

pub use origin::{is_hostname_or_subdomain, OriginSet, OriginSetKind};
pub use pattern::{
    raw_to_plain_str, raw_to_regex_str, LazyRegex, ANCHOR_HOSTNAME, ANCHOR_LEFT, ANCHOR_RIGHT,
    SEPARATOR_RE,
};

use serde::Serialize;

use crate::compiled::CompiledFilter;
use crate::url::get_host_position;

// =============================================================================
// Match Context
// =============================================================================

/// Per-request values shared by every filter tested for that request.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    /// Normalized (lowercased) request URL
    pub url: &'a str,
    /// Hostname of the document issuing the request
    pub page_hostname: &'a str,
    /// Hostname of the request
    pub request_hostname: &'a str,
    /// Byte range of the request hostname inside `url`
    hostname_range: Option<(usize, usize)>,
}

impl<'a> MatchContext<'a> {
    pub fn new(url: &'a str, page_hostname: &'a str, request_hostname: &'a str) -> Self {
        let hostname_range = if request_hostname.is_empty() {
            None
        } else {
            find_hostname(url, request_hostname)
        };
        Self {
            url,
            page_hostname,
            request_hostname,
            hostname_range,
        }
    }

    /// Whether a match starting at `pos` starts on a label boundary of the
    /// request hostname.
    #[inline]
    pub fn is_hn_anchored(&self, pos: usize) -> bool {
        let Some((beg, end)) = self.hostname_range else {
            return false;
        };
        if pos < beg || pos >= end {
            return false;
        }
        pos == beg || self.url.as_bytes()[pos - 1] == b'.'
    }
}

/// Locate `hostname` in the authority of `url`, never in its scheme.
fn find_hostname(url: &str, hostname: &str) -> Option<(usize, usize)> {
    let (host_beg, host_end) = get_host_position(url)?;
    let authority = url.get(host_beg..host_end)?;
    if authority.eq_ignore_ascii_case(hostname) {
        return Some((host_beg, host_end));
    }
    let beg = host_beg + authority.find(hostname)?;
    Some((beg, beg + hostname.len()))
}

#[inline]
fn starts_with_at(haystack: &str, needle: &str, pos: usize) -> bool {
    haystack
        .as_bytes()
        .get(pos..)
        .is_some_and(|tail| tail.starts_with(needle.as_bytes()))
}

// =============================================================================
// Log Data
// =============================================================================

/// Human-readable description of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogData {
    /// Filter text, without category-derived options
    pub raw: String,
    /// Equivalent regular expression
    pub regex: String,
    pub compiled: CompiledFilter,
    /// Filter-specific options (`domain=`, data directives)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<String>,
}

impl LogData {
    fn new(raw: String, regex: String, compiled: CompiledFilter) -> Self {
        Self {
            raw,
            regex,
            compiled,
            opts: None,
        }
    }

    fn append_opt(&mut self, opt: String) {
        self.opts = Some(match self.opts.take() {
            Some(opts) => format!("{opts},{opt}"),
            None => opt,
        });
    }

    fn prepend_opt(&mut self, opt: String) {
        self.opts = Some(match self.opts.take() {
            Some(opts) => format!("{opt},{opts}"),
            None => opt,
        });
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Wildcarded pattern matched through a lazily built regex.
#[derive(Debug, Clone)]
pub struct GenericPattern {
    pub s: String,
    pub anchor: u8,
    re: LazyRegex,
}

impl GenericPattern {
    pub fn new(s: String, anchor: u8) -> Self {
        Self {
            s,
            anchor,
            re: LazyRegex::new(),
        }
    }

    #[inline]
    fn is_match(&self, url: &str) -> bool {
        self.re.is_match(|| raw_to_regex_str(&self.s, self.anchor), url)
    }
}

/// One static network filter.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every request (`*`)
    True,
    /// Substring whose token starts `token_beg` bytes into the pattern
    Plain { s: String, token_beg: usize },
    /// Substring whose token starts one byte into the pattern
    PlainPrefix1 { s: String },
    /// Request hostname equals or is a subdomain of `s`
    PlainHostname { s: String },
    /// URL starts with `s`
    PlainLeftAnchored { s: String },
    /// URL ends with `s`
    PlainRightAnchored { s: String },
    /// URL equals `s`
    ExactMatch { s: String },
    /// `s` starts at the token, on a hostname label boundary
    PlainHnAnchored { s: String },
    Generic(GenericPattern),
    GenericHnAnchored(GenericPattern),
    GenericHnAndRightAnchored(GenericPattern),
    /// Regex literal, matched case-insensitively
    Regex { source: String, re: LazyRegex },
    OriginHit { hostname: String, wrapped: Box<Filter> },
    OriginMiss { hostname: String, wrapped: Box<Filter> },
    OriginSet { set: OriginSet, wrapped: Box<Filter> },
    /// Carries a data directive instead of a block/allow signal
    DataHolder { data_type: String, data_str: String, wrapped: Box<Filter> },
    /// One hostname of a hostname dictionary
    HostnameDict { hostname: String },
}

impl Filter {
    /// Build a filter from its compiled form.
    pub fn from_compiled(compiled: CompiledFilter) -> Self {
        let boxed = |c: Box<CompiledFilter>| Box::new(Self::from_compiled(*c));
        match compiled {
            CompiledFilter::True => Self::True,
            CompiledFilter::Plain(s, token_beg) => Self::Plain { s, token_beg },
            CompiledFilter::PlainPrefix1(s) => Self::PlainPrefix1 { s },
            CompiledFilter::PlainHostname(s) => Self::PlainHostname { s },
            CompiledFilter::PlainLeftAnchored(s) => Self::PlainLeftAnchored { s },
            CompiledFilter::PlainRightAnchored(s) => Self::PlainRightAnchored { s },
            CompiledFilter::ExactMatch(s) => Self::ExactMatch { s },
            CompiledFilter::PlainHnAnchored(s) => Self::PlainHnAnchored { s },
            CompiledFilter::Generic(s, anchor) => Self::Generic(GenericPattern::new(s, anchor)),
            CompiledFilter::GenericHnAnchored(s) => {
                Self::GenericHnAnchored(GenericPattern::new(s, ANCHOR_HOSTNAME))
            }
            CompiledFilter::GenericHnAndRightAnchored(s) => Self::GenericHnAndRightAnchored(
                GenericPattern::new(s, ANCHOR_HOSTNAME | ANCHOR_RIGHT),
            ),
            CompiledFilter::Regex(source) => Self::Regex {
                source,
                re: LazyRegex::new(),
            },
            CompiledFilter::OriginHit(hostname, wrapped) => Self::OriginHit {
                hostname,
                wrapped: boxed(wrapped),
            },
            CompiledFilter::OriginMiss(hostname, wrapped) => Self::OriginMiss {
                hostname,
                wrapped: boxed(wrapped),
            },
            CompiledFilter::OriginHitSet(domain_opt, wrapped) => Self::OriginSet {
                set: OriginSet::new(domain_opt, OriginSetKind::Hit),
                wrapped: boxed(wrapped),
            },
            CompiledFilter::OriginMissSet(domain_opt, wrapped) => Self::OriginSet {
                set: OriginSet::new(domain_opt, OriginSetKind::Miss),
                wrapped: boxed(wrapped),
            },
            CompiledFilter::OriginMixedSet(domain_opt, wrapped) => Self::OriginSet {
                set: OriginSet::new(domain_opt, OriginSetKind::Mixed),
                wrapped: boxed(wrapped),
            },
            CompiledFilter::DataHolder(data_type, data_str, wrapped) => Self::DataHolder {
                data_type,
                data_str,
                wrapped: boxed(wrapped),
            },
            CompiledFilter::HostnameDict(hostname) => Self::HostnameDict { hostname },
        }
    }

    /// Test a request. `token_beg` is the offset in the URL of the token
    /// under which this filter was found.
    pub fn matches(&self, cx: &MatchContext<'_>, token_beg: usize) -> bool {
        let url = cx.url;
        match self {
            Self::True => true,
            Self::Plain { s, token_beg: beg } => token_beg
                .checked_sub(*beg)
                .is_some_and(|pos| starts_with_at(url, s, pos)),
            Self::PlainPrefix1 { s } => token_beg
                .checked_sub(1)
                .is_some_and(|pos| starts_with_at(url, s, pos)),
            Self::PlainHostname { s } | Self::HostnameDict { hostname: s } => {
                is_hostname_or_subdomain(cx.request_hostname, s)
            }
            Self::PlainLeftAnchored { s } => url.starts_with(s.as_str()),
            Self::PlainRightAnchored { s } => url.ends_with(s.as_str()),
            Self::ExactMatch { s } => url == s,
            Self::PlainHnAnchored { s } => {
                starts_with_at(url, s, token_beg) && cx.is_hn_anchored(token_beg)
            }
            Self::Generic(p) | Self::GenericHnAnchored(p) | Self::GenericHnAndRightAnchored(p) => {
                p.is_match(url)
            }
            Self::Regex { source, re } => re.is_match(|| format!("(?i){source}"), url),
            Self::OriginHit { hostname, wrapped } => {
                is_hostname_or_subdomain(cx.page_hostname, hostname)
                    && wrapped.matches(cx, token_beg)
            }
            Self::OriginMiss { hostname, wrapped } => {
                !is_hostname_or_subdomain(cx.page_hostname, hostname)
                    && wrapped.matches(cx, token_beg)
            }
            Self::OriginSet { set, wrapped } => {
                set.accepts(cx.page_hostname) && wrapped.matches(cx, token_beg)
            }
            Self::DataHolder { wrapped, .. } => wrapped.matches(cx, token_beg),
        }
    }

    /// Serialized form of this filter.
    pub fn compile(&self) -> CompiledFilter {
        match self {
            Self::True => CompiledFilter::True,
            Self::Plain { s, token_beg } => CompiledFilter::Plain(s.clone(), *token_beg),
            Self::PlainPrefix1 { s } => CompiledFilter::PlainPrefix1(s.clone()),
            Self::PlainHostname { s } => CompiledFilter::PlainHostname(s.clone()),
            Self::PlainLeftAnchored { s } => CompiledFilter::PlainLeftAnchored(s.clone()),
            Self::PlainRightAnchored { s } => CompiledFilter::PlainRightAnchored(s.clone()),
            Self::ExactMatch { s } => CompiledFilter::ExactMatch(s.clone()),
            Self::PlainHnAnchored { s } => CompiledFilter::PlainHnAnchored(s.clone()),
            Self::Generic(p) => CompiledFilter::Generic(p.s.clone(), p.anchor),
            Self::GenericHnAnchored(p) => CompiledFilter::GenericHnAnchored(p.s.clone()),
            Self::GenericHnAndRightAnchored(p) => {
                CompiledFilter::GenericHnAndRightAnchored(p.s.clone())
            }
            Self::Regex { source, .. } => CompiledFilter::Regex(source.clone()),
            Self::OriginHit { hostname, wrapped } => {
                CompiledFilter::OriginHit(hostname.clone(), Box::new(wrapped.compile()))
            }
            Self::OriginMiss { hostname, wrapped } => {
                CompiledFilter::OriginMiss(hostname.clone(), Box::new(wrapped.compile()))
            }
            Self::OriginSet { set, wrapped } => {
                let domain_opt = set.domain_opt.clone();
                match set.kind {
                    OriginSetKind::Hit => CompiledFilter::OriginHitSet(domain_opt, Box::new(wrapped.compile())),
                    OriginSetKind::Miss => {
                        CompiledFilter::OriginMissSet(domain_opt, Box::new(wrapped.compile()))
                    }
                    OriginSetKind::Mixed => {
                        CompiledFilter::OriginMixedSet(domain_opt, Box::new(wrapped.compile()))
                    }
                }
            }
            Self::DataHolder {
                data_type,
                data_str,
                wrapped,
            } => CompiledFilter::DataHolder(data_type.clone(), data_str.clone(), Box::new(wrapped.compile())),
            Self::HostnameDict { hostname } => CompiledFilter::HostnameDict(hostname.clone()),
        }
    }

    /// Describe this filter.
    pub fn log_data(&self) -> LogData {
        let compiled = self.compile();
        match self {
            Self::True => LogData::new("*".to_string(), "^".to_string(), compiled),
            Self::Plain { s, .. } | Self::PlainPrefix1 { s } => {
                LogData::new(raw_to_plain_str(s, 0), raw_to_regex_str(s, 0), compiled)
            }
            Self::PlainHostname { s } | Self::HostnameDict { hostname: s } => LogData::new(
                format!("||{s}^"),
                raw_to_regex_str(&format!("{s}^"), 0),
                compiled,
            ),
            Self::PlainLeftAnchored { s } => {
                LogData::new(format!("|{s}"), raw_to_regex_str(s, ANCHOR_LEFT), compiled)
            }
            Self::PlainRightAnchored { s } => {
                LogData::new(format!("{s}|"), raw_to_regex_str(s, ANCHOR_RIGHT), compiled)
            }
            Self::ExactMatch { s } => LogData::new(
                format!("|{s}|"),
                raw_to_regex_str(s, ANCHOR_LEFT | ANCHOR_RIGHT),
                compiled,
            ),
            Self::PlainHnAnchored { s } => {
                LogData::new(format!("||{s}"), raw_to_regex_str(s, 0), compiled)
            }
            Self::Generic(p) => {
                let mut raw = raw_to_plain_str(&p.s, p.anchor);
                if p.anchor & ANCHOR_LEFT != 0 {
                    raw.insert(0, '|');
                }
                if p.anchor & ANCHOR_RIGHT != 0 {
                    raw.push('|');
                }
                LogData::new(raw, raw_to_regex_str(&p.s, p.anchor), compiled)
            }
            Self::GenericHnAnchored(p) => LogData::new(
                format!("||{}", p.s),
                raw_to_regex_str(&p.s, p.anchor & ANCHOR_RIGHT),
                compiled,
            ),
            Self::GenericHnAndRightAnchored(p) => LogData::new(
                format!("||{}|", p.s),
                raw_to_regex_str(&p.s, p.anchor & ANCHOR_RIGHT),
                compiled,
            ),
            Self::Regex { source, .. } => {
                LogData::new(format!("/{source}/"), source.clone(), compiled)
            }
            Self::OriginHit { hostname, wrapped } => {
                Self::origin_log_data(wrapped, compiled, hostname.clone())
            }
            Self::OriginMiss { hostname, wrapped } => {
                Self::origin_log_data(wrapped, compiled, format!("~{hostname}"))
            }
            Self::OriginSet { set, wrapped } => {
                Self::origin_log_data(wrapped, compiled, set.domain_opt.clone())
            }
            Self::DataHolder {
                data_type,
                data_str,
                wrapped,
            } => {
                let mut out = wrapped.log_data();
                out.compiled = compiled;
                let opt = if data_str.is_empty() {
                    data_type.clone()
                } else {
                    format!("{data_type}={data_str}")
                };
                out.prepend_opt(opt);
                out
            }
        }
    }

    fn origin_log_data(wrapped: &Filter, compiled: CompiledFilter, domains: String) -> LogData {
        let mut out = wrapped.log_data();
        out.compiled = compiled;
        out.append_opt(format!("domain={domains}"));
        out
    }

    /// Directive value of a data-holding filter.
    pub fn data(&self) -> Option<(&str, &str)> {
        match self {
            Self::DataHolder {
                data_type,
                data_str,
                ..
            } => Some((data_type, data_str)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx(url: &str) -> MatchContext<'_> {
        MatchContext::new(url, "example.com", crate::url::extract_host(url))
    }

    #[test]
    fn test_hn_anchored_positions() {
        let url = "https://sub.ads.example.com/x";
        let cx = cx(url);
        assert!(cx.is_hn_anchored(8));
        assert!(cx.is_hn_anchored(12));
        assert!(!cx.is_hn_anchored(13));
        assert!(!cx.is_hn_anchored(28));
    }

    #[test]
    fn test_hostname_range_skips_scheme() {
        let url = "http://tp/ads.js";
        let cx = MatchContext::new(url, "example.com", "tp");
        assert!(cx.is_hn_anchored(7));
        assert!(!cx.is_hn_anchored(2));

        let url = "https://h/x";
        let cx = MatchContext::new(url, "example.com", "h");
        assert!(cx.is_hn_anchored(8));
        assert!(!cx.is_hn_anchored(0));

        let filter = Filter::PlainHnAnchored { s: "tp/ads".to_string() };
        assert!(filter.matches(&MatchContext::new("http://tp/ads.js", "", "tp"), 7));
        assert!(!filter.matches(&MatchContext::new("http://x.tp.com/tp/ads", "", "x.tp.com"), 16));
    }

    #[test]
    fn test_plain_variants() {
        let url = "https://x.com/ads/banner.gif";
        let cx = cx(url);
        let plain = Filter::Plain {
            s: "/ads/".to_string(),
            token_beg: 1,
        };
        assert!(plain.matches(&cx, 14));
        assert!(!plain.matches(&cx, 0));

        let prefix1 = Filter::PlainPrefix1 { s: "/banner".to_string() };
        assert!(prefix1.matches(&cx, 18));

        assert!(Filter::PlainLeftAnchored { s: "https://x.com".to_string() }.matches(&cx, 0));
        assert!(Filter::PlainRightAnchored { s: ".gif".to_string() }.matches(&cx, 0));
        assert!(Filter::ExactMatch { s: url.to_string() }.matches(&cx, 0));
        assert!(!Filter::ExactMatch { s: "https://x.com".to_string() }.matches(&cx, 0));
    }

    #[test]
    fn test_plain_hn_anchored_rejects_mid_label() {
        let filter = Filter::PlainHnAnchored { s: "ads.example.com".to_string() };
        let good = "http://sub.ads.example.com/x";
        assert!(filter.matches(&cx(good), 11));
        let bad = "http://badads.example.com/x";
        assert!(!filter.matches(&cx(bad), 10));
    }

    #[test]
    fn test_generic_variants() {
        let generic = Filter::from_compiled(CompiledFilter::Generic("/ads/*.gif".to_string(), 0));
        assert!(generic.matches(&cx("https://x.com/ads/a/b.gif"), 0));
        assert!(!generic.matches(&cx("https://x.com/ads/a/b.png"), 0));

        let hn = Filter::from_compiled(CompiledFilter::GenericHnAnchored("ads.*.com^".to_string()));
        assert!(hn.matches(&cx("https://ads.foo.com/"), 0));
        assert!(!hn.matches(&cx("https://xads.foo.com/"), 0));

        let hn_right = Filter::from_compiled(CompiledFilter::GenericHnAndRightAnchored(
            "x.com/*.js".to_string(),
        ));
        assert!(hn_right.matches(&cx("https://x.com/a.js"), 0));
        assert!(!hn_right.matches(&cx("https://x.com/a.js?v=1"), 0));
    }

    #[test]
    fn test_regex_is_case_insensitive() {
        let filter = Filter::from_compiled(CompiledFilter::Regex("ads[0-9]+".to_string()));
        assert!(filter.matches(&cx("https://x.com/ADS42"), 0));
        assert!(!filter.matches(&cx("https://x.com/ads"), 0));
    }

    #[test]
    fn test_origin_modifiers() {
        let inner = Box::new(CompiledFilter::True);
        let hit = Filter::from_compiled(CompiledFilter::OriginHit("example.com".to_string(), inner.clone()));
        let miss = Filter::from_compiled(CompiledFilter::OriginMiss("example.com".to_string(), inner.clone()));
        let url = "https://cdn.net/";
        let on_page = MatchContext::new(url, "www.example.com", "cdn.net");
        let off_page = MatchContext::new(url, "other.org", "cdn.net");
        assert!(hit.matches(&on_page, 0));
        assert!(!hit.matches(&off_page, 0));
        assert!(!miss.matches(&on_page, 0));
        assert!(miss.matches(&off_page, 0));

        let mixed = Filter::from_compiled(CompiledFilter::OriginMixedSet(
            "example.com|~shop.example.com".to_string(),
            inner,
        ));
        assert!(mixed.matches(&on_page, 0));
        let shop = MatchContext::new(url, "shop.example.com", "cdn.net");
        assert!(!mixed.matches(&shop, 0));
    }

    #[test]
    fn test_compile_roundtrip_is_identity() {
        let compiled = CompiledFilter::DataHolder(
            "csp".to_string(),
            "script-src 'none'".to_string(),
            Box::new(CompiledFilter::OriginHitSet(
                "a.com|b.com".to_string(),
                Box::new(CompiledFilter::Generic("ads*x".to_string(), 2)),
            )),
        );
        assert_eq!(Filter::from_compiled(compiled.clone()).compile(), compiled);
    }

    #[test]
    fn test_log_data() {
        let filter = Filter::from_compiled(CompiledFilter::DataHolder(
            "csp".to_string(),
            "default-src 'self'".to_string(),
            Box::new(CompiledFilter::OriginHit(
                "example.com".to_string(),
                Box::new(CompiledFilter::PlainHnAnchored("ads.net".to_string())),
            )),
        ));
        let log = filter.log_data();
        assert_eq!(log.raw, "||ads.net");
        assert_eq!(log.regex, "ads\\.net");
        assert_eq!(
            log.opts.as_deref(),
            Some("csp=default-src 'self',domain=example.com")
        );

        let generic = Filter::from_compiled(CompiledFilter::Generic("/ads/".to_string(), 0));
        assert_eq!(generic.log_data().raw, "/ads/*");

        let host = Filter::HostnameDict { hostname: "ads.net".to_string() };
        assert_eq!(host.log_data().raw, "||ads.net^");
    }
}
