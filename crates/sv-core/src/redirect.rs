//! Redirect directives
//!
//! Static filters carrying `redirect=` produce redirect directives at
//! compile time. The directives bypass the category index and are handed
//! to a [`RedirectEngine`] at freeze time.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Collaborator which owns redirect rules.
pub trait RedirectEngine: Send + Sync + std::fmt::Debug {
    /// Turn the raw text of a static filter with `redirect=` into zero or
    /// more directives.
    fn compile_rule_from_static_filter(&self, raw: &str) -> Vec<String>;

    /// Accept one compiled directive at freeze time.
    fn from_compiled_rule(&mut self, directive: &str);

    /// Every directive accepted so far, for persistence.
    fn compiled_rules(&self) -> Vec<String>;

    fn reset(&mut self);
}

static RE_REDIRECT_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\|\|([^/:?#^]+)|\*)?([^$]+)?\$([^$]+)$").expect("valid redirect filter regex")
});

/// Request types a redirect directive can apply to.
const REDIRECT_TYPES: &[&str] = &[
    "beacon", "css", "font", "image", "media", "object", "other", "ping", "script", "stylesheet",
    "sub_frame", "subdocument", "xhr", "xmlhttprequest",
];

/// Default [`RedirectEngine`]: keeps directives in a set.
///
/// A directive is `srcHostname \t desHostname \t type \t pattern \t resource`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectDirectives {
    rules: BTreeSet<String>,
}

impl RedirectDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(String::as_str)
    }
}

impl RedirectEngine for RedirectDirectives {
    fn compile_rule_from_static_filter(&self, raw: &str) -> Vec<String> {
        let Some(caps) = RE_REDIRECT_FILTER.captures(raw) else {
            return Vec::new();
        };
        let des = caps.get(1).map_or("", |m| m.as_str());
        let path = caps.get(2).map_or("", |m| m.as_str());
        let pattern = format!("{des}{path}");

        let mut resource = "";
        let mut types = Vec::new();
        let mut src_hostnames = Vec::new();
        for option in caps[3].split(',') {
            if let Some(value) = option.strip_prefix("redirect=") {
                resource = value;
            } else if let Some(value) = option.strip_prefix("domain=") {
                src_hostnames.extend(value.split('|').filter(|hn| !hn.is_empty()));
            } else if option == "first-party" || option == "1p" {
                src_hostnames.push(if des.is_empty() { "*" } else { des });
            } else if REDIRECT_TYPES.contains(&option) {
                types.push(option);
            }
        }
        if resource.is_empty() || types.is_empty() {
            return Vec::new();
        }

        let des = if des.is_empty() { "*" } else { des };
        if src_hostnames.is_empty() {
            src_hostnames.push("*");
        }

        let mut out = Vec::new();
        for src in src_hostnames.iter().filter(|hn| !hn.starts_with('~')) {
            for type_name in &types {
                out.push(format!("{src}\t{des}\t{type_name}\t{pattern}\t{resource}"));
            }
        }
        out
    }

    fn from_compiled_rule(&mut self, directive: &str) {
        self.rules.insert(directive.to_string());
    }

    fn compiled_rules(&self) -> Vec<String> {
        self.rules.iter().cloned().collect()
    }

    fn reset(&mut self) {
        self.rules.clear();
    }
}
