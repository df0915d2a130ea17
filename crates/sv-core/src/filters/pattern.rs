//! Pattern text helpers and lazily compiled regular expressions

use once_cell::sync::OnceCell;
use regex::Regex;

// =============================================================================
// Anchor Bits
// =============================================================================

/// Anchored to the end of the URL.
pub const ANCHOR_RIGHT: u8 = 0b001;
/// Anchored to the start of the URL.
pub const ANCHOR_LEFT: u8 = 0b010;
/// Anchored to a label boundary of the URL hostname.
pub const ANCHOR_HOSTNAME: u8 = 0b100;

const HOSTNAME_ANCHOR_RE: &str = "^[a-z-]+://(?:[^/?#]+\\.)?";
const HOSTNAME_ANCHOR_DOT_RE: &str = "^[a-z-]+://(?:[^/?#]+)?";

/// Regex equivalent of a filter separator (`^`).
pub const SEPARATOR_RE: &str = "(?:[^%.0-9a-z_-]|$)";

// =============================================================================
// Pattern Conversion
// =============================================================================

/// Convert a filter pattern into an equivalent regular expression.
///
/// Literals are escaped, `^` becomes a separator class, a single leading
/// and trailing `*` are dropped and the remaining `*` become lazy runs.
pub fn raw_to_regex_str(s: &str, anchor: u8) -> String {
    let s = s.strip_prefix('*').unwrap_or(s);
    let s = s.strip_suffix('*').unwrap_or(s);

    let mut body = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        match c {
            '.' | '+' | '?' | '$' | '{' | '}' | '(' | ')' | '|' | '[' | ']' | '\\' => {
                body.push('\\');
                body.push(c);
            }
            '^' => body.push_str(SEPARATOR_RE),
            '*' => body.push_str("[^ ]*?"),
            _ => body.push(c),
        }
    }

    let mut out = String::with_capacity(body.len() + 32);
    if anchor & ANCHOR_HOSTNAME != 0 {
        out.push_str(if body.starts_with("\\.") {
            HOSTNAME_ANCHOR_DOT_RE
        } else {
            HOSTNAME_ANCHOR_RE
        });
    } else if anchor & ANCHOR_LEFT != 0 {
        out.push('^');
    }
    out.push_str(&body);
    if anchor & ANCHOR_RIGHT != 0 {
        out.push('$');
    }
    out
}

/// Filter text for a plain pattern. An unanchored pattern which looks like
/// a regex literal gets a trailing `*` so it reads back as a plain filter.
pub fn raw_to_plain_str(s: &str, anchor: u8) -> String {
    if anchor == 0 && s.len() > 2 && s.starts_with('/') && s.ends_with('/') {
        return format!("{s}*");
    }
    s.to_string()
}

// =============================================================================
// Lazy Regex
// =============================================================================

/// Regular expression compiled on first use and cached.
///
/// A source which fails to compile is logged once and never matches.
#[derive(Debug, Default)]
pub struct LazyRegex {
    cell: OnceCell<Option<Regex>>,
}

impl LazyRegex {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn is_match(&self, source: impl FnOnce() -> String, haystack: &str) -> bool {
        let re = self.cell.get_or_init(|| {
            let source = source();
            match Regex::new(&source) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Discarding unusable filter regex {source:?}: {e}");
                    None
                }
            }
        });
        re.as_ref().is_some_and(|re| re.is_match(haystack))
    }
}

impl Clone for LazyRegex {
    fn clone(&self) -> Self {
        Self::new()
    }
}
