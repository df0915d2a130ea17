//! Static network filter parser
//!
//! Turns one line of ABP/uBO filter syntax into a [`ParsedFilter`]: action,
//! options, anchors and the token the filter will be indexed under.

use once_cell::sync::Lazy;
use regex::Regex;
use sv_core::filters::{ANCHOR_HOSTNAME, ANCHOR_LEFT, ANCHOR_RIGHT};
use sv_core::hash::{token_hash, NO_TOKEN_HASH};
use sv_core::types::{Party, RuleAction, TypeMask, TypeValue};

/// Reason a line is not a usable network filter.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty filter")]
    Empty,
    #[error("cosmetic filter")]
    Cosmetic,
    #[error("`$$` filters are not supported")]
    DoubleDollar,
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("bad domain option `{0}`")]
    BadDomainOption(String),
    #[error("bad regular expression: {0}")]
    BadRegex(String),
    #[error("csp reporting directives are not allowed")]
    BadCsp,
    #[error("filter applies only to unsupported types")]
    UnsupportedType,
    #[error("`^` right after `||`")]
    CaretAfterHostnameAnchor,
    #[error("`generichide` cannot be negated")]
    NegatedGenericHide,
    #[error("`redirect=` on an exception filter")]
    RedirectOnAllow,
    #[error("cannot encode compiled filter: {0}")]
    Encode(#[from] sv_core::compiled::CompiledLineError),
}

impl ParseError {
    /// Lines which are not network filters at all, as opposed to broken ones.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Empty | Self::Cosmetic)
    }
}

// =============================================================================
// Patterns
// =============================================================================

static RE_HOSTNAME_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[0-9a-z][0-9a-z.-]*[0-9a-z]$").expect("valid regex"));
static RE_HOSTNAME_RULE_CARET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[0-9a-z][0-9a-z.-]*[0-9a-z]\^?$").expect("valid regex"));
static RE_ISOLATE_HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*?\.)?([^\x00-\x24\x26-\x2C\x2F\x3A-\x5E\x60\x7B-\x7F]+)(.*)$").expect("valid regex")
});
static RE_BAD_CSP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|;)\s*report-(?:to|uri)\b").expect("valid regex"));
static RE_BAD_DOMAIN_OPT_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[*+?^${}()\[\]\\]").expect("valid regex"));
static RE_LEADING_STARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*+([^%0-9a-z])").expect("valid regex"));
static RE_TRAILING_STARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([^%0-9a-z])\*+$").expect("valid regex"));

static RE_HOSTNAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-z]+").expect("valid regex"));
static RE_GOOD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[%0-9a-z]{2,}").expect("valid regex"));
static RE_REGEX_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[%0-9A-Za-z]{2,}").expect("valid regex"));
static RE_REGEX_TOKEN_ABORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[(\[]").expect("valid regex"));
static RE_REGEX_BAD_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\\]\.|[*?{}\\])$").expect("valid regex"));
static RE_REGEX_BAD_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\\]\.|\\[dw]|[(\[{}?*]|$)").expect("valid regex"));

/// Tokens too common to discriminate between requests.
const BAD_TOKENS: &[&str] = &[
    "com", "google", "http", "https", "icon", "images", "img", "js", "net", "news", "www",
];

fn is_bad_token(token: &str) -> bool {
    BAD_TOKENS.contains(&token)
}

/// Type value for a filter option name.
fn normalized_type(option: &str) -> Option<TypeValue> {
    let type_value = match option {
        "beacon" | "other" | "ping" => TypeValue::Other,
        "css" | "stylesheet" => TypeValue::Stylesheet,
        "data" => TypeValue::Data,
        "doc" | "document" => TypeValue::MainFrame,
        "elemhide" | "generichide" => TypeValue::GenericHide,
        "font" => TypeValue::Font,
        "frame" | "subdocument" => TypeValue::SubFrame,
        "genericblock" | "webrtc" => TypeValue::Unsupported,
        "image" => TypeValue::Image,
        "inline-font" => TypeValue::InlineFont,
        "inline-script" => TypeValue::InlineScript,
        "media" => TypeValue::Media,
        "object" | "object-subrequest" => TypeValue::Object,
        "popunder" => TypeValue::Popunder,
        "popup" => TypeValue::Popup,
        "script" => TypeValue::Script,
        "xhr" | "xmlhttprequest" => TypeValue::XmlHttpRequest,
        "websocket" => TypeValue::WebSocket,
        _ => return None,
    };
    Some(type_value)
}

/// Punycode-encode a hostname containing non-ASCII characters.
fn to_ascii_hostname(hostname: &str) -> Option<String> {
    if hostname.is_ascii() {
        return Some(hostname.to_string());
    }
    match url::Host::parse(hostname) {
        Ok(url::Host::Domain(domain)) => Some(domain),
        _ => None,
    }
}

// =============================================================================
// Parsed Filter
// =============================================================================

/// Data directive carried by a filter (`csp=...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirective {
    pub data_type: String,
    pub value: String,
}

/// Structured form of one network filter.
#[derive(Debug, Clone)]
pub struct ParsedFilter {
    pub raw: String,
    pub action: RuleAction,
    pub important: bool,
    pub party: Party,
    pub types: TypeMask,
    /// Anchor bits (`ANCHOR_RIGHT | ANCHOR_LEFT | ANCHOR_HOSTNAME`)
    pub anchor: u8,
    /// Pattern text, lowercased, without anchors and options
    pub pattern: String,
    pub is_regex: bool,
    /// Pattern is a bare hostname
    pub hostname_pure: bool,
    /// Pattern contains `*` or `^`
    pub wildcarded: bool,
    /// Raw `domain=` value, empty when absent
    pub domain_opt: String,
    pub data: Option<DataDirective>,
    pub bad_filter: bool,
    pub redirect: bool,
    pub token: String,
    pub token_hash: u32,
    /// Byte offset of the token inside `pattern`
    pub token_beg: usize,
    first_party: bool,
    third_party: bool,
}

impl ParsedFilter {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            action: RuleAction::Block,
            important: false,
            party: Party::Any,
            types: TypeMask::empty(),
            anchor: 0,
            pattern: String::new(),
            is_regex: false,
            hostname_pure: false,
            wildcarded: false,
            domain_opt: String::new(),
            data: None,
            bad_filter: false,
            redirect: false,
            token: "*".to_string(),
            token_hash: NO_TOKEN_HASH,
            token_beg: 0,
            first_party: false,
            third_party: false,
        }
    }

    // =========================================================================
    // Options
    // =========================================================================

    fn parse_type_option(&mut self, type_value: TypeValue, negated: bool) {
        let bit = type_value.mask_bit();
        if !negated {
            self.types |= bit;
            return;
        }
        // Only discrete network types can be negated
        if !TypeMask::ALL_NETWORK.intersects(bit) {
            return;
        }
        if !self.types.intersects(TypeMask::ALL_NETWORK) {
            self.types |= TypeMask::ALL_NETWORK;
        }
        self.types.remove(bit);
    }

    fn parse_party_option(&mut self, first_party: bool, negated: bool) {
        if first_party != negated {
            self.first_party = true;
            self.party = if self.third_party { Party::Any } else { Party::First };
        } else {
            self.third_party = true;
            self.party = if self.first_party { Party::Any } else { Party::Third };
        }
    }

    fn parse_domain_option(value: &str) -> Result<String, ParseError> {
        let mut hostnames = Vec::new();
        for hostname in value.split('|') {
            let (prefix, bare) = match hostname.strip_prefix('~') {
                Some(bare) => ("~", bare),
                None => ("", hostname),
            };
            let ascii = to_ascii_hostname(bare)
                .ok_or_else(|| ParseError::BadDomainOption(value.to_string()))?;
            hostnames.push(format!("{prefix}{}", ascii.to_ascii_lowercase()));
        }
        let joined = hostnames.join("|");
        if joined.is_empty() || RE_BAD_DOMAIN_OPT_CHARS.is_match(&joined) {
            return Err(ParseError::BadDomainOption(value.to_string()));
        }
        Ok(joined)
    }

    fn parse_options(&mut self, options: &str) -> Result<(), ParseError> {
        for option in options.split(',') {
            let (negated, opt) = match option.strip_prefix('~') {
                Some(opt) => (true, opt),
                None => (false, option),
            };

            if opt == "third-party" || opt == "3p" {
                self.parse_party_option(false, negated);
                continue;
            }
            if opt == "elemhide" || opt == "generichide" {
                if negated {
                    return Err(ParseError::NegatedGenericHide);
                }
                self.parse_type_option(TypeValue::GenericHide, false);
                continue;
            }
            if opt.starts_with("redirect=") {
                if self.action == RuleAction::Block {
                    self.redirect = true;
                    continue;
                }
                return Err(ParseError::RedirectOnAllow);
            }
            if let Some(type_value) = normalized_type(opt) {
                self.parse_type_option(type_value, negated);
                continue;
            }
            if let Some(value) = opt.strip_prefix("domain=") {
                self.domain_opt = Self::parse_domain_option(value)?;
                continue;
            }
            if opt == "important" {
                self.important = true;
                continue;
            }
            if opt == "first-party" || opt == "1p" {
                self.parse_party_option(true, negated);
                continue;
            }
            if let Some(value) = opt.strip_prefix("csp=") {
                if value.is_empty() {
                    continue;
                }
                if RE_BAD_CSP.is_match(opt) {
                    return Err(ParseError::BadCsp);
                }
                self.parse_type_option(TypeValue::Data, negated);
                self.data = Some(DataDirective {
                    data_type: "csp".to_string(),
                    value: value.trim().to_string(),
                });
                continue;
            }
            if opt == "csp" && self.action == RuleAction::Allow {
                self.parse_type_option(TypeValue::Data, negated);
                self.data = Some(DataDirective {
                    data_type: "csp".to_string(),
                    value: String::new(),
                });
                continue;
            }
            if opt == "empty" {
                continue;
            }
            if opt == "badfilter" {
                self.bad_filter = true;
                continue;
            }
            return Err(ParseError::UnknownOption(option.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Token Selection
    // =========================================================================

    /// Choose the token this filter is indexed under.
    ///
    /// Filters with no usable token keep the no-token hash and are tested
    /// against every request.
    pub fn make_token(&mut self) {
        if self.is_regex {
            self.extract_token_from_regex();
            return;
        }
        if self.pattern == "*" {
            return;
        }

        let mut found = None;
        if self.anchor & ANCHOR_HOSTNAME != 0 && !self.wildcarded {
            found = RE_HOSTNAME_TOKEN.find(&self.pattern).map(|m| (m.start(), m.end()));
        }
        if found.is_none() {
            found = self.find_first_good_token();
        }
        if let Some((beg, end)) = found {
            self.set_token(beg, end);
        }
    }

    fn set_token(&mut self, beg: usize, end: usize) {
        self.token = self.pattern[beg..end].to_ascii_lowercase();
        self.token_hash = token_hash(&self.token);
        self.token_beg = beg;
    }

    /// First token not adjacent to a `*` and not on the deny-list. Falls
    /// back to the first deny-listed token.
    fn find_first_good_token(&self) -> Option<(usize, usize)> {
        let bytes = self.pattern.as_bytes();
        let mut bad_token = None;
        for m in RE_GOOD_TOKEN.find_iter(&self.pattern) {
            if m.start() != 0 && bytes[m.start() - 1] == b'*' {
                continue;
            }
            if bytes.get(m.end()) == Some(&b'*') {
                continue;
            }
            if is_bad_token(m.as_str()) {
                bad_token.get_or_insert((m.start(), m.end()));
                continue;
            }
            return Some((m.start(), m.end()));
        }
        bad_token
    }

    /// Literal run of a regex filter which every match must contain.
    fn extract_token_from_regex(&mut self) {
        let mut found = None;
        for m in RE_REGEX_TOKEN.find_iter(&self.pattern) {
            let prefix = &self.pattern[..m.start()];
            if RE_REGEX_TOKEN_ABORT.is_match(prefix) {
                break;
            }
            if RE_REGEX_BAD_PREFIX.is_match(prefix)
                || RE_REGEX_BAD_SUFFIX.is_match(&self.pattern[m.end()..])
            {
                continue;
            }
            found = Some((m.start(), m.end()));
            if !is_bad_token(&m.as_str().to_ascii_lowercase()) {
                break;
            }
        }
        if let Some((beg, end)) = found {
            self.set_token(beg, end);
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse one filter line.
///
/// The caller trims the line. The token is not chosen here; see
/// [`ParsedFilter::make_token`].
pub fn parse_filter(raw: &str) -> Result<ParsedFilter, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parsed = ParsedFilter::new(raw);

    // Plain hostname (hosts file)
    if RE_HOSTNAME_RULE.is_match(raw) {
        parsed.pattern = raw.to_ascii_lowercase();
        parsed.hostname_pure = true;
        parsed.anchor |= ANCHOR_HOSTNAME;
        return Ok(parsed);
    }

    if is_cosmetic(raw) {
        return Err(ParseError::Cosmetic);
    }

    // Must precede option parsing
    let mut s = raw;
    if let Some(rest) = s.strip_prefix("@@") {
        parsed.action = RuleAction::Allow;
        s = rest;
    }

    if !(s.starts_with('/') && s.ends_with('/')) {
        if let Some(pos) = s.rfind('$') {
            if s.contains("$$") {
                return Err(ParseError::DoubleDollar);
            }
            parsed.parse_options(&s[pos + 1..])?;
            if parsed.types.contains(TypeMask::UNSUPPORTED) {
                parsed.types.remove(TypeMask::UNSUPPORTED);
                if parsed.types.is_empty() {
                    return Err(ParseError::UnsupportedType);
                }
            }
            s = &s[..pos];
        }
    }

    // Regex literal
    if s.len() > 2 && s.starts_with('/') && s.ends_with('/') {
        let source = &s[1..s.len() - 1];
        if let Err(e) = Regex::new(&format!("(?i){source}")) {
            log::debug!("Bad regex filter {raw:?}: {e}");
            return Err(ParseError::BadRegex(e.to_string()));
        }
        parsed.is_regex = true;
        parsed.pattern = source.to_string();
        return Ok(parsed);
    }

    let mut pattern: String;
    if let Some(rest) = s.strip_prefix("||") {
        parsed.anchor |= ANCHOR_HOSTNAME;
        pattern = punycode_hostname_part(rest);

        if pattern.starts_with('^') {
            return Err(ParseError::CaretAfterHostnameAnchor);
        }

        // Plain hostname (ABP syntax)
        if RE_HOSTNAME_RULE_CARET.is_match(&pattern) {
            let hostname = pattern.strip_suffix('^').unwrap_or(&pattern);
            parsed.pattern = hostname.to_ascii_lowercase();
            parsed.hostname_pure = true;
            return Ok(parsed);
        }
    } else if let Some(rest) = s.strip_prefix('|') {
        parsed.anchor |= ANCHOR_LEFT;
        pattern = rest.to_string();
    } else {
        pattern = s.to_string();
    }

    if let Some(rest) = pattern.strip_suffix('|') {
        parsed.anchor |= ANCHOR_RIGHT;
        pattern = rest.to_string();
    }

    // Leading or trailing `*` means no anchoring on that side
    if pattern.starts_with('*') {
        pattern = RE_LEADING_STARS.replace(&pattern, "${1}").into_owned();
        parsed.anchor &= !(ANCHOR_LEFT | ANCHOR_HOSTNAME);
    }
    if pattern.ends_with('*') {
        pattern = RE_TRAILING_STARS.replace(&pattern, "${1}").into_owned();
        parsed.anchor &= !ANCHOR_RIGHT;
    }

    if pattern.is_empty() {
        pattern.push('*');
    }
    if pattern == "*" {
        parsed.anchor = 0;
    }

    parsed.wildcarded = pattern.contains(['^', '*']);
    parsed.pattern = pattern.to_ascii_lowercase();
    Ok(parsed)
}

fn is_cosmetic(raw: &str) -> bool {
    if raw.starts_with('#') {
        return true;
    }
    raw.match_indices('#')
        .any(|(pos, _)| matches!(raw.as_bytes().get(pos + 1), Some(b'#') | Some(b'@') | Some(b'?') | Some(b'$')))
}

/// Punycode the leading hostname of a `||` pattern if it is not ASCII.
fn punycode_hostname_part(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    let Some(caps) = RE_ISOLATE_HOSTNAME.captures(s) else {
        return s.to_string();
    };
    let prefix = caps.get(1).map_or("", |m| m.as_str());
    let hostname = &caps[2];
    let rest = &caps[3];
    match to_ascii_hostname(hostname) {
        Some(ascii) => format!("{prefix}{ascii}{rest}"),
        None => s.to_string(),
    }
}
