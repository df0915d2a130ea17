//! Compiled line emission
//!
//! Picks the matcher variant for a [`ParsedFilter`], wraps it with its
//! origin and data modifiers, and expands it into one atomic line per
//! request type.

use once_cell::sync::Lazy;
use regex::Regex;
use sv_core::compiled::{CompiledFilter, CompiledLine, CompiledLineError, CompiledLines, Section};
use sv_core::filters::{ANCHOR_HOSTNAME, ANCHOR_LEFT, ANCHOR_RIGHT};
use sv_core::hash::{DOT_TOKEN_HASH, NO_TOKEN_HASH};
use sv_core::redirect::RedirectEngine;
use sv_core::types::{CategoryBits, TypeValue};

use crate::parser::ParsedFilter;

static RE_ALL_NEGATED_DOMAINS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^~(?:[^|~]+\|~)+[^|~]+$").expect("valid regex"));

/// Token hash and matcher for a parsed filter.
///
/// `parsed` must already have its token chosen.
pub fn compile_filter(parsed: &ParsedFilter) -> (u32, CompiledFilter) {
    // Pure hostnames with no modifiers go to the hostname dictionary
    if parsed.hostname_pure && parsed.domain_opt.is_empty() && parsed.data.is_none() {
        return (DOT_TOKEN_HASH, CompiledFilter::HostnameDict(parsed.pattern.clone()));
    }

    let mut compiled = pattern_filter(parsed);

    if !parsed.domain_opt.is_empty() {
        compiled = origin_filter(&parsed.domain_opt, compiled);
    }
    if let Some(data) = &parsed.data {
        compiled = CompiledFilter::DataHolder(
            data.data_type.clone(),
            data.value.clone(),
            Box::new(compiled),
        );
    }
    (parsed.token_hash, compiled)
}

fn pattern_filter(parsed: &ParsedFilter) -> CompiledFilter {
    let s = parsed.pattern.clone();
    if parsed.is_regex {
        return CompiledFilter::Regex(s);
    }
    if parsed.hostname_pure {
        return CompiledFilter::PlainHostname(s);
    }
    if s == "*" {
        return CompiledFilter::True;
    }

    let has_token = parsed.token_hash != NO_TOKEN_HASH;
    if parsed.anchor == ANCHOR_HOSTNAME | ANCHOR_RIGHT {
        return CompiledFilter::GenericHnAndRightAnchored(s);
    }
    if parsed.anchor == ANCHOR_HOSTNAME {
        if !parsed.wildcarded && has_token && parsed.token_beg == 0 {
            return CompiledFilter::PlainHnAnchored(s);
        }
        return CompiledFilter::GenericHnAnchored(s);
    }
    if parsed.wildcarded || !has_token {
        return CompiledFilter::Generic(s, parsed.anchor);
    }
    match parsed.anchor {
        ANCHOR_LEFT => CompiledFilter::PlainLeftAnchored(s),
        ANCHOR_RIGHT => CompiledFilter::PlainRightAnchored(s),
        a if a == ANCHOR_LEFT | ANCHOR_RIGHT => CompiledFilter::ExactMatch(s),
        _ if parsed.token_beg == 1 => CompiledFilter::PlainPrefix1(s),
        _ => CompiledFilter::Plain(s, parsed.token_beg),
    }
}

fn origin_filter(domain_opt: &str, wrapped: CompiledFilter) -> CompiledFilter {
    let wrapped = Box::new(wrapped);
    if !domain_opt.contains('|') {
        return match domain_opt.strip_prefix('~') {
            Some(hostname) => CompiledFilter::OriginMiss(hostname.to_string(), wrapped),
            None => CompiledFilter::OriginHit(domain_opt.to_string(), wrapped),
        };
    }
    if !domain_opt.contains('~') {
        return CompiledFilter::OriginHitSet(domain_opt.to_string(), wrapped);
    }
    if RE_ALL_NEGATED_DOMAINS.is_match(domain_opt) {
        return CompiledFilter::OriginMissSet(domain_opt.to_string(), wrapped);
    }
    CompiledFilter::OriginMixedSet(domain_opt.to_string(), wrapped)
}

/// Category bits shared by every line of the filter, before the type.
pub fn descriptor_bits(parsed: &ParsedFilter) -> CategoryBits {
    CategoryBits::new(parsed.action, parsed.important, parsed.party, TypeValue::NoType)
}

/// Append the atomic lines of `parsed` to `out`.
///
/// A typed filter yields one line per request type. `badfilter` lines go to
/// the bad-filter section. Typed filters with `redirect=` also yield the
/// directives `redirects` produces for them.
pub fn emit_lines(
    parsed: &ParsedFilter,
    redirects: &dyn RedirectEngine,
    out: &mut CompiledLines,
) -> Result<usize, CompiledLineError> {
    let (token_hash, compiled) = compile_filter(parsed);
    let section = if parsed.bad_filter {
        Section::BadFilter
    } else {
        Section::Network
    };
    let bits = descriptor_bits(parsed);

    let mut emitted = 0;
    if parsed.types.is_empty() {
        out.push(section, &CompiledLine::Filter(bits, token_hash, compiled))?;
        emitted += 1;
    } else {
        for type_value in parsed.types.type_values() {
            let line = CompiledLine::Filter(bits.with_type(type_value), token_hash, compiled.clone());
            out.push(section, &line)?;
            emitted += 1;
        }
    }

    if parsed.redirect && !parsed.bad_filter && !parsed.types.is_empty() {
        let redirect_bits = CategoryBits::BLOCK.with_type(TypeValue::Redirect);
        for directive in redirects.compile_rule_from_static_filter(&parsed.raw) {
            out.push(Section::Network, &CompiledLine::Redirect(redirect_bits, directive))?;
            emitted += 1;
        }
    }
    Ok(emitted)
}
