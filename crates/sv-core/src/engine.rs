//! Decision Engine
//!
//! A [`FilterEngine`] is the frozen, read-only product of a filter list
//! load. It answers three kinds of queries:
//!
//! - block/allow decisions for a request ([`FilterEngine::match_request`])
//! - the generic-hide exception check ([`FilterEngine::match_generic_hide`])
//! - data directives for a URL ([`FilterEngine::match_data`])
//!
//! Precedence for a network request:
//!
//! 1. an `important` block filter blocks, no exception applies
//! 2. no block filter: no match
//! 3. an exception filter: allow
//! 4. otherwise block

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::compiled::CompiledLine;
use crate::data::{DataFilterEntry, DataFilterStore};
use crate::filters::{Filter, MatchContext};
use crate::hash::NO_TOKEN_HASH;
use crate::index::{CategoryIndex, MatchedFilter, SlotStat};
use crate::redirect::{RedirectDirectives, RedirectEngine};
use crate::selfie::{self, EngineSelfie, SelfieError};
use crate::types::{
    CategoryBits, Decision, FilterCounts, GenericHide, Party, RequestContext, RuleAction, TypeValue,
};
use crate::url::{extract_host, TokenizedUrl, Tokenizer, UrlToken, UrlTokenizer};

// =============================================================================
// Results
// =============================================================================

/// Why a request got its decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explanation {
    /// Filter text rebuilt from the matcher and its category
    pub raw: String,
    /// Equivalent regular expression
    pub regex: String,
    /// Compiled line of the matcher
    pub compiled: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<String>,
    /// 1 for a blocking filter, 2 for an exception
    pub result: u8,
    pub token_hash: u32,
    pub source: &'static str,
}

/// Data directives collected for one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataMatches {
    /// Directive values in effect
    pub directives: Vec<String>,
    /// One entry per contributing filter
    pub log: Vec<Explanation>,
}

/// Engine size summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub counts: FilterCounts,
    pub filter_count: usize,
    pub categories: usize,
    pub slots: usize,
    pub data_filters: usize,
    pub redirects: usize,
}

// =============================================================================
// Engine
// =============================================================================

/// Frozen static network filtering engine.
pub struct FilterEngine {
    index: CategoryIndex,
    data: DataFilterStore,
    redirects: Box<dyn RedirectEngine>,
    tokenizer: Box<dyn Tokenizer>,
    counts: FilterCounts,
}

impl fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEngine")
            .field("counts", &self.counts)
            .field("categories", &self.index.category_count())
            .field("data_filters", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(Box::new(RedirectDirectives::new()))
    }
}

impl FilterEngine {
    /// Empty engine: every request gets no match.
    pub fn new(redirects: Box<dyn RedirectEngine>) -> Self {
        Self {
            index: CategoryIndex::new(),
            data: DataFilterStore::new(),
            redirects,
            tokenizer: Box::new(UrlTokenizer),
            counts: FilterCounts::default(),
        }
    }

    /// Build the engine from compiled lines.
    ///
    /// Lines also present in `bad_filters` are skipped and counted as
    /// discarded. Redirect lines go to `redirects`, data-holding filters
    /// to the data store, everything else to the category index.
    pub fn freeze<'a, I>(
        lines: I,
        bad_filters: &HashSet<String>,
        mut counts: FilterCounts,
        redirects: Box<dyn RedirectEngine>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut engine = Self::new(redirects);
        for line in lines {
            if bad_filters.contains(line) {
                counts.discarded += 1;
                continue;
            }
            match CompiledLine::decode(line) {
                Ok(CompiledLine::Redirect(_, directive)) => {
                    engine.redirects.from_compiled_rule(&directive);
                }
                Ok(CompiledLine::Filter(bits, token_hash, compiled)) => {
                    let filter = Filter::from_compiled(compiled);
                    if filter.data().is_some() {
                        engine.data.add(bits, token_hash, filter);
                    } else {
                        engine.index.insert(bits, token_hash, filter);
                    }
                }
                Err(e) => {
                    log::warn!("Skipping compiled line {line:?}: {e}");
                    counts.rejected += 1;
                }
            }
        }
        engine.index.optimize();
        engine.data.optimize();
        engine.counts = counts;
        log::info!(
            "Static filters frozen: {} filters, {} categories, {} data filters",
            counts.filter_count(),
            engine.index.category_count(),
            engine.data.len()
        );
        engine
    }

    /// Replace the URL tokenizer. Its token hashes must agree with the
    /// hashes the compiler used.
    pub fn with_tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Drop every filter and counter.
    pub fn reset(&mut self) {
        self.index.clear();
        self.data.clear();
        self.redirects.reset();
        self.counts = FilterCounts::default();
    }

    pub fn counts(&self) -> FilterCounts {
        self.counts
    }

    pub fn filter_count(&self) -> usize {
        self.counts.filter_count()
    }

    pub fn redirects(&self) -> &dyn RedirectEngine {
        self.redirects.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            counts: self.counts,
            filter_count: self.counts.filter_count(),
            categories: self.index.category_count(),
            slots: self.index.slot_count(),
            data_filters: self.data.len(),
            redirects: self.redirects.compiled_rules().len(),
        }
    }

    /// Slots holding more than one filter, largest first.
    pub fn bucket_histogram(&self) -> Vec<SlotStat> {
        self.index.histogram()
    }

    // =========================================================================
    // Network Requests
    // =========================================================================

    /// Decide a request.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> Decision {
        self.evaluate(ctx).0
    }

    /// Decide a request and describe the deciding filter.
    pub fn explain_request(&self, ctx: &RequestContext<'_>) -> (Decision, Option<Explanation>) {
        let (decision, matched) = self.evaluate(ctx);
        (decision, matched.map(|m| explain(&m)))
    }

    /// Decide a request against filters naming its exact type only.
    pub fn match_exact_type(&self, ctx: &RequestContext<'_>) -> Decision {
        self.evaluate_exact_type(ctx, TypeValue::from_name(ctx.request_type)).0
    }

    fn evaluate(&self, ctx: &RequestContext<'_>) -> (Decision, Option<MatchedFilter>) {
        let type_value = TypeValue::from_name(ctx.request_type).unwrap_or(TypeValue::Other);
        if type_value == TypeValue::NoType || type_value > TypeValue::LAST_NETWORK {
            return self.evaluate_exact_type(ctx, Some(type_value));
        }

        let tokenized = self.tokenizer.tokenize(ctx.url);
        let page_hostname = ctx.doc_hostname.to_ascii_lowercase();
        let request_hostname = ctx.hostname.to_ascii_lowercase();
        let cx = MatchContext::new(&tokenized.url, &page_hostname, &request_hostname);
        let party = Party::of_request(ctx.is_third_party);

        let tiers = |action, important| {
            [
                CategoryBits::new(action, important, Party::Any, TypeValue::NoType),
                CategoryBits::new(action, important, party, TypeValue::NoType),
                CategoryBits::new(action, important, Party::Any, type_value),
                CategoryBits::new(action, important, party, type_value),
            ]
        };

        if let Some(m) = self.first_match(&tiers(RuleAction::Block, true), &cx, &tokenized.tokens) {
            return (Decision::Block, Some(m));
        }
        let Some(block) = self.first_match(&tiers(RuleAction::Block, false), &cx, &tokenized.tokens)
        else {
            return (Decision::NoMatch, None);
        };
        if let Some(allow) = self.first_match(&tiers(RuleAction::Allow, false), &cx, &tokenized.tokens) {
            return (Decision::Allow, Some(allow));
        }
        (Decision::Block, Some(block))
    }

    fn evaluate_exact_type(
        &self,
        ctx: &RequestContext<'_>,
        type_value: Option<TypeValue>,
    ) -> (Decision, Option<MatchedFilter>) {
        let Some(type_value) = type_value else {
            return (Decision::NoMatch, None);
        };
        if type_value == TypeValue::GenericHide {
            let (state, matched) = self.evaluate_generic_hide(ctx.url);
            return (state.into(), matched);
        }

        let tokenized = self.tokenizer.tokenize(ctx.url);
        let page_hostname = ctx.doc_hostname.to_ascii_lowercase();
        let request_hostname = ctx.hostname.to_ascii_lowercase();
        let cx = MatchContext::new(&tokenized.url, &page_hostname, &request_hostname);
        let party = Party::of_request(ctx.is_third_party);

        let tiers = |action, important| {
            [
                CategoryBits::new(action, important, Party::Any, type_value),
                CategoryBits::new(action, important, party, type_value),
            ]
        };

        if let Some(m) = self.first_match(&tiers(RuleAction::Block, true), &cx, &tokenized.tokens) {
            return (Decision::Block, Some(m));
        }
        let Some(block) = self.first_match(&tiers(RuleAction::Block, false), &cx, &tokenized.tokens)
        else {
            return (Decision::NoMatch, None);
        };
        if let Some(allow) = self.first_match(&tiers(RuleAction::Allow, false), &cx, &tokenized.tokens) {
            return (Decision::Allow, Some(allow));
        }
        (Decision::Block, Some(block))
    }

    /// Generic-hide exception check for a page URL.
    pub fn match_generic_hide(&self, url: &str) -> GenericHide {
        self.evaluate_generic_hide(url).0
    }

    fn evaluate_generic_hide(&self, url: &str) -> (GenericHide, Option<MatchedFilter>) {
        let tokenized = self.tokenizer.tokenize(url);
        let hostname = extract_host(&tokenized.url);
        let cx = MatchContext::new(&tokenized.url, hostname, hostname);

        let exception = CategoryBits::new(RuleAction::Allow, false, Party::Any, TypeValue::GenericHide);
        let Some(allow) = self.index.match_tokens(exception, &cx, &tokenized.tokens) else {
            return (GenericHide::NoException, None);
        };
        let important = CategoryBits::new(RuleAction::Block, true, Party::Any, TypeValue::GenericHide);
        match self.index.match_tokens(important, &cx, &tokenized.tokens) {
            Some(block) => (GenericHide::ImportantOverride, Some(block)),
            None => (GenericHide::ExceptionApplies, Some(allow)),
        }
    }

    fn first_match(
        &self,
        keys: &[CategoryBits],
        cx: &MatchContext<'_>,
        tokens: &[UrlToken],
    ) -> Option<MatchedFilter> {
        keys.iter()
            .find_map(|&bits| self.index.match_tokens(bits, cx, tokens))
    }

    // =========================================================================
    // Data Directives
    // =========================================================================

    /// Collect the `data_type` directives in effect for a URL.
    ///
    /// Important directives always apply. An exception with an empty value
    /// cancels every non-important directive, otherwise an exception
    /// cancels the directive with the same value.
    pub fn match_data(&self, data_type: &str, url: &str) -> DataMatches {
        if self.data.is_empty() {
            return DataMatches::default();
        }

        let TokenizedUrl { url, tokens } = self.tokenizer.tokenize(url);
        let hostname = extract_host(&url);
        let cx = MatchContext::new(&url, hostname, hostname);

        let mut important: BTreeMap<&str, &DataFilterEntry> = BTreeMap::new();
        let mut add: BTreeMap<&str, &DataFilterEntry> = BTreeMap::new();
        let mut remove: BTreeMap<&str, &DataFilterEntry> = BTreeMap::new();

        let visits = tokens
            .iter()
            .map(|token| (token.hash, token.start))
            .chain(std::iter::once((NO_TOKEN_HASH, 0)));
        for (token_hash, token_beg) in visits {
            for entry in self.data.chain(token_hash) {
                let Some((entry_type, value)) = entry.filter.data() else {
                    continue;
                };
                if entry_type != data_type || !entry.filter.matches(&cx, token_beg) {
                    continue;
                }
                let target = if entry.category.is_allow() {
                    &mut remove
                } else if entry.category.is_important() {
                    &mut important
                } else {
                    &mut add
                };
                target.insert(value, entry);
            }
        }

        if important.is_empty() && add.is_empty() {
            return DataMatches::default();
        }

        for key in important.keys() {
            add.remove(key);
            remove.remove(key);
        }
        if remove.contains_key("") {
            add.clear();
        } else {
            for key in remove.keys() {
                add.remove(key);
            }
        }

        let mut out = DataMatches::default();
        for (value, entry) in important.iter().chain(add.iter()) {
            out.directives.push(value.to_string());
            out.log.push(explain_data(entry, 1));
        }
        for entry in remove.values() {
            out.log.push(explain_data(entry, 2));
        }
        out
    }

    // =========================================================================
    // Selfie
    // =========================================================================

    /// Persist the frozen engine.
    pub fn to_selfie(&self) -> Result<Vec<u8>, SelfieError> {
        selfie::encode(&EngineSelfie {
            counts: self.counts,
            categories: self.index.to_selfie(),
            data_filters: self.data.to_selfie(),
            redirects: self.redirects.compiled_rules(),
        })
    }

    /// Restore an engine persisted with [`FilterEngine::to_selfie`].
    pub fn from_selfie(data: &[u8], redirects: Box<dyn RedirectEngine>) -> Result<Self, SelfieError> {
        let mut engine = Self::new(redirects);
        engine.load_selfie(data)?;
        Ok(engine)
    }

    /// Replace the engine state with a persisted one.
    ///
    /// Everything is decoded before anything is replaced: on error the
    /// engine keeps the filters it had.
    pub fn load_selfie(&mut self, data: &[u8]) -> Result<(), SelfieError> {
        let selfie = selfie::decode(data)?;
        let index = CategoryIndex::from_selfie(selfie.categories)?;
        let store = DataFilterStore::from_selfie(selfie.data_filters);

        self.redirects.reset();
        for directive in &selfie.redirects {
            self.redirects.from_compiled_rule(directive);
        }
        self.index = index;
        self.data = store;
        self.counts = selfie.counts;
        log::debug!(
            "Selfie loaded: {} filters, {} categories",
            self.counts.filter_count(),
            self.index.category_count()
        );
        Ok(())
    }
}

// =============================================================================
// Explanations
// =============================================================================

fn explain(matched: &MatchedFilter) -> Explanation {
    let result = if matched.category.is_allow() { 2 } else { 1 };
    build_explanation(matched.category, matched.token_hash, &matched.filter, result)
}

fn explain_data(entry: &DataFilterEntry, result: u8) -> Explanation {
    build_explanation(entry.category, entry.token_hash, &entry.filter, result)
}

/// Rebuild filter text from the matcher and the options its category
/// implies.
fn build_explanation(
    category: CategoryBits,
    token_hash: u32,
    filter: &Filter,
    result: u8,
) -> Explanation {
    let log_data = filter.log_data();
    let compiled = CompiledLine::Filter(category, token_hash, log_data.compiled)
        .encode()
        .unwrap_or_default();

    let mut raw = log_data.raw;
    if category.is_allow() {
        raw.insert_str(0, "@@");
    }

    let mut opts = Vec::new();
    if category.is_important() {
        opts.push("important".to_string());
    }
    match category.party() {
        Party::Third => opts.push("third-party".to_string()),
        Party::First => opts.push("first-party".to_string()),
        Party::Any => {}
    }
    if let Some(type_value) = category.type_value() {
        if type_value != TypeValue::NoType && type_value != TypeValue::Data {
            opts.push(type_value.option_name().to_string());
        }
    }
    if let Some(filter_opts) = &log_data.opts {
        opts.push(filter_opts.clone());
    }
    if !opts.is_empty() {
        raw.push('$');
        raw.push_str(&opts.join(","));
    }

    Explanation {
        raw,
        regex: log_data.regex,
        compiled,
        opts: log_data.opts,
        result,
        token_hash,
        source: "static",
    }
}
