//! Pending filter set
//!
//! [`FilterCompiler`] accumulates compiled lines from any number of filter
//! lists, drops duplicates, and freezes into a read-only [`FilterEngine`].

use std::collections::HashSet;

use sv_core::compiled::CompiledLines;
use sv_core::engine::FilterEngine;
use sv_core::redirect::{RedirectDirectives, RedirectEngine};
use sv_core::types::{FilterCounts, RuleAction};

use crate::compile::emit_lines;
use crate::parser::{parse_filter, ParseError};

/// Options for one compile call.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Name of the list the filter comes from, for log messages
    pub list_name: String,
}

impl CompileOptions {
    pub fn new(list_name: impl Into<String>) -> Self {
        Self {
            list_name: list_name.into(),
        }
    }
}

/// Mutable filter set being built.
#[derive(Debug)]
pub struct FilterCompiler {
    /// Accepted network lines, in arrival order
    good: Vec<String>,
    good_set: HashSet<String>,
    bad: HashSet<String>,
    counts: FilterCounts,
    redirects: Box<dyn RedirectEngine>,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new(Box::new(RedirectDirectives::new()))
    }
}

impl FilterCompiler {
    pub fn new(redirects: Box<dyn RedirectEngine>) -> Self {
        Self {
            good: Vec::new(),
            good_set: HashSet::new(),
            bad: HashSet::new(),
            counts: FilterCounts::default(),
            redirects,
        }
    }

    pub fn counts(&self) -> FilterCounts {
        self.counts
    }

    /// Number of distinct accepted network lines.
    pub fn pending_len(&self) -> usize {
        self.good.len()
    }

    /// Drop every pending line and counter.
    pub fn reset(&mut self) {
        self.good.clear();
        self.good_set.clear();
        self.bad.clear();
        self.counts = FilterCounts::default();
        self.redirects.reset();
    }

    /// Compile one filter and add its lines to the pending set.
    ///
    /// Comments and cosmetic filters are skipped quietly. Invalid network
    /// filters are logged and counted as rejected.
    pub fn compile_line(&mut self, raw: &str, options: &CompileOptions) -> Result<(), ParseError> {
        let raw = raw.trim();
        let mut compiled = CompiledLines::new();
        match compile_into(raw, self.redirects.as_ref(), &mut compiled) {
            Ok(parsed_action) => {
                self.counts.processed += 1;
                match parsed_action {
                    RuleAction::Block => self.counts.block += 1,
                    RuleAction::Allow => self.counts.allow += 1,
                }
                self.add_compiled(&compiled);
                Ok(())
            }
            Err(e) if e.is_skippable() => Err(e),
            Err(e) => {
                self.counts.processed += 1;
                self.counts.rejected += 1;
                log::warn!("Invalid network filter in {}: {} ({})", options.list_name, raw, e);
                Err(e)
            }
        }
    }

    /// Compile a whole filter list. Returns the number of filters accepted.
    pub fn add_filter_list(&mut self, text: &str, options: &CompileOptions) -> usize {
        let mut accepted = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || is_comment_line(line) {
                continue;
            }
            if self.compile_line(line, options).is_ok() {
                accepted += 1;
            }
        }
        log::debug!("Compiled {} filters from {}", accepted, options.list_name);
        accepted
    }

    /// Merge already-compiled lines into the pending set.
    pub fn add_compiled(&mut self, compiled: &CompiledLines) {
        for line in &compiled.network {
            self.counts.accepted += 1;
            if self.good_set.contains(line) {
                self.counts.discarded += 1;
                continue;
            }
            self.good_set.insert(line.clone());
            self.good.push(line.clone());
        }
        for line in &compiled.bad_filters {
            self.bad.insert(line.clone());
        }
    }

    /// Pending lines in text form.
    pub fn compiled(&self) -> CompiledLines {
        let mut bad_filters: Vec<_> = self.bad.iter().cloned().collect();
        bad_filters.sort();
        CompiledLines {
            network: self.good.clone(),
            bad_filters,
        }
    }

    /// Build the engine. The pending set is consumed.
    pub fn freeze(self) -> FilterEngine {
        FilterEngine::freeze(
            self.good.iter().map(String::as_str),
            &self.bad,
            self.counts,
            self.redirects,
        )
    }
}

/// Parse `raw` and append its compiled lines to `out`.
pub fn compile_into(
    raw: &str,
    redirects: &dyn RedirectEngine,
    out: &mut CompiledLines,
) -> Result<RuleAction, ParseError> {
    let mut parsed = parse_filter(raw)?;
    parsed.make_token();
    emit_lines(&parsed, redirects, out)?;
    Ok(parsed.action)
}

/// Compile a filter list to compiled lines without building an engine.
pub fn compile_filter_list(text: &str, options: &CompileOptions) -> CompiledLines {
    let redirects = RedirectDirectives::new();
    let mut out = CompiledLines::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }
        match compile_into(line, &redirects, &mut out) {
            Ok(_) => {}
            Err(e) if e.is_skippable() => {}
            Err(e) => log::warn!("Invalid network filter in {}: {} ({})", options.list_name, line, e),
        }
    }
    out
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}
