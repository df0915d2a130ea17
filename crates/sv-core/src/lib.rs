//! Sieve Core Library
//!
//! This crate provides the static network filtering engine for Sieve: the
//! matcher variants, the category index they are stored in, and the
//! decision engine which evaluates requests against it.
//!
//! # Architecture
//!
//! The compiler (`sv-compiler`) turns filter list text into compiled lines.
//! Freezing those lines builds a [`FilterEngine`]: filters are grouped by
//! category (action, importance, party, request type) and by token, and
//! each token slot escalates from a single filter to a pair to a bucket.
//! A frozen engine is read-only and can be shared across threads.
//!
//! # Modules
//!
//! - `types`: Category bits, request types and decisions
//! - `hash`: Token hashing and checksums
//! - `url`: URL host extraction and tokenization
//! - `psl`: Registrable domains for party computation
//! - `compiled`: Compiled line format
//! - `filters`: Matcher variant family
//! - `trie`: Hostname and prefix tries
//! - `bucket`: Filter pairs and buckets
//! - `index`: Category index
//! - `data`: Data-filter store
//! - `redirect`: Redirect directive collaborator
//! - `engine`: Decision engine
//! - `selfie`: Persisted engine format

pub mod bucket;
pub mod compiled;
pub mod data;
pub mod engine;
pub mod filters;
pub mod hash;
pub mod index;
pub mod psl;
pub mod redirect;
pub mod selfie;
pub mod trie;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use compiled::{CompiledFilter, CompiledLine, CompiledLines, Section};
pub use engine::{DataMatches, EngineStats, Explanation, FilterEngine};
pub use filters::Filter;
pub use hash::{token_hash, DOT_TOKEN_HASH, NO_TOKEN_HASH};
pub use psl::is_third_party;
pub use redirect::{RedirectDirectives, RedirectEngine};
pub use selfie::SelfieError;
pub use types::{
    CategoryBits, Decision, FilterCounts, GenericHide, Party, RequestContext, RuleAction, TypeMask,
    TypeValue,
};
pub use url::{Tokenizer, UrlTokenizer};
