//! Sieve Filter List Compiler
//!
//! This crate compiles ABP/uBO network filter lists into compiled lines and
//! freezes them into a [`sv_core::FilterEngine`].
//!
//! ```no_run
//! use sv_compiler::{CompileOptions, FilterCompiler};
//!
//! let mut compiler = FilterCompiler::default();
//! compiler.add_filter_list("||ads.example.com^\n", &CompileOptions::new("easylist"));
//! let engine = compiler.freeze();
//! ```

pub mod compile;
pub mod parser;
pub mod pending;

pub use compile::{compile_filter, emit_lines};
pub use parser::{parse_filter, ParseError, ParsedFilter};
pub use pending::{compile_filter_list, compile_into, CompileOptions, FilterCompiler};
