//! Sieve CLI
//!
//! CLI tool for compiling filter lists, building selfies and checking
//! requests against the static network filtering engine.

mod engine_io;
mod error;
mod replay;

use std::path::Path;

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};

use sv_core::url::extract_host;
use sv_core::{is_third_party, RequestContext};

use crate::engine_io::{compile_lists, load_engine, save_selfie, write_output};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "sv-cli")]
#[command(about = "Sieve static network filter compiler and tools")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into compiled lines
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output compiled lines file
        #[arg(short, long, default_value = "filters.compiled")]
        output: String,
    },

    /// Compile filter lists and write the frozen engine selfie
    Selfie {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output selfie file
        #[arg(short, long, default_value = "filters.selfie")]
        output: String,
    },

    /// Evaluate one request and explain the decision
    Check {
        /// Selfie to load instead of compiling lists
        #[arg(long, conflicts_with = "input")]
        selfie: Option<String>,

        /// Input filter list files
        #[arg(short, long)]
        input: Vec<String>,

        /// Request URL
        #[arg(long)]
        url: String,

        /// URL of the document issuing the request
        #[arg(long)]
        doc_url: Option<String>,

        /// Request type (script, image, sub_frame, ...)
        #[arg(long = "type", default_value = "other")]
        request_type: String,

        /// Also print csp directives for the URL
        #[arg(long)]
        csp: bool,
    },

    /// Replay a JSONL request dataset
    Replay {
        #[arg(long, conflicts_with = "input")]
        selfie: Option<String>,

        #[arg(short, long)]
        input: Vec<String>,

        /// JSONL file of {url, frameUrl, cpt} records
        #[arg(long)]
        requests: String,

        /// Maximum number of requests to replay
        #[arg(long, default_value_t = usize::MAX)]
        limit: usize,
    },

    /// Dump selfie info
    Info {
        #[arg(long)]
        selfie: String,

        /// Number of largest buckets to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Compile { input, output } => cmd_compile(&input, &output, cli.verbose),
        Commands::Selfie { input, output } => cmd_selfie(&input, &output, cli.verbose),
        Commands::Check {
            selfie,
            input,
            url,
            doc_url,
            request_type,
            csp,
        } => cmd_check(
            selfie.as_deref(),
            &input,
            &url,
            doc_url.as_deref(),
            &request_type,
            csp,
        ),
        Commands::Replay {
            selfie,
            input,
            requests,
            limit,
        } => cmd_replay(selfie.as_deref(), &input, &requests, limit),
        Commands::Info { selfie, top } => cmd_info(&selfie, top),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn print_counts(counts: &sv_core::FilterCounts) {
    println!("  Processed: {}", counts.processed);
    println!("  Rejected:  {}", counts.rejected);
    println!(
        "  Filters:   {} ({} accepted, {} discarded)",
        counts.filter_count(),
        counts.accepted,
        counts.discarded
    );
    println!("  Block:     {}  Allow: {}", counts.block, counts.allow);
}

fn cmd_compile(inputs: &[String], output: &str, verbose: bool) -> Result<(), CliError> {
    let (compiler, stats) = compile_lists(inputs, verbose)?;
    let compiled = compiler.compiled();
    let text = compiled.to_text();
    write_output(Path::new(output), text.as_bytes())?;

    println!("Compiled {} filter lists to '{}'", stats.lists, output);
    println!("  Lines:     {}", stats.lines);
    print_counts(&stats.counts);
    println!(
        "  Output:    {} network, {} badfilter lines",
        compiled.network.len(),
        compiled.bad_filters.len()
    );
    println!("  Time:      {:.1}ms", stats.total_ms);
    Ok(())
}

fn cmd_selfie(inputs: &[String], output: &str, verbose: bool) -> Result<(), CliError> {
    let (compiler, stats) = compile_lists(inputs, verbose)?;
    let engine = compiler.freeze();
    let size = save_selfie(&engine, Path::new(output))?;

    println!("Wrote selfie '{}'", output);
    print_counts(&engine.counts());
    println!("  Size:      {} bytes ({:.1} KB)", size, size as f64 / 1024.0);
    println!("  Time:      {:.1}ms compile", stats.total_ms);
    Ok(())
}

fn cmd_check(
    selfie: Option<&str>,
    inputs: &[String],
    url: &str,
    doc_url: Option<&str>,
    request_type: &str,
    csp: bool,
) -> Result<(), CliError> {
    let engine = load_engine(selfie, inputs)?;

    let hostname = extract_host(url);
    let doc_hostname = doc_url.map(extract_host).unwrap_or(hostname);
    let ctx = RequestContext {
        url,
        doc_hostname,
        hostname,
        request_type,
        is_third_party: is_third_party(doc_hostname, hostname),
    };

    let (decision, explanation) = engine.explain_request(&ctx);
    println!("{}", decision.as_u8());
    if let Some(explanation) = explanation {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    }

    if csp {
        let matches = engine.match_data("csp", url);
        println!("{}", serde_json::to_string_pretty(&matches)?);
    }
    Ok(())
}

fn cmd_replay(selfie: Option<&str>, inputs: &[String], requests: &str, limit: usize) -> Result<(), CliError> {
    let engine = load_engine(selfie, inputs)?;
    let requests = replay::load_requests_jsonl(requests, limit)?;
    if requests.is_empty() {
        return Err(CliError::NoRequests);
    }

    let result = replay::replay(&engine, &requests);
    println!("Replayed {} requests", result.requests);
    println!("  Blocked:   {}", result.blocked);
    println!("  Excepted:  {}", result.allowed);
    println!("  No match:  {}", result.no_match);
    println!(
        "  Time:      {:.1}ms (p50 {:?}, p99 {:?})",
        result.total.as_secs_f64() * 1000.0,
        result.p50,
        result.p99
    );
    Ok(())
}

fn cmd_info(selfie: &str, top: usize) -> Result<(), CliError> {
    let size = std::fs::metadata(selfie).map_err(|e| CliError::read(selfie, e))?.len();
    let engine = load_engine(Some(selfie), &[])?;
    let stats = engine.stats();

    println!("Selfie: {}", selfie);
    println!("  Size:        {} bytes ({:.1} KB)", size, size as f64 / 1024.0);
    print_counts(&stats.counts);
    println!("  Categories:  {}", stats.categories);
    println!("  Slots:       {}", stats.slots);
    println!("  Data:        {}", stats.data_filters);
    println!("  Redirects:   {}", stats.redirects);

    let histogram = engine.bucket_histogram();
    if !histogram.is_empty() {
        println!();
        println!("Largest buckets:");
        for slot in histogram.iter().take(top) {
            println!(
                "  bits {:#06x}  token {:#010x}  {} filters",
                slot.category.bits(),
                slot.token_hash,
                slot.size
            );
        }
    }
    Ok(())
}
