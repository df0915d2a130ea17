use std::fs;
use std::path::Path;
use std::time::Instant;

use sv_compiler::{CompileOptions, FilterCompiler};
use sv_core::{FilterCounts, FilterEngine, RedirectDirectives};

use crate::error::CliError;

#[derive(Debug, Clone)]
pub struct CompileStats {
    pub lists: usize,
    pub lines: usize,
    pub counts: FilterCounts,
    pub total_ms: f64,
}

/// Compile every input list into one pending filter set.
pub fn compile_lists(inputs: &[String], verbose: bool) -> Result<(FilterCompiler, CompileStats), CliError> {
    if inputs.is_empty() {
        return Err(CliError::NoInput);
    }

    let start = Instant::now();
    let mut compiler = FilterCompiler::default();
    let mut total_lines = 0usize;

    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path).map_err(|e| CliError::read(path, e))?;
        let line_count = content.lines().count();
        total_lines += line_count;

        let name = Path::new(path)
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let accepted = compiler.add_filter_list(&content, &CompileOptions::new(name.clone()));

        if verbose {
            println!("  [{}] {} - {} lines, {} filters", list_id, name, line_count, accepted);
        }
    }

    let stats = CompileStats {
        lists: inputs.len(),
        lines: total_lines,
        counts: compiler.counts(),
        total_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    Ok((compiler, stats))
}

/// Engine from a selfie file, or compiled from filter lists.
pub fn load_engine(selfie: Option<&str>, inputs: &[String]) -> Result<FilterEngine, CliError> {
    let Some(path) = selfie else {
        let (compiler, _) = compile_lists(inputs, false)?;
        return Ok(compiler.freeze());
    };
    let bytes = fs::read(path).map_err(|e| CliError::read(path, e))?;
    let engine = FilterEngine::from_selfie(&bytes, Box::new(RedirectDirectives::new()))
        .map_err(|source| CliError::Selfie {
            path: path.into(),
            source,
        })?;
    log::debug!("Loaded selfie '{}' ({} bytes)", path, bytes.len());
    Ok(engine)
}

/// Persist the frozen engine. Returns the selfie size in bytes.
pub fn save_selfie(engine: &FilterEngine, path: &Path) -> Result<usize, CliError> {
    let bytes = engine.to_selfie().map_err(CliError::EncodeSelfie)?;
    write_output(path, &bytes)?;
    Ok(bytes.len())
}

/// Write a command output file, creating missing parent directories.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    let write_err = |source| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(write_err)?,
        _ => {}
    }
    fs::write(path, bytes).map_err(write_err)
}
