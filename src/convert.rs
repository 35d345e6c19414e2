//! The transpile driver.
//!
//! Owns the end-to-end contract: parse, clean, normalize defaults, extract
//! the worker, classify, reassemble, emit. Pure and deterministic — the same
//! source and options always produce byte-identical output.

use log::debug;

use crate::assemble;
use crate::cleaner::Cleaner;
use crate::defaults;
use crate::emit;
use crate::error::ConvertError;
use crate::loops;
use crate::parser;
use crate::report::{ConversionReport, DispatchMode, REPORT_VERSION};

/// Options for one conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    /// Emit a strictly sequential per-row loop instead of the bounded
    /// worker pool.
    pub sequential: bool,
}

/// A finished conversion: the generated source and its report.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub code: String,
    pub report: ConversionReport,
}

/// Convert one script into the platform's `run(data, token, env_config)`
/// form. Fails only when the input does not parse.
pub fn convert_source(source: &str, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
    let parsed = parser::parse_module(source)?;

    let mut cleaner = Cleaner::new();
    let mut cleaned = cleaner.clean_module(parsed);
    defaults::normalize_stmts(&mut cleaned);

    let row_variable = cleaner.loop_target.clone();
    let mut rewrote_break = false;
    let worker = cleaner.loop_body.take().map(|body| {
        let row = row_variable.as_deref().unwrap_or("row");
        let (worker, controls) = loops::synthesize_worker(body, row);
        rewrote_break = controls.rewrote_break;
        worker
    });
    let loop_extracted = worker.is_some();
    if !loop_extracted {
        debug!("no main data loop found; script runs once as-is");
    }

    let buckets = assemble::classify(cleaned);
    let (run, user_entry_renamed) = assemble::build_run(buckets, worker, options.sequential);
    let code = emit::module(&[run]);

    let report = ConversionReport {
        schema_version: REPORT_VERSION.to_string(),
        dispatch: if options.sequential {
            DispatchMode::Sequential
        } else {
            DispatchMode::Threaded
        },
        loop_extracted,
        row_variable: if loop_extracted { row_variable } else { None },
        rewrote_break,
        rewritten_http_calls: cleaner.rewritten_calls,
        dropped_imports: cleaner.dropped_imports.clone(),
        deleted_names: cleaner.deleted_names(),
        user_entry_renamed,
        data_load_function: cleaner.data_load_function.clone(),
    };

    Ok(Conversion { code, report })
}
