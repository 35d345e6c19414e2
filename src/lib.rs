//! rowforge — convert row-automation scripts into platform-ready workers.
//!
//! Takes a loosely-structured Python automation script and rewrites it into
//! a single `run(data, token, env_config)` function implementing the
//! platform runtime contract: authentication injected, spreadsheet access
//! mocked onto the in-memory row list, HTTP calls routed through a logging
//! wrapper, and the per-row processing loop lifted into a parallelizable
//! `process_row(idx, row)` worker.

pub mod assemble;
pub mod ast;
pub mod calls;
pub mod cleaner;
pub mod convert;
pub mod defaults;
pub mod emit;
pub mod error;
pub mod loops;
pub mod parser;
pub mod report;
pub mod runtime;

pub use convert::{convert_source, Conversion, ConvertOptions};
pub use error::ConvertError;
pub use report::{ConversionReport, DispatchMode};
