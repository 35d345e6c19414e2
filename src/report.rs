//! Conversion report types.
//!
//! One record per conversion describing what the transform did, emitted by
//! the CLI as YAML or JSON for the surrounding tooling (the web dashboard
//! shows whether a loop was parallelized and which legacy names vanished).

use serde::{Deserialize, Serialize};

/// Current report schema version.
pub const REPORT_VERSION: &str = "1.0";

/// How the generated code walks the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Threaded,
    Sequential,
}

/// What one conversion did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Schema version for forward compatibility
    pub schema_version: String,

    /// Dispatch strategy baked into the generated code
    pub dispatch: DispatchMode,

    /// Whether a main data loop was found and lifted into `process_row`
    pub loop_extracted: bool,

    /// Row variable bound by the extracted loop
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_variable: Option<String>,

    /// A `break` in the extracted loop was narrowed to a per-row return
    pub rewrote_break: bool,

    /// HTTP calls redirected to the logging wrapper
    pub rewritten_http_calls: usize,

    /// Legacy imports dropped from the script
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dropped_imports: Vec<String>,

    /// Names deleted by removal propagation
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub deleted_names: Vec<String>,

    /// A user-authored `run` was renamed and chained
    pub user_entry_renamed: bool,

    /// Function that loaded spreadsheet data, when the load sat inside one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_load_function: Option<String>,
}
