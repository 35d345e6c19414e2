//! End-to-end conversion scenarios.
//!
//! Each test drives a whole conversion and inspects the generated Python
//! source, the way the platform's verifier does: re-parse the output, then
//! assert on its structure.

use rowforge::parser::parse_module;
use rowforge::{convert_source, ConvertOptions};

fn convert(source: &str) -> String {
    let conversion = convert_source(source, &ConvertOptions::default()).expect("conversion");
    parse_module(&conversion.code).expect("output parses");
    conversion.code
}

fn convert_sequential(source: &str) -> String {
    let conversion = convert_source(source, &ConvertOptions { sequential: true }).expect("conversion");
    parse_module(&conversion.code).expect("output parses");
    conversion.code
}

#[test]
fn loop_body_becomes_worker_with_early_returns() {
    let code = convert(
        "\
for row in data:
    if not row['x']:
        continue
    row['y'] = 1
",
    );

    let worker = "\
    def process_row(idx, row):
        if not row['x']:
            return (idx, row)
        row['y'] = 1
        return (idx, row)
";
    assert!(
        code.contains(worker),
        "worker not found in output:\n{}",
        code
    );
    assert!(!code.contains("for row in data"));
    assert!(code.contains("ThreadPoolExecutor(max_workers=5)"));
}

#[test]
fn http_calls_keep_their_arguments() {
    let code = convert("resp = requests.get(url, headers=h)\n");
    assert!(code.contains("resp = _log_get(url, headers=h)"));
    assert!(code.contains("def _log_get(url, **kwargs):"));
}

#[test]
fn excel_read_is_replaced_by_memory_buffer() {
    let code = convert("df = pd.read_excel(file_path)\n");
    assert!(code.contains("df = builtins.data_df"));
    assert!(!code.contains("read_excel("));
}

#[test]
fn deleted_chains_vanish_and_constants_move_up() {
    let code = convert(
        "\
def my_helper():
    return CONST

wb_auth = get_access_token(key)
y = build(wb_auth)
CONST = 5
",
    );
    assert!(!code.contains("wb_auth"));
    assert!(!code.contains("y = build"));

    let const_at = code.find("CONST = 5").expect("constant kept");
    let def_at = code.find("def my_helper():").expect("definition kept");
    assert!(
        const_at < def_at,
        "constant must precede definitions:\n{}",
        code
    );
}

#[test]
fn user_entry_point_is_renamed_and_preferred() {
    let conversion = convert_source(
        "\
def run(data, token, env_config):
    for row in data:
        row['Status'] = 'Done'
    return data
",
        &ConvertOptions::default(),
    )
    .expect("conversion");

    let code = &conversion.code;
    assert!(conversion.report.user_entry_renamed);
    assert!(code.contains("def _user_run(data, token, env_config):"));
    assert!(code.contains("res = _user_run(data, token, env_config)"));
    assert!(code.trim_end().ends_with("return res"));
    // The in-function loop is not extracted.
    assert!(!conversion.report.loop_extracted);
}

#[test]
fn main_guard_always_executes() {
    let code = convert(
        "\
def main():
    print('go')

if __name__ == '__main__':
    main()
",
    );
    assert!(code.contains("if True:"));
    assert!(!code.contains("__main__"));
}

#[test]
fn plain_script_round_trips_inside_standard_signature() {
    let code = convert(
        "\
def greet(name):
    return 'Hello ' + name

message = greet('farm')
print(message)
",
    );
    assert!(code.starts_with("def run(data, token, env_config):"));
    assert!(code.contains("def greet(name):"));
    assert!(code.contains("message = greet('farm')"));
    assert!(code.trim_end().ends_with("return data"));
}

#[test]
fn dispatch_mode_is_selected_once() {
    let source = "for row in data:\n    row['x'] = 1\n";
    let threaded = convert(source);
    let sequential = convert_sequential(source);

    assert!(threaded.contains("ThreadPoolExecutor(max_workers=5)"));
    assert!(threaded.contains("concurrent.futures.as_completed(futures)"));
    assert!(sequential.contains("for idx, row in enumerate(builtins.data):"));
    assert!(!sequential.contains("ThreadPoolExecutor"));
}

#[test]
fn conversion_is_byte_deterministic() {
    let source = "\
import requests

CONFIG = {'retries': 3}

for idx, row in enumerate(data):
    resp = requests.post(base_url + '/assets', json=row)
    row['Response'] = resp.text
";
    assert_eq!(convert(source), convert(source));
}

#[test]
fn converting_converted_output_never_double_wraps() {
    let first = convert("requests.delete(url, headers=h)\n");
    let second = convert(&first);
    assert!(!second.contains("_log__log_"));
}

#[test]
fn tuple_loop_targets_bind_the_row_variable() {
    let conversion = convert_source(
        "\
for i, record in table.iterrows():
    record['n'] = i
",
        &ConvertOptions::default(),
    )
    .expect("conversion");

    assert_eq!(conversion.report.row_variable.as_deref(), Some("record"));
    assert!(conversion.code.contains("def process_row(idx, record):"));
    assert!(conversion.code.contains("return (idx, record)"));
}

#[test]
fn break_is_narrowed_and_reported() {
    let conversion = convert_source(
        "\
for row in data:
    if row['stop']:
        break
    row['ok'] = True
",
        &ConvertOptions::default(),
    )
    .expect("conversion");

    assert!(conversion.report.rewrote_break);
    let worker_start = conversion
        .code
        .find("def process_row(idx, row):")
        .expect("worker");
    let worker = &conversion.code[worker_start..];
    assert!(!worker.contains("break"));
}

#[test]
fn empty_script_still_yields_contract_shape() {
    let code = convert("");
    let stmts = parse_module(&code).expect("parses");
    assert_eq!(stmts.len(), 1);
    assert!(code.starts_with("def run(data, token, env_config):"));
    assert!(code.contains("builtins.data = data"));
    assert!(code.contains("class MockWorkbook:"));
    assert!(code.trim_end().ends_with("return data"));
}

#[test]
fn legacy_auth_stack_is_fully_replaced() {
    let code = convert_sequential(
        "\
import openpyxl
from GetAuthtoken import get_bearer_token
import pandas as pd
import requests

token = get_bearer_token('user', 'pass')
base_url = 'https://legacy.example.com'
file_path = 'input.xlsx'
wb = load_workbook(file_path)
sheet = wb['Sheet1']

for row in data:
    resp = requests.post(base_url + '/farmers', json=row, headers={'Authorization': token})
    row['Status'] = 'Success' if resp.status_code == 200 else 'Fail'
",
    );

    assert!(!code.contains("openpyxl"));
    assert!(!code.contains("GetAuthtoken"));
    assert!(!code.contains("get_bearer_token"));
    assert!(!code.contains("legacy.example.com"));
    assert!(!code.contains("'input.xlsx'"));
    assert!(code.contains("wb = MockWorkbook(builtins)"));
    assert!(code.contains("sheet = wb['Sheet1']"));
    assert!(code.contains("_log_post("));
    assert!(code.contains("base_url = builtins.base_url"));
}

#[test]
fn script_read_from_disk_converts_identically() {
    use std::io::Write;

    let source = "for row in data:\n    row['seen'] = True\n";
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(source.as_bytes()).expect("write script");

    let from_disk = std::fs::read_to_string(file.path()).expect("read back");
    assert_eq!(convert(&from_disk), convert(source));
}
