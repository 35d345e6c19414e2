//! Injected runtime boilerplate.
//!
//! The Python fragments below are appended to every converted script: the
//! request-logging wrapper, the row/workbook emulation layer, the setup
//! block binding platform-provided values, the per-row dispatch blocks and
//! the result-sync tails. They are parsed through the same lowering pipeline
//! as user code, so the emitter prints everything in one consistent shape.

use crate::ast::Stmt;
use crate::parser;

/// Parse an embedded fragment. The fragments are compiled into the binary
/// and covered by tests, so a parse failure here is a build defect, not a
/// runtime condition.
fn snippet(source: &str) -> Vec<Stmt> {
    parser::parse_module(source).expect("embedded runtime snippet must parse")
}

/// Imports prepended to every converted script. `import pandas as pd` is
/// only added when the script brings no pandas import of its own.
pub fn header_imports(has_pandas: bool) -> Vec<Stmt> {
    let mut stmts = Vec::new();
    if !has_pandas {
        stmts.extend(snippet("import pandas as pd\n"));
    }
    stmts.extend(snippet(
        "import builtins\nimport concurrent.futures\nimport requests\nimport json\n",
    ));
    stmts
}

/// The request-logging wrapper, its verb shims, and `_safe_iloc`.
pub fn wrapper_defs() -> Vec<Stmt> {
    snippet(WRAPPER_SOURCE)
}

/// Platform bindings executed before any user statement.
pub fn setup_stmts() -> Vec<Stmt> {
    snippet(SETUP_SOURCE)
}

/// Per-row dispatch over `builtins.data`, threaded or sequential.
pub fn dispatch_stmts(sequential: bool) -> Vec<Stmt> {
    if sequential {
        snippet(SEQUENTIAL_SOURCE)
    } else {
        snippet(THREADED_SOURCE)
    }
}

/// Result-sync tail. With a renamed user entry point the sync fills `res`
/// only when the user returned nothing; otherwise it refreshes `data` from
/// the dataframe buffer.
pub fn sync_stmts(user_run: bool) -> Vec<Stmt> {
    if user_run {
        snippet(SYNC_USER_SOURCE)
    } else {
        snippet(SYNC_DEFAULT_SOURCE)
    }
}

/// Replacement body for a failed `if not env_url:` probe.
pub fn env_url_fix() -> Vec<Stmt> {
    snippet("env_url = builtins.env_config.get('apiBaseUrl', '')\n")
}

/// Replacement body for a user-defined `get_cell_value`.
pub fn get_cell_body() -> Vec<Stmt> {
    snippet(GET_CELL_SOURCE)
}

/// Replacement body for a user-defined `set_cell_value`.
pub fn set_cell_body() -> Vec<Stmt> {
    snippet(SET_CELL_SOURCE)
}

const WRAPPER_SOURCE: &str = r#"
def _log_req(method, url, **kwargs):
    def _debug_jwt(token_str):
        try:
            if not token_str or len(token_str) < 10:
                return 'Invalid/Empty Token'
            if token_str.startswith('Bearer '):
                token_str = token_str.replace('Bearer ', '')
            parts = token_str.split('.')
            if len(parts) < 2:
                return 'Not a JWT'
            payload = parts[1]
            pad = len(payload) % 4
            if pad:
                payload += '=' * (4 - pad)
            import base64
            decoded = base64.urlsafe_b64decode(payload).decode('utf-8')
            claims = json.loads(decoded)
            user = claims.get('preferred_username') or claims.get('sub')
            iss = claims.get('iss', '')
            tenant = iss.split('/')[-1] if '/' in iss else 'Unknown'
            return f'User: {user} | Tenant: {tenant}'
        except Exception as e:
            return f'Decode Error: {e}'

    headers = kwargs.get('headers', {})
    auth_header = headers.get('Authorization', 'None')
    token_meta = _debug_jwt(auth_header)

    print(f'[API_DEBUG] ----------------------------------------------------------------')
    print(f'[API_DEBUG] 🚀 REQUEST: {method} {url}')
    print(f'[API_DEBUG] 🔑 TOKEN META: {token_meta}')

    payload = kwargs.get('json') or kwargs.get('data')

    if not payload:
        files = kwargs.get('files')
        if files and isinstance(files, dict):
            if 'dto' in files:
                val = files['dto']
                if isinstance(val, (list, tuple)) and len(val) > 1:
                    payload = f'[Multipart DTO] {val[1]}'
                else:
                    payload = f'[Multipart DTO] {val}'
            else:
                payload = f'[Multipart Files] Keys: {list(files.keys())}'

    if not payload:
        payload = 'No Payload'
    print(f'[API_DEBUG] 📦 PAYLOAD: {payload}')
    print(f'[API_DEBUG] ----------------------------------------------------------------')

    try:
        if method == 'GET':
            resp = requests.get(url, **kwargs)
        elif method == 'POST':
            resp = requests.post(url, **kwargs)
        elif method == 'PUT':
            resp = requests.put(url, **kwargs)
        elif method == 'DELETE':
            resp = requests.delete(url, **kwargs)
        else:
            resp = requests.request(method, url, **kwargs)

        body_preview = 'Binary/No Content'
        try:
            if not resp.text or not resp.text.strip():
                body_preview = '[Empty Response]'
            else:
                try:
                    json_obj = resp.json()
                    body_preview = json.dumps(json_obj, indent=2)
                except:
                    body_preview = resp.text[:4000]
        except:
            pass

        status_icon = '✅' if 200 <= resp.status_code < 300 else '❌'
        print(f'[API_DEBUG] {status_icon} RESPONSE [{resp.status_code}]')
        print(f'[API_DEBUG] 📄 BODY:\n{body_preview}')
        print(f'[API_DEBUG] ----------------------------------------------------------------\n')

        return resp
    except Exception as e:
        print(f'[API_DEBUG] ❌ EXCEPTION: {e}')
        print(f'[API_DEBUG] ----------------------------------------------------------------\n')
        raise e

def _log_get(url, **kwargs):
    return _log_req('GET', url, **kwargs)

def _log_post(url, **kwargs):
    return _log_req('POST', url, **kwargs)

def _log_put(url, **kwargs):
    return _log_req('PUT', url, **kwargs)

def _log_delete(url, **kwargs):
    return _log_req('DELETE', url, **kwargs)

def _safe_iloc(row, idx):
    try:
        if isinstance(row, dict):
            keys = list(row.keys())
            if 0 <= idx < len(keys):
                val = row[keys[idx]]
                return val.strip() if isinstance(val, str) else val
            return None
        elif isinstance(row, list):
            if 0 <= idx < len(row):
                return row[idx]
            return None
        return row.iloc[idx]
    except:
        return None
"#;

const SETUP_SOURCE: &str = r#"
import sys
sys.argv = [sys.argv[0]]

builtins.data = data
builtins.data_df = pd.DataFrame(data)

import os
valid_token_path = os.path.join(os.getcwd(), 'valid_token.txt')
if os.path.exists(valid_token_path):
    try:
        with open(valid_token_path, 'r') as f:
            forced_token = f.read().strip()
        if len(forced_token) > 10:
            print(f'[API_DEBUG] ⚠️ OVERRIDE: Using token from valid_token.txt')
            token = forced_token
    except Exception:
        pass

builtins.token = token
builtins.base_url = env_config.get('apiBaseUrl')
base_url = builtins.base_url
env_key = env_config.get('environment')
file_path = 'Uploaded_File.xlsx'
builtins.file_path = file_path
env_url = base_url
builtins.env_url = base_url

class MockCell:
    def __init__(self, row_data, key):
        self.row_data = row_data
        self.key = key

    @property
    def value(self):
        return self.row_data.get(self.key)

    @value.setter
    def value(self, val):
        self.row_data[self.key] = val

class MockSheet:
    def __init__(self, data):
        self.data = data

    def cell(self, row, column, value=None):
        idx = row - 2
        if not (0 <= idx < len(self.data)):
            return MockCell({}, 'dummy')
        row_data = self.data[idx]
        keys = list(row_data.keys())
        if 1 <= column <= len(keys):
            key = keys[column - 1]
        elif 'output_columns' in dir(builtins) and 0 <= column - 1 < len(builtins.output_columns):
            key = builtins.output_columns[column - 1]
        else:
            key = f'Column_{column}'
        cell = MockCell(row_data, key)
        if value is not None:
            cell.value = value
        return cell

    @property
    def max_row(self):
        return len(self.data) + 1

class MockWorkbook:
    def __init__(self, data_or_builtins):
        if hasattr(data_or_builtins, 'data'):
            self.data = data_or_builtins.data
        else:
            self.data = data_or_builtins

    def __getitem__(self, key):
        return MockSheet(self.data)

    @property
    def sheetnames(self):
        return ['Sheet1', 'Environment_Details', 'Plot_details', 'Sheet']

    def save(self, path):
        import json
        print(f'[MOCK] Excel saved to {path}')
        try:
            print('[OUTPUT_DATA_DUMP]')
            print(json.dumps(self.data))
            print('[/OUTPUT_DATA_DUMP]')
        except:
            pass

    @property
    def active(self):
        return MockSheet(self.data)

wk = MockWorkbook(builtins)
builtins.wk = wk
builtins.wb = wk
wb = wk
"#;

const THREADED_SOURCE: &str = r#"
print(f'[Threaded] Starting execution with 5 workers...')
with concurrent.futures.ThreadPoolExecutor(max_workers=5) as executor:
    futures = {executor.submit(process_row, idx, row): idx for idx, row in enumerate(builtins.data)}
    for future in concurrent.futures.as_completed(futures):
        try:
            res = future.result()
        except Exception as e:
            print(f'[Threaded] Row failed: {e}')
"#;

const SEQUENTIAL_SOURCE: &str = r#"
print(f'[Sequential] Starting execution (Single Thread)...')
for idx, row in enumerate(builtins.data):
    try:
        process_row(idx, row)
    except Exception as e:
        print(f'[Sequential] Row {idx} failed: {e}')
"#;

const SYNC_USER_SOURCE: &str = r#"
try:
    if res is None and hasattr(builtins, 'data_df'):
        import pandas as pd
        if isinstance(builtins.data_df, pd.DataFrame):
            res = builtins.data_df.where(pd.notnull(builtins.data_df), None).to_dict(orient='records')
except Exception as e:
    print(f'[Warn] Failed to sync data_df to result: {e}')
"#;

const SYNC_DEFAULT_SOURCE: &str = r#"
try:
    if hasattr(builtins, 'data_df'):
        import pandas as pd
        if isinstance(builtins.data_df, pd.DataFrame):
            data = builtins.data_df.where(pd.notnull(builtins.data_df), None).to_dict(orient='records')
except Exception as e:
    print(f'[Warn] Failed to sync data_df to data: {e}')
"#;

const GET_CELL_SOURCE: &str = r#"
import builtins
import json
if isinstance(row, int):
    idx = row - 2
    if hasattr(builtins, 'data') and isinstance(builtins.data, list) and 0 <= idx < len(builtins.data):
        row = builtins.data[idx]
    else:
        return ''

if not isinstance(row, dict):
    return ''
target = str(header).strip().lower()
found_val = ''
found_key = ''

for k, v in row.items():
    if str(k).strip().lower() == target:
        found_val = v
        found_key = k
        break
    if str(k).strip().replace('_', ' ').lower() == target.replace('_', ' '):
        found_val = v
        found_key = k
        break

try:
    _trace_idx = row.get('_row_index', -1)
    print(f'[TRACE_DATA_READ] [Row {_trace_idx}] Key: {header} | Found: {found_key} | Value: {found_val}')
except:
    pass

return found_val
"#;

const SET_CELL_SOURCE: &str = r#"
if not isinstance(row, dict):
    return False
target = str(header).strip().lower()
matched = None
for k in row.keys():
    if str(k).strip().lower() == target:
        matched = k
        break
if matched:
    row[matched] = value
else:
    row[header] = value

try:
    _trace_idx = row.get('_row_index', -1)
    print(f'[TRACE_DATA_WRITE] [Row {_trace_idx}] Key: {header} | Value: {value}')
except:
    pass

return True
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::parser::parse_module;

    fn assert_reparses(stmts: &[Stmt]) {
        let emitted = emit::module(stmts);
        parse_module(&emitted).expect("emitted snippet parses");
    }

    #[test]
    fn test_all_snippets_parse_and_reemit() {
        assert_reparses(&wrapper_defs());
        assert_reparses(&setup_stmts());
        assert_reparses(&dispatch_stmts(true));
        assert_reparses(&dispatch_stmts(false));
        assert_reparses(&sync_stmts(true));
        assert_reparses(&sync_stmts(false));
        assert_reparses(&env_url_fix());
        assert_reparses(&get_cell_body());
        assert_reparses(&set_cell_body());
        assert_reparses(&header_imports(false));
    }

    #[test]
    fn test_wrapper_defines_all_shims() {
        let emitted = emit::module(&wrapper_defs());
        for name in [
            "_log_req",
            "_log_get",
            "_log_post",
            "_log_put",
            "_log_delete",
            "_safe_iloc",
        ] {
            assert!(
                emitted.contains(&format!("def {}(", name)),
                "missing {}",
                name
            );
        }
    }

    #[test]
    fn test_setup_binds_platform_values() {
        let emitted = emit::module(&setup_stmts());
        assert!(emitted.contains("builtins.token = token"));
        assert!(emitted.contains("env_config.get('apiBaseUrl')"));
        assert!(emitted.contains("valid_token.txt"));
        assert!(emitted.contains("class MockWorkbook:"));
        assert!(emitted.contains("'Sheet1', 'Environment_Details', 'Plot_details', 'Sheet'"));
    }

    #[test]
    fn test_dispatch_modes_differ() {
        let threaded = emit::module(&dispatch_stmts(false));
        let sequential = emit::module(&dispatch_stmts(true));
        assert!(threaded.contains("ThreadPoolExecutor(max_workers=5)"));
        assert!(threaded.contains("as_completed"));
        assert!(sequential.contains("[Sequential] Starting execution"));
        assert!(!sequential.contains("ThreadPoolExecutor"));
    }

    #[test]
    fn test_header_imports_respect_existing_pandas() {
        let with_pd = emit::module(&header_imports(true));
        assert!(!with_pd.contains("import pandas"));
        let without_pd = emit::module(&header_imports(false));
        assert!(without_pd.starts_with("import pandas as pd\n"));
    }
}
