mod analyzer;

use expr::SourceFlavor;
use serde::Serialize;

use crate::analyzer::{LintReport, lint_source_with_flavor};

#[derive(Serialize)]
struct LintResponse {
    diagnostics: Vec<LintDiagnostic>,
}

#[derive(Serialize)]
struct LintDiagnostic {
    line: usize,
    column: usize,
    end_column: usize,
    offset: usize,
    code: &'static str,
    message: String,
    rendered: String,
}

/// Unknown names fall back to the C#-style flavor.
fn parse_flavor(raw: &str) -> SourceFlavor {
    SourceFlavor::from_name(raw.trim()).unwrap_or_default()
}

fn pack_ptr_len(ptr: *mut u8, len: usize) -> u64 {
    ((len as u64) << 32) | (ptr as u64)
}

fn unpack_input<'a>(ptr: u32, len: u32) -> &'a [u8] {
    if ptr == 0 || len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) }
}

fn leak_bytes(bytes: Vec<u8>) -> u64 {
    let owned = bytes.into_boxed_slice();
    let len = owned.len();
    let ptr = Box::into_raw(owned) as *mut u8;
    pack_ptr_len(ptr, len)
}

fn report_to_json(report: LintReport) -> Vec<u8> {
    let response = LintResponse {
        diagnostics: report
            .diagnostics
            .into_iter()
            .map(|item| LintDiagnostic {
                line: item.line,
                column: item.column,
                end_column: item.span.end_col,
                offset: item.offset,
                code: item.code,
                message: item.message,
                rendered: item.rendered,
            })
            .collect(),
    };
    serde_json::to_vec(&response).unwrap_or_else(|_| b"{\"diagnostics\":[]}".to_vec())
}

/// JSON diagnostics for `source` compiled in the named flavor.
pub fn lint_json(source: &str, flavor: &str) -> String {
    let report = lint_source_with_flavor(source, parse_flavor(flavor));
    String::from_utf8(report_to_json(report))
        .unwrap_or_else(|_| "{\"diagnostics\":[]}".to_string())
}

#[unsafe(no_mangle)]
pub extern "C" fn wasm_alloc(len: u32) -> *mut u8 {
    let mut buf = Vec::<u8>::with_capacity(len as usize);
    let ptr = buf.as_mut_ptr();
    std::mem::forget(buf);
    ptr
}

#[unsafe(no_mangle)]
pub extern "C" fn wasm_dealloc(ptr: u32, len: u32) {
    if ptr == 0 || len == 0 {
        return;
    }
    unsafe {
        let _ = Vec::from_raw_parts(ptr as *mut u8, len as usize, len as usize);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn lint_source_json(
    source_ptr: u32,
    source_len: u32,
    flavor_ptr: u32,
    flavor_len: u32,
) -> u64 {
    let source_bytes = unpack_input(source_ptr, source_len);
    let source = match std::str::from_utf8(source_bytes) {
        Ok(value) => value,
        Err(err) => {
            let report = LintResponse {
                diagnostics: vec![LintDiagnostic {
                    line: 1,
                    column: 1,
                    end_column: 1,
                    offset: err.valid_up_to(),
                    code: "E_LEX",
                    message: format!("invalid utf-8 source: {err}"),
                    rendered: format!("invalid utf-8 source: {err}"),
                }],
            };
            let fallback =
                serde_json::to_vec(&report).unwrap_or_else(|_| b"{\"diagnostics\":[]}".to_vec());
            return leak_bytes(fallback);
        }
    };

    let flavor_raw = std::str::from_utf8(unpack_input(flavor_ptr, flavor_len)).unwrap_or("csharp");
    leak_bytes(lint_json(source, flavor_raw).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::{lint_json, parse_flavor};
    use crate::analyzer::lint_source_with_flavor;
    use expr::SourceFlavor;

    #[test]
    fn parse_flavor_accepts_aliases() {
        assert_eq!(parse_flavor("cs"), SourceFlavor::CSharp);
        assert_eq!(parse_flavor(" Excel "), SourceFlavor::Formula);
        assert_eq!(parse_flavor("formula"), SourceFlavor::Formula);
        assert_eq!(parse_flavor("unknown"), SourceFlavor::CSharp);
    }

    #[test]
    fn lint_reports_no_errors_for_both_flavors() {
        let cases = [
            (
                SourceFlavor::CSharp,
                "(int a, int b) => { var total = 0; for (var i = a; i < b; i++) total += i; return total; }",
            ),
            (SourceFlavor::Formula, "(double x) => x ^ 2 & ' units'"),
        ];

        for (flavor, source) in cases {
            let report = lint_source_with_flavor(source, flavor);
            assert!(
                !report.has_errors(),
                "lint should succeed for {flavor:?}, got diagnostics: {:?}",
                report.diagnostics
            );
        }
    }

    #[test]
    fn lint_reports_positioned_errors() {
        let source = "(int x) =>\n  (x + 1]";
        let report = lint_source_with_flavor(source, SourceFlavor::CSharp);
        assert!(report.has_errors());
        let diagnostic = &report.diagnostics[0];
        assert_eq!(diagnostic.line, 2);
        assert_eq!(diagnostic.column, 9);
        assert_eq!(diagnostic.code, "E_UNMATCHED_SCOPE");
        assert!(diagnostic.rendered.contains("  2 |   (x + 1]"));
    }

    #[test]
    fn lint_json_serializes_diagnostics() {
        let json = lint_json("(int x) => y", "csharp");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let diagnostics = parsed["diagnostics"].as_array().expect("diagnostics array");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0]["code"], "E_UNKNOWN_SYMBOL");
        assert_eq!(diagnostics[0]["offset"], 11);
        assert_eq!(diagnostics[0]["line"], 1);

        let clean = lint_json("(int x) => x * 2", "cs");
        assert_eq!(clean, "{\"diagnostics\":[]}");
    }
}
