//! Host runtime for compiled WebAssembly programs: strings, arrays, console
//! and file I/O, math builtins, plus a decoder that recovers an export's
//! result type so the result can be rendered for display.

pub mod abi;
pub mod arena;
pub mod config;
mod diagnostics;
pub mod error;
pub mod host;
pub mod introspect;
pub mod io;
pub mod math;
pub mod memory;
pub mod normalize;
pub mod strings;

use diagnostics::diagnostic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;

pub use abi::HostFn;
pub use config::{ConfigError, HostConfig};
pub use diagnostics::Diagnostic;
pub use error::{HostError, HostResult};
pub use host::{dispatch, HostImports, HostRuntime, HostValue};
pub use introspect::{resolve_return_type, IntrospectError, ModuleTypeInfo, ReturnType};
pub use memory::{LinearMemory, VecMemory};
pub use normalize::{normalize, NormalizeOptions, RawValue};

pub const TOOL_NAME: &str = "hostlib";
pub const VERSION: &str = "0.1";

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub ok: bool,
    pub result: Option<String>,
    pub return_type: Option<ReturnType>,
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn success(
        result: String,
        return_type: ReturnType,
        stdout: String,
        files: BTreeMap<String, String>,
    ) -> Self {
        Self {
            tool: TOOL_NAME,
            version: VERSION,
            ok: true,
            result: Some(result),
            return_type: Some(return_type),
            stdout: Some(stdout),
            files,
            diagnostics: Vec::new(),
        }
    }

    /// A failed run still reports whatever the program printed.
    pub fn failure(stdout: Option<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            tool: TOOL_NAME,
            version: VERSION,
            ok: false,
            result: None,
            return_type: None,
            stdout,
            files: BTreeMap::new(),
            diagnostics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportSummary {
    pub name: String,
    pub return_type: ReturnType,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub tool: &'static str,
    pub version: &'static str,
    pub ok: bool,
    pub exports: Vec<ExportSummary>,
    pub module: Option<ModuleTypeInfo>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn inspect_report(path: &str, bytes: &[u8]) -> InspectReport {
    match ModuleTypeInfo::parse(bytes) {
        Ok(info) => InspectReport {
            tool: TOOL_NAME,
            version: VERSION,
            ok: true,
            exports: info
                .function_exports()
                .into_iter()
                .map(|(name, return_type)| ExportSummary { name, return_type })
                .collect(),
            module: Some(info),
            diagnostics: Vec::new(),
        },
        Err(err) => InspectReport {
            tool: TOOL_NAME,
            version: VERSION,
            ok: false,
            exports: Vec::new(),
            module: None,
            diagnostics: vec![malformed_module_diagnostic(path, &err)],
        },
    }
}

pub fn to_json<T: Serialize>(report: &T) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

fn malformed_module_diagnostic(path: &str, err: &IntrospectError) -> Diagnostic {
    diagnostic(
        "E0300",
        "error",
        format!("Malformed module: {err}"),
        path,
        vec!["Binary decoder error".to_string()],
        Some("Pass a WebAssembly binary (.wasm) or text module (.wat).".to_string()),
    )
}

pub fn load_file(path: &str) -> Result<Vec<u8>, Diagnostic> {
    fs::read(path).map_err(|err| {
        diagnostic(
            "E0001",
            "error",
            format!("Unable to read file: {err}"),
            path,
            vec!["IO error".to_string()],
            Some("Ensure the path exists and is readable.".to_string()),
        )
    })
}

pub fn load_text(path: &str) -> Result<String, Diagnostic> {
    let bytes = load_file(path)?;
    String::from_utf8(bytes).map_err(|err| {
        diagnostic(
            "E0002",
            "error",
            format!("File is not valid UTF-8: {err}"),
            path,
            Vec::new(),
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_lists_function_exports() {
        let bytes = wat::parse_str(
            r#"(module (func (export "main") (result i64) i64.const 1) (memory (export "memory") 1))"#,
        )
        .unwrap();
        let report = inspect_report("m.wat", &bytes);
        assert!(report.ok);
        assert_eq!(report.exports.len(), 1);
        assert_eq!(report.exports[0].name, "main");
        assert_eq!(report.exports[0].return_type, ReturnType::I64);
        let json: serde_json::Value = serde_json::from_str(&to_json(&report)).unwrap();
        assert_eq!(json["exports"][0]["return_type"], "i64");
        assert_eq!(json["tool"], "hostlib");
    }

    #[test]
    fn inspect_reports_malformed_module() {
        let report = inspect_report("bad.wasm", b"not wasm");
        assert!(!report.ok);
        assert_eq!(report.diagnostics[0].code, "E0300");
        assert_eq!(report.diagnostics[0].file, "bad.wasm");
    }

    #[test]
    fn run_report_shapes() {
        let mut files = BTreeMap::new();
        files.insert("out.txt".to_string(), "1".to_string());
        let ok = RunReport::success("42".to_string(), ReturnType::I32, "hi\n".to_string(), files);
        let json: serde_json::Value = serde_json::from_str(&to_json(&ok)).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["result"], "42");
        assert_eq!(json["return_type"], "i32");
        assert_eq!(json["files"]["out.txt"], "1");

        let failed = RunReport::failure(None, vec![Diagnostic::error("E0401", "trap", "m.wasm")]);
        let json: serde_json::Value = serde_json::from_str(&to_json(&failed)).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json.get("files").is_none());
        assert_eq!(json["diagnostics"][0]["code"], "E0401");
    }

    #[test]
    fn missing_file_diagnostic() {
        let err = load_file("/nonexistent/prog.wasm").unwrap_err();
        assert_eq!(err.code, "E0001");
        let err = load_text("/nonexistent/input.txt").unwrap_err();
        assert_eq!(err.code, "E0001");
    }

    #[test]
    fn load_text_rejects_invalid_utf8() {
        let path = std::env::temp_dir().join(format!("hostlib-text-{}.txt", std::process::id()));
        fs::write(&path, [b'o', b'k', 0xc3]).unwrap();
        let err = load_text(&path.display().to_string()).unwrap_err();
        assert_eq!(err.code, "E0002");
        fs::write(&path, "строка\n").unwrap();
        assert_eq!(load_text(&path.display().to_string()).unwrap(), "строка\n");
        fs::remove_file(&path).unwrap();
    }
}
