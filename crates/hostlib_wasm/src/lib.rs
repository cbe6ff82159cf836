//! Runs compiled WebAssembly programs under wasmtime with the hostlib
//! runtime supplying every `env` import.

mod memory;
mod runtime;

use hostlib_core::{Diagnostic, HostConfig, RawValue, ReturnType};
use std::collections::BTreeMap;

pub use runtime::execute;

#[derive(Debug, Clone)]
pub struct ExecError {
    pub code: &'static str,
    pub message: String,
    /// Program output produced before the failure.
    pub stdout: String,
}

pub(crate) fn exec_error(code: &'static str, message: impl Into<String>) -> ExecError {
    ExecError {
        code,
        message: message.into(),
        stdout: String::new(),
    }
}

impl ExecError {
    pub fn to_diagnostic(&self, file: &str) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.code, self.message.clone(), file);
        match self.code {
            "E0400" => diagnostic
                .with_note("Module setup error")
                .with_help("Import host functions from `env` and export a parameterless entry."),
            "E0401" | "E0402" => diagnostic.with_note("WASM trap"),
            code if code.starts_with("E05") => diagnostic.with_note("Host runtime error"),
            _ => diagnostic,
        }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ExecError {}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Export to call; falls back to `config.entry`.
    pub entry: Option<String>,
    pub input: String,
    /// Files visible to the program, by name.
    pub files: BTreeMap<String, String>,
    /// Source-level result type, used to render text results.
    pub declared_type: Option<String>,
    pub config: HostConfig,
}

impl RunRequest {
    pub fn entry(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.config.entry)
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub raw: RawValue,
    pub result: String,
    pub return_type: ReturnType,
    pub stdout: String,
    pub files: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_carry_category_notes() {
        let link = exec_error("E0400", "WASM link error: unknown host function `env.x`");
        let diag = link.to_diagnostic("m.wat");
        assert_eq!(diag.code, "E0400");
        assert_eq!(diag.notes, vec!["Module setup error".to_string()]);
        assert!(diag.help.is_some());

        let trap = exec_error("E0402", "integer divide by zero").to_diagnostic("m.wat");
        assert_eq!(trap.notes, vec!["WASM trap".to_string()]);
        assert_eq!(trap.help, None);

        let host = exec_error("E0502", "stale or unknown string handle -1").to_diagnostic("m.wat");
        assert_eq!(host.notes, vec!["Host runtime error".to_string()]);
    }
}
