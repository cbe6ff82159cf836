use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: &'static str,
    pub message: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, file: &str) -> Self {
        diagnostic(code, "error", message.into(), file, Vec::new(), None)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

pub(crate) fn diagnostic(
    code: &'static str,
    severity: &'static str,
    message: String,
    file: &str,
    notes: Vec<String>,
    help: Option<String>,
) -> Diagnostic {
    Diagnostic {
        code,
        severity,
        message,
        file: file.to_string(),
        notes,
        help,
    }
}
