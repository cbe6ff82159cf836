use std::cell::RefCell;
use std::rc::Rc;

/// Source of program input. Reading past the end never fails: tokens fall
/// back to `"0"` and lines to `""`.
pub trait InputStream {
    fn read_token(&mut self) -> String;
    fn read_line(&mut self) -> String;
    fn has_more(&self) -> bool;
    fn reset(&mut self);
}

pub trait OutputStream {
    fn write(&mut self, text: &str);
    fn clear(&mut self);
}

pub const EXHAUSTED_TOKEN: &str = "0";

fn is_separator(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n' | '\u{0B}' | '\u{0C}' | '\r' | ' ' | '\u{A0}'
    )
}

/// Tokenizing reader over an in-memory text with a single cursor shared by
/// token and line reads.
#[derive(Debug, Clone, Default)]
pub struct TextInput {
    source: String,
    cursor: usize,
}

impl TextInput {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            cursor: 0,
        }
    }

    fn rest(&self) -> &str {
        &self.source[self.cursor..]
    }
}

impl InputStream for TextInput {
    fn read_token(&mut self) -> String {
        let skipped = self
            .rest()
            .find(|ch: char| !is_separator(ch))
            .unwrap_or(self.rest().len());
        self.cursor += skipped;
        if self.cursor >= self.source.len() {
            return EXHAUSTED_TOKEN.to_string();
        }
        let len = self.rest().find(is_separator).unwrap_or(self.rest().len());
        let token = self.rest()[..len].to_string();
        self.cursor += len;
        token
    }

    fn read_line(&mut self) -> String {
        if self.cursor >= self.source.len() {
            return String::new();
        }
        let (line, consumed) = match self.rest().find('\n') {
            Some(newline) => (&self.rest()[..newline], newline + 1),
            None => (self.rest(), self.rest().len()),
        };
        let line = line.strip_suffix('\r').unwrap_or(line).to_string();
        self.cursor += consumed;
        line
    }

    fn has_more(&self) -> bool {
        self.cursor < self.source.len()
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullInput;

impl InputStream for NullInput {
    fn read_token(&mut self) -> String {
        EXHAUSTED_TOKEN.to_string()
    }

    fn read_line(&mut self) -> String {
        String::new()
    }

    fn has_more(&self) -> bool {
        false
    }

    fn reset(&mut self) {}
}

/// In-memory sink; clones share the same buffer so the embedder can keep a
/// handle while the runtime owns the stream.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutput {
    buffer: Rc<RefCell<String>>,
}

impl CaptureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }
}

impl OutputStream for CaptureOutput {
    fn write(&mut self, text: &str) {
        self.buffer.borrow_mut().push_str(text);
    }

    fn clear(&mut self) {
        self.buffer.borrow_mut().clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputStream for NullOutput {
    fn write(&mut self, _text: &str) {}

    fn clear(&mut self) {}
}
