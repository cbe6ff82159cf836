//! Program input/output: pluggable streams, the named-file store and the
//! single active input slot that file reads are routed through.

mod files;
mod stream;

pub use files::{FileManager, FileMode, MISSING_FILE};
pub use stream::{
    CaptureOutput, InputStream, NullInput, NullOutput, OutputStream, TextInput,
    EXHAUSTED_TOKEN,
};

use crate::error::HostResult;
use crate::strings::numeric::{format_shortest, parse_double, parse_int};
use crate::strings::symbol_from_codepoint;
use tracing::debug;

pub struct IoState {
    default_input: Box<dyn InputStream>,
    substitute_input: Option<Box<dyn InputStream>>,
    file_input: Option<i32>,
    output: Box<dyn OutputStream>,
    files: FileManager,
}

impl Default for IoState {
    fn default() -> Self {
        Self {
            default_input: Box::new(NullInput),
            substitute_input: None,
            file_input: None,
            output: Box::new(NullOutput),
            files: FileManager::new(),
        }
    }
}

impl IoState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs an input stream. A default stream replaces the one restored
    /// by `input_reset_file`; a non-default one only shadows it until the
    /// next reset.
    pub fn set_input_stream(&mut self, stream: Box<dyn InputStream>, is_default: bool) {
        self.file_input = None;
        if is_default {
            self.default_input = stream;
            self.substitute_input = None;
        } else {
            self.substitute_input = Some(stream);
        }
    }

    pub fn set_output_stream(&mut self, stream: Box<dyn OutputStream>) {
        self.output = stream;
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileManager {
        &mut self.files
    }

    pub fn active_file(&self) -> Option<i32> {
        self.file_input
    }

    fn active_input(&mut self) -> &mut dyn InputStream {
        if let Some(handle) = self.file_input {
            if let Some(reader) = self.files.reader_mut(handle) {
                return reader;
            }
        }
        match self.substitute_input.as_mut() {
            Some(stream) => stream.as_mut(),
            None => self.default_input.as_mut(),
        }
    }

    pub fn read_token(&mut self) -> String {
        self.active_input().read_token()
    }

    pub fn read_line(&mut self) -> String {
        self.active_input().read_line()
    }

    pub fn read_double(&mut self) -> f64 {
        parse_double(&self.read_token()).unwrap_or(0.0)
    }

    pub fn read_int(&mut self) -> i64 {
        parse_int(&self.read_token()).unwrap_or(0)
    }

    pub fn write(&mut self, text: &str) {
        self.output.write(text);
    }

    pub fn write_double(&mut self, value: f64) {
        self.write(&format_shortest(value));
    }

    pub fn write_int(&mut self, value: i64) {
        self.write(&value.to_string());
    }

    pub fn write_symbol(&mut self, codepoint: i64) {
        let ch = symbol_from_codepoint(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut buf = [0u8; 4];
        self.write(ch.encode_utf8(&mut buf));
    }

    pub fn input_set_file(&mut self, handle: i32) -> HostResult<()> {
        self.files.check_readable(handle)?;
        debug!(handle, "input redirected to file");
        self.file_input = Some(handle);
        Ok(())
    }

    pub fn input_reset_file(&mut self) {
        self.file_input = None;
    }

    pub fn close_file(&mut self, handle: i32) {
        if self.file_input == Some(handle) {
            self.file_input = None;
        }
        self.files.close(handle);
    }

    pub fn reset(&mut self, clear_output: bool) {
        self.default_input.reset();
        self.substitute_input = None;
        self.file_input = None;
        if clear_output {
            self.output.clear();
        }
        self.files.reset();
    }
}
