use crate::error::{HostError, HostResult};
use crate::io::stream::{InputStream, TextInput};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const MISSING_FILE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

impl FileMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Read => "reading",
            FileMode::Write => "writing",
            FileMode::Append => "appending",
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    name: String,
    mode: FileMode,
    reader: Option<TextInput>,
}

/// Named in-memory files plus the table of open handles.
#[derive(Debug)]
pub struct FileManager {
    seeded: BTreeMap<String, String>,
    files: BTreeMap<String, String>,
    open: HashMap<i32, OpenFile>,
    released: Vec<i32>,
    next_handle: i32,
}

impl Default for FileManager {
    fn default() -> Self {
        Self {
            seeded: BTreeMap::new(),
            files: BTreeMap::new(),
            open: HashMap::new(),
            released: Vec::new(),
            next_handle: 1,
        }
    }
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file that survives `reset`.
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        self.seeded.insert(name.clone(), content.clone());
        self.files.insert(name, content);
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.files.clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn allocate_handle(&mut self) -> i32 {
        match self.released.pop() {
            Some(handle) => handle,
            None => {
                let handle = self.next_handle;
                self.next_handle += 1;
                handle
            }
        }
    }

    fn register(&mut self, name: &str, mode: FileMode, reader: Option<TextInput>) -> i32 {
        let handle = self.allocate_handle();
        self.open.insert(
            handle,
            OpenFile {
                name: name.to_string(),
                mode,
                reader,
            },
        );
        debug!(handle, name, mode = mode.as_str(), "file opened");
        handle
    }

    /// Opens an existing file for reading; `-1` when there is no such file.
    pub fn open(&mut self, name: &str) -> i32 {
        let Some(content) = self.files.get(name) else {
            debug!(name, "open for read of missing file");
            return MISSING_FILE;
        };
        let reader = TextInput::new(content.clone());
        self.register(name, FileMode::Read, Some(reader))
    }

    pub fn open_for_write(&mut self, name: &str) -> i32 {
        self.files.insert(name.to_string(), String::new());
        self.register(name, FileMode::Write, None)
    }

    pub fn open_for_append(&mut self, name: &str) -> i32 {
        self.files.entry(name.to_string()).or_default();
        self.register(name, FileMode::Append, None)
    }

    pub fn write(&mut self, handle: i32, text: &str) -> HostResult<()> {
        let file = self
            .open
            .get(&handle)
            .ok_or(HostError::BadFileHandle(handle))?;
        if file.mode == FileMode::Read {
            return Err(HostError::FileMode {
                handle,
                expected: FileMode::Write.as_str(),
            });
        }
        self.files
            .entry(file.name.clone())
            .or_default()
            .push_str(text);
        Ok(())
    }

    /// Returns whether the handle was open.
    pub fn close(&mut self, handle: i32) -> bool {
        match self.open.remove(&handle) {
            Some(file) => {
                debug!(handle, name = %file.name, "file closed");
                self.released.push(handle);
                true
            }
            None => false,
        }
    }

    pub fn has_more(&self, handle: i32) -> bool {
        self.open
            .get(&handle)
            .and_then(|file| file.reader.as_ref())
            .is_some_and(|reader| reader.has_more())
    }

    /// Checks that `handle` can serve as program input.
    pub fn check_readable(&self, handle: i32) -> HostResult<()> {
        let file = self
            .open
            .get(&handle)
            .ok_or(HostError::BadFileHandle(handle))?;
        if file.reader.is_none() {
            return Err(HostError::FileMode {
                handle,
                expected: FileMode::Read.as_str(),
            });
        }
        Ok(())
    }

    pub fn reader_mut(&mut self, handle: i32) -> Option<&mut TextInput> {
        self.open
            .get_mut(&handle)
            .and_then(|file| file.reader.as_mut())
    }

    pub fn reset(&mut self) {
        self.open.clear();
        self.released.clear();
        self.next_handle = 1;
        self.files = self.seeded.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_fails_softly() {
        let mut files = FileManager::new();
        assert_eq!(files.open("nope.txt"), MISSING_FILE);
        assert_eq!(files.open_count(), 0);
    }

    #[test]
    fn handles_start_at_one_and_reuse_latest() {
        let mut files = FileManager::new();
        let a = files.open_for_write("a");
        let b = files.open_for_write("b");
        let c = files.open_for_write("c");
        assert_eq!((a, b, c), (1, 2, 3));
        files.close(a);
        files.close(c);
        assert_eq!(files.open_for_write("d"), c);
        assert_eq!(files.open_for_write("e"), a);
        assert_eq!(files.open_for_write("f"), 4);
    }

    #[test]
    fn write_truncates_and_append_preserves() {
        let mut files = FileManager::new();
        files.add_file("log", "old\n");
        let handle = files.open_for_append("log");
        files.write(handle, "new\n").unwrap();
        files.close(handle);
        assert_eq!(files.file("log"), Some("old\nnew\n"));

        let handle = files.open_for_write("log");
        files.write(handle, "fresh").unwrap();
        assert_eq!(files.file("log"), Some("fresh"));

        files.open_for_append("created");
        assert_eq!(files.file("created"), Some(""));
    }

    #[test]
    fn read_handle_snapshots_content() {
        let mut files = FileManager::new();
        files.add_file("data", "1 2");
        let reader = files.open("data");
        let writer = files.open_for_write("data");
        files.write(writer, "changed").unwrap();
        assert!(files.has_more(reader));
        assert_eq!(files.reader_mut(reader).unwrap().read_token(), "1");
        assert_eq!(files.reader_mut(reader).unwrap().read_token(), "2");
        assert!(!files.has_more(reader));
    }

    #[test]
    fn write_errors_are_fatal() {
        let mut files = FileManager::new();
        files.add_file("in", "x");
        let reader = files.open("in");
        assert_eq!(
            files.write(reader, "y"),
            Err(HostError::FileMode {
                handle: reader,
                expected: "writing"
            })
        );
        assert_eq!(files.write(9, "y"), Err(HostError::BadFileHandle(9)));
    }

    #[test]
    fn check_readable_rejects_writers() {
        let mut files = FileManager::new();
        let writer = files.open_for_write("out");
        assert!(matches!(
            files.check_readable(writer),
            Err(HostError::FileMode { .. })
        ));
        assert_eq!(files.check_readable(7), Err(HostError::BadFileHandle(7)));
    }

    #[test]
    fn unknown_handles_are_forgiving() {
        let mut files = FileManager::new();
        assert!(!files.close(3));
        assert!(!files.has_more(3));
    }

    #[test]
    fn reset_restores_seed() {
        let mut files = FileManager::new();
        files.add_file("keep", "seed");
        let handle = files.open_for_write("keep");
        files.write(handle, "overwritten").unwrap();
        files.open_for_write("extra");
        files.reset();
        assert_eq!(files.file("keep"), Some("seed"));
        assert_eq!(files.file("extra"), None);
        assert_eq!(files.open_count(), 0);
        assert_eq!(files.open_for_write("again"), 1);
    }
}
