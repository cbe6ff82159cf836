//! Minimal WebAssembly binary decoder: enough of the type, import, function
//! and export sections to recover the result type of an exported function.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

const MAGIC: &[u8; 4] = b"\0asm";
const VERSION: u32 = 1;

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_EXPORT: u8 = 7;

const FUNC_FORM: u8 = 0x60;
const REF_NULL: u8 = 0x63;
const REF: u8 = 0x64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntrospectError {
    #[error("module ends unexpectedly at byte {0}")]
    Truncated(usize),
    #[error("missing \\0asm magic")]
    BadMagic,
    #[error("unsupported binary version {0}")]
    BadVersion(u32),
    #[error("malformed LEB128 integer at byte {0}")]
    BadLeb(usize),
    #[error("section {id} at byte {offset} overruns the module")]
    SectionOverrun { id: u8, offset: usize },
    #[error("unexpected function type form 0x{form:02x} at byte {offset}")]
    BadTypeForm { form: u8, offset: usize },
    #[error("unknown import kind 0x{kind:02x} at byte {offset}")]
    BadImportKind { kind: u8, offset: usize },
    #[error("export name at byte {0} is not valid UTF-8")]
    BadName(usize),
}

type Result<T> = std::result::Result<T, IntrospectError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Funcref,
    Externref,
    Ref,
    Other,
}

impl ValType {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0x7F => ValType::I32,
            0x7E => ValType::I64,
            0x7D => ValType::F32,
            0x7C => ValType::F64,
            0x7B => ValType::V128,
            0x70 => ValType::Funcref,
            0x6F => ValType::Externref,
            REF_NULL | REF => ValType::Ref,
            _ => ValType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    I32,
    I64,
    F32,
    F64,
    Void,
    Unknown,
}

impl ReturnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnType::I32 => "i32",
            ReturnType::I64 => "i64",
            ReturnType::F32 => "f32",
            ReturnType::F64 => "f64",
            ReturnType::Void => "void",
            ReturnType::Unknown => "unknown",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ReturnType::F32 | ReturnType::F64)
    }

    fn from_results(results: &[ValType]) -> Self {
        match results {
            [] => ReturnType::Void,
            [ValType::I32] => ReturnType::I32,
            [ValType::I64] => ReturnType::I64,
            [ValType::F32] => ReturnType::F32,
            [ValType::F64] => ReturnType::F64,
            _ => ReturnType::Unknown,
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
    Tag,
    Other,
}

impl ExternKind {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => ExternKind::Func,
            0x01 => ExternKind::Table,
            0x02 => ExternKind::Memory,
            0x03 => ExternKind::Global,
            0x04 => ExternKind::Tag,
            _ => ExternKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleTypeInfo {
    pub types: Vec<FuncType>,
    pub imported_functions: u32,
    pub function_types: Vec<u32>,
    pub exports: Vec<Export>,
}

impl ModuleTypeInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        if reader.take(4)? != MAGIC {
            return Err(IntrospectError::BadMagic);
        }
        let version = u32::from_le_bytes([
            reader.byte()?,
            reader.byte()?,
            reader.byte()?,
            reader.byte()?,
        ]);
        if version != VERSION {
            return Err(IntrospectError::BadVersion(version));
        }

        let mut info = ModuleTypeInfo::default();
        while !reader.at_end() {
            let id = reader.byte()?;
            let size = reader.u32()? as usize;
            let offset = reader.pos;
            let mut section = reader
                .sub(size)
                .ok_or(IntrospectError::SectionOverrun { id, offset })?;
            match id {
                SECTION_TYPE => info.read_types(&mut section)?,
                SECTION_IMPORT => info.read_imports(&mut section)?,
                SECTION_FUNCTION => info.read_functions(&mut section)?,
                SECTION_EXPORT => info.read_exports(&mut section)?,
                _ => {}
            }
            reader.pos = offset + size;
        }
        Ok(info)
    }

    fn read_types(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        for _ in 0..reader.u32()? {
            let offset = reader.pos;
            let form = reader.byte()?;
            if form != FUNC_FORM {
                return Err(IntrospectError::BadTypeForm { form, offset });
            }
            let params = reader.val_types()?;
            let results = reader.val_types()?;
            self.types.push(FuncType { params, results });
        }
        Ok(())
    }

    fn read_imports(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        for _ in 0..reader.u32()? {
            reader.name()?;
            reader.name()?;
            let offset = reader.pos;
            match reader.byte()? {
                0x00 => {
                    reader.u32()?;
                    self.imported_functions += 1;
                }
                0x01 => {
                    reader.val_type()?;
                    reader.limits()?;
                }
                0x02 => reader.limits()?,
                0x03 => {
                    reader.val_type()?;
                    reader.byte()?;
                }
                0x04 => {
                    reader.byte()?;
                    reader.u32()?;
                }
                kind => return Err(IntrospectError::BadImportKind { kind, offset }),
            }
        }
        Ok(())
    }

    fn read_functions(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        for _ in 0..reader.u32()? {
            self.function_types.push(reader.u32()?);
        }
        Ok(())
    }

    fn read_exports(&mut self, reader: &mut Reader<'_>) -> Result<()> {
        for _ in 0..reader.u32()? {
            let name = reader.name()?;
            let kind = ExternKind::from_byte(reader.byte()?);
            let index = reader.u32()?;
            self.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|export| export.name == name)
    }

    /// Signature of a function by its index in the combined function space,
    /// or `None` for imported functions.
    pub fn defined_function_type(&self, index: u32) -> Option<&FuncType> {
        let defined = index.checked_sub(self.imported_functions)?;
        let type_index = *self.function_types.get(defined as usize)?;
        self.types.get(type_index as usize)
    }

    pub fn return_type(&self, export_name: &str) -> ReturnType {
        let Some(export) = self.export(export_name) else {
            return ReturnType::Unknown;
        };
        if export.kind != ExternKind::Func {
            return ReturnType::Unknown;
        }
        match self.defined_function_type(export.index) {
            Some(func) => ReturnType::from_results(&func.results),
            None => ReturnType::Unknown,
        }
    }

    /// Every exported function with its resolved return type.
    pub fn function_exports(&self) -> Vec<(String, ReturnType)> {
        self.exports
            .iter()
            .filter(|export| export.kind == ExternKind::Func)
            .map(|export| (export.name.clone(), self.return_type(&export.name)))
            .collect()
    }
}

/// Return type of `export_name`; malformed modules resolve to `Unknown`.
pub fn resolve_return_type(bytes: &[u8], export_name: &str) -> ReturnType {
    match ModuleTypeInfo::parse(bytes) {
        Ok(info) => info.return_type(export_name),
        Err(err) => {
            debug!(error = %err, "module introspection failed");
            ReturnType::Unknown
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            end: bytes.len(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn sub(&self, len: usize) -> Option<Reader<'a>> {
        let end = self.pos.checked_add(len)?;
        if end > self.end {
            return None;
        }
        Some(Reader {
            bytes: self.bytes,
            pos: self.pos,
            end,
        })
    }

    fn byte(&mut self) -> Result<u8> {
        if self.pos >= self.end {
            return Err(IntrospectError::Truncated(self.pos));
        }
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.end => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            _ => Err(IntrospectError::Truncated(self.end)),
        }
    }

    fn leb(&mut self, bits: u32) -> Result<u64> {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.byte()?;
            let payload = (byte & 0x7F) as u64;
            if shift >= bits || (bits - shift < 7 && payload >> (bits - shift) != 0) {
                return Err(IntrospectError::BadLeb(start));
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(self.leb(32)? as u32)
    }

    fn u64(&mut self) -> Result<u64> {
        self.leb(64)
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| IntrospectError::BadName(offset))
    }

    fn val_type(&mut self) -> Result<ValType> {
        let byte = self.byte()?;
        if byte == REF_NULL || byte == REF {
            // heap type, signed LEB128 up to 33 bits
            let start = self.pos;
            for _ in 0..5 {
                if self.byte()? & 0x80 == 0 {
                    return Ok(ValType::Ref);
                }
            }
            return Err(IntrospectError::BadLeb(start));
        }
        Ok(ValType::from_byte(byte))
    }

    fn val_types(&mut self) -> Result<Vec<ValType>> {
        let count = self.u32()?;
        let mut types = Vec::new();
        for _ in 0..count {
            types.push(self.val_type()?);
        }
        Ok(types)
    }

    fn limits(&mut self) -> Result<()> {
        let flags = self.u32()?;
        let wide = flags & 0x04 != 0;
        let has_max = flags & 0x01 != 0;
        let count = if has_max { 2 } else { 1 };
        for _ in 0..count {
            if wide {
                self.u64()?;
            } else {
                self.u32()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(text: &str) -> Vec<u8> {
        wat::parse_str(text).unwrap()
    }

    #[test]
    fn scalar_return_types() {
        let bytes = module(
            r#"(module
                (func (export "a") (result i32) i32.const 1)
                (func (export "b") (result i64) i64.const 1)
                (func (export "c") (result f32) f32.const 1)
                (func (export "d") (result f64) f64.const 1)
                (func (export "e")))"#,
        );
        assert_eq!(resolve_return_type(&bytes, "a"), ReturnType::I32);
        assert_eq!(resolve_return_type(&bytes, "b"), ReturnType::I64);
        assert_eq!(resolve_return_type(&bytes, "c"), ReturnType::F32);
        assert_eq!(resolve_return_type(&bytes, "d"), ReturnType::F64);
        assert_eq!(resolve_return_type(&bytes, "e"), ReturnType::Void);
        assert_eq!(resolve_return_type(&bytes, "missing"), ReturnType::Unknown);
    }

    #[test]
    fn imports_offset_function_indices() {
        let bytes = module(
            r#"(module
                (import "env" "memory" (memory 1 2))
                (import "env" "table" (table 1 funcref))
                (import "env" "flag" (global (mut i32)))
                (import "env" "ext" (func $ext (param i64) (result i64)))
                (import "env" "ext2" (func $ext2 (result f32)))
                (func $main (result f64) f64.const 2)
                (export "ext" (func $ext))
                (export "main" (func $main)))"#,
        );
        let info = ModuleTypeInfo::parse(&bytes).unwrap();
        assert_eq!(info.imported_functions, 2);
        assert_eq!(info.return_type("main"), ReturnType::F64);
        assert_eq!(info.return_type("ext"), ReturnType::Unknown);
    }

    #[test]
    fn non_function_exports_are_unknown() {
        let bytes = module(
            r#"(module
                (memory (export "memory") 1)
                (global (export "g") i32 (i32.const 0)))"#,
        );
        assert_eq!(resolve_return_type(&bytes, "memory"), ReturnType::Unknown);
        assert_eq!(resolve_return_type(&bytes, "g"), ReturnType::Unknown);
    }

    #[test]
    fn multi_value_and_vector_results_are_unknown() {
        let bytes = module(
            r#"(module
                (func (export "pair") (result i32 i64) i32.const 1 i64.const 2)
                (func (export "vec") (result v128) v128.const i64x2 0 0))"#,
        );
        assert_eq!(resolve_return_type(&bytes, "pair"), ReturnType::Unknown);
        assert_eq!(resolve_return_type(&bytes, "vec"), ReturnType::Unknown);
    }

    #[test]
    fn skips_code_data_and_custom_sections() {
        let mut bytes = module(
            r#"(module
                (memory 1)
                (data (i32.const 16) "hello")
                (func (export "main") (result i64) i64.const 5))"#,
        );
        // trailing custom section: id 0, size 5, name "x", payload "abc"
        bytes.extend_from_slice(&[0, 5, 1, b'x', b'a', b'b', b'c']);
        assert_eq!(resolve_return_type(&bytes, "main"), ReturnType::I64);
    }

    #[test]
    fn function_exports_listing() {
        let bytes = module(
            r#"(module
                (func (export "one") (result i32) i32.const 1)
                (memory (export "memory") 1)
                (func (export "two")))"#,
        );
        let info = ModuleTypeInfo::parse(&bytes).unwrap();
        assert_eq!(
            info.function_exports(),
            vec![
                ("one".to_string(), ReturnType::I32),
                ("two".to_string(), ReturnType::Void),
            ]
        );
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(
            ModuleTypeInfo::parse(&[]),
            Err(IntrospectError::Truncated(0))
        );
        assert_eq!(
            ModuleTypeInfo::parse(b"\0ELF\x01\0\0\0"),
            Err(IntrospectError::BadMagic)
        );
        assert_eq!(
            ModuleTypeInfo::parse(b"\0asm\x02\0\0\0"),
            Err(IntrospectError::BadVersion(2))
        );
    }

    #[test]
    fn truncated_module_is_unknown() {
        let bytes = module(r#"(module (func (export "main") (result i32) i32.const 7))"#);
        for len in 0..bytes.len() {
            // cut points on section boundaries parse cleanly; nothing may panic
            let _ = ModuleTypeInfo::parse(&bytes[..len]);
        }
        let cut = &bytes[..bytes.len() - 1];
        assert_eq!(resolve_return_type(cut, "main"), ReturnType::Unknown);
    }

    #[test]
    fn section_overrun_detected() {
        let bytes = [0, b'a', b's', b'm', 1, 0, 0, 0, SECTION_TYPE, 10, 0];
        assert_eq!(
            ModuleTypeInfo::parse(&bytes),
            Err(IntrospectError::SectionOverrun { id: 1, offset: 10 })
        );
    }

    #[test]
    fn leb_bounds() {
        let mut reader = Reader::new(&[0xE5, 0x8E, 0x26]);
        assert_eq!(reader.u32().unwrap(), 624485);
        let mut reader = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(reader.u32().unwrap(), u32::MAX);
        let mut reader = Reader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert_eq!(reader.u32(), Err(IntrospectError::BadLeb(0)));
        let mut reader = Reader::new(&[0x80, 0x80]);
        assert_eq!(reader.u32(), Err(IntrospectError::Truncated(2)));
    }
}
