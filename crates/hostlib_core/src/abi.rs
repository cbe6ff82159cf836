// Shared ABI between compiled modules and the host runtime.

pub const HOST_MODULE: &str = "env";
pub const MEMORY_EXPORT: &str = "memory";

pub const PAGE_SIZE: u32 = 65536;

// Layout of string arrays is fixed by the code generator.
pub const STR_ARRAY_STRIDE: u32 = 8;
pub const STR_ARRAY_HANDLE_OFFSET: u32 = 0;

pub const MAX_CODEPOINT: i64 = 0x10FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: &'static [ArgKind],
    pub result: Option<ArgKind>,
}

const fn sig(params: &'static [ArgKind], result: Option<ArgKind>) -> Signature {
    Signature { params, result }
}

use ArgKind::{Float as F, Int as I};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFn {
    StrFromLit,
    StrRetain,
    StrRelease,
    StrConcat,
    StrSlice,
    StrCompare,
    StrLen,
    StrSymbolAt,
    StrUnicode,
    StrFromUnicode,
    StrStr,
    StrStrFrom,
    StrFromDouble,
    StrFromInt,
    StrToDouble,
    StrToInt,
    StrReplaceSymbol,
    ArrayCreate,
    ArrayDestroy,
    ArrayStrDestroy,
    InputDouble,
    InputInt64,
    InputString,
    OutputDouble,
    OutputInt64,
    OutputBool,
    OutputSymbol,
    OutputString,
    OutputNewline,
    FileOpenForRead,
    FileOpenForWrite,
    FileOpenForAppend,
    FileClose,
    FileHasMoreData,
    FileWriteString,
    InputSetFile,
    InputResetFile,
    Sign,
    MinInt64,
    MaxInt64,
    MinDouble,
    MaxDouble,
    Labs,
    Fabs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Cotan,
    Asin,
    Acos,
    Atan,
    Log,
    Log10,
    Exp,
    Div,
    Mod,
    Fpow,
    Pow,
    TruncDouble,
    MaxLimitInt64,
    MaxLimitDouble,
    RandDouble,
    RandDoubleRange,
    RandInt64,
    RandInt64Range,
    RandUint64,
    RandUint64Range,
}

impl HostFn {
    pub const ALL: &'static [HostFn] = &[
        HostFn::StrFromLit,
        HostFn::StrRetain,
        HostFn::StrRelease,
        HostFn::StrConcat,
        HostFn::StrSlice,
        HostFn::StrCompare,
        HostFn::StrLen,
        HostFn::StrSymbolAt,
        HostFn::StrUnicode,
        HostFn::StrFromUnicode,
        HostFn::StrStr,
        HostFn::StrStrFrom,
        HostFn::StrFromDouble,
        HostFn::StrFromInt,
        HostFn::StrToDouble,
        HostFn::StrToInt,
        HostFn::StrReplaceSymbol,
        HostFn::ArrayCreate,
        HostFn::ArrayDestroy,
        HostFn::ArrayStrDestroy,
        HostFn::InputDouble,
        HostFn::InputInt64,
        HostFn::InputString,
        HostFn::OutputDouble,
        HostFn::OutputInt64,
        HostFn::OutputBool,
        HostFn::OutputSymbol,
        HostFn::OutputString,
        HostFn::OutputNewline,
        HostFn::FileOpenForRead,
        HostFn::FileOpenForWrite,
        HostFn::FileOpenForAppend,
        HostFn::FileClose,
        HostFn::FileHasMoreData,
        HostFn::FileWriteString,
        HostFn::InputSetFile,
        HostFn::InputResetFile,
        HostFn::Sign,
        HostFn::MinInt64,
        HostFn::MaxInt64,
        HostFn::MinDouble,
        HostFn::MaxDouble,
        HostFn::Labs,
        HostFn::Fabs,
        HostFn::Sqrt,
        HostFn::Sin,
        HostFn::Cos,
        HostFn::Tan,
        HostFn::Cotan,
        HostFn::Asin,
        HostFn::Acos,
        HostFn::Atan,
        HostFn::Log,
        HostFn::Log10,
        HostFn::Exp,
        HostFn::Div,
        HostFn::Mod,
        HostFn::Fpow,
        HostFn::Pow,
        HostFn::TruncDouble,
        HostFn::MaxLimitInt64,
        HostFn::MaxLimitDouble,
        HostFn::RandDouble,
        HostFn::RandDoubleRange,
        HostFn::RandInt64,
        HostFn::RandInt64Range,
        HostFn::RandUint64,
        HostFn::RandUint64Range,
    ];

    pub fn from_name(name: &str) -> Option<HostFn> {
        HostFn::ALL.iter().copied().find(|host_fn| host_fn.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            HostFn::StrFromLit => "str_from_lit",
            HostFn::StrRetain => "str_retain",
            HostFn::StrRelease => "str_release",
            HostFn::StrConcat => "str_concat",
            HostFn::StrSlice => "str_slice",
            HostFn::StrCompare => "str_compare",
            HostFn::StrLen => "str_len",
            HostFn::StrSymbolAt => "str_symbol_at",
            HostFn::StrUnicode => "str_unicode",
            HostFn::StrFromUnicode => "str_from_unicode",
            HostFn::StrStr => "str_str",
            HostFn::StrStrFrom => "str_str_from",
            HostFn::StrFromDouble => "str_from_double",
            HostFn::StrFromInt => "str_from_int",
            HostFn::StrToDouble => "str_to_double",
            HostFn::StrToInt => "str_to_int",
            HostFn::StrReplaceSymbol => "str_replace_symbol",
            HostFn::ArrayCreate => "array_create",
            HostFn::ArrayDestroy => "array_destroy",
            HostFn::ArrayStrDestroy => "array_str_destroy",
            HostFn::InputDouble => "input_double",
            HostFn::InputInt64 => "input_int64",
            HostFn::InputString => "input_string",
            HostFn::OutputDouble => "output_double",
            HostFn::OutputInt64 => "output_int64",
            HostFn::OutputBool => "output_bool",
            HostFn::OutputSymbol => "output_symbol",
            HostFn::OutputString => "output_string",
            HostFn::OutputNewline => "output_newline",
            HostFn::FileOpenForRead => "file_open_for_read",
            HostFn::FileOpenForWrite => "file_open_for_write",
            HostFn::FileOpenForAppend => "file_open_for_append",
            HostFn::FileClose => "file_close",
            HostFn::FileHasMoreData => "file_has_more_data",
            HostFn::FileWriteString => "file_write_string",
            HostFn::InputSetFile => "input_set_file",
            HostFn::InputResetFile => "input_reset_file",
            HostFn::Sign => "sign",
            HostFn::MinInt64 => "min_int64_t",
            HostFn::MaxInt64 => "max_int64_t",
            HostFn::MinDouble => "min_double",
            HostFn::MaxDouble => "max_double",
            HostFn::Labs => "labs",
            HostFn::Fabs => "fabs",
            HostFn::Sqrt => "sqrt",
            HostFn::Sin => "sin",
            HostFn::Cos => "cos",
            HostFn::Tan => "tan",
            HostFn::Cotan => "cotan",
            HostFn::Asin => "asin",
            HostFn::Acos => "acos",
            HostFn::Atan => "atan",
            HostFn::Log => "log",
            HostFn::Log10 => "log10",
            HostFn::Exp => "exp",
            HostFn::Div => "div",
            HostFn::Mod => "mod",
            HostFn::Fpow => "fpow",
            HostFn::Pow => "pow",
            HostFn::TruncDouble => "trunc_double",
            HostFn::MaxLimitInt64 => "max_limit_int64_t",
            HostFn::MaxLimitDouble => "max_limit_double",
            HostFn::RandDouble => "rand_double",
            HostFn::RandDoubleRange => "rand_double_range",
            HostFn::RandInt64 => "rand_int64",
            HostFn::RandInt64Range => "rand_int64_range",
            HostFn::RandUint64 => "rand_uint64",
            HostFn::RandUint64Range => "rand_uint64_range",
        }
    }

    pub fn signature(self) -> Signature {
        match self {
            HostFn::StrFromLit => sig(&[I], Some(I)),
            HostFn::StrRetain | HostFn::StrRelease => sig(&[I], None),
            HostFn::StrConcat => sig(&[I, I], Some(I)),
            HostFn::StrSlice => sig(&[I, I, I], Some(I)),
            HostFn::StrCompare => sig(&[I, I], Some(I)),
            HostFn::StrLen => sig(&[I], Some(I)),
            HostFn::StrSymbolAt => sig(&[I, I], Some(I)),
            HostFn::StrUnicode => sig(&[I], Some(I)),
            HostFn::StrFromUnicode => sig(&[I], Some(I)),
            HostFn::StrStr => sig(&[I, I], Some(I)),
            HostFn::StrStrFrom => sig(&[I, I, I], Some(I)),
            HostFn::StrFromDouble => sig(&[F], Some(I)),
            HostFn::StrFromInt => sig(&[I], Some(I)),
            HostFn::StrToDouble => sig(&[I, I], Some(F)),
            HostFn::StrToInt => sig(&[I, I], Some(I)),
            HostFn::StrReplaceSymbol => sig(&[I, I, I], Some(I)),
            HostFn::ArrayCreate => sig(&[I], Some(I)),
            HostFn::ArrayDestroy => sig(&[I], None),
            HostFn::ArrayStrDestroy => sig(&[I, I], None),
            HostFn::InputDouble => sig(&[], Some(F)),
            HostFn::InputInt64 => sig(&[], Some(I)),
            HostFn::InputString => sig(&[], Some(I)),
            HostFn::OutputDouble => sig(&[F], None),
            HostFn::OutputInt64
            | HostFn::OutputBool
            | HostFn::OutputSymbol
            | HostFn::OutputString => sig(&[I], None),
            HostFn::OutputNewline => sig(&[], None),
            HostFn::FileOpenForRead | HostFn::FileOpenForWrite | HostFn::FileOpenForAppend => {
                sig(&[I], Some(I))
            }
            HostFn::FileClose | HostFn::InputSetFile => sig(&[I], None),
            HostFn::FileHasMoreData => sig(&[I], Some(I)),
            HostFn::FileWriteString => sig(&[I, I], None),
            HostFn::InputResetFile => sig(&[], None),
            HostFn::Sign => sig(&[F], Some(I)),
            HostFn::MinInt64 | HostFn::MaxInt64 | HostFn::Div | HostFn::Mod => {
                sig(&[I, I], Some(I))
            }
            HostFn::MinDouble | HostFn::MaxDouble | HostFn::Pow => sig(&[F, F], Some(F)),
            HostFn::Labs => sig(&[I], Some(I)),
            HostFn::Fabs
            | HostFn::Sqrt
            | HostFn::Sin
            | HostFn::Cos
            | HostFn::Tan
            | HostFn::Cotan
            | HostFn::Asin
            | HostFn::Acos
            | HostFn::Atan
            | HostFn::Log
            | HostFn::Log10
            | HostFn::Exp => sig(&[F], Some(F)),
            HostFn::Fpow => sig(&[F, I], Some(F)),
            HostFn::TruncDouble => sig(&[F], Some(I)),
            HostFn::MaxLimitInt64 => sig(&[], Some(I)),
            HostFn::MaxLimitDouble => sig(&[], Some(F)),
            HostFn::RandDouble => sig(&[F], Some(F)),
            HostFn::RandDoubleRange => sig(&[F, F], Some(F)),
            HostFn::RandInt64 | HostFn::RandUint64 => sig(&[I], Some(I)),
            HostFn::RandInt64Range | HostFn::RandUint64Range => sig(&[I, I], Some(I)),
        }
    }
}

/// Address carried in a raw integer argument: the low 32 bits, no range check.
pub fn addr(raw: i64) -> u32 {
    raw as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_round_trip_through_lookup() {
        for host_fn in HostFn::ALL {
            assert_eq!(HostFn::from_name(host_fn.name()), Some(*host_fn));
        }
        assert_eq!(HostFn::from_name("str_nope"), None);
    }

    #[test]
    fn names_are_unique() {
        let names = HostFn::ALL
            .iter()
            .map(|host_fn| host_fn.name())
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), HostFn::ALL.len());
    }

    #[test]
    fn addr_truncates_to_low_bits() {
        assert_eq!(addr(0x1_0000_0010), 0x10);
        assert_eq!(addr(-1), u32::MAX);
        assert_eq!(addr(1024), 1024);
    }

    #[test]
    fn string_array_layout_is_fixed() {
        assert_eq!(STR_ARRAY_STRIDE, 8);
        assert_eq!(STR_ARRAY_HANDLE_OFFSET, 0);
    }
}
