use crate::abi::{addr, HostFn};
use crate::arena::ArrayArena;
use crate::config::HostConfig;
use crate::error::HostResult;
use crate::io::{InputStream, IoState, OutputStream};
use crate::math;
use crate::memory::{LinearMemory, MemoryBinding};
use crate::normalize::{normalize, NormalizeOptions, RawValue};
use crate::strings::StringPool;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Every function a compiled module may import from the host, with Rust
/// types. Integer arguments arrive sign-extended to i64, floats widened to
/// f64; string arguments are raw references (pool handle or address).
pub trait HostImports {
    fn str_from_lit(&mut self, memory: &mut dyn LinearMemory, lit: i64) -> HostResult<i64>;
    fn str_retain(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<()>;
    fn str_release(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<()>;
    fn str_concat(&mut self, memory: &mut dyn LinearMemory, a: i64, b: i64) -> HostResult<i64>;
    fn str_slice(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        start: i64,
        end: i64,
    ) -> HostResult<i64>;
    fn str_compare(&mut self, memory: &mut dyn LinearMemory, a: i64, b: i64) -> HostResult<i64>;
    fn str_len(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<i64>;
    fn str_symbol_at(&mut self, memory: &mut dyn LinearMemory, s: i64, pos: i64)
        -> HostResult<i64>;
    fn str_unicode(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<i64>;
    fn str_from_unicode(&mut self, memory: &mut dyn LinearMemory, code: i64) -> HostResult<i64>;
    fn str_str(&mut self, memory: &mut dyn LinearMemory, haystack: i64, needle: i64)
        -> HostResult<i64>;
    fn str_str_from(
        &mut self,
        memory: &mut dyn LinearMemory,
        start: i64,
        haystack: i64,
        needle: i64,
    ) -> HostResult<i64>;
    fn str_from_double(&mut self, memory: &mut dyn LinearMemory, value: f64) -> HostResult<i64>;
    fn str_from_int(&mut self, memory: &mut dyn LinearMemory, value: i64) -> HostResult<i64>;
    fn str_to_double(&mut self, memory: &mut dyn LinearMemory, s: i64, ok: i64)
        -> HostResult<f64>;
    fn str_to_int(&mut self, memory: &mut dyn LinearMemory, s: i64, ok: i64) -> HostResult<i64>;
    fn str_replace_symbol(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        code: i64,
        pos: i64,
    ) -> HostResult<i64>;

    fn array_create(&mut self, memory: &mut dyn LinearMemory, size: i64) -> HostResult<i64>;
    fn array_destroy(&mut self, memory: &mut dyn LinearMemory, ptr: i64) -> HostResult<()>;
    fn array_str_destroy(
        &mut self,
        memory: &mut dyn LinearMemory,
        ptr: i64,
        total_bytes: i64,
    ) -> HostResult<()>;

    fn input_double(&mut self) -> HostResult<f64>;
    fn input_int64(&mut self) -> HostResult<i64>;
    fn input_string(&mut self, memory: &mut dyn LinearMemory) -> HostResult<i64>;
    fn output_double(&mut self, value: f64) -> HostResult<()>;
    fn output_int64(&mut self, value: i64) -> HostResult<()>;
    fn output_bool(&mut self, value: i64) -> HostResult<()>;
    fn output_symbol(&mut self, code: i64) -> HostResult<()>;
    fn output_string(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<()>;
    fn output_newline(&mut self) -> HostResult<()>;

    fn file_open_for_read(&mut self, memory: &mut dyn LinearMemory, name: i64) -> HostResult<i64>;
    fn file_open_for_write(&mut self, memory: &mut dyn LinearMemory, name: i64)
        -> HostResult<i64>;
    fn file_open_for_append(
        &mut self,
        memory: &mut dyn LinearMemory,
        name: i64,
    ) -> HostResult<i64>;
    fn file_close(&mut self, handle: i64) -> HostResult<()>;
    fn file_has_more_data(&mut self, handle: i64) -> HostResult<i64>;
    fn file_write_string(
        &mut self,
        memory: &mut dyn LinearMemory,
        handle: i64,
        s: i64,
    ) -> HostResult<()>;
    fn input_set_file(&mut self, handle: i64) -> HostResult<()>;
    fn input_reset_file(&mut self) -> HostResult<()>;

    fn rand_double(&mut self, x: f64) -> HostResult<f64>;
    fn rand_double_range(&mut self, a: f64, b: f64) -> HostResult<f64>;
    fn rand_int64(&mut self, x: i64) -> HostResult<i64>;
    fn rand_int64_range(&mut self, a: i64, b: i64) -> HostResult<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    Int(i64),
    Float(f64),
}

impl HostValue {
    pub fn as_int(self) -> i64 {
        match self {
            HostValue::Int(value) => value,
            HostValue::Float(value) => value as i64,
        }
    }

    pub fn as_float(self) -> f64 {
        match self {
            HostValue::Int(value) => value as f64,
            HostValue::Float(value) => value,
        }
    }
}

/// Routes a loosely typed import call to the matching typed host function.
/// Missing arguments read as zero. Math builtins other than the random
/// ones are pure and bypass `host`.
pub fn dispatch<H: HostImports + ?Sized>(
    host: &mut H,
    memory: &mut dyn LinearMemory,
    func: HostFn,
    args: &[HostValue],
) -> HostResult<Option<HostValue>> {
    use HostValue::{Float, Int};

    let int = |idx: usize| args.get(idx).map_or(0, |arg| arg.as_int());
    let float = |idx: usize| args.get(idx).map_or(0.0, |arg| arg.as_float());
    let unit = |_: ()| None;

    let result = match func {
        HostFn::StrFromLit => Some(Int(host.str_from_lit(memory, int(0))?)),
        HostFn::StrRetain => unit(host.str_retain(memory, int(0))?),
        HostFn::StrRelease => unit(host.str_release(memory, int(0))?),
        HostFn::StrConcat => Some(Int(host.str_concat(memory, int(0), int(1))?)),
        HostFn::StrSlice => Some(Int(host.str_slice(memory, int(0), int(1), int(2))?)),
        HostFn::StrCompare => Some(Int(host.str_compare(memory, int(0), int(1))?)),
        HostFn::StrLen => Some(Int(host.str_len(memory, int(0))?)),
        HostFn::StrSymbolAt => Some(Int(host.str_symbol_at(memory, int(0), int(1))?)),
        HostFn::StrUnicode => Some(Int(host.str_unicode(memory, int(0))?)),
        HostFn::StrFromUnicode => Some(Int(host.str_from_unicode(memory, int(0))?)),
        HostFn::StrStr => Some(Int(host.str_str(memory, int(0), int(1))?)),
        HostFn::StrStrFrom => Some(Int(host.str_str_from(memory, int(0), int(1), int(2))?)),
        HostFn::StrFromDouble => Some(Int(host.str_from_double(memory, float(0))?)),
        HostFn::StrFromInt => Some(Int(host.str_from_int(memory, int(0))?)),
        HostFn::StrToDouble => Some(Float(host.str_to_double(memory, int(0), int(1))?)),
        HostFn::StrToInt => Some(Int(host.str_to_int(memory, int(0), int(1))?)),
        HostFn::StrReplaceSymbol => Some(Int(host.str_replace_symbol(
            memory,
            int(0),
            int(1),
            int(2),
        )?)),

        HostFn::ArrayCreate => Some(Int(host.array_create(memory, int(0))?)),
        HostFn::ArrayDestroy => unit(host.array_destroy(memory, int(0))?),
        HostFn::ArrayStrDestroy => unit(host.array_str_destroy(memory, int(0), int(1))?),

        HostFn::InputDouble => Some(Float(host.input_double()?)),
        HostFn::InputInt64 => Some(Int(host.input_int64()?)),
        HostFn::InputString => Some(Int(host.input_string(memory)?)),
        HostFn::OutputDouble => unit(host.output_double(float(0))?),
        HostFn::OutputInt64 => unit(host.output_int64(int(0))?),
        HostFn::OutputBool => unit(host.output_bool(int(0))?),
        HostFn::OutputSymbol => unit(host.output_symbol(int(0))?),
        HostFn::OutputString => unit(host.output_string(memory, int(0))?),
        HostFn::OutputNewline => unit(host.output_newline()?),

        HostFn::FileOpenForRead => Some(Int(host.file_open_for_read(memory, int(0))?)),
        HostFn::FileOpenForWrite => Some(Int(host.file_open_for_write(memory, int(0))?)),
        HostFn::FileOpenForAppend => Some(Int(host.file_open_for_append(memory, int(0))?)),
        HostFn::FileClose => unit(host.file_close(int(0))?),
        HostFn::FileHasMoreData => Some(Int(host.file_has_more_data(int(0))?)),
        HostFn::FileWriteString => unit(host.file_write_string(memory, int(0), int(1))?),
        HostFn::InputSetFile => unit(host.input_set_file(int(0))?),
        HostFn::InputResetFile => unit(host.input_reset_file()?),

        HostFn::Sign => Some(Int(math::sign(float(0)))),
        HostFn::MinInt64 => Some(Int(math::min_int(int(0), int(1)))),
        HostFn::MaxInt64 => Some(Int(math::max_int(int(0), int(1)))),
        HostFn::MinDouble => Some(Float(math::min_double(float(0), float(1)))),
        HostFn::MaxDouble => Some(Float(math::max_double(float(0), float(1)))),
        HostFn::Labs => Some(Int(math::labs(int(0)))),
        HostFn::Fabs => Some(Float(float(0).abs())),
        HostFn::Sqrt => Some(Float(float(0).sqrt())),
        HostFn::Sin => Some(Float(float(0).sin())),
        HostFn::Cos => Some(Float(float(0).cos())),
        HostFn::Tan => Some(Float(float(0).tan())),
        HostFn::Cotan => Some(Float(math::cotan(float(0)))),
        HostFn::Asin => Some(Float(float(0).asin())),
        HostFn::Acos => Some(Float(float(0).acos())),
        HostFn::Atan => Some(Float(float(0).atan())),
        HostFn::Log => Some(Float(float(0).ln())),
        HostFn::Log10 => Some(Float(float(0).log10())),
        HostFn::Exp => Some(Float(float(0).exp())),
        HostFn::Div => Some(Int(math::div(int(0), int(1)))),
        HostFn::Mod => Some(Int(math::rem(int(0), int(1)))),
        HostFn::Fpow => Some(Float(math::fpow(float(0), int(1)))),
        HostFn::Pow => Some(Float(float(0).powf(float(1)))),
        HostFn::TruncDouble => Some(Int(math::trunc_double(float(0)))),
        HostFn::MaxLimitInt64 => Some(Int(math::max_limit_int())),
        HostFn::MaxLimitDouble => Some(Float(math::max_limit_double())),
        HostFn::RandDouble => Some(Float(host.rand_double(float(0))?)),
        HostFn::RandDoubleRange => Some(Float(host.rand_double_range(float(0), float(1))?)),
        HostFn::RandInt64 | HostFn::RandUint64 => Some(Int(host.rand_int64(int(0))?)),
        HostFn::RandInt64Range | HostFn::RandUint64Range => {
            Some(Int(host.rand_int64_range(int(0), int(1))?))
        }
    };
    Ok(result)
}

/// All mutable host state for one module instance.
pub struct HostRuntime {
    config: HostConfig,
    binding: MemoryBinding,
    pool: StringPool,
    arena: ArrayArena,
    io: IoState,
    rng: StdRng,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl HostRuntime {
    pub fn new(config: HostConfig) -> Self {
        let arena = ArrayArena::new(config.strict_free, config.max_memory_pages);
        let rng = match config.rand_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            binding: MemoryBinding::default(),
            pool: StringPool::new(),
            arena,
            io: IoState::new(),
            rng,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Attaches the runtime to a memory instance, dropping every string and
    /// array allocation made against the previous one.
    pub fn bind(&mut self, memory: &dyn LinearMemory) -> u64 {
        let generation = self.binding.bind(memory);
        self.pool.clear();
        self.arena.reset();
        debug!(generation, size = memory.size(), "host runtime bound to memory");
        generation
    }

    pub fn binding(&self) -> &MemoryBinding {
        &self.binding
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn arena(&self) -> &ArrayArena {
        &self.arena
    }

    pub fn io(&self) -> &IoState {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IoState {
        &mut self.io
    }

    pub fn set_input_stream(&mut self, stream: Box<dyn InputStream>, is_default: bool) {
        self.io.set_input_stream(stream, is_default);
    }

    pub fn set_output_stream(&mut self, stream: Box<dyn OutputStream>) {
        self.io.set_output_stream(stream);
    }

    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.io.files_mut().add_file(name, content);
    }

    /// Called before each execution so nothing leaks between runs.
    pub fn reset_io(&mut self, clear_output: bool) {
        self.io.reset(clear_output);
    }

    pub fn call(
        &mut self,
        memory: &mut dyn LinearMemory,
        func: HostFn,
        args: &[HostValue],
    ) -> HostResult<Option<HostValue>> {
        dispatch(self, memory, func, args)
    }

    pub fn normalize(
        &self,
        value: RawValue,
        options: &NormalizeOptions<'_>,
        memory: &dyn LinearMemory,
    ) -> String {
        normalize(value, options, &self.pool, memory)
    }

    fn bound(&self) -> HostResult<()> {
        self.binding.ensure_bound()
    }

    fn file_name(&self, memory: &dyn LinearMemory, name: i64) -> HostResult<String> {
        Ok(self.pool.read(memory, name)?.into_owned())
    }
}

impl HostImports for HostRuntime {
    fn str_from_lit(&mut self, memory: &mut dyn LinearMemory, lit: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.from_literal(memory, lit)
    }

    fn str_retain(&mut self, _memory: &mut dyn LinearMemory, s: i64) -> HostResult<()> {
        self.bound()?;
        self.pool.retain_ref(s)
    }

    fn str_release(&mut self, _memory: &mut dyn LinearMemory, s: i64) -> HostResult<()> {
        self.bound()?;
        self.pool.release_ref(s)
    }

    fn str_concat(&mut self, memory: &mut dyn LinearMemory, a: i64, b: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.concat(memory, a, b)
    }

    fn str_slice(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        start: i64,
        end: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        self.pool.slice(memory, s, start, end)
    }

    fn str_compare(&mut self, memory: &mut dyn LinearMemory, a: i64, b: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.compare(memory, a, b)
    }

    fn str_len(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.length(memory, s)
    }

    fn str_symbol_at(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        pos: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        self.pool.symbol_at(memory, s, pos)
    }

    fn str_unicode(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.unicode(memory, s)
    }

    fn str_from_unicode(&mut self, _memory: &mut dyn LinearMemory, code: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.from_codepoint(code)
    }

    fn str_str(
        &mut self,
        memory: &mut dyn LinearMemory,
        haystack: i64,
        needle: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        self.pool.index_of(memory, haystack, needle)
    }

    fn str_str_from(
        &mut self,
        memory: &mut dyn LinearMemory,
        start: i64,
        haystack: i64,
        needle: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        self.pool.index_of_from(memory, start, haystack, needle)
    }

    fn str_from_double(&mut self, _memory: &mut dyn LinearMemory, value: f64) -> HostResult<i64> {
        self.bound()?;
        self.pool.from_double(value)
    }

    fn str_from_int(&mut self, _memory: &mut dyn LinearMemory, value: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.from_int(value)
    }

    fn str_to_double(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        ok: i64,
    ) -> HostResult<f64> {
        self.bound()?;
        self.pool.to_double(memory, s, ok)
    }

    fn str_to_int(&mut self, memory: &mut dyn LinearMemory, s: i64, ok: i64) -> HostResult<i64> {
        self.bound()?;
        self.pool.to_int(memory, s, ok)
    }

    fn str_replace_symbol(
        &mut self,
        memory: &mut dyn LinearMemory,
        s: i64,
        code: i64,
        pos: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        self.pool.replace_symbol(memory, s, code, pos)
    }

    fn array_create(&mut self, memory: &mut dyn LinearMemory, size: i64) -> HostResult<i64> {
        self.bound()?;
        self.arena.create(memory, addr(size)).map(i64::from)
    }

    fn array_destroy(&mut self, _memory: &mut dyn LinearMemory, ptr: i64) -> HostResult<()> {
        self.bound()?;
        self.arena.destroy(addr(ptr))
    }

    fn array_str_destroy(
        &mut self,
        memory: &mut dyn LinearMemory,
        ptr: i64,
        total_bytes: i64,
    ) -> HostResult<()> {
        self.bound()?;
        self.arena
            .destroy_string_array(memory, &mut self.pool, addr(ptr), addr(total_bytes))
    }

    fn input_double(&mut self) -> HostResult<f64> {
        Ok(self.io.read_double())
    }

    fn input_int64(&mut self) -> HostResult<i64> {
        Ok(self.io.read_int())
    }

    fn input_string(&mut self, _memory: &mut dyn LinearMemory) -> HostResult<i64> {
        self.bound()?;
        let line = self.io.read_line();
        self.pool.insert(line).map(i64::from)
    }

    fn output_double(&mut self, value: f64) -> HostResult<()> {
        self.io.write_double(value);
        Ok(())
    }

    fn output_int64(&mut self, value: i64) -> HostResult<()> {
        self.io.write_int(value);
        Ok(())
    }

    fn output_bool(&mut self, value: i64) -> HostResult<()> {
        let token = self.config.bool_token(value != 0);
        self.io.write(token);
        Ok(())
    }

    fn output_symbol(&mut self, code: i64) -> HostResult<()> {
        self.io.write_symbol(code);
        Ok(())
    }

    fn output_string(&mut self, memory: &mut dyn LinearMemory, s: i64) -> HostResult<()> {
        self.bound()?;
        let text = self.pool.read(memory, s)?;
        self.io.write(&text);
        Ok(())
    }

    fn output_newline(&mut self) -> HostResult<()> {
        self.io.write("\n");
        Ok(())
    }

    fn file_open_for_read(&mut self, memory: &mut dyn LinearMemory, name: i64) -> HostResult<i64> {
        self.bound()?;
        let name = self.file_name(memory, name)?;
        Ok(self.io.files_mut().open(&name) as i64)
    }

    fn file_open_for_write(
        &mut self,
        memory: &mut dyn LinearMemory,
        name: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        let name = self.file_name(memory, name)?;
        Ok(self.io.files_mut().open_for_write(&name) as i64)
    }

    fn file_open_for_append(
        &mut self,
        memory: &mut dyn LinearMemory,
        name: i64,
    ) -> HostResult<i64> {
        self.bound()?;
        let name = self.file_name(memory, name)?;
        Ok(self.io.files_mut().open_for_append(&name) as i64)
    }

    fn file_close(&mut self, handle: i64) -> HostResult<()> {
        self.io.close_file(handle as i32);
        Ok(())
    }

    fn file_has_more_data(&mut self, handle: i64) -> HostResult<i64> {
        Ok(self.io.files().has_more(handle as i32) as i64)
    }

    fn file_write_string(
        &mut self,
        memory: &mut dyn LinearMemory,
        handle: i64,
        s: i64,
    ) -> HostResult<()> {
        self.bound()?;
        let text = self.pool.read(memory, s)?;
        self.io.files_mut().write(handle as i32, &text)
    }

    fn input_set_file(&mut self, handle: i64) -> HostResult<()> {
        self.io.input_set_file(handle as i32)
    }

    fn input_reset_file(&mut self) -> HostResult<()> {
        self.io.input_reset_file();
        Ok(())
    }

    fn rand_double(&mut self, x: f64) -> HostResult<f64> {
        Ok(math::rand_double(&mut self.rng, x))
    }

    fn rand_double_range(&mut self, a: f64, b: f64) -> HostResult<f64> {
        Ok(math::rand_double_range(&mut self.rng, a, b))
    }

    fn rand_int64(&mut self, x: i64) -> HostResult<i64> {
        Ok(math::rand_int(&mut self.rng, x))
    }

    fn rand_int64_range(&mut self, a: i64, b: i64) -> HostResult<i64> {
        Ok(math::rand_int_range(&mut self.rng, a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::io::{CaptureOutput, TextInput};
    use crate::memory::{write_bytes, VecMemory};
    use HostValue::{Float, Int};

    struct Fixture {
        host: HostRuntime,
        memory: VecMemory,
        output: CaptureOutput,
        next: u32,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(HostConfig::default())
        }

        fn with_config(config: HostConfig) -> Self {
            let mut host = HostRuntime::new(config);
            let memory = VecMemory::new(1);
            let output = CaptureOutput::new();
            host.set_output_stream(Box::new(output.clone()));
            host.bind(&memory);
            Self {
                host,
                memory,
                output,
                next: 16,
            }
        }

        fn cstr(&mut self, text: &str) -> i64 {
            let at = self.next;
            write_bytes(&mut self.memory, at, text.as_bytes()).unwrap();
            write_bytes(&mut self.memory, at + text.len() as u32, &[0]).unwrap();
            self.next += text.len() as u32 + 1;
            at as i64
        }

        fn call(&mut self, func: HostFn, args: &[HostValue]) -> HostResult<Option<HostValue>> {
            self.host.call(&mut self.memory, func, args)
        }

        fn int(&mut self, func: HostFn, args: &[HostValue]) -> i64 {
            match self.call(func, args).unwrap() {
                Some(Int(value)) => value,
                other => panic!("expected int from {func:?}, got {other:?}"),
            }
        }

        fn text(&self, raw: i64) -> String {
            self.host.pool().read(&self.memory, raw).unwrap().into_owned()
        }
    }

    #[test]
    fn unbound_runtime_rejects_memory_calls() {
        let mut host = HostRuntime::default();
        let mut memory = VecMemory::new(1);
        assert_eq!(
            host.call(&mut memory, HostFn::StrFromLit, &[Int(0)]),
            Err(HostError::Unbound)
        );
        assert_eq!(
            host.call(&mut memory, HostFn::ArrayCreate, &[Int(8)]),
            Err(HostError::Unbound)
        );
        assert_eq!(
            host.call(&mut memory, HostFn::Div, &[Int(7), Int(2)]),
            Ok(Some(Int(3)))
        );
    }

    #[test]
    fn concat_through_dispatch() {
        let mut fx = Fixture::new();
        let abc = fx.cstr("abc");
        let def = fx.cstr("def");
        let a = fx.int(HostFn::StrFromLit, &[Int(abc)]);
        let b = fx.int(HostFn::StrFromLit, &[Int(def)]);
        let joined = fx.int(HostFn::StrConcat, &[Int(a), Int(b)]);
        assert_eq!(fx.text(joined), "abcdef");
        assert_eq!(fx.int(HostFn::StrLen, &[Int(joined)]), 6);
    }

    #[test]
    fn handles_survive_i32_truncation() {
        let mut fx = Fixture::new();
        let lit = fx.cstr("hi");
        let handle = fx.int(HostFn::StrFromLit, &[Int(lit)]);
        // an i32-typed caller sees the same bits zero-extended into an i64
        let zero_extended = handle as i32 as u32 as i64;
        assert_eq!(fx.int(HostFn::StrLen, &[Int(zero_extended)]), 2);
    }

    #[test]
    fn to_double_writes_flag() {
        let mut fx = Fixture::new();
        let text = fx.cstr("2.5");
        let flag = fx.next as i64;
        let result = fx
            .call(HostFn::StrToDouble, &[Int(text), Int(flag)])
            .unwrap();
        assert_eq!(result, Some(Float(2.5)));
        assert_eq!(fx.memory.bytes()[flag as usize], 1);
    }

    #[test]
    fn bool_tokens_follow_config() {
        let mut fx = Fixture::new();
        fx.call(HostFn::OutputBool, &[Int(1)]).unwrap();
        fx.call(HostFn::OutputNewline, &[]).unwrap();
        fx.call(HostFn::OutputBool, &[Int(0)]).unwrap();
        assert_eq!(fx.output.contents(), "да\nнет");

        let mut fx = Fixture::with_config(HostConfig {
            true_token: "true".to_string(),
            false_token: "false".to_string(),
            ..HostConfig::default()
        });
        fx.call(HostFn::OutputBool, &[Int(5)]).unwrap();
        assert_eq!(fx.output.contents(), "true");
    }

    #[test]
    fn output_mixed_values() {
        let mut fx = Fixture::new();
        let lit = fx.cstr("x=");
        fx.call(HostFn::OutputString, &[Int(lit)]).unwrap();
        fx.call(HostFn::OutputInt64, &[Int(-3)]).unwrap();
        fx.call(HostFn::OutputSymbol, &[Int(' ' as i64)]).unwrap();
        fx.call(HostFn::OutputDouble, &[Float(0.5)]).unwrap();
        assert_eq!(fx.output.contents(), "x=-3 0.5");
    }

    #[test]
    fn input_reads_tokens_and_lines() {
        let mut fx = Fixture::new();
        fx.host
            .set_input_stream(Box::new(TextInput::new("4 2.5\nrest of line\n")), true);
        assert_eq!(fx.int(HostFn::InputInt64, &[]), 4);
        assert_eq!(
            fx.call(HostFn::InputDouble, &[]).unwrap(),
            Some(Float(2.5))
        );
        let empty = fx.int(HostFn::InputString, &[]);
        assert_eq!(fx.text(empty), "");
        let line = fx.int(HostFn::InputString, &[]);
        assert_eq!(fx.text(line), "rest of line");
    }

    #[test]
    fn file_round_trip() {
        let mut fx = Fixture::new();
        let name = fx.cstr("out.txt");
        let payload = fx.cstr("7 8");
        let writer = fx.int(HostFn::FileOpenForWrite, &[Int(name)]);
        assert_eq!(writer, 1);
        fx.call(HostFn::FileWriteString, &[Int(writer), Int(payload)])
            .unwrap();
        fx.call(HostFn::FileClose, &[Int(writer)]).unwrap();

        let reader = fx.int(HostFn::FileOpenForRead, &[Int(name)]);
        assert_eq!(reader, 1);
        fx.call(HostFn::InputSetFile, &[Int(reader)]).unwrap();
        assert_eq!(fx.int(HostFn::FileHasMoreData, &[Int(reader)]), 1);
        assert_eq!(fx.int(HostFn::InputInt64, &[]), 7);
        assert_eq!(fx.int(HostFn::InputInt64, &[]), 8);
        assert_eq!(fx.int(HostFn::FileHasMoreData, &[Int(reader)]), 0);
        fx.call(HostFn::InputResetFile, &[]).unwrap();
        assert_eq!(fx.host.io().files().file("out.txt"), Some("7 8"));
    }

    #[test]
    fn missing_file_returns_minus_one() {
        let mut fx = Fixture::new();
        let name = fx.cstr("absent");
        assert_eq!(fx.int(HostFn::FileOpenForRead, &[Int(name)]), -1);
    }

    #[test]
    fn writing_to_reader_is_fatal() {
        let mut fx = Fixture::new();
        fx.host.add_file("in", "data");
        let name = fx.cstr("in");
        let payload = fx.cstr("x");
        let reader = fx.int(HostFn::FileOpenForRead, &[Int(name)]);
        let err = fx
            .call(HostFn::FileWriteString, &[Int(reader), Int(payload)])
            .unwrap_err();
        assert_eq!(err.code(), "E0507");
    }

    #[test]
    fn arrays_through_dispatch() {
        let mut fx = Fixture::new();
        let ptr = fx.int(HostFn::ArrayCreate, &[Int(32)]);
        assert_eq!(ptr, 65536);
        fx.call(HostFn::ArrayDestroy, &[Int(ptr)]).unwrap();
        assert_eq!(fx.int(HostFn::ArrayCreate, &[Int(16)]), ptr);
    }

    #[test]
    fn strict_free_from_config() {
        let mut fx = Fixture::with_config(HostConfig {
            strict_free: true,
            ..HostConfig::default()
        });
        let err = fx.call(HostFn::ArrayDestroy, &[Int(4096)]).unwrap_err();
        assert_eq!(err, HostError::InvalidFree(4096));
    }

    #[test]
    fn rebinding_drops_handles() {
        let mut fx = Fixture::new();
        let lit = fx.cstr("x");
        let handle = fx.int(HostFn::StrFromLit, &[Int(lit)]);
        let generation = fx.host.binding().generation();
        fx.host.bind(&fx.memory);
        assert_eq!(fx.host.binding().generation(), generation + 1);
        assert!(fx.call(HostFn::StrLen, &[Int(handle)]).is_err());
    }

    #[test]
    fn math_builtins() {
        let mut fx = Fixture::new();
        assert_eq!(fx.int(HostFn::Mod, &[Int(7), Int(0)]), 0);
        assert_eq!(fx.int(HostFn::Sign, &[Float(-2.0)]), -1);
        assert_eq!(fx.int(HostFn::TruncDouble, &[Float(3.9)]), 3);
        assert_eq!(
            fx.call(HostFn::Fpow, &[Float(3.0), Int(2)]).unwrap(),
            Some(Float(9.0))
        );
        assert_eq!(
            fx.call(HostFn::MaxLimitDouble, &[]).unwrap(),
            Some(Float(f64::MAX))
        );
    }

    #[test]
    fn seeded_random_builtins_repeat() {
        let config = HostConfig {
            rand_seed: Some(42),
            ..HostConfig::default()
        };
        let mut first = Fixture::with_config(config.clone());
        let mut second = Fixture::with_config(config);
        for _ in 0..20 {
            let a = first.int(HostFn::RandInt64Range, &[Int(10), Int(20)]);
            let b = second.int(HostFn::RandInt64Range, &[Int(10), Int(20)]);
            assert_eq!(a, b);
            assert!((10..20).contains(&a));
        }
        assert_eq!(first.int(HostFn::RandUint64Range, &[Int(9), Int(3)]), 9);
        assert_eq!(first.int(HostFn::RandInt64, &[Int(0)]), 0);
        match first.call(HostFn::RandDoubleRange, &[Float(1.0), Float(2.0)]).unwrap() {
            Some(Float(value)) => assert!((1.0..2.0).contains(&value)),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn every_function_dispatches() {
        let mut fx = Fixture::new();
        let lit = fx.cstr("abc");
        fx.host.add_file("abc", "1");
        for &func in HostFn::ALL {
            if matches!(func, HostFn::InputSetFile | HostFn::FileWriteString) {
                continue;
            }
            let args = func
                .signature()
                .params
                .iter()
                .map(|_| Int(lit))
                .collect::<Vec<_>>();
            let result = fx.call(func, &args);
            let result = match result {
                Ok(result) => result,
                Err(err) => panic!("{} failed: {err}", func.name()),
            };
            assert_eq!(result.is_some(), func.signature().result.is_some(), "{}", func.name());
        }
    }
}
