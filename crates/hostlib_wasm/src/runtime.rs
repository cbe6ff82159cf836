use crate::memory::StoreMemory;
use crate::{exec_error, ExecError, RunOutcome, RunRequest};
use hostlib_core::abi::{ArgKind, HOST_MODULE, MEMORY_EXPORT};
use hostlib_core::io::{CaptureOutput, TextInput};
use hostlib_core::{
    resolve_return_type, HostError, HostFn, HostRuntime, HostValue, NormalizeOptions, RawValue,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};
use wasmtime::{
    Caller, Engine, Extern, ExternType, Func, FuncType, Linker, Memory, Module, Store, Trap, Val,
    ValType,
};

struct HostState {
    runtime: Rc<RefCell<HostRuntime>>,
    memory: Option<Memory>,
}

/// Compiles `module_bytes` (binary or text format), links it against the
/// host runtime, calls the entry export and renders its result.
pub fn execute(module_bytes: &[u8], request: &RunRequest) -> Result<RunOutcome, ExecError> {
    let binary = wat::parse_bytes(module_bytes)
        .map_err(|err| exec_error("E0400", format!("WASM encode error: {err}")))?;
    let entry = request.entry();
    let return_type = resolve_return_type(&binary, entry);

    let engine = Engine::default();
    let module = Module::new(&engine, &binary)
        .map_err(|err| exec_error("E0400", format!("WASM compile error: {err}")))?;

    let output = CaptureOutput::new();
    let mut runtime = HostRuntime::new(request.config.clone());
    runtime.set_output_stream(Box::new(output.clone()));
    runtime.set_input_stream(Box::new(TextInput::new(request.input.clone())), true);
    for (name, content) in &request.files {
        runtime.add_file(name.clone(), content.clone());
    }
    let runtime = Rc::new(RefCell::new(runtime));

    let mut store = Store::new(
        &engine,
        HostState {
            runtime: Rc::clone(&runtime),
            memory: None,
        },
    );
    let linker = link(&engine, &mut store, &module)?;
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|err| map_trap(err, "WASM instantiation error"))?;

    let memory = instance
        .get_memory(&mut store, MEMORY_EXPORT)
        .or(store.data().memory);
    store.data_mut().memory = memory;
    if memory.is_some() {
        let view = StoreMemory::new(&mut store, memory);
        runtime.borrow_mut().bind(&view);
    } else {
        debug!("module has no linear memory; string and array imports stay unbound");
    }
    runtime.borrow_mut().reset_io(true);

    let func = instance
        .get_func(&mut store, entry)
        .ok_or_else(|| exec_error("E0400", format!("WASM missing export `{entry}`")))?;
    let ty = func.ty(&store);
    if ty.params().len() != 0 {
        return Err(exec_error(
            "E0400",
            format!("entry `{entry}` must not take parameters"),
        ));
    }
    let mut results = vec![Val::I32(0); ty.results().len()];
    let call = func.call(&mut store, &[], &mut results);
    let stdout = output.contents();
    if let Err(err) = call {
        let mut mapped = map_trap(err, "WASM runtime error");
        mapped.stdout = stdout;
        return Err(mapped);
    }

    let raw = raw_value(results.first());
    let options = NormalizeOptions {
        return_type,
        declared_type: request.declared_type.as_deref(),
    };
    let result = {
        let view = StoreMemory::new(&mut store, memory);
        runtime.borrow().normalize(raw, &options, &view)
    };
    let files = runtime.borrow().io().files().snapshot();
    Ok(RunOutcome {
        raw,
        result,
        return_type,
        stdout,
        files,
    })
}

fn link(
    engine: &Engine,
    store: &mut Store<HostState>,
    module: &Module,
) -> Result<Linker<HostState>, ExecError> {
    let mut linker = Linker::new(engine);
    for import in module.imports() {
        let (module_name, name) = (import.module(), import.name());
        if module_name != HOST_MODULE {
            return Err(exec_error(
                "E0400",
                format!("WASM link error: unknown import module `{module_name}` for `{name}`"),
            ));
        }
        let item: Extern = match import.ty() {
            ExternType::Func(ty) => {
                let Some(host_fn) = HostFn::from_name(name) else {
                    warn!(name, "module imports an unknown host function");
                    return Err(exec_error(
                        "E0400",
                        format!("WASM link error: unknown host function `{HOST_MODULE}.{name}`"),
                    ));
                };
                check_signature(host_fn, &ty).map_err(|reason| {
                    exec_error(
                        "E0400",
                        format!("WASM link error: `{HOST_MODULE}.{name}` {reason}"),
                    )
                })?;
                host_func(store, host_fn, ty).into()
            }
            ExternType::Memory(ty) if name == MEMORY_EXPORT => {
                let memory = Memory::new(&mut *store, ty)
                    .map_err(|err| exec_error("E0400", format!("WASM memory error: {err}")))?;
                store.data_mut().memory = Some(memory);
                memory.into()
            }
            _ => {
                return Err(exec_error(
                    "E0400",
                    format!("WASM link error: unsupported import `{HOST_MODULE}.{name}`"),
                ))
            }
        };
        linker
            .define(&mut *store, module_name, name, item)
            .map_err(|err| exec_error("E0400", format!("WASM link error: {err}")))?;
        debug!(name, "linked host import");
    }
    Ok(linker)
}

fn kind_of(ty: &ValType) -> Option<ArgKind> {
    match ty {
        ValType::I32 | ValType::I64 => Some(ArgKind::Int),
        ValType::F32 | ValType::F64 => Some(ArgKind::Float),
        _ => None,
    }
}

/// Both i32 and i64 satisfy an integer slot, f32 and f64 a float slot.
fn check_signature(host_fn: HostFn, ty: &FuncType) -> Result<(), String> {
    let signature = host_fn.signature();
    let params = ty.params().map(|ty| kind_of(&ty)).collect::<Vec<_>>();
    let expected = signature.params.iter().copied().map(Some).collect::<Vec<_>>();
    if params != expected {
        return Err(format!(
            "expects parameters {:?}, module declares {:?}",
            signature.params,
            ty.params().collect::<Vec<_>>()
        ));
    }
    let results = ty.results().map(|ty| kind_of(&ty)).collect::<Vec<_>>();
    let expected = signature.result.into_iter().map(Some).collect::<Vec<_>>();
    if results != expected {
        return Err(format!(
            "returns {:?}, module declares {:?}",
            signature.result,
            ty.results().collect::<Vec<_>>()
        ));
    }
    Ok(())
}

fn host_func(store: &mut Store<HostState>, host_fn: HostFn, ty: FuncType) -> Func {
    let result_ty = ty.results().next();
    Func::new(
        &mut *store,
        ty,
        move |mut caller: Caller<'_, HostState>, params: &[Val], results: &mut [Val]| {
            let args = params.iter().map(host_value).collect::<Vec<_>>();
            let runtime = Rc::clone(&caller.data().runtime);
            let memory = caller.data().memory;
            let mut view = StoreMemory::new(&mut caller, memory);
            let value = runtime.borrow_mut().call(&mut view, host_fn, &args)?;
            if let (Some(slot), Some(value), Some(ty)) = (results.first_mut(), value, &result_ty) {
                *slot = narrow(value, ty);
            }
            Ok(())
        },
    )
}

fn host_value(val: &Val) -> HostValue {
    match val {
        Val::I32(value) => HostValue::Int(*value as i64),
        Val::I64(value) => HostValue::Int(*value),
        Val::F32(bits) => HostValue::Float(f32::from_bits(*bits) as f64),
        Val::F64(bits) => HostValue::Float(f64::from_bits(*bits)),
        _ => HostValue::Int(0),
    }
}

fn narrow(value: HostValue, ty: &ValType) -> Val {
    match ty {
        ValType::I64 => Val::I64(value.as_int()),
        ValType::F32 => Val::F32((value.as_float() as f32).to_bits()),
        ValType::F64 => Val::F64(value.as_float().to_bits()),
        _ => Val::I32(value.as_int() as i32),
    }
}

fn raw_value(val: Option<&Val>) -> RawValue {
    match val {
        Some(Val::I32(value)) => RawValue::I32(*value),
        Some(Val::I64(value)) => RawValue::I64(*value),
        Some(Val::F32(bits)) => RawValue::F32(f32::from_bits(*bits)),
        Some(Val::F64(bits)) => RawValue::F64(f64::from_bits(*bits)),
        _ => RawValue::None,
    }
}

fn map_trap(err: anyhow::Error, default_message: &str) -> ExecError {
    if let Some(host) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<HostError>())
    {
        return exec_error(host.code(), host.to_string());
    }
    if let Some(trap) = err.downcast_ref::<Trap>() {
        if *trap == Trap::IntegerDivisionByZero {
            exec_error("E0402", "Division or modulo by zero.")
        } else {
            exec_error("E0401", format!("{default_message}: {trap}"))
        }
    } else {
        exec_error("E0400", format!("{default_message}: {err}"))
    }
}
