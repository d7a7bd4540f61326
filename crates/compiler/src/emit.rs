//! Emission of a wasm module's declaration surface.

use cranelift_entity::{EntityRef, PrimaryMap};
use ingot_backend::{
    CallConv, Constant, DebugBuilder, DebugType, FuncId, MetadataId, Signature, Type,
};
use ingot_environ::{
    symbols, DefinedFuncIndex, EmitError, EmitResult, ExceptionTypeIndex, FuncIndex, FunctionType,
    GlobalIndex, MemoryIndex, Module, TableIndex, TypeIndex, ValueType, NUM_VALUE_TYPES,
};
use std::time::Instant;
use target_lexicon::Triple;

/// Lowers the opcode stream of one function definition.
///
/// The module emitter owns everything up to the function shell: signatures,
/// external symbols, personality, and prefix data. Producing the body from
/// the validated opcode stream is this collaborator's job.
pub trait FunctionBodyEmitter {
    /// Emits the body of the definition at `def_index`, whose shell is
    /// `function`, into `backend`.
    fn emit_function_body(
        &mut self,
        context: &EmitModuleContext,
        def_index: DefinedFuncIndex,
        function: FuncId,
        backend: &mut ingot_backend::Module,
    ) -> EmitResult<()>;
}

/// A body emitter that lowers nothing, leaving declaration shells only.
pub struct DummyBodyEmitter;

impl FunctionBodyEmitter for DummyBodyEmitter {
    fn emit_function_body(
        &mut self,
        _context: &EmitModuleContext,
        _def_index: DefinedFuncIndex,
        _function: FuncId,
        _backend: &mut ingot_backend::Module,
    ) -> EmitResult<()> {
        Ok(())
    }
}

/// The per-emission context: backend handles for every indexed wasm object,
/// plus the module-wide metadata function bodies reference.
///
/// One context exists per module emission; it is never shared between
/// emissions.
pub struct EmitModuleContext {
    /// Machine-word handles of the `typeId<i>` external constants.
    pub type_ids: PrimaryMap<TypeIndex, Constant>,
    /// Machine-word handles of the `tableOffset<i>` external constants.
    pub table_offsets: PrimaryMap<TableIndex, Constant>,
    /// Machine-word handles of the `memoryOffset<i>` external constants.
    pub memory_offsets: PrimaryMap<MemoryIndex, Constant>,
    /// Pointer handles of the `global<i>` external constants.
    pub globals: PrimaryMap<GlobalIndex, Constant>,
    /// Pointer handles of the `exceptionType<i>` external constants.
    pub exception_type_instances: PrimaryMap<ExceptionTypeIndex, Constant>,
    /// The backend shell of every wasm function, imports and definitions.
    pub functions: PrimaryMap<FuncIndex, FuncId>,
    /// `table_offsets[0]`, if the module declares any table.
    pub default_table_offset: Option<Constant>,
    /// `memory_offsets[0]`, if the module declares any memory.
    pub default_memory_offset: Option<Constant>,
    /// Pointer handle of the `moduleInstance` external constant.
    pub module_instance: Constant,
    /// Machine-word handle of the `tableReferenceBias` external constant.
    pub table_reference_bias: Constant,
    /// The exception personality attached to every function definition.
    pub personality: FuncId,
    /// The `__cxa_begin_catch` declaration referenced by emitted landing
    /// pads. `None` on targets that unwind with SEH.
    pub cxa_begin_catch: Option<FuncId>,
    /// Branch weights biasing a conditional toward its taken edge.
    pub likely_true_branch_weights: MetadataId,
    /// Branch weights biasing a conditional toward its not-taken edge.
    pub likely_false_branch_weights: MetadataId,
    /// Rounding-mode metadata for constrained FP operations.
    pub fp_rounding_mode: MetadataId,
    /// Exception-behavior metadata for constrained FP operations.
    pub fp_exception_behavior: MetadataId,
    di_value_types: [Option<DebugType>; NUM_VALUE_TYPES],
}

impl EmitModuleContext {
    /// Returns the debug type describing `ty`, if it has one.
    pub fn debug_type(&self, ty: ValueType) -> Option<DebugType> {
        self.di_value_types[ty.index()]
    }
}

fn backend_value_type(ty: ValueType) -> EmitResult<Type> {
    match ty {
        ValueType::I32 => Ok(Type::I32),
        ValueType::I64 => Ok(Type::I64),
        ValueType::F32 => Ok(Type::F32),
        ValueType::F64 => Ok(Type::F64),
        ValueType::V128 => Ok(Type::V128),
        ValueType::Anyref | ValueType::Anyfunc | ValueType::Nullref => Ok(Type::Ptr),
        ValueType::Any => Err(EmitError::TypeLowering(ty)),
    }
}

/// Lowers a wasm function signature to a backend signature using the wasm
/// calling convention.
pub fn wasm_signature(ty: &FunctionType) -> EmitResult<Signature> {
    let params = ty
        .params
        .iter()
        .map(|&param| backend_value_type(param))
        .collect::<EmitResult<Vec<_>>>()?;
    let returns = ty
        .results
        .iter()
        .map(|&result| backend_value_type(result))
        .collect::<EmitResult<Vec<_>>>()?;
    Ok(Signature::new(params, returns, CallConv::Wasm))
}

fn declare_debug_types(debug: &mut DebugBuilder) -> [Option<DebugType>; NUM_VALUE_TYPES] {
    let mut types = [None; NUM_VALUE_TYPES];
    types[ValueType::I32.index()] = Some(debug.base_type("i32", 32, gimli::DW_ATE_signed));
    types[ValueType::I64.index()] = Some(debug.base_type("i64", 64, gimli::DW_ATE_signed));
    types[ValueType::F32.index()] = Some(debug.base_type("f32", 32, gimli::DW_ATE_float));
    types[ValueType::F64.index()] = Some(debug.base_type("f64", 64, gimli::DW_ATE_float));
    types[ValueType::V128.index()] = Some(debug.base_type("v128", 128, gimli::DW_ATE_signed));
    types[ValueType::Anyref.index()] = Some(debug.base_type("anyref", 8, gimli::DW_ATE_address));
    types[ValueType::Anyfunc.index()] = Some(debug.base_type("anyfunc", 8, gimli::DW_ATE_address));
    types[ValueType::Nullref.index()] = Some(debug.base_type("nullref", 8, gimli::DW_ATE_address));
    types
}

fn module_error(error: ingot_backend::ModuleError) -> EmitError {
    match error {
        ingot_backend::ModuleError::DuplicateSymbol(name) => EmitError::DuplicateSymbol(name),
        ingot_backend::ModuleError::Dwarf(error) => EmitError::DebugInfo(error.to_string()),
    }
}

/// Populates `backend` with the declaration surface of `module` and lowers
/// every function definition through `body_emitter`.
///
/// On error the partially populated backend module is the caller's to
/// discard; emission is not retried.
pub fn emit_module(
    module: &Module,
    triple: &Triple,
    backend: &mut ingot_backend::Module,
    body_emitter: &mut dyn FunctionBodyEmitter,
) -> EmitResult<EmitModuleContext> {
    let start = Instant::now();

    let likely_true_branch_weights = backend.branch_weights(i32::MAX, 0);
    let likely_false_branch_weights = backend.branch_weights(0, i32::MAX);
    let fp_rounding_mode = backend.metadata_str("round.tonearest");
    let fp_exception_behavior = backend.metadata_str("fpexcept.strict");

    // Targets that unwind with the Itanium ABI need `__cxa_begin_catch`
    // visible before any landing pad references it.
    let cxa_begin_catch = if symbols::uses_seh(triple) {
        None
    } else {
        let signature = Signature::new(vec![Type::Ptr], vec![Type::Ptr], CallConv::Native);
        Some(
            backend
                .declare_function(symbols::CXA_BEGIN_CATCH, signature)
                .map_err(module_error)?,
        )
    };

    let di_value_types = declare_debug_types(&mut backend.debug);

    // An external reference to the personality appropriate for the target's
    // unwinder.
    let personality = backend
        .declare_function(
            symbols::personality_symbol(triple),
            Signature::new(vec![], vec![Type::I32], CallConv::Native),
        )
        .map_err(module_error)?;

    // External globals whose addresses encode the id of each of the module's
    // function types.
    let mut type_ids = PrimaryMap::new();
    for type_index in module.types.keys() {
        let data = backend
            .declare_data(&symbols::external_name("typeId", type_index.index()), Type::I8)
            .map_err(module_error)?;
        type_ids.push(backend.ptr_to_int(data));
    }

    // External globals whose addresses are offsets to table base pointers in
    // per-instance runtime data.
    let mut table_offsets = PrimaryMap::new();
    for table_index in module.tables.keys() {
        let data = backend
            .declare_data(
                &symbols::external_name("tableOffset", table_index.index()),
                Type::I8,
            )
            .map_err(module_error)?;
        table_offsets.push(backend.ptr_to_int(data));
    }
    let default_table_offset = table_offsets.get(TableIndex::from_u32(0)).copied();

    // Likewise for memory base pointers.
    let mut memory_offsets = PrimaryMap::new();
    for memory_index in module.memories.keys() {
        let data = backend
            .declare_data(
                &symbols::external_name("memoryOffset", memory_index.index()),
                Type::I8,
            )
            .map_err(module_error)?;
        memory_offsets.push(backend.ptr_to_int(data));
    }
    let default_memory_offset = memory_offsets.get(MemoryIndex::from_u32(0)).copied();

    // External globals for the module's globals.
    let mut globals = PrimaryMap::new();
    for global_index in module.globals.keys() {
        let data = backend
            .declare_data(&symbols::external_name("global", global_index.index()), Type::I8)
            .map_err(module_error)?;
        globals.push(backend.symbol_address(data));
    }

    // External globals pointing to the instances of the module's exception
    // types.
    let mut exception_type_instances = PrimaryMap::new();
    for exception_type_index in module.exception_types.keys() {
        let data = backend
            .declare_data(
                &symbols::external_name("exceptionType", exception_type_index.index()),
                Type::I8,
            )
            .map_err(module_error)?;
        exception_type_instances.push(backend.symbol_address(data));
    }

    let module_instance_data = backend
        .declare_data(symbols::MODULE_INSTANCE, Type::I8)
        .map_err(module_error)?;
    let module_instance = backend.symbol_address(module_instance_data);

    // The bias applied to all references stored in a table.
    let table_reference_bias_data = backend
        .declare_data(symbols::TABLE_REFERENCE_BIAS, Type::I8)
        .map_err(module_error)?;
    let table_reference_bias = backend.ptr_to_int(table_reference_bias_data);

    // One function shell per wasm function, imports and definitions alike.
    let mut functions = PrimaryMap::new();
    for index in module.functions.indices() {
        let ty = &module.types[module.functions.type_of(index)];
        let signature = wasm_signature(ty)?;
        let name = match module.functions.defined_func_index(index) {
            Some(defined) => symbols::external_name("functionDef", defined.index()),
            None => symbols::external_name("functionImport", index.index()),
        };
        let function = backend
            .declare_function(&name, signature)
            .map_err(module_error)?;
        functions.push(function);
    }

    let context = EmitModuleContext {
        type_ids,
        table_offsets,
        memory_offsets,
        globals,
        exception_type_instances,
        functions,
        default_table_offset,
        default_memory_offset,
        module_instance,
        table_reference_bias,
        personality,
        cxa_begin_catch,
        likely_true_branch_weights,
        likely_false_branch_weights,
        fp_rounding_mode,
        fp_exception_behavior,
        di_value_types,
    };

    // Emit each function definition.
    for (def_index, def) in module.functions.defs.iter() {
        let function = context.functions[module.functions.func_index(def_index)];
        backend.set_personality(function, context.personality);

        // Two machine words laid out before the entry point let the runtime
        // recover the function instance and its type id from a code pointer.
        let instance_data = backend
            .declare_data(
                &symbols::external_name("functionDefInstance", def_index.index()),
                Type::I8,
            )
            .map_err(module_error)?;
        let instance_word = backend.ptr_to_int(instance_data);
        let type_id = context.type_ids[def.type_index];
        let prefix = backend.word_array(vec![instance_word, type_id]);
        backend.set_prefix_data(function, prefix);

        body_emitter.emit_function_body(&context, def_index, function, backend)?;
    }

    backend.debug.finalize().map_err(module_error)?;

    log::debug!(
        "emitted backend IR for {} functions in {:.1}ms",
        module.functions.defs.len(),
        start.elapsed().as_secs_f64() * 1e3,
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_backend::ConstantData;
    use ingot_environ::{ExceptionType, FunctionDef, FunctionImport, Global, Limits, Table};
    use std::collections::BTreeSet;
    use std::str::FromStr;

    fn linux() -> Triple {
        Triple::from_str("x86_64-unknown-linux-gnu").unwrap()
    }

    fn windows() -> Triple {
        Triple::from_str("x86_64-pc-windows-msvc").unwrap()
    }

    /// Two types, one table, no memories, one import, three definitions.
    fn test_module() -> Module {
        let mut module = Module::default();
        let nullary = module.types.push(FunctionType::default());
        let unary = module
            .types
            .push(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]));
        module.tables.push(Table {
            element: ValueType::Anyfunc,
            limits: Limits { min: 1, max: None },
        });
        module.functions.imports.push(FunctionImport {
            type_index: nullary,
            module: "env".to_string(),
            field: "imported".to_string(),
        });
        for type_index in [nullary, unary, unary] {
            module.functions.defs.push(FunctionDef {
                type_index,
                locals: Vec::new(),
                body: Vec::new(),
            });
        }
        module
    }

    #[test]
    fn symbol_scheme_is_exact() {
        let _ = env_logger::try_init();
        let module = test_module();
        let mut backend = ingot_backend::Module::new("test");
        let context =
            emit_module(&module, &windows(), &mut backend, &mut DummyBodyEmitter).unwrap();

        let symbols: BTreeSet<_> = backend.symbol_names().collect();
        let expected: BTreeSet<_> = [
            "typeId0",
            "typeId1",
            "tableOffset0",
            "functionImport0",
            "functionDef0",
            "functionDef1",
            "functionDef2",
            "functionDefInstance0",
            "functionDefInstance1",
            "functionDefInstance2",
            "moduleInstance",
            "tableReferenceBias",
            "__C_specific_handler",
        ]
        .into_iter()
        .collect();
        assert_eq!(symbols, expected);

        assert_eq!(context.default_memory_offset, None);
        assert_eq!(
            context.default_table_offset,
            Some(context.table_offsets[TableIndex::from_u32(0)])
        );
        assert_eq!(context.cxa_begin_catch, None);
    }

    #[test]
    fn itanium_targets_predeclare_cxa_begin_catch() {
        let module = test_module();
        let mut backend = ingot_backend::Module::new("test");
        let context = emit_module(&module, &linux(), &mut backend, &mut DummyBodyEmitter).unwrap();

        assert!(backend.contains_symbol("__cxa_begin_catch"));
        assert!(backend.contains_symbol("__gxx_personality_v0"));
        assert!(!backend.contains_symbol("__C_specific_handler"));
        let cxa = context.cxa_begin_catch.unwrap();
        assert_eq!(
            backend.function(cxa).signature,
            Signature::new(vec![Type::Ptr], vec![Type::Ptr], CallConv::Native)
        );
    }

    #[test]
    fn definitions_carry_prefix_data_and_personality() {
        let module = test_module();
        let mut backend = ingot_backend::Module::new("test");
        let context = emit_module(&module, &linux(), &mut backend, &mut DummyBodyEmitter).unwrap();

        for (def_index, def) in module.functions.defs.iter() {
            let function = context.functions[module.functions.func_index(def_index)];
            let decl = backend.function(function);
            assert_eq!(
                decl.name,
                symbols::external_name("functionDef", def_index.index())
            );
            assert_eq!(decl.signature.call_conv, CallConv::Wasm);
            assert_eq!(decl.personality, Some(context.personality));

            let prefix = decl.prefix_data.expect("definition has prefix data");
            let words = match backend.constant(prefix) {
                ConstantData::WordArray(words) => words,
                other => panic!("expected a word array, got {other:?}"),
            };
            assert_eq!(words.len(), 2);
            let instance = backend
                .data_named(&symbols::external_name("functionDefInstance", def_index.index()))
                .unwrap();
            assert_eq!(backend.constant(words[0]), &ConstantData::PtrToInt(instance));
            assert_eq!(words[1], context.type_ids[def.type_index]);
        }

        // Imports get a shell and nothing else.
        let import = context.functions[FuncIndex::from_u32(0)];
        assert_eq!(backend.function(import).personality, None);
        assert_eq!(backend.function(import).prefix_data, None);
    }

    #[test]
    fn debug_info_finalizes_after_all_bodies() {
        struct RecordingBodyEmitter {
            emitted: Vec<DefinedFuncIndex>,
        }

        impl FunctionBodyEmitter for RecordingBodyEmitter {
            fn emit_function_body(
                &mut self,
                context: &EmitModuleContext,
                def_index: DefinedFuncIndex,
                function: FuncId,
                backend: &mut ingot_backend::Module,
            ) -> EmitResult<()> {
                assert!(!backend.debug.is_finalized());
                assert_eq!(context.debug_type(ValueType::Any), None);
                assert!(context.debug_type(ValueType::I32).is_some());
                assert_eq!(backend.function(function).personality, Some(context.personality));
                self.emitted.push(def_index);
                Ok(())
            }
        }

        let module = test_module();
        let mut backend = ingot_backend::Module::new("test");
        let mut emitter = RecordingBodyEmitter { emitted: Vec::new() };
        emit_module(&module, &linux(), &mut backend, &mut emitter).unwrap();

        assert!(backend.debug.is_finalized());
        assert_eq!(
            emitter.emitted,
            [0, 1, 2].map(DefinedFuncIndex::from_u32).to_vec()
        );
    }

    #[test]
    fn globals_and_exception_types_keep_pointer_handles() {
        let mut module = test_module();
        module.globals.push(Global {
            ty: ValueType::I64,
            mutable: true,
        });
        module.exception_types.push(ExceptionType {
            params: vec![ValueType::I32],
        });

        let mut backend = ingot_backend::Module::new("test");
        let context = emit_module(&module, &linux(), &mut backend, &mut DummyBodyEmitter).unwrap();

        let global = context.globals[GlobalIndex::from_u32(0)];
        let global_data = backend.data_named("global0").unwrap();
        assert_eq!(backend.constant(global), &ConstantData::SymbolAddress(global_data));

        let exception = context.exception_type_instances[ExceptionTypeIndex::from_u32(0)];
        let exception_data = backend.data_named("exceptionType0").unwrap();
        assert_eq!(
            backend.constant(exception),
            &ConstantData::SymbolAddress(exception_data)
        );

        // Type ids and offsets are machine-word casts, not raw pointers.
        let type_id = context.type_ids[TypeIndex::from_u32(0)];
        let type_data = backend.data_named("typeId0").unwrap();
        assert_eq!(backend.constant(type_id), &ConstantData::PtrToInt(type_data));
    }

    #[test]
    fn unlowerable_signature_is_an_error() {
        let mut module = Module::default();
        let bad = module
            .types
            .push(FunctionType::new(vec![ValueType::Any], vec![]));
        module.functions.defs.push(FunctionDef {
            type_index: bad,
            locals: Vec::new(),
            body: Vec::new(),
        });

        let mut backend = ingot_backend::Module::new("test");
        match emit_module(&module, &linux(), &mut backend, &mut DummyBodyEmitter) {
            Err(EmitError::TypeLowering(ValueType::Any)) => {}
            Err(other) => panic!("expected a type lowering error, got {other:?}"),
            Ok(_) => panic!("emission unexpectedly succeeded"),
        }
    }
}
