//! The evaluator: one RPN program, its variables, its bytecode and its
//! evaluation stack.
//!
//! Lifecycle: construct with the program text, run variable discovery,
//! assign types and optionally bind external memory, compile, then
//! execute as often as needed. Addresses and types are frozen at
//! compilation; only variable values change between runs.

use std::fmt;
use std::sync::Arc;

use rtexpr_core::{ErrorFlags, Fault, Result, TypeShape};
use rtexpr_lang::{CompiledProgram, Compiler, Decompiler, VariableRecord, VariableTable};
use rtexpr_stdlib::register_builtins;
use rtexpr_vm::{EvalStack, ExecCtx, FunctionRegistry, Scalar};

use crate::trace::{self, Tracer};

/// How much checking the execution loop performs per instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// No per-instruction checks. Faults raised by executors are only
    /// collected at the end of the run.
    Fast,
    /// Bounds-check the evaluation stack after every instruction and
    /// abort on the first fault.
    Safe,
    /// Like `Safe`, writing a step-by-step trace to the provided sink.
    Debug,
}

/// Variable selector accepted by the evaluator API, by name or by
/// discovery index.
#[derive(Copy, Clone, Debug)]
pub enum VarQuery<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for VarQuery<'a> {
    fn from(name: &'a str) -> Self {
        VarQuery::Name(name)
    }
}

impl From<usize> for VarQuery<'_> {
    fn from(index: usize) -> Self {
        VarQuery::Index(index)
    }
}

impl fmt::Display for VarQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarQuery::Name(name) => f.write_str(name),
            VarQuery::Index(index) => write!(f, "#{}", index),
        }
    }
}

pub struct Evaluator {
    text: String,
    registry: Arc<FunctionRegistry>,
    vars: VariableTable,
    program: Option<CompiledProgram>,
    stack: EvalStack,
}

impl Evaluator {
    /// Build an evaluator with the builtin operator set.
    pub fn new(text: impl Into<String>) -> Self {
        let mut registry = FunctionRegistry::new();
        register_builtins(&mut registry);
        Self::with_registry(text, Arc::new(registry))
    }

    /// Build an evaluator over a shared registry. One registry may back
    /// any number of evaluators.
    pub fn with_registry(text: impl Into<String>, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            text: text.into(),
            registry,
            vars: VariableTable::default(),
            program: None,
            stack: EvalStack::new(),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn variables(&self) -> &VariableTable {
        &self.vars
    }

    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    /// Scan the program text and build the input and output variable
    /// collections. Must run before types are assigned.
    pub fn extract_variables(&mut self) -> Result<()> {
        if self.program.is_some() {
            return Err(Fault::illegal("variables are frozen after compilation"));
        }
        self.vars = VariableTable::extract(&self.text)?;
        Ok(())
    }

    pub fn input_count(&self) -> usize {
        self.vars.input_count()
    }

    pub fn output_count(&self) -> usize {
        self.vars.output_count()
    }

    /// Inputs in discovery order; constants appear after compilation.
    pub fn browse_input(&self, index: usize) -> Option<&VariableRecord> {
        self.vars.input_at(index)
    }

    /// Outputs in discovery order; temporaries appear after compilation.
    pub fn browse_output(&self, index: usize) -> Option<&VariableRecord> {
        self.vars.output_at(index)
    }

    pub fn set_input_type<'a>(
        &mut self,
        query: impl Into<VarQuery<'a>>,
        shape: TypeShape,
    ) -> Result<()> {
        self.input_mut(query.into())?.set_shape(shape)
    }

    pub fn set_output_type<'a>(
        &mut self,
        query: impl Into<VarQuery<'a>>,
        shape: TypeShape,
    ) -> Result<()> {
        self.output_mut(query.into())?.set_shape(shape)
    }

    /// Bind an input to caller-owned memory instead of an internal
    /// slot. The pointed-to storage must stay valid and correctly sized
    /// for the variable's type for the evaluator's whole lifetime.
    pub fn set_input_memory<'a>(
        &mut self,
        query: impl Into<VarQuery<'a>>,
        ptr: *mut u8,
    ) -> Result<()> {
        self.input_mut(query.into())?.bind_external(ptr)
    }

    pub fn set_output_memory<'a>(
        &mut self,
        query: impl Into<VarQuery<'a>>,
        ptr: *mut u8,
    ) -> Result<()> {
        self.output_mut(query.into())?.bind_external(ptr)
    }

    /// Pointer to an input's storage, internal or external. Only valid
    /// after compilation.
    pub fn input_memory<'a>(&mut self, query: impl Into<VarQuery<'a>>) -> Result<*mut u8> {
        let addr = self.allocated_address(self.input(query.into())?)?;
        let program = self.compiled_mut()?;
        program
            .memory
            .slot_ptr(addr)
            .map_err(|e| Fault::fatal(e.to_string()))
    }

    pub fn output_memory<'a>(&mut self, query: impl Into<VarQuery<'a>>) -> Result<*mut u8> {
        let addr = self.allocated_address(self.output(query.into())?)?;
        let program = self.compiled_mut()?;
        program
            .memory
            .slot_ptr(addr)
            .map_err(|e| Fault::fatal(e.to_string()))
    }

    /// Store a scalar input value. The scalar type must match the
    /// variable's compiled type exactly.
    pub fn write_input<'a, T: Scalar>(
        &mut self,
        query: impl Into<VarQuery<'a>>,
        value: T,
    ) -> Result<()> {
        let addr = self.allocated_address(self.input(query.into())?)?;
        let program = self.compiled_mut()?;
        program
            .memory
            .write_scalar(addr, value)
            .map_err(|e| Fault::fatal(e.to_string()))
    }

    pub fn read_output<'a, T: Scalar>(&self, query: impl Into<VarQuery<'a>>) -> Result<T> {
        let addr = self.allocated_address(self.output(query.into())?)?;
        let program = self.compiled()?;
        program
            .memory
            .read_scalar(addr)
            .map_err(|e| Fault::fatal(e.to_string()))
    }

    /// Type-check the program, allocate every variable and emit
    /// bytecode. One-shot: addresses are frozen afterwards.
    pub fn compile(&mut self) -> Result<()> {
        if self.program.is_some() {
            return Err(Fault::illegal("program is already compiled"));
        }
        let program = Compiler::new(&self.registry).compile(&self.text, &mut self.vars)?;
        self.stack.resize(program.stack_depth);
        self.program = Some(program);
        Ok(())
    }

    /// Run the compiled bytecode once. `Debug` mode requires a sink and
    /// writes one trace line per instruction.
    pub fn execute(
        &mut self,
        mode: ExecutionMode,
        sink: Option<&mut dyn fmt::Write>,
    ) -> Result<()> {
        let program = self
            .program
            .as_mut()
            .ok_or_else(|| Fault::illegal("execute called before compile"))?;
        let code: &[u16] = &program.code;
        self.stack.reset();
        let mut ctx = ExecCtx::new(code, &mut self.stack, &mut program.memory);
        let mut flags = ErrorFlags::NONE;

        match mode {
            ExecutionMode::Fast => {
                while !ctx.at_end() {
                    let opcode = ctx.next_code();
                    match self.registry.record(opcode) {
                        Some(record) => (record.executor)(&mut ctx),
                        None => {
                            ctx.raise(ErrorFlags::FATAL_ERROR);
                            break;
                        }
                    }
                }
            }
            ExecutionMode::Safe => {
                while !ctx.at_end() {
                    let opcode = ctx.next_code();
                    let Some(record) = self.registry.record(opcode) else {
                        ctx.raise(ErrorFlags::FATAL_ERROR);
                        flags |= ErrorFlags::NOT_COMPLETED;
                        break;
                    };
                    (record.executor)(&mut ctx);
                    if !ctx.stack.in_bounds() {
                        ctx.raise(ErrorFlags::OUT_OF_RANGE);
                    }
                    if !ctx.ok() {
                        if !ctx.at_end() {
                            flags |= ErrorFlags::NOT_COMPLETED;
                        }
                        break;
                    }
                }
            }
            ExecutionMode::Debug => {
                let sink =
                    sink.ok_or_else(|| Fault::illegal("debug execution requires an output sink"))?;
                let mut tracer = Tracer::new(sink)?;
                while !ctx.at_end() {
                    let code_offset = ctx.pc();
                    let stack_offset = ctx.stack.cursor();
                    let opcode = ctx.next_code();
                    let Some(record) = self.registry.record(opcode) else {
                        ctx.raise(ErrorFlags::FATAL_ERROR);
                        flags |= ErrorFlags::NOT_COMPLETED;
                        break;
                    };
                    let operand = if record.operand_words > 0 {
                        code.get(ctx.pc()).copied()
                    } else {
                        None
                    };
                    let fault_before = ctx.fault();
                    let inputs = trace::stack_values(ctx.stack, stack_offset, record.input_types());
                    (record.executor)(&mut ctx);
                    if !ctx.stack.in_bounds() {
                        ctx.raise(ErrorFlags::OUT_OF_RANGE);
                    }
                    let outputs =
                        trace::stack_values(ctx.stack, ctx.stack.cursor(), record.output_types());
                    let errored = ctx.fault() != fault_before;
                    let name = trace::op_display(record, operand, &self.vars, ctx.memory);
                    tracer.step(stack_offset, code_offset, &name, &inputs, &outputs, errored)?;
                    if !ctx.ok() {
                        if !ctx.at_end() {
                            flags |= ErrorFlags::NOT_COMPLETED;
                        }
                        break;
                    }
                }
                // the closing line marks a clean end of the run
                if ctx.ok() {
                    tracer.finish(ctx.stack.cursor(), ctx.pc())?;
                }
            }
        }

        flags |= ctx.fault();
        // the cursor must be back at base even after an abort
        let cursor = ctx.stack.cursor();
        if cursor != 0 {
            flags |= ErrorFlags::INTERNAL_SETUP_ERROR;
        }
        if flags.is_empty() {
            return Ok(());
        }
        let context = if cursor != 0 {
            "stack cursor not at base after execution"
        } else {
            "execution completed with errors"
        };
        Err(Fault::new(flags, context))
    }

    /// Reconstruct RPN text from the compiled bytecode.
    pub fn decompile(&self, show_types: bool) -> Result<String> {
        let program = self.compiled()?;
        Decompiler::new(&self.registry, &self.vars, &program.memory)
            .decompile(&program.code, show_types)
    }

    fn compiled(&self) -> Result<&CompiledProgram> {
        self.program
            .as_ref()
            .ok_or_else(|| Fault::illegal("program is not compiled"))
    }

    fn compiled_mut(&mut self) -> Result<&mut CompiledProgram> {
        self.program
            .as_mut()
            .ok_or_else(|| Fault::illegal("program is not compiled"))
    }

    fn allocated_address(&self, record: &VariableRecord) -> Result<u16> {
        record.address().ok_or_else(|| {
            Fault::illegal(format!("variable {} is not allocated", record.name()))
        })
    }

    fn input(&self, query: VarQuery<'_>) -> Result<&VariableRecord> {
        match query {
            VarQuery::Name(name) => self.vars.input(name),
            VarQuery::Index(index) => self.vars.input_at(index),
        }
        .ok_or_else(|| Fault::unsupported(format!("no input variable {}", query)))
    }

    fn input_mut(&mut self, query: VarQuery<'_>) -> Result<&mut VariableRecord> {
        match query {
            VarQuery::Name(name) => self.vars.input_mut(name),
            VarQuery::Index(index) => self.vars.input_at_mut(index),
        }
        .ok_or_else(|| Fault::unsupported(format!("no input variable {}", query)))
    }

    fn output(&self, query: VarQuery<'_>) -> Result<&VariableRecord> {
        match query {
            VarQuery::Name(name) => self.vars.output(name),
            VarQuery::Index(index) => self.vars.output_at(index),
        }
        .ok_or_else(|| Fault::unsupported(format!("no output variable {}", query)))
    }

    fn output_mut(&mut self, query: VarQuery<'_>) -> Result<&mut VariableRecord> {
        match query {
            VarQuery::Name(name) => self.vars.output_mut(name),
            VarQuery::Index(index) => self.vars.output_at_mut(index),
        }
        .ok_or_else(|| Fault::unsupported(format!("no output variable {}", query)))
    }
}
