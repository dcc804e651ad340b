//! The RPN compiler.
//!
//! One pass over the text, simulating the runtime stack on a type
//! stack. Every line resolves to one registry opcode; READ/WRITE/CONST
//! and CAST push the concerned type first and match with the output
//! flag set, so the emitted opcode is type-checked exactly like any
//! operator. The running maximum of the simulated depth becomes the
//! evaluation-stack capacity.

use rtexpr_core::{Fault, Result, TypeShape, parse_literal};
use rtexpr_vm::{DataMemory, FunctionRegistry, StackUpdate, TypeStack};

use crate::variables::{VariableRecord, VariableTable};

/// The frozen output of a successful compilation.
#[derive(Debug)]
pub struct CompiledProgram {
    /// Opcodes interleaved with operand addresses.
    pub code: Vec<u16>,
    /// Evaluation-stack capacity in data elements.
    pub stack_depth: usize,
    /// Constants, variables and temporaries.
    pub memory: DataMemory,
}

pub struct Compiler<'a> {
    registry: &'a FunctionRegistry,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Self { registry }
    }

    /// Compile `text` against the discovered variables. Allocates every
    /// referenced variable; on failure the table is left partially
    /// allocated and must be rebuilt by re-running discovery.
    pub fn compile(&self, text: &str, vars: &mut VariableTable) -> Result<CompiledProgram> {
        let mut memory = DataMemory::new();
        let mut code: Vec<u16> = Vec::new();
        let mut types = TypeStack::new();
        let mut depth = 0usize;
        let mut max_depth = 0usize;
        let mut anon = 0u32;

        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            let mut tokens = line.split([' ', '\t', ',']).filter(|t| !t.is_empty());
            let Some(first) = tokens.next() else {
                continue;
            };
            let p1 = tokens.next();
            let p2 = tokens.next();

            let mut command = first;
            let mut match_output = false;
            let mut operand: Option<u16> = None;

            match first {
                "RREAD" | "RWRITE" => {
                    return Err(Fault::illegal(format!(
                        "{} command is reserved and cannot be used",
                        first
                    )));
                }
                "CAST" => {
                    let type_text = Self::one_parameter(first, p1, p2)?;
                    let shape = Self::parse_type(type_text)?;
                    types.push(shape);
                    match_output = true;
                }
                "WRITE" => {
                    let name = Self::one_parameter(first, p1, p2)?;
                    let record = vars.output_mut(name).ok_or_else(|| {
                        Fault::unsupported(format!("output variable {} not found", name))
                    })?;
                    if record.is_allocated() {
                        return Err(Fault::unsupported(format!(
                            "trying to overwrite output variable {}",
                            name
                        )));
                    }
                    if record.shape().is_void() {
                        // an external binding fixes a width the caller
                        // chose; it cannot be inferred from the stack
                        if record.external().is_some() {
                            return Err(Fault::unsupported(format!(
                                "externally bound output variable {} must be typed",
                                name
                            )));
                        }
                        let top = types.peek(0).ok_or_else(|| {
                            Fault::unsupported(format!(
                                "no value on the stack to type output variable {}",
                                name
                            ))
                        })?;
                        record.set_shape(top)?;
                    }
                    if record.is_remote_scalar() {
                        command = "RWRITE";
                    }
                    let addr = allocate(record, &mut memory)?;
                    types.push(record.shape());
                    match_output = true;
                    operand = Some(addr);
                }
                "READ" => {
                    let name = Self::one_parameter(first, p1, p2)?;
                    // an already-written output shadows the input of the
                    // same name: write-then-read semantics
                    let use_output = vars.output(name).is_some_and(|r| r.is_allocated());
                    let record = if use_output {
                        vars.output_mut(name)
                    } else {
                        vars.input_mut(name)
                    }
                    .ok_or_else(|| {
                        Fault::unsupported(format!("input variable {} not found", name))
                    })?;
                    if record.is_remote_scalar() {
                        command = "RREAD";
                    }
                    let addr = allocate(record, &mut memory)?;
                    types.push(record.shape());
                    match_output = true;
                    operand = Some(addr);
                }
                "CONST" => {
                    let (type_text, literal) = match (p1, p2) {
                        (Some(t), Some(l)) => (t, l),
                        _ => {
                            return Err(Fault::illegal("CONST without type name and value"));
                        }
                    };
                    if tokens.next().is_some() {
                        return Err(Fault::illegal("CONST followed by extra tokens"));
                    }
                    let shape = Self::parse_type(type_text)?;
                    if shape.is_matrix() {
                        return Err(Fault::unsupported("matrix constants are not supported"));
                    }
                    let mut record =
                        VariableRecord::constant(format!("Constant@{}", anon), shape);
                    anon += 1;
                    let addr = allocate(&mut record, &mut memory)?;
                    let words = parse_literal(shape.kind(), literal).ok_or_else(|| {
                        Fault::fatal(format!(
                            "assigning {} to a variable of type {} failed",
                            literal, type_text
                        ))
                    })?;
                    memory
                        .write_words(addr, &words)
                        .map_err(|e| Fault::fatal(e.to_string()))?;
                    vars.add_input(record);
                    types.push(shape);
                    match_output = true;
                    operand = Some(addr);
                    // the runtime operation is a READ from the constant area
                    command = "READ";
                }
                _ => {}
            }

            let opcode = self
                .registry
                .find(command, &types, match_output)
                .ok_or_else(|| {
                    Fault::unsupported(format!("command {}{} not found", command, types.render()))
                })?;
            let record = self
                .registry
                .record(opcode)
                .ok_or_else(|| Fault::internal(format!("invalid opcode {} selected", opcode)))?;

            let mut temporaries = Vec::new();
            record.apply_stack_effect(
                &mut StackUpdate {
                    types: &mut types,
                    depth: &mut depth,
                    temporaries: &mut temporaries,
                },
                match_output,
            )?;
            max_depth = max_depth.max(depth);

            code.push(opcode);
            if let Some(addr) = operand {
                code.push(addr);
            }

            for temp in temporaries {
                let mut record = VariableRecord::new(format!("Temp@{}", anon), temp.shape);
                anon += 1;
                let addr = allocate(&mut record, &mut memory)?;
                code.push(addr);
                vars.add_output(record);
                types.push(temp.shape);
                depth += 1;
                max_depth = max_depth.max(depth);
            }
        }

        if !types.is_empty() {
            return Err(Fault::internal(format!(
                "operation sequence is incomplete: {} entries left on the type stack",
                types.len()
            )));
        }

        Ok(CompiledProgram {
            code,
            stack_depth: max_depth,
            memory,
        })
    }

    fn one_parameter<'t>(command: &str, p1: Option<&'t str>, p2: Option<&str>) -> Result<&'t str> {
        match (p1, p2) {
            (Some(name), None) => Ok(name),
            (None, _) => Err(Fault::illegal(format!("{} without parameter", command))),
            (Some(_), Some(_)) => Err(Fault::illegal(format!(
                "{} followed by extra tokens",
                command
            ))),
        }
    }

    fn parse_type(text: &str) -> Result<TypeShape> {
        TypeShape::parse(text)
            .ok_or_else(|| Fault::unsupported(format!("type {} is not a known format", text)))
    }
}

/// Assign a data-memory slot, honoring an external binding. Idempotent
/// for already-allocated records.
fn allocate(record: &mut VariableRecord, memory: &mut DataMemory) -> Result<u16> {
    if let Some(addr) = record.address() {
        return Ok(addr);
    }
    let shape = record.shape();
    if !shape.is_numeric() {
        return Err(Fault::unsupported(format!(
            "cannot allocate untyped variable {}",
            record.name()
        )));
    }
    if shape.byte_size() == 0 {
        return Err(Fault::unsupported(format!(
            "variable {} has a zero-size type",
            record.name()
        )));
    }
    let addr = match (shape, record.external()) {
        (TypeShape::Matrix { kind, rows, cols }, Some(ptr)) => {
            memory.bind_matrix(kind, rows, cols, ptr)
        }
        (TypeShape::Matrix { kind, rows, cols }, None) => memory.alloc_matrix(kind, rows, cols),
        (TypeShape::Scalar(kind), Some(ptr)) => memory.bind_scalar(kind, ptr),
        (TypeShape::Scalar(kind), None) => memory.alloc_scalar(kind),
    };
    record.set_address(addr);
    Ok(addr)
}
