//! Bytecode to RPN text.
//!
//! Reconstructs source lines from compiled code. Load/store opcodes are
//! rendered with the variable name their operand address resolves to;
//! constants reappear as `CONST` lines with their stored value, and the
//! remote variants fold back into plain `READ`/`WRITE`. With type
//! annotations enabled every line carries the resolved overload's input
//! and output type lists instead.

use std::fmt::Write as _;

use rtexpr_core::{Fault, Result, TypeShape, render_words};
use rtexpr_vm::{DataMemory, FunctionRecord, FunctionRegistry};

use crate::variables::VariableTable;

pub struct Decompiler<'a> {
    registry: &'a FunctionRegistry,
    vars: &'a VariableTable,
    memory: &'a DataMemory,
}

impl<'a> Decompiler<'a> {
    pub fn new(
        registry: &'a FunctionRegistry,
        vars: &'a VariableTable,
        memory: &'a DataMemory,
    ) -> Self {
        Self {
            registry,
            vars,
            memory,
        }
    }

    /// Render `code` back to RPN text, one line per operation. With
    /// `show_types` each line is annotated with the overload's input and
    /// output types instead of reconstructing compilable source.
    pub fn decompile(&self, code: &[u16], show_types: bool) -> Result<String> {
        let mut out = String::new();
        let mut cursor = 0usize;
        while cursor < code.len() {
            let opcode = code[cursor];
            cursor += 1;
            let record = self
                .registry
                .record(opcode)
                .ok_or_else(|| Fault::internal(format!("invalid opcode {} in code", opcode)))?;

            let operands = record.operand_words as usize;
            if cursor + operands > code.len() {
                return Err(Fault::internal(format!(
                    "code truncated inside {} operands",
                    record.name
                )));
            }
            let operand = code.get(cursor).copied();
            cursor += operands;

            self.render_line(&mut out, record, operand, show_types)?;
            out.push('\n');
        }
        Ok(out)
    }

    fn render_line(
        &self,
        out: &mut String,
        record: &FunctionRecord,
        operand: Option<u16>,
        show_types: bool,
    ) -> Result<()> {
        match record.name {
            "READ" | "RREAD" => {
                let variable = self.operand_variable(record.name, operand)?;
                if variable.is_constant() {
                    let shape = variable.shape();
                    out.push_str("CONST ");
                    let _ = write!(out, "{} ", shape);
                    out.push_str(&self.constant_value(variable.address(), shape)?);
                } else {
                    out.push_str("READ ");
                    out.push_str(variable.name());
                }
            }
            "WRITE" | "RWRITE" => {
                let variable = self.operand_variable(record.name, operand)?;
                out.push_str("WRITE ");
                out.push_str(variable.name());
            }
            "CAST" if !show_types => {
                let Some(target) = record.output_types().first() else {
                    return Err(Fault::internal("CAST record without output type"));
                };
                let _ = write!(out, "CAST {}", target);
            }
            name => out.push_str(name),
        }
        if show_types {
            Self::render_type_list(out, " (", record.input_types());
            Self::render_type_list(out, " => (", record.output_types());
        }
        Ok(())
    }

    fn render_type_list(out: &mut String, prefix: &str, types: &[TypeShape]) {
        out.push_str(prefix);
        for (i, shape) in types.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}", shape);
        }
        out.push(')');
    }

    fn operand_variable(
        &self,
        name: &str,
        operand: Option<u16>,
    ) -> Result<&crate::variables::VariableRecord> {
        let address = operand.ok_or_else(|| {
            Fault::internal(format!("{} without an operand address", name))
        })?;
        self.vars.find_by_address(address).ok_or_else(|| {
            Fault::internal(format!("no variable at data address {}", address))
        })
    }

    fn constant_value(&self, address: Option<u16>, shape: TypeShape) -> Result<String> {
        let address = address
            .ok_or_else(|| Fault::internal("constant variable without an address"))?;
        let mut words = [0u32; 2];
        let count = shape.kind().word_count();
        self.memory
            .read_words(address, &mut words[..count])
            .map_err(|e| Fault::fatal(e.to_string()))?;
        render_words(shape.kind(), &words[..count])
            .ok_or_else(|| Fault::internal("constant value is not renderable"))
    }
}
