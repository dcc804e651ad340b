//! Line rendering for the step-by-step debug trace.

use std::fmt;
use std::fmt::Write as _;

use rtexpr_core::{Fault, Result, TypeShape, render_words};
use rtexpr_lang::VariableTable;
use rtexpr_vm::{DataMemory, EvalStack, FunctionRecord};

pub(crate) struct Tracer<'a> {
    sink: &'a mut dyn fmt::Write,
    line: usize,
}

impl<'a> Tracer<'a> {
    pub(crate) fn new(sink: &'a mut dyn fmt::Write) -> Result<Self> {
        let mut tracer = Self { sink, line: 1 };
        tracer.write("[line]-[stackPtr]-[codePtr]::[CODE] stack-in => stack-out\n")?;
        Ok(tracer)
    }

    pub(crate) fn step(
        &mut self,
        stack_offset: usize,
        code_offset: usize,
        name: &str,
        inputs: &str,
        outputs: &str,
        errored: bool,
    ) -> Result<()> {
        let marker = if errored { " <ERROR>" } else { "" };
        let text = format!(
            "{} - {} - {} :: {} ({}) => ({}){}\n",
            self.line, stack_offset, code_offset, name, inputs, outputs, marker
        );
        self.line += 1;
        self.write(&text)
    }

    pub(crate) fn finish(&mut self, stack_offset: usize, code_offset: usize) -> Result<()> {
        self.write(&format!("{} - {} :: END\n", stack_offset, code_offset))
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.sink
            .write_str(text)
            .map_err(|_| Fault::fatal("writing the debug trace failed"))
    }
}

/// Render the operation the way the author wrote it: loads and stores
/// show their variable name, constants their stored value.
pub(crate) fn op_display(
    record: &FunctionRecord,
    operand: Option<u16>,
    vars: &VariableTable,
    memory: &DataMemory,
) -> String {
    match record.name {
        "READ" | "RREAD" => {
            if let Some(variable) = operand.and_then(|addr| vars.find_by_address(addr)) {
                if variable.is_constant() {
                    if let Some(value) = constant_text(variable.shape(), variable.address(), memory)
                    {
                        return format!("CONST {} {}", variable.shape(), value);
                    }
                }
                return format!("READ {}", variable.name());
            }
        }
        "WRITE" | "RWRITE" => {
            if let Some(variable) = operand.and_then(|addr| vars.find_by_address(addr)) {
                return format!("WRITE {}", variable.name());
            }
        }
        "CAST" => {
            if let Some(target) = record.output_types().first() {
                return format!("CAST {}", target);
            }
        }
        _ => {}
    }
    record.name.to_string()
}

fn constant_text(shape: TypeShape, address: Option<u16>, memory: &DataMemory) -> Option<String> {
    let address = address?;
    let mut words = [0u32; 2];
    let count = shape.kind().word_count();
    memory.read_words(address, &mut words[..count]).ok()?;
    render_words(shape.kind(), &words[..count])
}

/// Render the typed entries sitting below `cursor`, one per shape in
/// `types` with index 0 topmost. Matrices show as their data address.
pub(crate) fn stack_values(stack: &EvalStack, cursor: usize, types: &[TypeShape]) -> String {
    let mut out = String::new();
    let mut index = cursor;
    for (i, shape) in types.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let words = shape.stack_words();
        let Some(base) = index.checked_sub(words) else {
            out.push('?');
            continue;
        };
        index = base;
        let mut buf = [0u32; 2];
        stack.read_at(base, &mut buf[..words]);
        if shape.is_matrix() {
            let _ = write!(out, "@{}", buf[0]);
        } else {
            match render_words(shape.kind(), &buf[..words]) {
                Some(text) => out.push_str(&text),
                None => out.push('?'),
            }
        }
    }
    out
}
