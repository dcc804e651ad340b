//! Variable records and the discovery scan.
//!
//! Discovery builds the input and output collections from the RPN text
//! alone; the caller may then adjust types and bind external memory
//! before compilation fixes addresses forever.

use rtexpr_core::{Fault, Result, TypeShape};

/// One named input or output, or one anonymous constant/temporary.
#[derive(Clone, Debug)]
pub struct VariableRecord {
    name: String,
    shape: TypeShape,
    address: Option<u16>,
    external: Option<*mut u8>,
    constant: bool,
}

impl VariableRecord {
    pub(crate) fn new(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            address: None,
            external: None,
            constant: false,
        }
    }

    pub(crate) fn constant(name: impl Into<String>, shape: TypeShape) -> Self {
        let mut record = Self::new(name, shape);
        record.constant = true;
        record
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> TypeShape {
        self.shape
    }

    /// Data-memory address; `None` until the compiler allocates the
    /// variable. Fixed forever once assigned.
    pub fn address(&self) -> Option<u16> {
        self.address
    }

    pub fn is_allocated(&self) -> bool {
        self.address.is_some()
    }

    pub fn external(&self) -> Option<*mut u8> {
        self.external
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// A scalar bound to caller-owned memory; compiles to the remote
    /// opcode variants.
    pub fn is_remote_scalar(&self) -> bool {
        self.external.is_some() && !self.shape.is_matrix()
    }

    pub fn set_shape(&mut self, shape: TypeShape) -> Result<()> {
        if self.is_allocated() {
            return Err(Fault::illegal(format!(
                "variable {} is already allocated, type is frozen",
                self.name
            )));
        }
        self.shape = shape;
        Ok(())
    }

    pub fn bind_external(&mut self, ptr: *mut u8) -> Result<()> {
        if self.is_allocated() {
            return Err(Fault::illegal(format!(
                "variable {} is already allocated, binding is frozen",
                self.name
            )));
        }
        self.external = Some(ptr);
        Ok(())
    }

    pub(crate) fn set_address(&mut self, address: u16) {
        self.address = Some(address);
    }
}

/// The input and output collections of one program.
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    inputs: Vec<VariableRecord>,
    outputs: Vec<VariableRecord>,
}

impl VariableTable {
    /// Scan RPN text and register every `READ`/`WRITE` name. A `READ`
    /// of a known output is not re-registered (write-then-read); a
    /// duplicate `WRITE` declaration is rejected. Other commands are
    /// ignored here; the scan stops at the first blank line.
    pub fn extract(text: &str) -> Result<Self> {
        let mut table = VariableTable::default();
        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            let mut tokens = line.split([' ', '\t', ',']).filter(|t| !t.is_empty());
            let Some(command) = tokens.next() else {
                continue;
            };
            match command {
                "READ" => {
                    let name = Self::single_parameter(command, &mut tokens)?;
                    if table.output(name).is_none() && table.input(name).is_none() {
                        table.inputs.push(VariableRecord::new(name, TypeShape::VOID));
                    }
                }
                "WRITE" => {
                    let name = Self::single_parameter(command, &mut tokens)?;
                    if table.output(name).is_some() {
                        return Err(Fault::illegal(format!(
                            "duplicate declaration of output variable {}",
                            name
                        )));
                    }
                    table
                        .outputs
                        .push(VariableRecord::new(name, TypeShape::VOID));
                }
                _ => {}
            }
        }
        Ok(table)
    }

    fn single_parameter<'a>(
        command: &str,
        tokens: &mut impl Iterator<Item = &'a str>,
    ) -> Result<&'a str> {
        let Some(name) = tokens.next() else {
            return Err(Fault::illegal(format!(
                "{} without variable name",
                command
            )));
        };
        if tokens.next().is_some() {
            return Err(Fault::illegal(format!(
                "{} {} followed by extra tokens",
                command, name
            )));
        }
        Ok(name)
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, name: &str) -> Option<&VariableRecord> {
        self.inputs.iter().find(|v| v.name() == name)
    }

    pub fn input_mut(&mut self, name: &str) -> Option<&mut VariableRecord> {
        self.inputs.iter_mut().find(|v| v.name() == name)
    }

    pub fn output(&self, name: &str) -> Option<&VariableRecord> {
        self.outputs.iter().find(|v| v.name() == name)
    }

    pub fn output_mut(&mut self, name: &str) -> Option<&mut VariableRecord> {
        self.outputs.iter_mut().find(|v| v.name() == name)
    }

    pub fn input_at(&self, index: usize) -> Option<&VariableRecord> {
        self.inputs.get(index)
    }

    pub fn input_at_mut(&mut self, index: usize) -> Option<&mut VariableRecord> {
        self.inputs.get_mut(index)
    }

    pub fn output_at(&self, index: usize) -> Option<&VariableRecord> {
        self.outputs.get(index)
    }

    pub fn output_at_mut(&mut self, index: usize) -> Option<&mut VariableRecord> {
        self.outputs.get_mut(index)
    }

    pub(crate) fn add_input(&mut self, record: VariableRecord) {
        self.inputs.push(record);
    }

    pub(crate) fn add_output(&mut self, record: VariableRecord) {
        self.outputs.push(record);
    }

    /// Find by allocated address, outputs shadowing inputs. Used by the
    /// decompiler and the debug trace to resolve operand names.
    pub fn find_by_address(&self, address: u16) -> Option<&VariableRecord> {
        self.outputs
            .iter()
            .chain(self.inputs.iter())
            .find(|v| v.address() == Some(address))
    }
}
