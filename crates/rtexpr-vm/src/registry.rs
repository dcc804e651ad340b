//! Function records and the ordered operator registry.
//!
//! Overload resolution is a linear scan in registration order and the
//! first structural match wins. Registration order is therefore part of
//! the registry's contract: it is the tie-breaker between overloads of
//! the same name, and tests may pin exact resolution by pinning order.
//!
//! The registry is a plain value with no global state. Build it once at
//! startup, then share it read-only (`Arc`) across evaluator instances.

use rtexpr_core::{Fault, Result, TypeShape};
use smallvec::SmallVec;

use crate::context::ExecCtx;

/// Compile-time mirror of the runtime evaluation stack.
///
/// `peek(0)` is the most recently pushed entry.
#[derive(Clone, Debug, Default)]
pub struct TypeStack {
    items: SmallVec<[TypeShape; 8]>,
}

impl TypeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, shape: TypeShape) {
        self.items.push(shape);
    }

    pub fn pop(&mut self) -> Option<TypeShape> {
        self.items.pop()
    }

    pub fn peek(&self, depth: usize) -> Option<TypeShape> {
        let len = self.items.len();
        if depth >= len {
            return None;
        }
        Some(self.items[len - 1 - depth])
    }

    /// Render the contents, top first, for no-match diagnostics.
    pub fn render(&self) -> String {
        let mut out = String::from("(");
        for (i, shape) in self.items.iter().rev().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&shape.to_string());
        }
        out.push(')');
        out
    }
}

pub type ExecutorFn = fn(&mut ExecCtx);

/// Request for an anonymous intermediate-result matrix, produced by a
/// stack-update hook. The compiler allocates it, appends its address to
/// the bytecode and registers it as an output variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TempMatrix {
    pub shape: TypeShape,
}

/// Compile-time state a stack-update hook operates on.
pub struct StackUpdate<'a> {
    pub types: &'a mut TypeStack,
    /// Simulated runtime stack depth in data elements.
    pub depth: &'a mut usize,
    pub temporaries: &'a mut Vec<TempMatrix>,
}

impl StackUpdate<'_> {
    pub fn pop_type(&mut self) -> Result<TypeShape> {
        self.types
            .pop()
            .ok_or_else(|| Fault::internal("type stack empty during stack update"))
    }

    pub fn shrink(&mut self, words: usize) -> Result<()> {
        *self.depth = self
            .depth
            .checked_sub(words)
            .ok_or_else(|| Fault::internal("simulated stack depth underflow"))?;
        Ok(())
    }

    pub fn grow(&mut self, words: usize) {
        *self.depth += words;
    }
}

/// Custom replacement for the default stack effect, used by operators
/// that propagate matrix dimensions or create temporaries.
pub type UpdateStackFn = fn(&FunctionRecord, &mut StackUpdate<'_>) -> Result<()>;

/// One registered overload of an operator name.
#[derive(Clone, Debug)]
pub struct FunctionRecord {
    pub name: &'static str,
    pub inputs: u16,
    pub outputs: u16,
    /// Input types followed by output types. Store-like records keep
    /// their destination type at index `inputs` even though `outputs`
    /// is zero, so output matching can still see it.
    pub types: SmallVec<[TypeShape; 4]>,
    pub executor: ExecutorFn,
    pub update_hook: Option<UpdateStackFn>,
    /// Code words the executor consumes after the opcode.
    pub operand_words: u16,
}

impl FunctionRecord {
    pub fn new(
        name: &'static str,
        inputs: u16,
        outputs: u16,
        types: &[TypeShape],
        executor: ExecutorFn,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            types: SmallVec::from_slice(types),
            executor,
            update_hook: None,
            operand_words: 0,
        }
    }

    pub fn with_operands(mut self, words: u16) -> Self {
        self.operand_words = words;
        self
    }

    pub fn with_update_hook(mut self, hook: UpdateStackFn) -> Self {
        self.update_hook = Some(hook);
        self
    }

    pub fn input_types(&self) -> &[TypeShape] {
        &self.types[..self.inputs as usize]
    }

    pub fn output_types(&self) -> &[TypeShape] {
        &self.types[self.inputs as usize..self.inputs as usize + self.outputs as usize]
    }

    /// The type output matching compares against: the entry right after
    /// the inputs, present even for store-like records.
    fn match_type(&self) -> Option<TypeShape> {
        self.types.get(self.inputs as usize).copied()
    }

    /// Structural match against the current type stack. With
    /// `match_output` the caller has pushed the desired output type on
    /// top; the declared inputs then sit below it.
    pub fn check(&self, name: &str, stack: &TypeStack, match_output: bool) -> bool {
        if self.name != name {
            return false;
        }
        let mut index = 0;
        if match_output {
            let Some(top) = stack.peek(index) else {
                return false;
            };
            let Some(expected) = self.match_type() else {
                return false;
            };
            if !expected.matches(top) {
                return false;
            }
            index += 1;
        }
        for declared in self.input_types() {
            let Some(actual) = stack.peek(index) else {
                return false;
            };
            if !declared.matches(actual) {
                return false;
            }
            index += 1;
        }
        true
    }

    /// Apply this record's compile-time stack effect.
    ///
    /// Default path: drop the matched output type if present, pop the
    /// declared inputs, push the declared outputs and adjust the
    /// simulated depth. Records with an update hook replace all of this.
    pub fn apply_stack_effect(&self, update: &mut StackUpdate<'_>, match_output: bool) -> Result<()> {
        if let Some(hook) = self.update_hook {
            return hook(self, update);
        }
        if match_output {
            // matching artifact pushed by the compiler, not runtime data
            update.pop_type()?;
        }
        for _ in 0..self.inputs {
            let shape = update.pop_type()?;
            update.shrink(shape.stack_words())?;
        }
        for shape in self.output_types() {
            if shape.is_matrix() {
                return Err(Fault::unsupported(format!(
                    "{}: matrix outputs require a custom stack-update hook",
                    self.name
                )));
            }
            update.types.push(*shape);
            update.grow(shape.stack_words());
        }
        Ok(())
    }
}

/// Append-only, ordered operator registry.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    records: Vec<FunctionRecord>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record and return its opcode.
    pub fn register(&mut self, record: FunctionRecord) -> u16 {
        self.records.push(record);
        (self.records.len() - 1) as u16
    }

    pub fn record(&self, opcode: u16) -> Option<&FunctionRecord> {
        self.records.get(opcode as usize)
    }

    /// First structural match in registration order, or `None`.
    pub fn find(&self, name: &str, stack: &TypeStack, match_output: bool) -> Option<u16> {
        self.records
            .iter()
            .position(|record| record.check(name, stack, match_output))
            .map(|index| index as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_core::ScalarKind;

    const F32: TypeShape = TypeShape::Scalar(ScalarKind::Float32);
    const F64: TypeShape = TypeShape::Scalar(ScalarKind::Float64);
    const U8: TypeShape = TypeShape::Scalar(ScalarKind::Uint8);

    fn nop(_: &mut ExecCtx) {}

    #[test]
    fn first_match_wins() {
        let mut registry = FunctionRegistry::new();
        let first = registry.register(FunctionRecord::new("ADD", 2, 1, &[F32, F32, F32], nop));
        let _f64 = registry.register(FunctionRecord::new("ADD", 2, 1, &[F64, F64, F64], nop));
        let shadow = FunctionRecord::new("ADD", 2, 1, &[F32, F32, F64], nop);
        registry.register(shadow);

        let mut stack = TypeStack::new();
        stack.push(F32);
        stack.push(F32);
        // the duplicate (f32,f32) overload never resolves
        assert_eq!(registry.find("ADD", &stack, false), Some(first));
    }

    #[test]
    fn input_order_is_top_first() {
        let mut registry = FunctionRegistry::new();
        let opcode = registry.register(FunctionRecord::new("MIX", 2, 1, &[F32, F64, F32], nop));

        // MIX expects f32 on top, f64 below
        let mut stack = TypeStack::new();
        stack.push(F64);
        stack.push(F32);
        assert_eq!(registry.find("MIX", &stack, false), Some(opcode));

        let mut stack = TypeStack::new();
        stack.push(F32);
        stack.push(F64);
        assert_eq!(registry.find("MIX", &stack, false), None);
    }

    #[test]
    fn output_matching() {
        let mut registry = FunctionRegistry::new();
        let to_u8 = registry.register(FunctionRecord::new("CAST", 1, 1, &[F32, U8], nop));
        let to_f64 = registry.register(FunctionRecord::new("CAST", 1, 1, &[F32, F64], nop));

        // f32 operand on the stack, desired output pushed on top
        let mut stack = TypeStack::new();
        stack.push(F32);
        stack.push(U8);
        assert_eq!(registry.find("CAST", &stack, true), Some(to_u8));

        let mut stack = TypeStack::new();
        stack.push(F32);
        stack.push(F64);
        assert_eq!(registry.find("CAST", &stack, true), Some(to_f64));
    }

    #[test]
    fn store_record_output_matching() {
        // WRITE-style record: one input, zero outputs, destination type
        // at index `inputs`
        let mut registry = FunctionRegistry::new();
        let opcode = registry.register(FunctionRecord::new("WRITE", 1, 0, &[F32, F32], nop));

        let mut stack = TypeStack::new();
        stack.push(F32);
        stack.push(F32);
        assert_eq!(registry.find("WRITE", &stack, true), Some(opcode));

        let mut stack = TypeStack::new();
        stack.push(F64);
        stack.push(F32);
        assert_eq!(registry.find("WRITE", &stack, true), None);
    }

    #[test]
    fn default_stack_effect_balances() {
        let record = FunctionRecord::new("SUB", 2, 1, &[F64, F64, F64], nop);
        let mut types = TypeStack::new();
        types.push(F64);
        types.push(F64);
        let mut depth = 4usize;
        let mut temporaries = Vec::new();
        let mut update = StackUpdate {
            types: &mut types,
            depth: &mut depth,
            temporaries: &mut temporaries,
        };
        record.apply_stack_effect(&mut update, false).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types.peek(0), Some(F64));
        assert_eq!(depth, 2);
        assert!(temporaries.is_empty());
    }

    #[test]
    fn store_stack_effect_consumes_all() {
        let record = FunctionRecord::new("WRITE", 1, 0, &[F32, F32], nop);
        let mut types = TypeStack::new();
        types.push(F32); // runtime value
        types.push(F32); // matched destination type
        let mut depth = 1usize;
        let mut temporaries = Vec::new();
        let mut update = StackUpdate {
            types: &mut types,
            depth: &mut depth,
            temporaries: &mut temporaries,
        };
        record.apply_stack_effect(&mut update, true).unwrap();
        assert!(types.is_empty());
        assert_eq!(depth, 0);
    }
}
