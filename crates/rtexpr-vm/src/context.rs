//! Execution context handed to native executors.
//!
//! Executors do not return results; they raise error flags on the
//! context and the execution loop decides what to do with them. This
//! keeps the dispatch loop a plain indirect call per opcode.

use rtexpr_core::ErrorFlags;

use crate::memory::DataMemory;
use crate::scalar::Scalar;
use crate::stack::EvalStack;

pub struct ExecCtx<'a> {
    code: &'a [u16],
    pc: usize,
    pub stack: &'a mut EvalStack,
    pub memory: &'a mut DataMemory,
    fault: ErrorFlags,
}

impl<'a> ExecCtx<'a> {
    pub fn new(code: &'a [u16], stack: &'a mut EvalStack, memory: &'a mut DataMemory) -> Self {
        Self {
            code,
            pc: 0,
            stack,
            memory,
            fault: ErrorFlags::NONE,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn at_end(&self) -> bool {
        self.pc >= self.code.len()
    }

    pub fn fault(&self) -> ErrorFlags {
        self.fault
    }

    pub fn ok(&self) -> bool {
        self.fault.is_empty()
    }

    pub fn raise(&mut self, flags: ErrorFlags) {
        self.fault |= flags;
    }

    /// Fetch the next code word and advance the cursor. Executors use
    /// this to consume their operand words.
    pub fn next_code(&mut self) -> u16 {
        match self.code.get(self.pc) {
            Some(&word) => {
                self.pc += 1;
                word
            }
            None => {
                self.raise(ErrorFlags::FATAL_ERROR);
                0
            }
        }
    }

    pub fn push<T: Scalar>(&mut self, value: T) {
        self.stack.push(value);
    }

    pub fn pop<T: Scalar>(&mut self) -> T {
        self.stack.pop()
    }

    /// Push a data-memory address, as matrix executors leave on the stack.
    pub fn push_addr(&mut self, addr: u16) {
        self.stack.push_word(addr as u32);
    }

    pub fn pop_addr(&mut self) -> u16 {
        self.stack.pop_word() as u16
    }

    /// Load a scalar from data memory, raising `FATAL_ERROR` on an
    /// invalid slot access.
    pub fn load<T: Scalar>(&mut self, addr: u16) -> T {
        match self.memory.read_scalar::<T>(addr) {
            Ok(value) => value,
            Err(_) => {
                self.raise(ErrorFlags::FATAL_ERROR);
                T::default()
            }
        }
    }

    pub fn store<T: Scalar>(&mut self, addr: u16, value: T) {
        if self.memory.write_scalar(addr, value).is_err() {
            self.raise(ErrorFlags::FATAL_ERROR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_core::ScalarKind;

    #[test]
    fn code_fetch() {
        let code = [3u16, 7];
        let mut stack = EvalStack::new();
        let mut memory = DataMemory::new();
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        assert_eq!(ctx.next_code(), 3);
        assert_eq!(ctx.next_code(), 7);
        assert!(ctx.at_end());
        assert!(ctx.ok());
        assert_eq!(ctx.next_code(), 0);
        assert!(ctx.fault().contains(ErrorFlags::FATAL_ERROR));
    }

    #[test]
    fn load_store_round_trip() {
        let code: [u16; 0] = [];
        let mut stack = EvalStack::new();
        stack.resize(2);
        let mut memory = DataMemory::new();
        let addr = memory.alloc_scalar(ScalarKind::Float32);
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        ctx.store(addr, 1.25f32);
        let value: f32 = ctx.load(addr);
        assert_eq!(value, 1.25);
        assert!(ctx.ok());
    }

    #[test]
    fn bad_slot_raises_fatal() {
        let code: [u16; 0] = [];
        let mut stack = EvalStack::new();
        let mut memory = DataMemory::new();
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        let _: f32 = ctx.load(12);
        assert!(ctx.fault().contains(ErrorFlags::FATAL_ERROR));
    }
}
