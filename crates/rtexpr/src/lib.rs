//! Embeddable RPN expression engine for control software.
//!
//! Programs are small stack-oriented texts such as:
//!
//! ```text
//! READ A
//! READ B
//! SUB
//! WRITE C
//! ```
//!
//! The [`Evaluator`] drives the whole lifecycle: variable discovery,
//! type assignment, compilation to bytecode and repeated execution
//! against pre-allocated memory. Compilation resolves every operator
//! against the type stack, so a program that compiles runs without
//! per-step type dispatch.

mod trace;

pub mod evaluator;

pub use evaluator::{Evaluator, ExecutionMode, VarQuery};

pub use rtexpr_core::{ErrorFlags, Fault, Result, ScalarKind, TypeShape};
pub use rtexpr_lang::{CompiledProgram, Compiler, Decompiler, VariableRecord, VariableTable};
pub use rtexpr_stdlib::register_builtins;
pub use rtexpr_vm::{
    DataMemory, EvalStack, ExecCtx, FunctionRecord, FunctionRegistry, MatrixBuffer, Scalar,
};
