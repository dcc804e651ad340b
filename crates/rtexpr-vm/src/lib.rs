//! The machine substrate of the rtexpr engine: evaluation stack, data
//! memory, execution context and the function registry that maps
//! opcodes to native executors.

pub mod context;
pub mod memory;
pub mod registry;
pub mod scalar;
pub mod stack;

pub use context::ExecCtx;
pub use memory::{DataMemory, MatrixBuffer, MatrixElem, MemoryError};
pub use registry::{
    FunctionRecord, FunctionRegistry, StackUpdate, TempMatrix, TypeStack, UpdateStackFn,
};
pub use scalar::Scalar;
pub use stack::EvalStack;
