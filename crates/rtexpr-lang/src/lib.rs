//! RPN language front end: variable discovery, the type-checked
//! compiler and the decompiler.

pub mod compile;
pub mod decompile;
pub mod variables;

pub use compile::{CompiledProgram, Compiler};
pub use decompile::Decompiler;
pub use variables::{VariableRecord, VariableTable};
