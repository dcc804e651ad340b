//! Core definitions shared by the rtexpr compiler and virtual machine:
//! scalar kinds, type shapes, literal conversion and the composable
//! error flags used across the whole engine.

pub mod error;
pub mod types;

pub use error::{ErrorFlags, Fault, Result};
pub use types::{ScalarKind, TypeShape, parse_literal, render_words};
