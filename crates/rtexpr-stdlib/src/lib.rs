//! Built-in operator library.
//!
//! `register_builtins` populates a registry in a fixed order; since the
//! first structural match wins during overload resolution, this order
//! is part of the public contract and must not be rearranged.

use rtexpr_core::{ScalarKind, TypeShape};
use rtexpr_vm::FunctionRegistry;

mod cast;
mod compare;
mod io;
mod math;
mod matrix;

pub(crate) const fn scalar(kind: ScalarKind) -> TypeShape {
    TypeShape::Scalar(kind)
}

pub(crate) const fn matrix_of(kind: ScalarKind) -> TypeShape {
    TypeShape::Matrix {
        kind,
        rows: 0,
        cols: 0,
    }
}

/// Register every built-in operator: memory access, casts, transcendental
/// functions, arithmetic, comparisons, logic and matrix operators.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    io::register(registry);
    cast::register(registry);
    math::register(registry);
    compare::register(registry);
    matrix::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_vm::TypeStack;

    #[test]
    fn registry_is_populated() {
        let mut registry = FunctionRegistry::new();
        register_builtins(&mut registry);
        // 10 kinds x READ/WRITE/RREAD/RWRITE, 100 casts, and the rest
        assert!(registry.len() > 200);
    }

    #[test]
    fn read_resolves_per_kind() {
        let mut registry = FunctionRegistry::new();
        register_builtins(&mut registry);

        let mut stack = TypeStack::new();
        stack.push(scalar(ScalarKind::Float32));
        let f32_read = registry.find("READ", &stack, true).unwrap();

        let mut stack = TypeStack::new();
        stack.push(scalar(ScalarKind::Int64));
        let i64_read = registry.find("READ", &stack, true).unwrap();

        assert_ne!(f32_read, i64_read);
        assert_eq!(registry.record(f32_read).unwrap().name, "READ");
    }
}
