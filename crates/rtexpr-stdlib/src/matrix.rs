//! Matrix operators.
//!
//! Matrices travel on the evaluation stack as data-memory addresses;
//! the buffers themselves stay in the pool. Each operator carries a
//! stack-update hook that validates concrete dimensions at compile
//! time, since signature matching only compares kind and matrix-ness.
//! Operators that produce a result request an anonymous temporary from
//! the compiler, which allocates it and appends its address as an extra
//! operand word.

use rtexpr_core::{ErrorFlags, Fault, Result, ScalarKind, TypeShape};
use rtexpr_vm::{
    ExecCtx, FunctionRecord, FunctionRegistry, MatrixElem, StackUpdate, TempMatrix,
};

use crate::matrix_of;

fn matrix_read(ctx: &mut ExecCtx) {
    let addr = ctx.next_code();
    ctx.push_addr(addr);
}

fn matrix_write<T: MatrixElem>(ctx: &mut ExecCtx) {
    let dest = ctx.next_code();
    let src = ctx.pop_addr();
    if src == dest {
        return;
    }
    let Ok(mut out) = ctx.memory.take_matrix(dest) else {
        ctx.raise(ErrorFlags::FATAL_ERROR);
        return;
    };
    let copied = match ctx.memory.matrix(src) {
        Ok(source) if source.same_shape(&out) => {
            match (source.elements::<T>(), out.elements_mut::<T>()) {
                (Some(from), Some(to)) => {
                    to.copy_from_slice(from);
                    true
                }
                _ => false,
            }
        }
        _ => false,
    };
    if !copied {
        ctx.raise(ErrorFlags::INTERNAL_SETUP_ERROR);
    }
    if ctx.memory.put_matrix(dest, out).is_err() {
        ctx.raise(ErrorFlags::FATAL_ERROR);
    }
}

/// Element-wise binary operator: pops the two operand addresses, writes
/// into the temporary at the extra operand word and pushes its address.
fn matrix_elementwise<T: MatrixElem + std::ops::Add<Output = T> + std::ops::Sub<Output = T>>(
    ctx: &mut ExecCtx,
    subtract: bool,
) {
    let y1 = ctx.pop_addr();
    let y2 = ctx.pop_addr();
    let out_addr = ctx.next_code();
    let Ok(mut out) = ctx.memory.take_matrix(out_addr) else {
        ctx.raise(ErrorFlags::FATAL_ERROR);
        return;
    };
    let computed = match (ctx.memory.matrix(y2), ctx.memory.matrix(y1)) {
        (Ok(left), Ok(right)) if left.same_shape(right) && left.same_shape(&out) => {
            match (
                left.elements::<T>(),
                right.elements::<T>(),
                out.elements_mut::<T>(),
            ) {
                (Some(a), Some(b), Some(z)) => {
                    for i in 0..z.len() {
                        z[i] = if subtract { a[i] - b[i] } else { a[i] + b[i] };
                    }
                    true
                }
                _ => false,
            }
        }
        _ => false,
    };
    if !computed {
        ctx.raise(ErrorFlags::INTERNAL_SETUP_ERROR);
    }
    if ctx.memory.put_matrix(out_addr, out).is_err() {
        ctx.raise(ErrorFlags::FATAL_ERROR);
    }
    ctx.push_addr(out_addr);
}

fn matrix_add<T: MatrixElem + std::ops::Add<Output = T> + std::ops::Sub<Output = T>>(
    ctx: &mut ExecCtx,
) {
    matrix_elementwise::<T>(ctx, false);
}

fn matrix_sub<T: MatrixElem + std::ops::Add<Output = T> + std::ops::Sub<Output = T>>(
    ctx: &mut ExecCtx,
) {
    matrix_elementwise::<T>(ctx, true);
}

fn matrix_mul<T>(ctx: &mut ExecCtx)
where
    T: MatrixElem + std::ops::Add<Output = T> + std::ops::Mul<Output = T>,
{
    let y1 = ctx.pop_addr(); // right operand, pushed last
    let y2 = ctx.pop_addr(); // left operand
    let out_addr = ctx.next_code();
    let Ok(mut out) = ctx.memory.take_matrix(out_addr) else {
        ctx.raise(ErrorFlags::FATAL_ERROR);
        return;
    };
    let computed = match (ctx.memory.matrix(y2), ctx.memory.matrix(y1)) {
        (Ok(left), Ok(right))
            if left.cols == right.rows && out.rows == left.rows && out.cols == right.cols =>
        {
            match (
                left.elements::<T>(),
                right.elements::<T>(),
                out.elements_mut::<T>(),
            ) {
                (Some(a), Some(b), Some(z)) => {
                    let (rows, inner, cols) =
                        (left.rows as usize, left.cols as usize, right.cols as usize);
                    for r in 0..rows {
                        for c in 0..cols {
                            let mut acc = T::default();
                            for k in 0..inner {
                                acc = acc + a[r * inner + k] * b[k * cols + c];
                            }
                            z[r * cols + c] = acc;
                        }
                    }
                    true
                }
                _ => false,
            }
        }
        _ => false,
    };
    if !computed {
        ctx.raise(ErrorFlags::INTERNAL_SETUP_ERROR);
    }
    if ctx.memory.put_matrix(out_addr, out).is_err() {
        ctx.raise(ErrorFlags::FATAL_ERROR);
    }
    ctx.push_addr(out_addr);
}

fn expect_matrix(shape: TypeShape, what: &str) -> Result<(ScalarKind, u32, u32)> {
    match shape {
        TypeShape::Matrix { kind, rows, cols } => Ok((kind, rows, cols)),
        TypeShape::Scalar(_) => Err(Fault::internal(format!("expecting a matrix as {}", what))),
    }
}

/// READ of a matrix variable: the concrete type the compiler pushed for
/// output matching stays on the type stack, keeping its dimensions.
fn read_update(_record: &FunctionRecord, update: &mut StackUpdate<'_>) -> Result<()> {
    let top = update
        .types
        .peek(0)
        .ok_or_else(|| Fault::internal("type stack empty during stack update"))?;
    expect_matrix(top, "READ operand")?;
    update.grow(1);
    Ok(())
}

/// WRITE to a matrix output: destination type on top (matching
/// artifact), source below it. Shapes must agree exactly.
fn write_update(_record: &FunctionRecord, update: &mut StackUpdate<'_>) -> Result<()> {
    let dest = expect_matrix(update.pop_type()?, "WRITE destination")?;
    let src = expect_matrix(update.pop_type()?, "WRITE source")?;
    update.shrink(1)?;
    if dest != src {
        return Err(Fault::unsupported(format!(
            "cannot write matrix of {}x{} into {}x{}",
            src.1, src.2, dest.1, dest.2
        )));
    }
    Ok(())
}

/// ADD/SUB: both operands share one shape, the result is a fresh
/// temporary of the same shape.
fn same_shape_update(_record: &FunctionRecord, update: &mut StackUpdate<'_>) -> Result<()> {
    let first = expect_matrix(update.pop_type()?, "operand")?;
    let second = expect_matrix(update.pop_type()?, "operand")?;
    update.shrink(2)?;
    if first != second {
        return Err(Fault::unsupported(format!(
            "matrix shapes {}x{} and {}x{} do not agree",
            second.1, second.2, first.1, first.2
        )));
    }
    update.temporaries.push(TempMatrix {
        shape: TypeShape::Matrix {
            kind: first.0,
            rows: first.1,
            cols: first.2,
        },
    });
    Ok(())
}

/// MUL: conformability (left columns == right rows), result shape is
/// (left rows, right columns).
fn mul_update(_record: &FunctionRecord, update: &mut StackUpdate<'_>) -> Result<()> {
    let right = expect_matrix(update.pop_type()?, "operand")?;
    let left = expect_matrix(update.pop_type()?, "operand")?;
    update.shrink(2)?;
    if left.0 != right.0 {
        return Err(Fault::unsupported("matrix kinds do not agree"));
    }
    if left.2 != right.1 {
        return Err(Fault::unsupported(format!(
            "matrix product {}x{} * {}x{} is not conformable",
            left.1, left.2, right.1, right.2
        )));
    }
    update.temporaries.push(TempMatrix {
        shape: TypeShape::Matrix {
            kind: left.0,
            rows: left.1,
            cols: right.2,
        },
    });
    Ok(())
}

macro_rules! register_matrix_ops {
    ($registry:ident, $ty:ty, $kind:ident) => {
        let m = matrix_of(ScalarKind::$kind);
        $registry.register(
            FunctionRecord::new("READ", 0, 1, &[m], matrix_read)
                .with_operands(1)
                .with_update_hook(read_update),
        );
        $registry.register(
            FunctionRecord::new("WRITE", 1, 0, &[m, m], matrix_write::<$ty>)
                .with_operands(1)
                .with_update_hook(write_update),
        );
        $registry.register(
            FunctionRecord::new("ADD", 2, 1, &[m, m, m], matrix_add::<$ty>)
                .with_operands(1)
                .with_update_hook(same_shape_update),
        );
        $registry.register(
            FunctionRecord::new("SUB", 2, 1, &[m, m, m], matrix_sub::<$ty>)
                .with_operands(1)
                .with_update_hook(same_shape_update),
        );
        $registry.register(
            FunctionRecord::new("MUL", 2, 1, &[m, m, m], matrix_mul::<$ty>)
                .with_operands(1)
                .with_update_hook(mul_update),
        );
    };
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    register_matrix_ops!(registry, f32, Float32);
    register_matrix_ops!(registry, f64, Float64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_vm::{DataMemory, EvalStack, TypeStack};

    fn shape(rows: u32, cols: u32) -> TypeShape {
        TypeShape::Matrix {
            kind: ScalarKind::Float32,
            rows,
            cols,
        }
    }

    #[test]
    fn add_executor() {
        let mut memory = DataMemory::new();
        let a = memory.alloc_matrix(ScalarKind::Float32, 2, 2);
        let b = memory.alloc_matrix(ScalarKind::Float32, 2, 2);
        let out = memory.alloc_matrix(ScalarKind::Float32, 2, 2);
        memory
            .matrix_mut(a)
            .unwrap()
            .elements_mut::<f32>()
            .unwrap()
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        memory
            .matrix_mut(b)
            .unwrap()
            .elements_mut::<f32>()
            .unwrap()
            .copy_from_slice(&[10.0, 20.0, 30.0, 40.0]);

        let mut stack = EvalStack::new();
        stack.resize(4);
        stack.push_word(a as u32);
        stack.push_word(b as u32);

        let code = [out];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        matrix_add::<f32>(&mut ctx);
        assert!(ctx.ok());
        assert_eq!(ctx.pop_addr(), out);
        assert_eq!(
            memory.matrix(out).unwrap().elements::<f32>().unwrap(),
            &[11.0, 22.0, 33.0, 44.0]
        );
    }

    #[test]
    fn mul_executor() {
        let mut memory = DataMemory::new();
        let a = memory.alloc_matrix(ScalarKind::Float64, 2, 3);
        let b = memory.alloc_matrix(ScalarKind::Float64, 3, 1);
        let out = memory.alloc_matrix(ScalarKind::Float64, 2, 1);
        memory
            .matrix_mut(a)
            .unwrap()
            .elements_mut::<f64>()
            .unwrap()
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        memory
            .matrix_mut(b)
            .unwrap()
            .elements_mut::<f64>()
            .unwrap()
            .copy_from_slice(&[1.0, 1.0, 1.0]);

        let mut stack = EvalStack::new();
        stack.resize(4);
        stack.push_word(a as u32); // left
        stack.push_word(b as u32); // right

        let code = [out];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        matrix_mul::<f64>(&mut ctx);
        assert!(ctx.ok());
        assert_eq!(ctx.pop_addr(), out);
        assert_eq!(
            memory.matrix(out).unwrap().elements::<f64>().unwrap(),
            &[6.0, 15.0]
        );
    }

    #[test]
    fn same_shape_hook_rejects_mismatch() {
        let record = FunctionRecord::new(
            "ADD",
            2,
            1,
            &[
                matrix_of(ScalarKind::Float32),
                matrix_of(ScalarKind::Float32),
                matrix_of(ScalarKind::Float32),
            ],
            matrix_add::<f32>,
        );
        let mut types = TypeStack::new();
        types.push(shape(2, 2));
        types.push(shape(3, 3));
        let mut depth = 2usize;
        let mut temporaries = Vec::new();
        let mut update = StackUpdate {
            types: &mut types,
            depth: &mut depth,
            temporaries: &mut temporaries,
        };
        let err = same_shape_update(&record, &mut update).unwrap_err();
        assert!(err.flags().contains(ErrorFlags::UNSUPPORTED_FEATURE));
    }

    #[test]
    fn mul_hook_propagates_product_shape() {
        let record = FunctionRecord::new(
            "MUL",
            2,
            1,
            &[
                matrix_of(ScalarKind::Float32),
                matrix_of(ScalarKind::Float32),
                matrix_of(ScalarKind::Float32),
            ],
            matrix_mul::<f32>,
        );
        let mut types = TypeStack::new();
        types.push(shape(4, 3)); // left, pushed first
        types.push(shape(3, 2)); // right
        let mut depth = 2usize;
        let mut temporaries = Vec::new();
        let mut update = StackUpdate {
            types: &mut types,
            depth: &mut depth,
            temporaries: &mut temporaries,
        };
        mul_update(&record, &mut update).unwrap();
        assert_eq!(temporaries, vec![TempMatrix { shape: shape(4, 2) }]);
        assert_eq!(depth, 0);
        assert!(types.is_empty());

        // non-conformable pair
        let mut types = TypeStack::new();
        types.push(shape(4, 3));
        types.push(shape(2, 2));
        let mut depth = 2usize;
        let mut temporaries = Vec::new();
        let mut update = StackUpdate {
            types: &mut types,
            depth: &mut depth,
            temporaries: &mut temporaries,
        };
        assert!(mul_update(&record, &mut update).is_err());
    }
}
