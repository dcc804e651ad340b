//! Comparison and logical operators. Comparisons produce a uint8 flag
//! (0 or 1); the logical operators consume and produce uint8 flags,
//! treating any non-zero value as true.

use rtexpr_vm::{ExecCtx, FunctionRecord, FunctionRegistry, Scalar};

use crate::scalar;

macro_rules! compare_executor {
    ($name:ident, $op:tt) => {
        fn $name<T: Scalar + PartialOrd>(ctx: &mut ExecCtx) {
            let x1: T = ctx.pop();
            let x2: T = ctx.pop();
            ctx.push((x2 $op x1) as u8);
        }
    };
}

compare_executor!(gt_op, >);
compare_executor!(lt_op, <);
compare_executor!(gte_op, >=);
compare_executor!(lte_op, <=);
compare_executor!(eq_op, ==);
compare_executor!(neq_op, !=);

fn and_op(ctx: &mut ExecCtx) {
    let x1: u8 = ctx.pop();
    let x2: u8 = ctx.pop();
    ctx.push(((x2 != 0) && (x1 != 0)) as u8);
}

fn or_op(ctx: &mut ExecCtx) {
    let x1: u8 = ctx.pop();
    let x2: u8 = ctx.pop();
    ctx.push(((x2 != 0) || (x1 != 0)) as u8);
}

fn xor_op(ctx: &mut ExecCtx) {
    let x1: u8 = ctx.pop();
    let x2: u8 = ctx.pop();
    ctx.push(((x2 != 0) ^ (x1 != 0)) as u8);
}

fn register_compare<T: Scalar + PartialOrd>(
    registry: &mut FunctionRegistry,
    name: &'static str,
    executor: fn(&mut ExecCtx),
) {
    let t = scalar(T::KIND);
    let flag = scalar(rtexpr_core::ScalarKind::Uint8);
    registry.register(FunctionRecord::new(name, 2, 1, &[t, t, flag], executor));
}

macro_rules! register_compares_for {
    ($registry:ident, $ty:ty) => {
        register_compare::<$ty>($registry, "GT", gt_op::<$ty>);
        register_compare::<$ty>($registry, "LT", lt_op::<$ty>);
        register_compare::<$ty>($registry, "GTE", gte_op::<$ty>);
        register_compare::<$ty>($registry, "LTE", lte_op::<$ty>);
        register_compare::<$ty>($registry, "EQ", eq_op::<$ty>);
        register_compare::<$ty>($registry, "NEQ", neq_op::<$ty>);
    };
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    register_compares_for!(registry, f32);
    register_compares_for!(registry, f64);
    register_compares_for!(registry, i32);
    register_compares_for!(registry, i64);
    register_compares_for!(registry, u32);
    register_compares_for!(registry, u64);

    let flag = scalar(rtexpr_core::ScalarKind::Uint8);
    registry.register(FunctionRecord::new("AND", 2, 1, &[flag, flag, flag], and_op));
    registry.register(FunctionRecord::new("OR", 2, 1, &[flag, flag, flag], or_op));
    registry.register(FunctionRecord::new("XOR", 2, 1, &[flag, flag, flag], xor_op));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_vm::{DataMemory, EvalStack};

    fn binary<T: Scalar>(a: T, b: T, executor: fn(&mut ExecCtx)) -> u8 {
        let code: [u16; 0] = [];
        let mut stack = EvalStack::new();
        stack.resize(4);
        let mut memory = DataMemory::new();
        stack.push(a);
        stack.push(b);
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        executor(&mut ctx);
        assert!(ctx.ok());
        ctx.pop::<u8>()
    }

    #[test]
    fn comparisons_use_push_order() {
        // GT asks whether the first-pushed value is greater
        assert_eq!(binary(2.0f32, 1.0f32, gt_op::<f32>), 1);
        assert_eq!(binary(1.0f32, 2.0f32, gt_op::<f32>), 0);
        assert_eq!(binary(-5i32, -5i32, gte_op::<i32>), 1);
        assert_eq!(binary(3u64, 9u64, lt_op::<u64>), 1);
        assert_eq!(binary(1.5f64, 1.5f64, neq_op::<f64>), 0);
    }

    #[test]
    fn logic_treats_nonzero_as_true() {
        assert_eq!(binary(7u8, 1u8, and_op), 1);
        assert_eq!(binary(0u8, 1u8, and_op), 0);
        assert_eq!(binary(0u8, 0u8, or_op), 0);
        assert_eq!(binary(2u8, 0u8, or_op), 1);
        assert_eq!(binary(1u8, 1u8, xor_op), 0);
        assert_eq!(binary(1u8, 0u8, xor_op), 1);
    }
}
