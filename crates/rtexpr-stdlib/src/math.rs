//! Transcendental functions and arithmetic.
//!
//! Binary operators pop the right operand first: `READ A, READ B, SUB`
//! computes `A - B`, and `POW` raises the first-pushed value to the
//! second. Float arithmetic is unchecked (NaN/inf propagate); integer
//! arithmetic is checked and raises `OUT_OF_RANGE` on overflow or
//! division by zero, pushing a zero to keep the stack balanced.

use std::ops::{Add, Div, Mul, Sub};

use rtexpr_core::ErrorFlags;
use rtexpr_vm::{ExecCtx, FunctionRecord, FunctionRegistry, Scalar};

use crate::scalar;

trait FloatScalar:
    Scalar + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
{
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn log10(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
}

macro_rules! impl_float_scalar {
    ($ty:ty) => {
        impl FloatScalar for $ty {
            fn sin(self) -> Self {
                <$ty>::sin(self)
            }
            fn cos(self) -> Self {
                <$ty>::cos(self)
            }
            fn tan(self) -> Self {
                <$ty>::tan(self)
            }
            fn exp(self) -> Self {
                <$ty>::exp(self)
            }
            fn ln(self) -> Self {
                <$ty>::ln(self)
            }
            fn log10(self) -> Self {
                <$ty>::log10(self)
            }
            fn powf(self, exponent: Self) -> Self {
                <$ty>::powf(self, exponent)
            }
        }
    };
}

impl_float_scalar!(f32);
impl_float_scalar!(f64);

macro_rules! unary_executor {
    ($name:ident, $method:ident) => {
        fn $name<T: FloatScalar>(ctx: &mut ExecCtx) {
            let x: T = ctx.pop();
            ctx.push(x.$method());
        }
    };
}

unary_executor!(sin_op, sin);
unary_executor!(cos_op, cos);
unary_executor!(tan_op, tan);
unary_executor!(exp_op, exp);
unary_executor!(log_op, ln);
unary_executor!(log10_op, log10);

fn pow_op<T: FloatScalar>(ctx: &mut ExecCtx) {
    let exponent: T = ctx.pop();
    let base: T = ctx.pop();
    ctx.push(base.powf(exponent));
}

macro_rules! float_binary_executor {
    ($name:ident, $op:tt) => {
        fn $name<T: FloatScalar>(ctx: &mut ExecCtx) {
            let x1: T = ctx.pop();
            let x2: T = ctx.pop();
            ctx.push(x2 $op x1);
        }
    };
}

float_binary_executor!(fadd_op, +);
float_binary_executor!(fsub_op, -);
float_binary_executor!(fmul_op, *);
float_binary_executor!(fdiv_op, /);

trait CheckedArith: Scalar {
    fn checked_add(self, other: Self) -> Option<Self>;
    fn checked_sub(self, other: Self) -> Option<Self>;
    fn checked_mul(self, other: Self) -> Option<Self>;
    fn checked_div(self, other: Self) -> Option<Self>;
}

macro_rules! impl_checked_arith {
    ($ty:ty) => {
        impl CheckedArith for $ty {
            fn checked_add(self, other: Self) -> Option<Self> {
                <$ty>::checked_add(self, other)
            }
            fn checked_sub(self, other: Self) -> Option<Self> {
                <$ty>::checked_sub(self, other)
            }
            fn checked_mul(self, other: Self) -> Option<Self> {
                <$ty>::checked_mul(self, other)
            }
            fn checked_div(self, other: Self) -> Option<Self> {
                <$ty>::checked_div(self, other)
            }
        }
    };
}

impl_checked_arith!(i32);
impl_checked_arith!(i64);
impl_checked_arith!(u32);
impl_checked_arith!(u64);

macro_rules! int_binary_executor {
    ($name:ident, $method:ident) => {
        fn $name<T: CheckedArith>(ctx: &mut ExecCtx) {
            let x1: T = ctx.pop();
            let x2: T = ctx.pop();
            match x2.$method(x1) {
                Some(result) => ctx.push(result),
                None => {
                    ctx.push(T::default());
                    ctx.raise(ErrorFlags::OUT_OF_RANGE);
                }
            }
        }
    };
}

int_binary_executor!(iadd_op, checked_add);
int_binary_executor!(isub_op, checked_sub);
int_binary_executor!(imul_op, checked_mul);
int_binary_executor!(idiv_op, checked_div);

macro_rules! widening_executor {
    ($name:ident, $method:ident) => {
        fn $name<A, W>(ctx: &mut ExecCtx)
        where
            A: Scalar + Into<W>,
            W: CheckedArith,
        {
            let x1: A = ctx.pop();
            let x2: A = ctx.pop();
            match Into::<W>::into(x2).$method(x1.into()) {
                Some(result) => ctx.push(result),
                None => {
                    ctx.push(W::default());
                    ctx.raise(ErrorFlags::OUT_OF_RANGE);
                }
            }
        }
    };
}

widening_executor!(wadd_op, checked_add);
widening_executor!(wsub_op, checked_sub);
widening_executor!(wmul_op, checked_mul);
widening_executor!(wdiv_op, checked_div);

fn register_unary<T: FloatScalar>(
    registry: &mut FunctionRegistry,
    name: &'static str,
    executor: fn(&mut ExecCtx),
) {
    let t = scalar(T::KIND);
    registry.register(FunctionRecord::new(name, 1, 1, &[t, t], executor));
}

fn register_binary<T: Scalar>(
    registry: &mut FunctionRegistry,
    name: &'static str,
    executor: fn(&mut ExecCtx),
) {
    let t = scalar(T::KIND);
    registry.register(FunctionRecord::new(name, 2, 1, &[t, t, t], executor));
}

fn register_widening<A: Scalar, W: Scalar>(
    registry: &mut FunctionRegistry,
    name: &'static str,
    executor: fn(&mut ExecCtx),
) {
    let a = scalar(A::KIND);
    let w = scalar(W::KIND);
    registry.register(FunctionRecord::new(name, 2, 1, &[a, a, w], executor));
}

macro_rules! register_float_unaries {
    ($registry:ident, $ty:ty) => {
        register_unary::<$ty>($registry, "SIN", sin_op::<$ty>);
        register_unary::<$ty>($registry, "COS", cos_op::<$ty>);
        register_unary::<$ty>($registry, "TAN", tan_op::<$ty>);
        register_unary::<$ty>($registry, "EXP", exp_op::<$ty>);
        register_unary::<$ty>($registry, "LOG", log_op::<$ty>);
        register_unary::<$ty>($registry, "LOG10", log10_op::<$ty>);
    };
}

macro_rules! register_int_arith {
    ($registry:ident, $ty:ty) => {
        register_binary::<$ty>($registry, "ADD", iadd_op::<$ty>);
        register_binary::<$ty>($registry, "SUB", isub_op::<$ty>);
        register_binary::<$ty>($registry, "MUL", imul_op::<$ty>);
        register_binary::<$ty>($registry, "DIV", idiv_op::<$ty>);
    };
}

macro_rules! register_widening_arith {
    ($registry:ident, $narrow:ty => $wide:ty) => {
        register_widening::<$narrow, $wide>($registry, "ADD", wadd_op::<$narrow, $wide>);
        register_widening::<$narrow, $wide>($registry, "SUB", wsub_op::<$narrow, $wide>);
        register_widening::<$narrow, $wide>($registry, "MUL", wmul_op::<$narrow, $wide>);
        register_widening::<$narrow, $wide>($registry, "DIV", wdiv_op::<$narrow, $wide>);
    };
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    register_float_unaries!(registry, f32);
    register_float_unaries!(registry, f64);

    register_binary::<f32>(registry, "POW", pow_op::<f32>);
    register_binary::<f64>(registry, "POW", pow_op::<f64>);

    register_binary::<f32>(registry, "ADD", fadd_op::<f32>);
    register_binary::<f32>(registry, "SUB", fsub_op::<f32>);
    register_binary::<f32>(registry, "MUL", fmul_op::<f32>);
    register_binary::<f32>(registry, "DIV", fdiv_op::<f32>);
    register_binary::<f64>(registry, "ADD", fadd_op::<f64>);
    register_binary::<f64>(registry, "SUB", fsub_op::<f64>);
    register_binary::<f64>(registry, "MUL", fmul_op::<f64>);
    register_binary::<f64>(registry, "DIV", fdiv_op::<f64>);

    register_int_arith!(registry, i32);
    register_int_arith!(registry, i64);
    register_int_arith!(registry, u32);
    register_int_arith!(registry, u64);

    register_widening_arith!(registry, i8 => i32);
    register_widening_arith!(registry, i16 => i32);
    register_widening_arith!(registry, u8 => u32);
    register_widening_arith!(registry, u16 => u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtexpr_vm::{DataMemory, EvalStack};

    fn ctx_parts() -> (EvalStack, DataMemory) {
        let mut stack = EvalStack::new();
        stack.resize(8);
        (stack, DataMemory::new())
    }

    #[test]
    fn sub_is_first_minus_second() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(2.0f32); // A
        stack.push(1.0f32); // B
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        fsub_op::<f32>(&mut ctx);
        assert_eq!(ctx.pop::<f32>(), 1.0);
    }

    #[test]
    fn pow_operand_order() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(2.0f64); // base
        stack.push(10.0f64); // exponent
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        pow_op::<f64>(&mut ctx);
        assert_eq!(ctx.pop::<f64>(), 1024.0);
    }

    #[test]
    fn int_overflow_raises() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(i32::MAX);
        stack.push(1i32);
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        iadd_op::<i32>(&mut ctx);
        assert!(ctx.fault().contains(ErrorFlags::OUT_OF_RANGE));
        assert_eq!(ctx.pop::<i32>(), 0);
    }

    #[test]
    fn division_by_zero_raises() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(5u64);
        stack.push(0u64);
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        idiv_op::<u64>(&mut ctx);
        assert!(ctx.fault().contains(ErrorFlags::OUT_OF_RANGE));
    }

    #[test]
    fn widening_add() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(200u8);
        stack.push(100u8);
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        wadd_op::<u8, u32>(&mut ctx);
        assert!(ctx.ok());
        assert_eq!(ctx.pop::<u32>(), 300);
    }

    #[test]
    fn unsigned_sub_below_zero() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(1u16);
        stack.push(2u16);
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        wsub_op::<u16, u32>(&mut ctx);
        assert!(ctx.fault().contains(ErrorFlags::OUT_OF_RANGE));
    }

    #[test]
    fn float_div_is_unchecked() {
        let (mut stack, mut memory) = ctx_parts();
        stack.push(1.0f64);
        stack.push(0.0f64);
        let code: [u16; 0] = [];
        let mut ctx = ExecCtx::new(&code, &mut stack, &mut memory);
        fdiv_op::<f64>(&mut ctx);
        assert!(ctx.ok());
        assert!(ctx.pop::<f64>().is_infinite());
    }
}
