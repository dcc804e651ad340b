//! CAST: checked conversion between every ordered pair of numeric kinds.
//!
//! Conversions that lose the value (not merely precision) raise
//! `OUT_OF_RANGE` at runtime and leave a zero on the stack so the
//! program keeps its stack balance.

use rtexpr_core::ErrorFlags;
use rtexpr_vm::{ExecCtx, FunctionRecord, FunctionRegistry, Scalar};

use crate::scalar;

/// Checked value-preserving conversion.
trait CastTo<T>: Sized {
    fn cast_to(self) -> Option<T>;
}

macro_rules! impl_int_casts_from {
    ($from:ty) => {
        impl CastTo<i8> for $from {
            fn cast_to(self) -> Option<i8> {
                self.try_into().ok()
            }
        }
        impl CastTo<i16> for $from {
            fn cast_to(self) -> Option<i16> {
                self.try_into().ok()
            }
        }
        impl CastTo<i32> for $from {
            fn cast_to(self) -> Option<i32> {
                self.try_into().ok()
            }
        }
        impl CastTo<i64> for $from {
            fn cast_to(self) -> Option<i64> {
                self.try_into().ok()
            }
        }
        impl CastTo<u8> for $from {
            fn cast_to(self) -> Option<u8> {
                self.try_into().ok()
            }
        }
        impl CastTo<u16> for $from {
            fn cast_to(self) -> Option<u16> {
                self.try_into().ok()
            }
        }
        impl CastTo<u32> for $from {
            fn cast_to(self) -> Option<u32> {
                self.try_into().ok()
            }
        }
        impl CastTo<u64> for $from {
            fn cast_to(self) -> Option<u64> {
                self.try_into().ok()
            }
        }
        impl CastTo<f32> for $from {
            fn cast_to(self) -> Option<f32> {
                Some(self as f32)
            }
        }
        impl CastTo<f64> for $from {
            fn cast_to(self) -> Option<f64> {
                Some(self as f64)
            }
        }
    };
}

impl_int_casts_from!(i8);
impl_int_casts_from!(i16);
impl_int_casts_from!(i32);
impl_int_casts_from!(i64);
impl_int_casts_from!(u8);
impl_int_casts_from!(u16);
impl_int_casts_from!(u32);
impl_int_casts_from!(u64);

macro_rules! impl_float_to_int {
    ($from:ty => $($to:ty),*) => {
        $(impl CastTo<$to> for $from {
            fn cast_to(self) -> Option<$to> {
                if !self.is_finite() {
                    return None;
                }
                let truncated = self as $to;
                // the saturating cast is exact iff the value was in range
                if (truncated as $from) == self.trunc() {
                    Some(truncated)
                } else {
                    None
                }
            }
        })*
    };
}

impl_float_to_int!(f32 => i8, i16, i32, i64, u8, u16, u32, u64);
impl_float_to_int!(f64 => i8, i16, i32, i64, u8, u16, u32, u64);

impl CastTo<f32> for f32 {
    fn cast_to(self) -> Option<f32> {
        Some(self)
    }
}

impl CastTo<f64> for f32 {
    fn cast_to(self) -> Option<f64> {
        Some(self as f64)
    }
}

impl CastTo<f64> for f64 {
    fn cast_to(self) -> Option<f64> {
        Some(self)
    }
}

impl CastTo<f32> for f64 {
    fn cast_to(self) -> Option<f32> {
        let narrowed = self as f32;
        if narrowed.is_finite() || !self.is_finite() {
            Some(narrowed)
        } else {
            None
        }
    }
}

fn cast_op<F, T>(ctx: &mut ExecCtx)
where
    F: Scalar + CastTo<T>,
    T: Scalar,
{
    let value: F = ctx.pop();
    match value.cast_to() {
        Some(out) => ctx.push(out),
        None => {
            ctx.push(T::default());
            ctx.raise(ErrorFlags::OUT_OF_RANGE);
        }
    }
}

fn register_cast<F, T>(registry: &mut FunctionRegistry)
where
    F: Scalar + CastTo<T>,
    T: Scalar,
{
    registry.register(FunctionRecord::new(
        "CAST",
        1,
        1,
        &[scalar(F::KIND), scalar(T::KIND)],
        cast_op::<F, T>,
    ));
}

macro_rules! register_casts_from {
    ($registry:ident, $from:ty) => {
        register_cast::<$from, i8>($registry);
        register_cast::<$from, i16>($registry);
        register_cast::<$from, i32>($registry);
        register_cast::<$from, i64>($registry);
        register_cast::<$from, u8>($registry);
        register_cast::<$from, u16>($registry);
        register_cast::<$from, u32>($registry);
        register_cast::<$from, u64>($registry);
        register_cast::<$from, f32>($registry);
        register_cast::<$from, f64>($registry);
    };
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    register_casts_from!(registry, i8);
    register_casts_from!(registry, i16);
    register_casts_from!(registry, i32);
    register_casts_from!(registry, i64);
    register_casts_from!(registry, u8);
    register_casts_from!(registry, u16);
    register_casts_from!(registry, u32);
    register_casts_from!(registry, u64);
    register_casts_from!(registry, f32);
    register_casts_from!(registry, f64);
}
