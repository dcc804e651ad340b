//! Packing of scalar values into 32-bit data elements.

use rtexpr_core::ScalarKind;

/// A scalar value that can live on the evaluation stack and in data
/// memory. Values are packed into 32-bit data elements, low element
/// first; sub-word integers occupy one full element.
pub trait Scalar: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    const KIND: ScalarKind;
    /// Number of data elements the value occupies.
    const WORDS: usize;

    fn store(self, words: &mut [u32]);
    fn load(words: &[u32]) -> Self;
}

macro_rules! narrow_scalar {
    ($ty:ty, $kind:ident, $via:ty) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;
            const WORDS: usize = 1;

            fn store(self, words: &mut [u32]) {
                words[0] = self as $via as u32;
            }

            fn load(words: &[u32]) -> Self {
                words[0] as $ty
            }
        }
    };
}

narrow_scalar!(i8, Int8, i32);
narrow_scalar!(i16, Int16, i32);
narrow_scalar!(i32, Int32, i32);
narrow_scalar!(u8, Uint8, u32);
narrow_scalar!(u16, Uint16, u32);
narrow_scalar!(u32, Uint32, u32);

macro_rules! wide_scalar {
    ($ty:ty, $kind:ident) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;
            const WORDS: usize = 2;

            fn store(self, words: &mut [u32]) {
                let bits = self as u64;
                words[0] = bits as u32;
                words[1] = (bits >> 32) as u32;
            }

            fn load(words: &[u32]) -> Self {
                ((words[0] as u64) | ((words[1] as u64) << 32)) as $ty
            }
        }
    };
}

wide_scalar!(i64, Int64);
wide_scalar!(u64, Uint64);

impl Scalar for f32 {
    const KIND: ScalarKind = ScalarKind::Float32;
    const WORDS: usize = 1;

    fn store(self, words: &mut [u32]) {
        words[0] = self.to_bits();
    }

    fn load(words: &[u32]) -> Self {
        f32::from_bits(words[0])
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::Float64;
    const WORDS: usize = 2;

    fn store(self, words: &mut [u32]) {
        let bits = self.to_bits();
        words[0] = bits as u32;
        words[1] = (bits >> 32) as u32;
    }

    fn load(words: &[u32]) -> Self {
        f64::from_bits((words[0] as u64) | ((words[1] as u64) << 32))
    }
}
