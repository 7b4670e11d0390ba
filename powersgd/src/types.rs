use std::fmt::Debug;

use ndarray::LinalgScalar;
use num_traits::Float;

/// Floating-point element types the compressor runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
}

impl DataType {
    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of gradients and factors.
///
/// Implemented for `f32` and `f64`.
pub trait Scalar: LinalgScalar + Float + Debug + Send + Sync + 'static {
    const DTYPE: DataType;

    fn from_f64(v: f64) -> Self;

    fn from_usize(v: usize) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $dtype:expr);* $(;)?) => {
        $(
            impl Scalar for $ty {
                const DTYPE: DataType = $dtype;

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as $ty
                }

                #[inline]
                fn from_usize(v: usize) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

impl_scalar! {
    f32 => DataType::F32;
    f64 => DataType::F64;
}
