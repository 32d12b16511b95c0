//! 算子描述层，只考虑参数解析与形状推导。

mod arg;
mod rms_norm;

use digit_layout::DigitLayout;

pub use arg::Arg;
pub use rms_norm::{DEFAULT_AXIS, DEFAULT_EPSILON, NAME, RmsNorm, RmsNormMeta};

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum OpError {
    #[error("axis {axis} out of range for tensor with {ndim} dimensions")]
    InvalidAxis { axis: isize, ndim: usize },
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("normalized shape {shape:?} has no elements")]
    DegenerateShape { shape: Vec<usize> },
    #[error("unsupported data type {dt:?}")]
    DataTypeError { dt: DigitLayout },
    #[error("data type mismatch: expected {expected:?}, got {got:?}")]
    DataTypeMismatch {
        expected: DigitLayout,
        got: DigitLayout,
    },
    #[error("invalid argument `{name}`: {reason}")]
    ArgError { name: String, reason: &'static str },
    #[error("tensor storage is not a contiguous aligned buffer")]
    LayoutError,
}
