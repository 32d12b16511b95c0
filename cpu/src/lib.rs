//! RMS 归一化的 CPU 参考实现。

mod rms_norm;

pub use op::{Arg, OpError, RmsNorm};
pub use rms_norm::{normalize, rms_norm};
pub use tensor::{Blob, Tensor};
