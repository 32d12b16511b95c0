use digit_layout::{DigitLayout, types};
use half::{bf16, f16};
use itertools::izip;
use log::{debug, trace};
use op::{NAME, OpError, RmsNorm, RmsNormMeta};
use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use tensor::{Blob, Element, Fmt, Tensor};

/// 元素数达到此值且多于一行时按行并行。
const PARALLEL_THRESHOLD: usize = 1 << 15;

/// 计算 `y = x / sqrt(rms(x) + epsilon) * w`，返回新分配的 `y`。
///
/// `x` 以 `op.axis` 为界视作 `rows x cols` 的矩阵，逐行归一化后按列乘以 `w`。
/// `w` 的形状须等于 `x` 从 `axis` 起的后缀形状。
/// 参数或形状非法时不分配输出，直接返回错误。
pub fn normalize<T, U, const N: usize>(
    x: &Tensor<T, N>,
    w: &Tensor<U, N>,
    op: &RmsNorm,
) -> Result<Tensor<Blob, N>, OpError>
where
    T: Deref<Target = [u8]>,
    U: Deref<Target = [u8]>,
{
    op.infer(x.shape(), w.shape())?;
    check_dt(x.dt())?;
    check_dt(w.dt())?;

    let mut y = Tensor::<Blob, N>::zeros(x.dt(), x.shape());
    rms_norm(&mut y, x, w, op)?;
    Ok(y)
}

/// 计算 RMS 归一化并写入 `y`，`y` 须与 `x` 同形同类型。
pub fn rms_norm<V, T, U, const N: usize>(
    y: &mut Tensor<V, N>,
    x: &Tensor<T, N>,
    w: &Tensor<U, N>,
    op: &RmsNorm,
) -> Result<(), OpError>
where
    V: DerefMut<Target = [u8]>,
    T: Deref<Target = [u8]>,
    U: Deref<Target = [u8]>,
{
    let RmsNormMeta { axis, rows, cols } = op.infer(x.shape(), w.shape())?;
    if y.shape() != x.shape() {
        return Err(OpError::ShapeMismatch {
            expected: x.shape().to_vec(),
            got: y.shape().to_vec(),
        });
    }
    if y.dt() != x.dt() {
        return Err(OpError::DataTypeMismatch {
            expected: x.dt(),
            got: y.dt(),
        });
    }
    check_dt(x.dt())?;
    check_dt(w.dt())?;

    debug!(
        "{NAME}(mut {:?}, {:?}, {:?}, axis={axis}, {:.2e}) rows={rows} cols={cols}",
        y.shape(),
        x.shape(),
        w.shape(),
        op.epsilon,
    );

    let scheme = Scheme {
        rows,
        cols,
        epsilon: op.epsilon,
        parallel: rows > 1 && rows * cols >= PARALLEL_THRESHOLD,
    };
    match x.dt() {
        types::F16 => scheme.launch::<f16, _, N>(typed_mut(y)?, typed(x)?, w)?,
        types::BF16 => scheme.launch::<bf16, _, N>(typed_mut(y)?, typed(x)?, w)?,
        types::F32 => scheme.launch::<f32, _, N>(typed_mut(y)?, typed(x)?, w)?,
        types::F64 => scheme.launch::<f64, _, N>(typed_mut(y)?, typed(x)?, w)?,
        dt => return Err(OpError::DataTypeError { dt }),
    }

    trace!("{NAME} output\n{}", Fmt(&*y));
    Ok(())
}

fn check_dt(dt: DigitLayout) -> Result<(), OpError> {
    match dt {
        types::F16 | types::BF16 | types::F32 | types::F64 => Ok(()),
        dt => Err(OpError::DataTypeError { dt }),
    }
}

fn typed<E: Element, T, const N: usize>(t: &Tensor<T, N>) -> Result<&[E], OpError>
where
    T: Deref<Target = [u8]>,
{
    t.typed().ok_or(OpError::LayoutError)
}

fn typed_mut<E: Element, T, const N: usize>(t: &mut Tensor<T, N>) -> Result<&mut [E], OpError>
where
    T: DerefMut<Target = [u8]>,
{
    t.typed_mut().ok_or(OpError::LayoutError)
}

struct Scheme {
    rows: usize,
    cols: usize,
    epsilon: f32,
    parallel: bool,
}

/// 存储类型，计算统一在 f32 上进行。
trait Data: Element {
    fn load(self) -> f32;
    fn store(val: f32) -> Self;
}

macro_rules! data {
    ($t:ty; $load:expr, $store:expr) => {
        impl Data for $t {
            fn load(self) -> f32 {
                $load(self)
            }
            fn store(val: f32) -> Self {
                $store(val)
            }
        }
    };
}

data!(f16; f16::to_f32, f16::from_f32);
data!(bf16; bf16::to_f32, bf16::from_f32);
data!(f32; |x| x, |x| x);
data!(f64; |x: f64| x as f32, |x: f32| x as f64);

impl Scheme {
    fn launch<E, U, const N: usize>(
        &self,
        y: &mut [E],
        x: &[E],
        w: &Tensor<U, N>,
    ) -> Result<(), OpError>
    where
        E: Data,
        U: Deref<Target = [u8]>,
    {
        match w.dt() {
            types::F16 => self.compute::<E, f16>(y, x, typed(w)?),
            types::BF16 => self.compute::<E, bf16>(y, x, typed(w)?),
            types::F32 => self.compute::<E, f32>(y, x, typed(w)?),
            types::F64 => self.compute::<E, f64>(y, x, typed(w)?),
            dt => return Err(OpError::DataTypeError { dt }),
        }
        Ok(())
    }

    fn compute<E: Data, W: Data>(&self, y: &mut [E], x: &[E], w: &[W]) {
        let &Self {
            rows,
            cols,
            epsilon,
            parallel,
        } = self;
        assert_eq!(y.len(), rows * cols);
        assert_eq!(x.len(), rows * cols);
        assert_eq!(w.len(), cols);

        // 行内求和保持顺序，并行只发生在行之间
        let row = |(y, x): (&mut [E], &[E])| {
            let sum = x
                .iter()
                .map(|x| {
                    let x = x.load();
                    x * x
                })
                .sum::<f32>();
            let rms = (sum / cols as f32).sqrt();
            let scale = (rms + epsilon).sqrt().recip();
            for (y, x, w) in izip!(y, x, w) {
                *y = E::store(x.load() * scale * w.load())
            }
        };

        if parallel {
            y.par_chunks_exact_mut(cols)
                .zip(x.par_chunks_exact(cols))
                .for_each(row)
        } else {
            y.chunks_exact_mut(cols)
                .zip(x.chunks_exact(cols))
                .for_each(row)
        }
    }
}
