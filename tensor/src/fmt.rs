use crate::{Element, Tensor};
use digit_layout::types;
use half::{bf16, f16};
use std::{fmt, ops::Deref};

trait DataFmt: Element {
    fn value(self) -> f64;
}

macro_rules! data_fmt {
    ($( $ty:ty => $f:expr ),+) => {
        $(
            impl DataFmt for $ty {
                #[inline]
                fn value(self) -> f64 {
                    $f(self)
                }
            }
        )+
    };
}

data_fmt! {
    f16  => f16::to_f64,
    bf16 => bf16::to_f64,
    f32  => f64::from,
    f64  => std::convert::identity
}

/// 以矩阵形式打印张量，高维张量按外层维度逐片打印。
///
/// 无法按数据类型读取的张量（非连续、存储不足等）只打印形状与类型。
pub struct Fmt<'a, T, const N: usize>(pub &'a Tensor<T, N>);

impl<T: Deref<Target = [u8]>, const N: usize> fmt::Display for Fmt<'_, T, N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.dt() {
            types::F16 => self.write::<f16>(f),
            types::BF16 => self.write::<bf16>(f),
            types::F32 => self.write::<f32>(f),
            types::F64 => self.write::<f64>(f),
            _ => self.write_meta(f),
        }
    }
}

impl<T: Deref<Target = [u8]>, const N: usize> Fmt<'_, T, N> {
    fn write_meta(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "<{:?}> {:?}", self.0.shape(), self.0.dt())
    }

    fn write<E: DataFmt>(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Some(data) = self.0.typed::<E>() else {
            return self.write_meta(f);
        };

        let shape = self.0.shape();
        let (batch, matrix) = shape.split_at(shape.len().saturating_sub(2));
        let (head, rows, cols) = match *matrix {
            [] => ("<>".to_string(), 1, 1),
            [len] => (format!("<{len}>"), len, 1),
            [rows, cols] => (format!("<{rows}x{cols}>"), rows, cols),
            _ => unreachable!(),
        };

        let size = rows * cols;
        let count = batch.iter().product::<usize>();
        for i in 0..count {
            write!(f, "{head}")?;
            write_indices(f, batch, i)?;
            if size == 0 {
                continue;
            }
            for row in data[i * size..][..size].chunks_exact(cols) {
                for &x in row {
                    let v = x.value();
                    if v == 0. {
                        write!(f, " ________ ")?
                    } else {
                        write!(f, "{v:>9.3e} ")?
                    }
                }
                writeln!(f)?
            }
        }
        Ok(())
    }
}

/// 把第 `i` 片展开成外层各维的下标，按 `, i/b` 打印。
fn write_indices(f: &mut fmt::Formatter, batch: &[usize], mut i: usize) -> fmt::Result {
    let mut indices = vec![0; batch.len()];
    for (index, &b) in indices.iter_mut().zip(batch).rev() {
        *index = i % b;
        i /= b
    }
    for (i, b) in indices.into_iter().zip(batch) {
        write!(f, ", {i}/{b}")?
    }
    writeln!(f)
}
