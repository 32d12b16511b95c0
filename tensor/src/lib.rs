mod element;
mod fmt;
mod host;

use digit_layout::DigitLayout;
use ndarray_layout::{ArrayLayout, Endian::BigEndian};
use std::{
    ops::{Deref, DerefMut},
    slice::{from_raw_parts, from_raw_parts_mut},
};

pub use element::Element;
pub use fmt::Fmt;
pub use host::Blob;

pub extern crate digit_layout;
pub extern crate ndarray_layout;

/// 张量：数据类型、行优先布局与存储。
#[derive(Clone)]
pub struct Tensor<T, const N: usize = 4> {
    dt: DigitLayout,
    layout: ArrayLayout<N>,
    item: T,
}

impl<const N: usize> Tensor<usize, N> {
    /// 创建连续张量的元信息，存储项为所需字节数。
    pub fn new(dt: DigitLayout, shape: &[usize]) -> Self {
        assert_eq!(dt.group_size(), 1);

        let element_size = dt.nbytes();
        let layout = ArrayLayout::new_contiguous(shape, BigEndian, element_size);
        let size = layout.num_elements() * element_size;
        Self {
            dt,
            layout,
            item: size,
        }
    }
}

impl<T, const N: usize> Tensor<T, N> {
    pub const fn dt(&self) -> DigitLayout {
        self.dt
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub const fn layout(&self) -> &ArrayLayout<N> {
        &self.layout
    }

    pub fn take(self) -> T {
        self.item
    }

    pub const fn get(&self) -> &T {
        &self.item
    }

    /// 判断布局是否行优先连续。长度为 1 的维度不约束步长。
    pub fn is_contiguous(&self) -> bool {
        let mut expected = self.dt.nbytes() as isize;
        for (&d, &s) in self
            .layout
            .shape()
            .iter()
            .zip(self.layout.strides())
            .rev()
        {
            if d != 1 && s != expected {
                return false;
            }
            expected *= d as isize
        }
        true
    }

    /// 取 `axis` 维的第 `index` 项，移除该维度。
    pub fn index(self, axis: usize, index: usize) -> Self {
        self.map_layout(|l| l.index(axis, index))
    }

    fn map_layout(mut self, f: impl FnOnce(&ArrayLayout<N>) -> ArrayLayout<N>) -> Self {
        self.layout = f(&self.layout);
        self
    }
}

impl<T, const N: usize> Tensor<T, N> {
    pub fn as_ref(&self) -> Tensor<&T, N> {
        Tensor {
            dt: self.dt,
            layout: self.layout.clone(),
            item: &self.item,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tensor<U, N> {
        let Self { dt, layout, item } = self;
        Tensor {
            dt,
            layout,
            item: f(item),
        }
    }
}

impl<T: Deref<Target = [u8]>, const N: usize> Tensor<T, N> {
    /// 以 `E` 类型的切片访问连续张量。
    ///
    /// `E` 与数据类型不符、布局不连续、存储越界或未对齐时返回 `None`。
    pub fn typed<E: Element>(&self) -> Option<&[E]> {
        let (start, len) = self.typed_range::<E>()?;
        let bytes = self.item.get(start..start + len * size_of::<E>())?;
        if bytes.as_ptr().align_offset(align_of::<E>()) != 0 {
            return None;
        }
        Some(unsafe { from_raw_parts(bytes.as_ptr().cast(), len) })
    }

    fn typed_range<E: Element>(&self) -> Option<(usize, usize)> {
        if E::DT != self.dt || !self.is_contiguous() {
            return None;
        }
        let start = usize::try_from(self.layout.offset()).ok()?;
        Some((start, self.layout.num_elements()))
    }
}

impl<T: DerefMut<Target = [u8]>, const N: usize> Tensor<T, N> {
    pub fn typed_mut<E: Element>(&mut self) -> Option<&mut [E]> {
        let (start, len) = self.typed_range::<E>()?;
        let bytes = self.item.get_mut(start..start + len * size_of::<E>())?;
        if bytes.as_ptr().align_offset(align_of::<E>()) != 0 {
            return None;
        }
        Some(unsafe { from_raw_parts_mut(bytes.as_mut_ptr().cast(), len) })
    }
}

#[cfg(test)]
mod test {
    use super::{Blob, Tensor};
    use digit_layout::types;
    use half::f16;

    #[test]
    fn test_meta() {
        let t = Tensor::<usize>::new(types::F32, &[2, 3, 4, 5]);
        assert_eq!(t.shape(), [2, 3, 4, 5]);
        assert_eq!(t.take(), 2 * 3 * 4 * 5 * 4);

        let t = Tensor::<usize>::new(types::F16, &[7]);
        assert_eq!(t.take(), 14)
    }

    #[test]
    fn test_typed() {
        let t = Tensor::<Blob>::from_slice(types::F32, &[2, 2], &[1.0f32, 2., 3., 4.]);
        assert!(t.is_contiguous());
        assert_eq!(t.typed::<f32>().unwrap(), [1., 2., 3., 4.]);
        // 元素尺寸与数据类型不符
        assert!(t.typed::<f16>().is_none());
        assert!(t.typed::<f64>().is_none());

        let row = t.clone().index(0, 1);
        assert_eq!(row.shape(), [2]);
        assert_eq!(row.typed::<f32>().unwrap(), [3., 4.]);

        let col = t.index(1, 1);
        assert_eq!(col.shape(), [2]);
        assert!(!col.is_contiguous());
        assert!(col.typed::<f32>().is_none())
    }

    #[test]
    fn test_typed_element_mismatch() {
        // 尺寸相同但类型不同的元素不可解释
        let t = Tensor::<Blob>::from_slice(types::F32, &[2], &[1.0f32, 2.]);
        assert!(t.typed::<u32>().is_none());
        let t = Tensor::<Blob>::zeros(types::U64, &[1]);
        assert!(t.typed::<f64>().is_none());
        assert_eq!(t.typed::<u64>().unwrap(), [0]);

        let t = Tensor::<Blob>::from_slice(types::U8, &[1], &[2u8]);
        assert_eq!(t.typed::<u8>().unwrap(), [2]);
        assert!(t.clone().map(|_| Blob::new(0)).typed::<u8>().is_none())
    }

    #[test]
    fn test_rank5() {
        let data = (0..72).map(|i| i as f32).collect::<Vec<_>>();
        let t = Tensor::<Blob>::from_slice(types::F32, &[2, 3, 2, 2, 3], &data);
        assert_eq!(t.shape(), [2, 3, 2, 2, 3]);
        assert!(t.is_contiguous());
        assert_eq!(t.typed::<f32>().unwrap(), data);

        let t = t.index(0, 1).index(0, 2);
        assert_eq!(t.shape(), [2, 2, 3]);
        assert_eq!(t.typed::<f32>().unwrap(), &data[60..])
    }

    #[test]
    fn test_typed_mut() {
        let mut t = Tensor::<Blob>::zeros(types::F16, &[3]);
        t.typed_mut::<f16>().unwrap()[1] = f16::ONE;
        assert_eq!(t.typed::<f16>().unwrap(), [f16::ZERO, f16::ONE, f16::ZERO]);
        assert_eq!(t.map(|blob| blob.len()).take(), 6)
    }
}
