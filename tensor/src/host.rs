use crate::{Element, Tensor};
use digit_layout::DigitLayout;
use std::{
    ops::{Deref, DerefMut},
    slice::{from_raw_parts, from_raw_parts_mut},
};

/// 主机存储，按 8 字节对齐，可容纳任意受支持的数据类型。
#[derive(Clone)]
pub struct Blob {
    buf: Box<[u64]>,
    len: usize,
}

impl Blob {
    /// 分配 `len` 字节的零初始化存储。
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0u64; len.div_ceil(8)].into_boxed_slice(),
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut ans = Self::new(bytes.len());
        ans.copy_from_slice(bytes);
        ans
    }
}

impl Deref for Blob {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        unsafe { from_raw_parts(self.buf.as_ptr().cast(), self.len) }
    }
}

impl DerefMut for Blob {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { from_raw_parts_mut(self.buf.as_mut_ptr().cast(), self.len) }
    }
}

impl<const N: usize> Tensor<Blob, N> {
    pub fn zeros(dt: DigitLayout, shape: &[usize]) -> Self {
        Tensor::<usize, N>::new(dt, shape).map(Blob::new)
    }

    /// 从 `data` 复制数据创建张量，`E` 须与 `dt` 一致。
    pub fn from_slice<E: Element>(dt: DigitLayout, shape: &[usize], data: &[E]) -> Self {
        assert_eq!(E::DT, dt);
        let meta = Tensor::<usize, N>::new(dt, shape);
        assert_eq!(size_of_val(data), *meta.get());

        let bytes = unsafe { from_raw_parts(data.as_ptr().cast::<u8>(), size_of_val(data)) };
        meta.map(|_| Blob::from_bytes(bytes))
    }
}
