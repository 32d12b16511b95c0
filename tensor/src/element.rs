use digit_layout::{DigitLayout, types};
use half::{bf16, f16};

mod sealed {
    pub trait Sealed {}
}

/// 可直接由字节解释的元素类型，任意位模式都是合法值。
///
/// `DT` 是该类型在张量中的数据类型，类型化访问要求二者一致。
pub trait Element: sealed::Sealed + Copy + Send + Sync + 'static {
    const DT: DigitLayout;
}

macro_rules! element {
    ($( $ty:ty => $dt:ident )+) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Element for $ty {
                const DT: DigitLayout = types::$dt;
            }
        )+
    };
}

element! {
    u8   => U8
    u32  => U32
    u64  => U64
    f16  => F16
    bf16 => BF16
    f32  => F32
    f64  => F64
}
