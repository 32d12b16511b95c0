/// 算子标量参数
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Arg {
    Int(i64),
    Float(f64),
}

macro_rules! impl_from {
    ($( $ty:ty => $variant:ident as $as:ty )+) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Self::$variant(value as $as)
                }
            }
        )+
    };
}

impl_from! {
    i64   => Int   as i64
    isize => Int   as i64
    i32   => Int   as i64
    f64   => Float as f64
    f32   => Float as f64
}

impl Arg {
    pub fn to_int(self) -> Option<i64> {
        match self {
            Self::Int(val) => Some(val),
            Self::Float(_) => None,
        }
    }

    /// 整数参数可以提升为浮点数。
    pub fn to_float(self) -> Option<f64> {
        match self {
            Self::Int(val) => Some(val as _),
            Self::Float(val) => Some(val),
        }
    }
}
