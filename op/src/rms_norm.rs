use crate::{Arg, OpError};
use std::collections::HashSet;

pub const NAME: &str = "rms-norm";

/// 未指定 `axis` 时对最后一维归一化。
pub const DEFAULT_AXIS: isize = -1;
pub const DEFAULT_EPSILON: f32 = 1e-5;

const STASH_TYPE_F32: i64 = 1;

/// RMS 归一化算子参数。
///
/// 输入 `x` 在 `axis` 处切分为前导维与归一化维，归一化维形状即 `w` 的形状。
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RmsNorm {
    pub axis: isize,
    pub epsilon: f32,
}

impl Default for RmsNorm {
    fn default() -> Self {
        Self {
            axis: DEFAULT_AXIS,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// 形状推导结果：`x` 视作 `rows x cols` 的矩阵。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RmsNormMeta {
    pub axis: usize,
    pub rows: usize,
    pub cols: usize,
}

impl RmsNorm {
    pub fn new(axis: isize, epsilon: f32) -> Self {
        Self { axis, epsilon }
    }

    /// 从具名参数构造，缺省的参数取默认值。
    pub fn from_attrs<'a>(
        attrs: impl IntoIterator<Item = (&'a str, Arg)>,
    ) -> Result<Self, OpError> {
        let mut ans = Self::default();
        let mut seen = HashSet::new();
        for (name, arg) in attrs {
            let err = |reason| OpError::ArgError {
                name: name.to_string(),
                reason,
            };
            if !seen.insert(name) {
                return Err(err("duplicate attribute"));
            }
            match name {
                "axis" => {
                    let axis = arg.to_int().ok_or_else(|| err("expect an integer"))?;
                    ans.axis = isize::try_from(axis).map_err(|_| err("out of range"))?
                }
                "epsilon" => {
                    ans.epsilon = arg.to_float().ok_or_else(|| err("expect a float"))? as _
                }
                "stash_type" => match arg.to_int() {
                    Some(STASH_TYPE_F32) => {}
                    Some(_) => return Err(err("only float32 stash is supported")),
                    None => return Err(err("expect an integer")),
                },
                _ => return Err(err("unknown attribute")),
            }
        }
        ans.check_epsilon()?;
        Ok(ans)
    }

    fn check_epsilon(&self) -> Result<(), OpError> {
        if self.epsilon.is_finite() && self.epsilon >= 0. {
            Ok(())
        } else {
            Err(OpError::ArgError {
                name: "epsilon".into(),
                reason: "expect a finite non-negative value",
            })
        }
    }

    /// 负数轴从末尾计数，合法范围为 `[-ndim, ndim)`。
    pub fn resolve_axis(&self, ndim: usize) -> Result<usize, OpError> {
        let err = OpError::InvalidAxis {
            axis: self.axis,
            ndim,
        };
        let resolved = if self.axis < 0 {
            self.axis.checked_add(ndim as isize).ok_or(err.clone())?
        } else {
            self.axis
        };
        match usize::try_from(resolved) {
            Ok(axis) if axis < ndim => Ok(axis),
            _ => Err(err),
        }
    }

    pub fn normalized_shape<'a>(&self, x: &'a [usize]) -> Result<&'a [usize], OpError> {
        self.resolve_axis(x.len()).map(|axis| &x[axis..])
    }

    /// 检查参数与形状，`x` 与 `w` 的形状须满足 `w == x[axis..]`。
    pub fn infer(&self, x: &[usize], w: &[usize]) -> Result<RmsNormMeta, OpError> {
        self.check_epsilon()?;

        let axis = self.resolve_axis(x.len())?;
        let (batch, normalized) = x.split_at(axis);
        if normalized != w {
            return Err(OpError::ShapeMismatch {
                expected: normalized.to_vec(),
                got: w.to_vec(),
            });
        }

        let cols = normalized.iter().product::<usize>();
        if cols == 0 {
            return Err(OpError::DegenerateShape {
                shape: normalized.to_vec(),
            });
        }

        Ok(RmsNormMeta {
            axis,
            rows: batch.iter().product(),
            cols,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{RmsNorm, RmsNormMeta};
    use crate::{Arg, OpError};

    const X: [usize; 4] = [2, 3, 4, 5];

    #[test]
    fn test_resolve_axis() {
        for k in 0..X.len() {
            let pos = RmsNorm::new(k as _, 1e-5).resolve_axis(X.len());
            let neg = RmsNorm::new(k as isize - X.len() as isize, 1e-5).resolve_axis(X.len());
            assert_eq!(pos, Ok(k));
            assert_eq!(neg, Ok(k))
        }
        assert_eq!(
            RmsNorm::new(4, 1e-5).resolve_axis(4),
            Err(OpError::InvalidAxis { axis: 4, ndim: 4 })
        );
        assert_eq!(
            RmsNorm::new(-5, 1e-5).resolve_axis(4),
            Err(OpError::InvalidAxis { axis: -5, ndim: 4 })
        );
        assert_eq!(
            RmsNorm::default().resolve_axis(0),
            Err(OpError::InvalidAxis { axis: -1, ndim: 0 })
        );
        assert!(RmsNorm::new(isize::MIN, 1e-5).resolve_axis(4).is_err())
    }

    #[test]
    fn test_normalized_shape() {
        let op = RmsNorm::default();
        assert_eq!(op.normalized_shape(&X), Ok(&[5][..]));
        let op = RmsNorm::new(1, 1e-5);
        assert_eq!(op.normalized_shape(&X), Ok(&[3, 4, 5][..]));
        let op = RmsNorm::new(-4, 1e-5);
        assert_eq!(op.normalized_shape(&X), Ok(&X[..]))
    }

    #[test]
    fn test_infer() {
        let op = RmsNorm::new(2, 1e-5);
        assert_eq!(
            op.infer(&X, &[4, 5]),
            Ok(RmsNormMeta {
                axis: 2,
                rows: 6,
                cols: 20
            })
        );
        assert_eq!(
            RmsNorm::new(0, 1e-5).infer(&X, &X),
            Ok(RmsNormMeta {
                axis: 0,
                rows: 1,
                cols: 120
            })
        );
        // 前导维为空时没有行需要计算
        assert_eq!(
            RmsNorm::default().infer(&[0, 3], &[3]),
            Ok(RmsNormMeta {
                axis: 1,
                rows: 0,
                cols: 3
            })
        )
    }

    #[test]
    fn test_infer_error() {
        let op = RmsNorm::new(2, 1e-5);
        assert_eq!(
            op.infer(&X, &[5]),
            Err(OpError::ShapeMismatch {
                expected: vec![4, 5],
                got: vec![5]
            })
        );
        assert_eq!(
            op.infer(&[2, 3, 0, 5], &[0, 5]),
            Err(OpError::DegenerateShape { shape: vec![0, 5] })
        );
        assert_eq!(
            RmsNorm::new(7, 1e-5).infer(&X, &[5]),
            Err(OpError::InvalidAxis { axis: 7, ndim: 4 })
        );
        assert!(matches!(
            RmsNorm::new(-1, -1e-5).infer(&X, &[5]),
            Err(OpError::ArgError { .. })
        ))
    }

    #[test]
    fn test_attrs() {
        assert_eq!(RmsNorm::from_attrs(std::iter::empty()), Ok(RmsNorm::default()));

        let op = RmsNorm::from_attrs([
            ("axis", Arg::from(-2i64)),
            ("epsilon", Arg::from(1e-1f32)),
            ("stash_type", Arg::from(1i64)),
        ]);
        assert_eq!(op, Ok(RmsNorm::new(-2, 1e-1)));

        // 整数 epsilon 可以提升为浮点数
        assert_eq!(
            RmsNorm::from_attrs([("epsilon", Arg::Int(0))]),
            Ok(RmsNorm::new(-1, 0.))
        );
    }

    #[test]
    fn test_attrs_error() {
        let err = |name: &str, reason| {
            Err(OpError::ArgError {
                name: name.into(),
                reason,
            })
        };
        assert_eq!(
            RmsNorm::from_attrs([("axis", Arg::Float(1.))]),
            err("axis", "expect an integer")
        );
        assert_eq!(
            RmsNorm::from_attrs([("stash_type", Arg::Int(11))]),
            err("stash_type", "only float32 stash is supported")
        );
        assert_eq!(
            RmsNorm::from_attrs([("momentum", Arg::Float(0.9))]),
            err("momentum", "unknown attribute")
        );
        assert_eq!(
            RmsNorm::from_attrs([("epsilon", Arg::Float(f64::NAN))]),
            err("epsilon", "expect a finite non-negative value")
        );
        // 同名属性只能出现一次，后者不覆盖前者
        assert_eq!(
            RmsNorm::from_attrs([("axis", Arg::Int(0)), ("axis", Arg::Int(1))]),
            err("axis", "duplicate attribute")
        );
        assert_eq!(
            RmsNorm::from_attrs([
                ("epsilon", Arg::Float(1e-3)),
                ("axis", Arg::Int(0)),
                ("epsilon", Arg::Float(1e-3)),
            ]),
            err("epsilon", "duplicate attribute")
        )
    }
}
