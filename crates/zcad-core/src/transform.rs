//! 二维仿射变换
//!
//! 使用 3x3 齐次矩阵表示，组合顺序与矩阵乘法一致：
//! `a.then(&b)` 表示先应用 `a` 再应用 `b`。

use crate::math::{Matrix3, Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};

/// 二维仿射变换
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    matrix: Matrix3,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            matrix: Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0),
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            matrix: Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0),
        }
    }

    /// 旋转（弧度，逆时针）
    pub fn rotation(angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            matrix: Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0),
        }
    }

    /// 块参照的放置变换：T(position) · R(rotation) · S(scale) · T(-base)
    pub fn placement(position: Point2, scale: Vector2, rotation_deg: f64, base: Point2) -> Self {
        Self::translation(-base.x, -base.y)
            .then(&Self::scale(scale.x, scale.y))
            .then(&Self::rotation(rotation_deg.to_radians()))
            .then(&Self::translation(position.x, position.y))
    }

    /// 先应用 `self`，再应用 `next`
    pub fn then(&self, next: &Transform2D) -> Transform2D {
        Transform2D {
            matrix: next.matrix * self.matrix,
        }
    }

    pub fn apply(&self, p: &Point2) -> Point2 {
        let m = &self.matrix;
        Point2::new(
            m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)],
            m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)],
        )
    }

    /// 线性部分行列式
    pub fn determinant(&self) -> f64 {
        let m = &self.matrix;
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]
    }

    /// 等效的均匀缩放系数（几何平均）
    pub fn mean_scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    /// x 轴经变换后的转角（弧度）
    pub fn rotation_angle(&self) -> f64 {
        let m = &self.matrix;
        m[(1, 0)].atan2(m[(0, 0)])
    }

    /// 是否包含镜像
    pub fn is_mirrored(&self) -> bool {
        self.determinant() < 0.0
    }

    pub fn is_identity(&self) -> bool {
        (self.matrix - Matrix3::identity()).amax() < EPSILON
    }
}
