use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 2次元ベクトルを表す構造体
///
/// 位置・速度・加速度のすべてに使用する不変の値型です。
/// 角度はワールド座標系で `polar(angle, 1.0)` が機首方向を向くように定義します。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 極座標からベクトルを生成
    ///
    /// # 引数
    ///
    /// * `angle` - 方向
    /// * `magnitude` - 大きさ
    pub fn polar(angle: Angle, magnitude: f64) -> Self {
        let radians = angle.rad();
        Self::new(radians.cos() * magnitude, radians.sin() * magnitude)
    }

    /// 長さの二乗
    pub fn length2(&self) -> f64 {
        self.x.powi(2) + self.y.powi(2)
    }

    /// ベクトルの長さ
    pub fn length(&self) -> f64 {
        self.length2().sqrt()
    }

    /// 正規化したベクトル
    ///
    /// ゼロベクトルを正規化した結果はNaNになります（呼び出し側で検証すること）。
    pub fn normalize(&self) -> Self {
        *self / self.length()
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// 2次元外積（z成分）
    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn dist2(&self, other: Vec2) -> f64 {
        (*self - other).length2()
    }

    pub fn dist(&self, other: Vec2) -> f64 {
        self.dist2(other).sqrt()
    }

    /// 指定角度だけ回転したベクトル
    pub fn rotate(&self, angle: Angle) -> Self {
        let (sin, cos) = angle.rad().sin_cos();
        Self::new(cos * self.x - sin * self.y, sin * self.x + cos * self.y)
    }

    /// ベクトルの向き
    pub fn angle(&self) -> Angle {
        Angle::from_rad(self.y.atan2(self.x))
    }

    /// 自身から `other` への方位
    pub fn angle_to(&self, other: Vec2) -> Angle {
        (other - *self).angle()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, scalar: f64) -> Self::Output {
        Self::new(self.x / scalar, self.y / scalar)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:.2}, {:.2}>", self.x, self.y)
    }
}

/// 度数法の角度
///
/// 生成時に必ず (-180, 180] の範囲へ正規化されます。
/// 正規化前の差分を直接比較しないこと。
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Angle(f64);

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    pub fn new(degrees: f64) -> Self {
        Self(math_utils::normalize_angle(degrees))
    }

    pub fn from_rad(radians: f64) -> Self {
        Self::new(math_utils::rad_to_deg(radians))
    }

    pub fn deg(&self) -> f64 {
        self.0
    }

    pub fn rad(&self) -> f64 {
        math_utils::deg_to_rad(self.0)
    }

    /// 正反対の向き
    pub fn flip(&self) -> Self {
        Self::new(self.0 + 180.0)
    }

    pub fn abs(&self) -> Self {
        Self::new(self.0.abs())
    }

    /// `self` から `other` への符号付き最短弧
    pub fn delta(&self, other: Angle) -> Angle {
        Angle::new(other.0 - self.0)
    }

    /// 最短弧の大きさ（度）
    pub fn distance(&self, other: Angle) -> f64 {
        self.delta(other).0.abs()
    }

    /// `other` から `tolerance` 以内にあるか
    ///
    /// `tolerance` がNaNの場合は常にfalseになります。
    pub fn within(&self, other: Angle, tolerance: Angle) -> bool {
        self.distance(other) <= tolerance.0.abs()
    }

    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }
}

impl Add for Angle {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.0 + other.0)
    }
}

impl Sub for Angle {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.0 - other.0)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.0)
    }
}

impl From<f64> for Angle {
    fn from(degrees: f64) -> Self {
        Self::new(degrees)
    }
}

impl From<Angle> for f64 {
    fn from(angle: Angle) -> Self {
        angle.0
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.0)
    }
}

/// 機体座標系の方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

impl Direction {
    /// 機体座標系の単位ベクトル
    pub fn vec(&self) -> Vec2 {
        match self {
            Direction::Forward => Vec2::new(1.0, 0.0),
            Direction::Back => Vec2::new(-1.0, 0.0),
            Direction::Left => Vec2::new(0.0, -1.0),
            Direction::Right => Vec2::new(0.0, 1.0),
        }
    }

    pub fn flip(&self) -> Self {
        match self {
            Direction::Forward => Direction::Back,
            Direction::Back => Direction::Forward,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// 符号が負なら反転した方向を返す
    pub fn unsign(&self, sign: f64) -> Self {
        if sign < 0.0 { self.flip() } else { *self }
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * std::f64::consts::PI / 180.0
    }

    /// ラジアンを度に変換
    pub fn rad_to_deg(radians: f64) -> f64 {
        radians * 180.0 / std::f64::consts::PI
    }

    /// 角度を (-180度, 180度] の範囲に正規化
    pub fn normalize_angle(angle_deg: f64) -> f64 {
        let normalized = angle_deg.rem_euclid(360.0);
        if normalized > 180.0 {
            normalized - 360.0
        } else {
            normalized
        }
    }

    /// 指定の減速度で停止するまでに進む距離
    pub fn deceleration_distance(speed: f64, deceleration: f64) -> f64 {
        speed * (speed / deceleration) / 2.0
    }

    /// 値を [0, bound) の範囲へ巻き戻す（ワールド境界のラップアラウンド）
    pub fn wrap(value: f64, bound: f64) -> f64 {
        value.rem_euclid(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_angle_normalization_range() {
        assert_eq!(Angle::new(180.0).deg(), 180.0);
        assert_eq!(Angle::new(-180.0).deg(), 180.0);
        assert_eq!(Angle::new(540.0).deg(), 180.0);
        assert_eq!(Angle::new(190.0).deg(), -170.0);
        assert_eq!(Angle::new(-190.0).deg(), 170.0);
        assert_eq!(Angle::new(720.0).deg(), 0.0);
    }

    #[test]
    fn test_angle_shortest_arc() {
        let a = Angle::new(170.0);
        let b = Angle::new(-170.0);
        assert_abs_diff_eq!(a.delta(b).deg(), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.delta(a).deg(), -20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(a.distance(b), 20.0, epsilon = 1e-9);
        assert!(a.within(b, Angle::new(20.0)));
        assert!(!a.within(b, Angle::new(19.0)));
        assert!(!a.within(b, Angle::new(f64::NAN)));
    }

    #[test]
    fn test_angle_addition_wraps() {
        let sum = Angle::new(150.0) + Angle::new(60.0);
        assert_abs_diff_eq!(sum.deg(), -150.0, epsilon = 1e-9);
        assert_abs_diff_eq!(Angle::new(10.0).flip().deg(), -170.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vec_rotate_and_angle() {
        let v = Vec2::new(1.0, 0.0).rotate(Angle::new(90.0));
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.angle().deg(), 90.0, epsilon = 1e-9);

        let p = Vec2::polar(Angle::new(-45.0), 2.0_f64.sqrt());
        assert_abs_diff_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_vec_metrics() {
        let a = Vec2::new(3.0, 4.0);
        assert_eq!(a.length(), 5.0);
        assert_eq!(a.dist(Vec2::ZERO), 5.0);
        assert_eq!(a.dot(Vec2::new(1.0, 0.0)), 3.0);
        assert_eq!(a.cross(Vec2::new(1.0, 0.0)), -4.0);
        assert_abs_diff_eq!(a.normalize().length(), 1.0, epsilon = 1e-12);
        assert!(!Vec2::ZERO.normalize().is_finite());
    }

    #[test]
    fn test_direction_unsign() {
        assert_eq!(Direction::Forward.unsign(-0.5), Direction::Back);
        assert_eq!(Direction::Right.unsign(1.0), Direction::Right);
        assert_eq!(Direction::Left.vec(), -Direction::Right.vec());
    }

    #[test]
    fn test_math_utils() {
        assert_abs_diff_eq!(math_utils::deceleration_distance(6.6, 6.6), 3.3, epsilon = 1e-12);
        assert_eq!(math_utils::wrap(-10.0, 100.0), 90.0);
        assert_eq!(math_utils::wrap(250.0, 100.0), 50.0);
    }
}
