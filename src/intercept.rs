//! # Intercept モジュール
//!
//! 一定速度の魚雷を移動目標へ撃つための照準点（リードポイント）を閉形式で求めます。
//!
//! 目標速度を変位方向の成分 `a0` と垂直成分 `b` に分解し、
//! `(|vt|² − vp²)·t² + (2·a0·|vt|)·t + (a0² + b²) = 0` を解いて着弾時間 `t` を得ます。
//! 照準点は `target + vt × (lead_multiplier·t)` です。`lead_multiplier`（既定 -1.5）は
//! 実測で調整した補正係数で、物理定数ではありません。自機の向き・速度は現在の式では使いません。
//!
//! 判別式が負になる場合（目標の方が速い、幾何的に届かない）も特別扱いはせず、
//! 非有限な値がそのまま返ります。呼び出し側で [`InterceptSolution::is_valid`] を確認してください。

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::models::common::{Angle, Vec2};

/// 照準計算の結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterceptSolution {
    /// 照準点
    pub aim: Vec2,
    /// 着弾までの時間（根の選択そのまま、未検証）
    pub time: f64,
    pub discriminant: f64,
}

impl InterceptSolution {
    /// 照準点が使える値かどうか
    pub fn is_valid(&self) -> bool {
        self.discriminant >= 0.0 && self.time.is_finite() && self.aim.is_finite()
    }
}

/// 照準エンジン
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterceptEngine {
    pub projectile_speed: f64,
    pub lead_multiplier: f64,
}

impl InterceptEngine {
    pub fn new(projectile_speed: f64, lead_multiplier: f64) -> Self {
        Self {
            projectile_speed,
            lead_multiplier,
        }
    }

    /// 照準点を計算
    ///
    /// # 引数
    ///
    /// * `own_position` - 自機位置
    /// * `_own_heading` - 自機の向き（現在の式では未使用）
    /// * `_own_velocity` - 自機速度（現在の式では未使用）
    /// * `target` - 目標位置
    /// * `target_velocity` - 目標速度
    pub fn solve(
        &self,
        own_position: Vec2,
        _own_heading: Angle,
        _own_velocity: Vec2,
        target: Vec2,
        target_velocity: Vec2,
    ) -> InterceptSolution {
        let c0 = target - own_position;
        let axis = c0.normalize();
        let a0 = target_velocity.dot(axis);
        let b = axis.cross(target_velocity);
        let target_speed = target_velocity.length();

        let qa = target_speed.powi(2) - self.projectile_speed.powi(2);
        let qb = 2.0 * a0 * target_speed;
        let qc = a0.powi(2) + b.powi(2);
        let discriminant = qb.powi(2) - 4.0 * qa * qc;
        let time = (-qb + discriminant.sqrt()) / (2.0 * qa);

        let aim = target + target_velocity * (self.lead_multiplier * time);
        trace!(
            aim_x = aim.x,
            aim_y = aim.y,
            time,
            discriminant,
            "INTERCEPT_SOLVED: 照準点を計算しました"
        );

        InterceptSolution { aim, time, discriminant }
    }
}
