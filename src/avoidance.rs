//! # Avoidance モジュール
//!
//! 接線円による衝突回避を計算します。
//!
//! 危険物体を半径 `effective + ship_radius` の円とみなし、直進するとその円に
//! 接する偏向角 `asin(combined / distance)` を求めます。現在の進行方向がこの危険コーンの
//! 内側にあれば、二本の接線方位（方位 ± 偏向角）のうち進行方向に近い方へ操舵します。
//! すでに円の内側にいる場合は偏向角が定義できない（NaN）ため、脱出レポートを返します。
//! 停止中の自機には進行方向が無いため、脱出以外のレポートは出しません。
//!
//! 鮮度の確認と再スキャンは制御ランタイム側（`Control::avoid`）が担当し、
//! ここでは純粋な幾何計算のみを行います。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::common::{Angle, Vec2, math_utils};
use crate::models::snapshot::ShipState;

/// 1回の回避評価の結果
///
/// 要求した呼び出し側だけが所有し、キャッシュはしません。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvoidanceReport {
    pub target_id: u32,
    /// 危険物体の中心
    pub center: Vec2,
    /// 物体側の実効回避半径
    pub radius: f64,
    /// 自機半径を加えた危険半径
    pub combined_radius: f64,
    /// 現在の進行方向
    pub current: Angle,
    /// 物体への直線方位
    pub straight: Angle,
    /// 必要な偏向角（脱出時はNaN）
    pub deviation: Angle,
    /// 指令する操舵角（脱出時は物体から離れる方位）
    pub steer: Angle,
    pub escape: bool,
}

/// 回避に必要な偏向角
///
/// `distance < combined_radius` のときはNaNになります。
pub fn deviation_angle(distance: f64, combined_radius: f64) -> Angle {
    Angle::new(math_utils::rad_to_deg((combined_radius / distance).asin()))
}

/// 回避エンジン
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidanceEngine {
    pub ship_radius: f64,
}

impl AvoidanceEngine {
    pub fn new(ship_radius: f64) -> Self {
        Self { ship_radius }
    }

    /// 回避の要否を評価
    ///
    /// # 引数
    ///
    /// * `ship` - 現在の自機状態
    /// * `target_id` - 危険物体のID
    /// * `center` - 危険物体の位置
    /// * `radius` - 危険物体の実効回避半径（影響範囲と当たり半径の大きい方）
    ///
    /// # 戻り値
    ///
    /// 回避が必要なら報告、現在の進路が危険コーンの外なら `None`
    pub fn assess(&self, ship: &ShipState, target_id: u32, center: Vec2, radius: f64) -> Option<AvoidanceReport> {
        let combined_radius = radius + self.ship_radius;
        let distance = ship.position.dist(center);
        let current = ship.velocity.angle();
        let straight = ship.position.angle_to(center);
        let deviation = deviation_angle(distance, combined_radius);

        if deviation.is_nan() {
            debug!(
                target_id,
                distance,
                combined_radius,
                "AVOID_ESCAPE: 危険半径の内側にいます"
            );
            return Some(AvoidanceReport {
                target_id,
                center,
                radius,
                combined_radius,
                current,
                straight,
                deviation,
                steer: straight.flip(),
                escape: true,
            });
        }

        if ship.velocity.length2() == 0.0 {
            debug!(target_id, distance, "AVOID_STATIONARY: 停止中のため操舵しません");
            return None;
        }

        if !current.within(straight, deviation) {
            return None;
        }

        let left = straight + deviation;
        let right = straight - deviation;
        let steer = if current.distance(right) < current.distance(left) { right } else { left };

        debug!(
            target_id,
            distance,
            current = current.deg(),
            straight = straight.deg(),
            deviation = deviation.deg(),
            steer = steer.deg(),
            "AVOID_STEER: 接線方位へ操舵します"
        );

        Some(AvoidanceReport {
            target_id,
            center,
            radius,
            combined_radius,
            current,
            straight,
            deviation,
            steer,
            escape: false,
        })
    }
}
