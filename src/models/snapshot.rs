use serde::{Deserialize, Serialize};

use crate::models::common::{Angle, Vec2};
use crate::models::unit::UnitKind;

/// サーバーから届く1ティック分の環境スナップショット
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    pub ship: ShipStatus,
    /// 直前のコマンドがレーダースキャンだった場合のみ存在
    pub radar: Option<RadarResults>,
    pub game: GameInfo,
}

/// 自機の運動・資源状態
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShipStatus {
    pub position: Vec2,
    pub orientation: f64,
    pub speed: f64,
    pub movement_direction: f64,
    pub health: f64,
    pub shield: f64,
    pub energy: f64,
}

/// ゲームのメタ情報
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameInfo {
    pub score: f64,
    pub objective: Option<Vec2>,
}

/// レーダー結果
///
/// L1スキャンでは `count` のみが意味を持ち、`objects` は空です。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RadarResults {
    pub count: usize,
    pub objects: Vec<ObjectStatus>,
}

/// レーダーが返す1物体の観測値
///
/// スキャンレベルによって埋まるフィールドが異なるため、すべて省略可能です。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectStatus {
    pub id: u32,
    pub kind: Option<UnitKind>,
    pub name: Option<String>,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub orientation: Option<f64>,
    pub health: Option<f64>,
    pub shields: Option<f64>,
    pub energy: Option<f64>,
    pub point_value: Option<f64>,
    pub stored: Option<u32>,
    pub hit_radius: Option<f64>,
    pub influence: Option<f64>,
    pub strength: Option<f64>,
}

/// yield境界ごとに戦略コードへ渡す自機状態
///
/// 次のyieldまで変化しない不変の値です。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShipState {
    pub position: Vec2,
    pub angle: Angle,
    pub velocity: Vec2,
    pub speed: f64,
    pub health: f64,
    pub shield: f64,
    pub energy: f64,
}

impl From<&ShipStatus> for ShipState {
    fn from(status: &ShipStatus) -> Self {
        Self {
            position: status.position,
            angle: Angle::new(status.orientation),
            velocity: Vec2::polar(Angle::new(status.movement_direction), status.speed),
            speed: status.speed,
            health: status.health,
            shield: status.shield,
            energy: status.energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ship_state_from_status() {
        let status = ShipStatus {
            position: Vec2::new(10.0, 20.0),
            orientation: 270.0,
            speed: 5.0,
            movement_direction: 90.0,
            health: 80.0,
            shield: 10.0,
            energy: 55.0,
        };
        let state = ShipState::from(&status);
        assert_eq!(state.angle.deg(), -90.0);
        assert_abs_diff_eq!(state.velocity.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state.velocity.y, 5.0, epsilon = 1e-12);
        assert_eq!(state.energy, 55.0);
    }
}
