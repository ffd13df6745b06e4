use serde::{Deserialize, Serialize};

use crate::models::command::ScanLevel;
use crate::models::common::{Angle, Vec2};
use crate::models::expiring::Expiring;
use crate::models::snapshot::ObjectStatus;

/// 観測対象の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitKind {
    Ship,
    Planet,
    Star,
    BlackHole,
    Nebula,
    WormHole,
    Asteroid,
    Torpedo,
    Bauble,
    Outpost,
    SpaceMine,
    #[default]
    Unknown,
}

impl UnitKind {
    /// 変化の遅い天体かどうか（一度識別すれば再スキャン不要）
    pub fn is_celestial(&self) -> bool {
        matches!(
            self,
            UnitKind::Planet | UnitKind::Star | UnitKind::BlackHole | UnitKind::Nebula | UnitKind::WormHole
        )
    }
}

/// 属性ごとのTTL（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    pub position: f64,
    pub velocity: f64,
    pub orientation: f64,
    pub health: f64,
    pub shields: f64,
    pub energy: f64,
    pub point_value: f64,
    pub stored: f64,
    pub radius: f64,
    pub influence: f64,
    pub strength: f64,
}

impl TtlPolicy {
    /// 全属性を永続させるポリシー（天体用）
    pub fn persistent() -> Self {
        Self::uniform(f64::INFINITY)
    }

    pub fn uniform(ttl: f64) -> Self {
        Self {
            position: ttl,
            velocity: ttl,
            orientation: ttl,
            health: ttl,
            shields: ttl,
            energy: ttl,
            point_value: ttl,
            stored: ttl,
            radius: ttl,
            influence: ttl,
            strength: ttl,
        }
    }

    pub fn is_persistent(&self) -> bool {
        *self == Self::persistent()
    }

    pub fn values(&self) -> [f64; 11] {
        [
            self.position,
            self.velocity,
            self.orientation,
            self.health,
            self.shields,
            self.energy,
            self.point_value,
            self.stored,
            self.radius,
            self.influence,
            self.strength,
        ]
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            position: 0.5,
            velocity: 0.5,
            orientation: 0.5,
            health: 2.0,
            shields: 2.0,
            energy: 2.0,
            point_value: 10.0,
            stored: 5.0,
            radius: 30.0,
            influence: 30.0,
            strength: 30.0,
        }
    }
}

/// レーダーで知覚した物体の記録
///
/// IDは追跡対象の生存期間中不変です。各属性は独立に時刻付けされ、
/// 明示的に破棄されることはありません（完全に古くなった記録は不在とみなす）。
#[derive(Debug, Clone, PartialEq)]
pub struct PerceivedUnit {
    pub id: u32,
    pub kind: UnitKind,
    pub name: Option<String>,
    pub position: Expiring<Vec2>,
    pub velocity: Expiring<Vec2>,
    pub orientation: Expiring<Angle>,
    pub health: Expiring<f64>,
    pub shields: Expiring<f64>,
    pub energy: Expiring<f64>,
    pub point_value: Expiring<f64>,
    pub stored: Expiring<u32>,
    pub radius: Expiring<f64>,
    /// 重力の影響範囲
    pub influence: Expiring<f64>,
    /// 影響の強さ
    pub strength: Expiring<f64>,
    policy: TtlPolicy,
}

impl PerceivedUnit {
    pub fn new(id: u32, policy: TtlPolicy) -> Self {
        Self {
            id,
            kind: UnitKind::Unknown,
            name: None,
            position: Expiring::new(policy.position),
            velocity: Expiring::new(policy.velocity),
            orientation: Expiring::new(policy.orientation),
            health: Expiring::new(policy.health),
            shields: Expiring::new(policy.shields),
            energy: Expiring::new(policy.energy),
            point_value: Expiring::new(policy.point_value),
            stored: Expiring::new(policy.stored),
            radius: Expiring::new(policy.radius),
            influence: Expiring::new(policy.influence),
            strength: Expiring::new(policy.strength),
            policy,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// TTLポリシーを差し替え
    ///
    /// 既存の値と更新時刻は保持したまま、各属性のTTLだけを置き換えます。
    pub fn set_policy(&mut self, policy: TtlPolicy) {
        self.position.set_ttl(policy.position);
        self.velocity.set_ttl(policy.velocity);
        self.orientation.set_ttl(policy.orientation);
        self.health.set_ttl(policy.health);
        self.shields.set_ttl(policy.shields);
        self.energy.set_ttl(policy.energy);
        self.point_value.set_ttl(policy.point_value);
        self.stored.set_ttl(policy.stored);
        self.radius.set_ttl(policy.radius);
        self.influence.set_ttl(policy.influence);
        self.strength.set_ttl(policy.strength);
        self.policy = policy;
    }

    /// スキャン結果を取り込む
    ///
    /// そのスキャンレベルが実際に含む属性だけを更新します。
    /// 低レベルのスキャンが高レベルの新しい値を空で上書きすることはありません。
    ///
    /// # 引数
    ///
    /// * `status` - レーダーが返した観測値
    /// * `level` - 観測値を得たスキャンレベル
    /// * `now` - 現在時刻（秒）
    pub fn apply(&mut self, status: &ObjectStatus, level: ScanLevel, now: f64) {
        match level {
            ScanLevel::Count => {}
            ScanLevel::Blind => {
                set_opt(&mut self.position, status.position, now);
            }
            ScanLevel::Extended => {
                if let Some(kind) = status.kind {
                    self.kind = kind;
                }
                set_opt(&mut self.position, status.position, now);
            }
            ScanLevel::Target | ScanLevel::Full => {
                if let Some(kind) = status.kind {
                    self.kind = kind;
                }
                if status.name.is_some() {
                    self.name = status.name.clone();
                }
                set_opt(&mut self.position, status.position, now);
                set_opt(&mut self.velocity, status.velocity, now);
                set_opt(&mut self.orientation, status.orientation.map(Angle::new), now);
                set_opt(&mut self.health, status.health, now);
                set_opt(&mut self.shields, status.shields, now);
                set_opt(&mut self.energy, status.energy, now);
                set_opt(&mut self.point_value, status.point_value, now);
                set_opt(&mut self.stored, status.stored, now);
                set_opt(&mut self.radius, status.hit_radius, now);
                set_opt(&mut self.influence, status.influence, now);
                set_opt(&mut self.strength, status.strength, now);
            }
        }
    }

    /// 回避判定に使う実効半径（影響範囲と当たり半径の大きい方）
    pub fn avoidance_radius(&self, now: f64) -> Option<f64> {
        match (self.influence.get(now), self.radius.get(now)) {
            (Some(influence), Some(radius)) => Some(influence.max(*radius)),
            (Some(influence), None) => Some(*influence),
            (None, Some(radius)) => Some(*radius),
            (None, None) => None,
        }
    }

    /// 全属性が古い（不在とみなすべき）かどうか
    pub fn fully_stale(&self, now: f64) -> bool {
        self.position.stale(now)
            && self.velocity.stale(now)
            && self.orientation.stale(now)
            && self.health.stale(now)
            && self.shields.stale(now)
            && self.energy.stale(now)
            && self.point_value.stale(now)
            && self.stored.stale(now)
            && self.radius.stale(now)
            && self.influence.stale(now)
            && self.strength.stale(now)
    }
}

fn set_opt<T>(field: &mut Expiring<T>, value: Option<T>, now: f64) {
    if let Some(value) = value {
        field.set(value, now);
    }
}
