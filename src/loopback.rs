//! # Loopback モジュール
//!
//! オフライン実行とテストのためにゲームサーバーの代わりを務めるループバックサーバーです。
//!
//! 自機と物体リストからなる権威あるワールドを保持し、受け取ったコマンドを
//! 予測シミュレーターと同じ決定的な [`tick`] 関数で適用します。
//! ブロッキングコマンドは完了するまでワールドを進めてからスナップショットを返します。
//!
//! ## レーダー応答
//!
//! - 探知距離内に物体が無い場合は結果なし（圏外）
//! - L1: 物体数のみ
//! - L2: IDと位置
//! - L3: 指定IDの全情報（指定IDが圏外なら結果なし）
//! - L4: ID・種類・位置
//! - L5: 全情報

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::models::command::{ScanLevel, ShipCommand};
use crate::models::common::{Angle, Vec2, math_utils};
use crate::models::expiring::ManualClock;
use crate::models::snapshot::{Environment, GameInfo, ObjectStatus, RadarResults, ShipStatus};
use crate::models::unit::UnitKind;
use crate::runtime::{EventHandle, RuntimeError};
use crate::simulator::{PhysicsModel, SimState, SimulatedCommand, tick};

/// ブロッキングコマンドの完了を待つ最大ティック数
const MAX_BLOCKING_STEPS: u32 = 2_000;

/// ワールド内の物体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldObject {
    pub id: u32,
    pub kind: UnitKind,
    #[serde(default)]
    pub name: Option<String>,
    pub position: Vec2,
    #[serde(default)]
    pub velocity: Vec2,
    pub hit_radius: f64,
    #[serde(default)]
    pub influence: f64,
    #[serde(default = "full_health")]
    pub health: f64,
}

fn full_health() -> f64 {
    100.0
}

impl WorldObject {
    fn status(&self, level: ScanLevel) -> ObjectStatus {
        let base = ObjectStatus {
            id: self.id,
            position: Some(self.position),
            ..Default::default()
        };
        match level {
            ScanLevel::Count | ScanLevel::Blind => base,
            ScanLevel::Extended => ObjectStatus {
                kind: Some(self.kind),
                ..base
            },
            ScanLevel::Target | ScanLevel::Full => ObjectStatus {
                kind: Some(self.kind),
                name: self.name.clone(),
                velocity: Some(self.velocity),
                orientation: Some(self.velocity.angle().deg()),
                health: Some(self.health),
                shields: Some(0.0),
                energy: Some(0.0),
                point_value: Some(1.0),
                stored: Some(0),
                hit_radius: Some(self.hit_radius),
                influence: Some(self.influence),
                strength: Some(if self.influence > 0.0 { 1.0 } else { 0.0 }),
                ..base
            },
        }
    }
}

/// セッションの実行結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    /// 処理したサーバーティック数
    pub ticks: u64,
    /// コマンド種別ごとの受信数
    pub commands: BTreeMap<&'static str, usize>,
    pub torpedoes_fired: u32,
    pub destroyed: Option<String>,
    pub final_ship: ShipStatus,
}

/// ループバックサーバー
#[derive(Debug)]
pub struct LoopbackServer {
    ship: SimState,
    objects: Vec<WorldObject>,
    model: PhysicsModel,
    dt: f64,
    radar_range: f64,
    ship_radius: f64,
    pending: VecDeque<SimulatedCommand>,
    last_radar: Option<RadarResults>,
    torpedoes_fired: u32,
    steps: u64,
    clock: Option<ManualClock>,
}

impl LoopbackServer {
    /// 設定からワールドを構築
    pub fn new(config: &ClientConfig) -> Self {
        let model = config.simulator.physics;
        Self {
            ship: SimState {
                position: config.loopback.start_position,
                heading: Angle::new(config.loopback.start_heading),
                velocity: Vec2::ZERO,
                energy: model.energy_cap,
                health: 100.0,
                shield: 0.0,
            },
            objects: config.loopback.objects.clone(),
            model,
            dt: config.simulator.tick_s,
            radar_range: config.loopback.radar_range,
            ship_radius: config.avoidance.ship_radius,
            pending: VecDeque::new(),
            last_radar: None,
            torpedoes_fired: 0,
            steps: 0,
            clock: None,
        }
    }

    /// ワールドの時間経過に合わせて進める時計を接続
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ship(&self) -> &SimState {
        &self.ship
    }

    pub fn ship_mut(&mut self) -> &mut SimState {
        &mut self.ship
    }

    pub fn objects(&self) -> &[WorldObject] {
        &self.objects
    }

    /// 物理ティック数
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// 現在のスナップショット
    ///
    /// 直前のコマンドがレーダースキャンだった場合のみ結果を含みます。
    pub fn environment(&mut self) -> Environment {
        Environment {
            ship: ShipStatus {
                position: self.ship.position,
                orientation: self.ship.heading.deg(),
                speed: self.ship.velocity.length(),
                movement_direction: self.ship.velocity.angle().deg(),
                health: self.ship.health,
                shield: self.ship.shield,
                energy: self.ship.energy,
            },
            radar: self.last_radar.take(),
            game: GameInfo {
                score: self.torpedoes_fired as f64,
                objective: None,
            },
        }
    }

    /// コマンドを受け取りワールドを進める
    pub fn apply(&mut self, command: &ShipCommand) {
        let simulated = SimulatedCommand::from_command(command, &self.model);
        let blocking = simulated.blocking;

        if let ShipCommand::FireTorpedo { .. } = command {
            if self.ship.energy >= self.model.fire_cost {
                self.torpedoes_fired += 1;
            }
        }

        self.pending.push_back(simulated);
        self.last_radar = None;

        let mut steps = 0;
        loop {
            self.advance();
            steps += 1;
            let still_blocked = self.pending.iter().any(|c| c.blocking);
            if !blocking || !still_blocked {
                break;
            }
            if steps >= MAX_BLOCKING_STEPS {
                warn!(command = %command, steps, "LOOPBACK_BLOCKING_LIMIT: ブロッキングコマンドが完了しません");
                self.pending.retain(|c| !c.blocking);
                break;
            }
        }

        if let ShipCommand::RadarScan { level, target } = *command {
            self.last_radar = self.scan(level, target);
        }
    }

    fn advance(&mut self) {
        tick(&mut self.ship, &mut self.pending, &self.model, self.dt);
        for object in &mut self.objects {
            let moved = object.position + object.velocity * self.dt;
            object.position = Vec2::new(
                math_utils::wrap(moved.x, self.model.world_width),
                math_utils::wrap(moved.y, self.model.world_height),
            );
        }
        self.steps += 1;
        if let Some(clock) = &self.clock {
            clock.advance(self.dt);
        }
    }

    /// レーダースキャンに応答
    pub fn scan(&self, level: ScanLevel, target: Option<u32>) -> Option<RadarResults> {
        let in_range: Vec<&WorldObject> = self
            .objects
            .iter()
            .filter(|object| object.position.dist(self.ship.position) <= self.radar_range)
            .collect();

        if in_range.is_empty() {
            debug!(level = level.number(), "LOOPBACK_RADAR_SILENT: 探知距離内に物体がありません");
            return None;
        }

        let results = match level {
            ScanLevel::Count => RadarResults {
                count: in_range.len(),
                objects: Vec::new(),
            },
            ScanLevel::Target => {
                let object = in_range.iter().find(|object| Some(object.id) == target)?;
                RadarResults {
                    count: 1,
                    objects: vec![object.status(level)],
                }
            }
            ScanLevel::Blind | ScanLevel::Extended | ScanLevel::Full => RadarResults {
                count: in_range.len(),
                objects: in_range.iter().map(|object| object.status(level)).collect(),
            },
        };
        trace!(level = level.number(), count = results.count, "LOOPBACK_RADAR: スキャンに応答しました");
        Some(results)
    }

    /// 自機が物体に衝突していれば原因を返す
    pub fn collision(&self) -> Option<String> {
        self.objects
            .iter()
            .find(|object| object.position.dist(self.ship.position) < object.hit_radius + self.ship_radius)
            .map(|object| format!("collision with {:?} #{}", object.kind, object.id))
    }

    /// イベントハンドルに対してセッションを回す
    ///
    /// # 引数
    ///
    /// * `handle` - 制御ランタイムのイベントハンドル
    /// * `ticks` - 最大サーバーティック数
    pub fn run_session(&mut self, handle: &EventHandle, ticks: u64) -> Result<SessionSummary, RuntimeError> {
        let mut summary = SessionSummary::default();
        info!(ticks, objects = self.objects.len(), "LOOPBACK_SESSION_START: ループバックセッションを開始します");

        for _ in 0..ticks {
            let env = self.environment();
            let command = match handle.next_command(env) {
                Ok(command) => command,
                Err(RuntimeError::Destroyed(cause)) => {
                    summary.destroyed = Some(cause);
                    break;
                }
                Err(e) => return Err(e),
            };
            *summary.commands.entry(command.name()).or_insert(0) += 1;
            summary.ticks += 1;

            self.apply(&command);

            if let Some(cause) = self.collision() {
                handle.destroyed(&cause);
                summary.destroyed = Some(cause);
                break;
            }
        }

        summary.torpedoes_fired = self.torpedoes_fired;
        summary.final_ship = self.environment().ship;
        info!(
            ticks = summary.ticks,
            torpedoes = summary.torpedoes_fired,
            destroyed = summary.destroyed.is_some(),
            "LOOPBACK_SESSION_END: ループバックセッションを終了しました"
        );
        Ok(summary)
    }
}
