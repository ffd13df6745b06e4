//! # Config モジュール
//!
//! クライアント設定（YAML）の読み込みと検証を行います。
//!
//! すべてのセクションに既定値があり、YAMLで省略したセクション・項目は既定値で補われます。
//! 読み込み後は [`ClientConfig::validate`] で値の整合性を確認します。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::loopback::WorldObject;
use crate::models::common::Vec2;
use crate::models::unit::{TtlPolicy, UnitKind};
use crate::simulator::PhysicsModel;

/// ティック周期の上限（秒）
const MAX_TICK_S: f64 = 10.0;

fn positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// 設定メタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigMeta {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl Default for ConfigMeta {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "既定のクライアント設定".to_string(),
            version: "1".to_string(),
        }
    }
}

/// 予測シミュレーター設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// ティック周期（秒）
    pub tick_s: f64,
    /// 飛行中コマンドの最大数
    pub queue_capacity: usize,
    pub physics: PhysicsModel,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_s: 0.05,
            queue_capacity: 8,
            physics: PhysicsModel::default(),
        }
    }
}

/// 知覚メモリ設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub ttl: TtlPolicy,
}

/// 回避設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// 自機の半径
    pub ship_radius: f64,
    /// 脱出時に1回で噴射する時間（秒）
    pub escape_thrust_s: f64,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            ship_radius: 28.0,
            escape_thrust_s: 0.25,
        }
    }
}

/// 照準設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptConfig {
    pub torpedo_speed: f64,
    /// リード補正係数
    pub lead_multiplier: f64,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            torpedo_speed: 250.0,
            lead_multiplier: -1.5,
        }
    }
}

/// 制御ランタイム設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 戦略終了後に送り続けるアイドルの長さ（秒）
    pub idle_s: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { idle_s: 0.1 }
    }
}

/// ループバックサーバー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// レーダー探知距離
    pub radar_range: f64,
    /// 自機の初期位置
    pub start_position: Vec2,
    /// 自機の初期の向き（度）
    pub start_heading: f64,
    pub objects: Vec<WorldObject>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            radar_range: 400.0,
            start_position: Vec2::new(200.0, 384.0),
            start_heading: 0.0,
            objects: vec![
                WorldObject {
                    id: 1,
                    kind: UnitKind::Planet,
                    name: Some("Aurelia".to_string()),
                    position: Vec2::new(520.0, 384.0),
                    velocity: Vec2::ZERO,
                    hit_radius: 40.0,
                    influence: 90.0,
                    health: 100.0,
                },
                WorldObject {
                    id: 2,
                    kind: UnitKind::Ship,
                    name: Some("raider".to_string()),
                    position: Vec2::new(380.0, 200.0),
                    velocity: Vec2::new(0.0, 8.0),
                    hit_radius: 14.0,
                    influence: 0.0,
                    health: 100.0,
                },
                WorldObject {
                    id: 3,
                    kind: UnitKind::Asteroid,
                    name: None,
                    position: Vec2::new(260.0, 600.0),
                    velocity: Vec2::new(-4.0, -2.0),
                    hit_radius: 12.0,
                    influence: 0.0,
                    health: 100.0,
                },
            ],
        }
    }
}

/// クライアント設定全体
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub meta: ConfigMeta,
    pub simulator: SimulatorConfig,
    pub perception: PerceptionConfig,
    pub avoidance: AvoidanceConfig,
    pub intercept: InterceptConfig,
    pub runtime: RuntimeConfig,
    pub loopback: LoopbackConfig,
}

impl ClientConfig {
    /// YAMLファイルから設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

        let config: ClientConfig =
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// 設定値の検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulator;
        if !positive_finite(sim.tick_s) || sim.tick_s > MAX_TICK_S {
            return Err(ConfigError::ValidationError(format!(
                "simulator.tick_s must be in (0, {}]",
                MAX_TICK_S
            )));
        }
        if sim.queue_capacity == 0 {
            return Err(ConfigError::ValidationError("simulator.queue_capacity must be at least 1".to_string()));
        }
        if !positive_finite(sim.physics.world_width) || !positive_finite(sim.physics.world_height) {
            return Err(ConfigError::ValidationError("world size must be positive".to_string()));
        }
        // 回転・操舵・加速がゼロだとブロッキングコマンドが完了しない
        let rates = [
            ("physics.turn_rate_deg_s", sim.physics.turn_rate_deg_s),
            ("physics.steer_rate_deg_s", sim.physics.steer_rate_deg_s),
            ("physics.thrust_accel", sim.physics.thrust_accel),
            ("physics.brake_decel", sim.physics.brake_decel),
        ];
        if let Some((name, _)) = rates.iter().find(|(_, value)| !positive_finite(*value)) {
            return Err(ConfigError::ValidationError(format!("{} must be positive", name)));
        }

        if self.perception.ttl.values().iter().any(|ttl| ttl.is_nan() || *ttl < 0.0) {
            return Err(ConfigError::ValidationError("perception TTLs must not be negative".to_string()));
        }

        if self.avoidance.ship_radius < 0.0 {
            return Err(ConfigError::ValidationError("avoidance.ship_radius must not be negative".to_string()));
        }
        if self.avoidance.escape_thrust_s <= 0.0 {
            return Err(ConfigError::ValidationError("avoidance.escape_thrust_s must be positive".to_string()));
        }

        if self.intercept.torpedo_speed <= 0.0 {
            return Err(ConfigError::ValidationError("intercept.torpedo_speed must be positive".to_string()));
        }

        if self.runtime.idle_s <= 0.0 {
            return Err(ConfigError::ValidationError("runtime.idle_s must be positive".to_string()));
        }

        let mut ids: Vec<u32> = self.loopback.objects.iter().map(|o| o.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::ValidationError("loopback object ids must be unique".to_string()));
        }

        Ok(())
    }

    /// 設定の概要を表示
    pub fn print_summary(&self) {
        println!("=== 設定情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        let sim = &self.simulator;
        println!("=== 予測シミュレーター ===");
        println!("ティック周期: {:.3}秒", sim.tick_s);
        println!("キュー容量: {}", sim.queue_capacity);
        println!("ワールド: {:.0} x {:.0}", sim.physics.world_width, sim.physics.world_height);
        println!("回転速度: {:.1}度/秒", sim.physics.turn_rate_deg_s);
        println!();

        let ttl = &self.perception.ttl;
        println!("=== 知覚メモリ ===");
        println!("位置TTL: {:.2}秒 / 速度TTL: {:.2}秒", ttl.position, ttl.velocity);
        println!("半径TTL: {:.1}秒 / 影響範囲TTL: {:.1}秒", ttl.radius, ttl.influence);
        println!();

        println!("=== 回避・照準 ===");
        println!("自機半径: {:.1}", self.avoidance.ship_radius);
        println!("魚雷速度: {:.1}", self.intercept.torpedo_speed);
        println!("リード補正係数: {:.2}", self.intercept.lead_multiplier);
        println!();

        println!("=== ループバック ===");
        println!("レーダー探知距離: {:.0}", self.loopback.radar_range);
        println!("物体数: {}", self.loopback.objects.len());
        for object in &self.loopback.objects {
            println!("  #{} {:?} @ {}", object.id, object.kind, object.position);
        }
    }
}

/// 設定読み込みエラー
#[derive(Debug)]
pub enum ConfigError {
    FileNotFound(PathBuf),
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "設定ファイルが見つかりません: {}", path.display())
            }
            ConfigError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ConfigError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(_, err) => Some(err),
            ConfigError::ParseError(_, err) => Some(err),
            _ => None,
        }
    }
}
