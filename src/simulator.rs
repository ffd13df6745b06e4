//! # Simulator モジュール
//!
//! 権威あるスナップショットの合間に自機状態を局所的に予測するシミュレーターです。
//!
//! 制御ランタイムのペースとは独立した固定周期ループで動作し、
//! 送信済みコマンドの運動モデル・エネルギーモデルをローカルの運動状態へ適用します。
//! 予測はあくまで監視・可視化用の近似であり、新しいスナップショットが届くたびに
//! 再同期されます。
//!
//! ## ティック処理順序
//!
//! 1. **コマンド処理**: 飛行中の各コマンドについて
//!    - 開始直後なら一回分のエネルギーを課金（不足なら破棄）
//!    - それ以外はティック分の継続コストを課金し、足りれば物理効果を適用
//!    - 残り時間が尽きた、またはエネルギー切れのコマンドを除去
//! 2. **位置積分**: 速度×周期で位置を進め、ワールド境界で巻き戻す
//! 3. **エネルギー回復**: 上限に向けて受動的に回復
//!
//! [`tick`] は壁時計に依存しない純粋な関数で、同じ入力なら常に同じ結果になります。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::models::command::{ScanLevel, ShipCommand};
use crate::models::common::{Angle, Direction, Vec2, math_utils};
use crate::models::snapshot::ShipStatus;

/// 残り時間・残り角度をゼロとみなす閾値
const EPSILON: f64 = 1e-9;

/// 運動・エネルギーモデルのパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsModel {
    /// ワールド幅
    pub world_width: f64,
    /// ワールド高さ
    pub world_height: f64,
    /// 回転速度（度/秒）
    pub turn_rate_deg_s: f64,
    /// 操舵速度（度/秒）
    pub steer_rate_deg_s: f64,
    /// 最大推力時の加速度
    pub thrust_accel: f64,
    /// ブレーキの減速度
    pub brake_decel: f64,
    pub energy_cap: f64,
    pub energy_regen_per_s: f64,
    pub rotate_cost_per_s: f64,
    pub steer_cost_per_s: f64,
    pub brake_cost_per_s: f64,
    /// 出力1.0あたりの推進コスト（毎秒）
    pub thrust_cost_per_s: f64,
    pub radar_cost_per_s: f64,
    pub fire_cost: f64,
    pub torpedo_duration_s: f64,
    /// 修理1ポイントあたりのエネルギー
    pub repair_cost_per_point: f64,
    /// 修理1ポイントあたりの所要時間
    pub repair_s_per_point: f64,
}

impl Default for PhysicsModel {
    fn default() -> Self {
        Self {
            world_width: 1024.0,
            world_height: 768.0,
            turn_rate_deg_s: 120.0,
            steer_rate_deg_s: 120.0,
            thrust_accel: 6.6,
            brake_decel: 6.6,
            energy_cap: 100.0,
            energy_regen_per_s: 4.0,
            rotate_cost_per_s: 2.0,
            steer_cost_per_s: 3.0,
            brake_cost_per_s: 4.0,
            thrust_cost_per_s: 3.0,
            radar_cost_per_s: 6.0,
            fire_cost: 8.0,
            torpedo_duration_s: 0.1,
            repair_cost_per_point: 1.0,
            repair_s_per_point: 0.1,
        }
    }
}

/// 局所的に予測する自機の運動状態
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimState {
    pub position: Vec2,
    pub heading: Angle,
    pub velocity: Vec2,
    pub energy: f64,
    pub health: f64,
    pub shield: f64,
}

impl From<&ShipStatus> for SimState {
    fn from(status: &ShipStatus) -> Self {
        Self {
            position: status.position,
            heading: Angle::new(status.orientation),
            velocity: Vec2::polar(Angle::new(status.movement_direction), status.speed),
            energy: status.energy,
            health: status.health,
            shield: status.shield,
        }
    }
}

/// エネルギーコスト（一回分 + 毎秒）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyCost {
    pub once: f64,
    pub per_second: f64,
}

/// シミュレーター上のコマンド効果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEffect {
    /// 残り回転量（度、符号付き）
    Rotate { left_degrees: f64 },
    Thrust { direction: Direction, power: f64 },
    /// 目標速度は開始時の速度から決まる
    Brake { percent: f64, target_speed: Option<f64> },
    /// 残り操舵量（度、符号付き）
    Steer { left_degrees: f64 },
    Radar { level: ScanLevel },
    Fire { direction: Direction },
    Idle,
    Repair { amount: u32 },
}

/// 飛行中のコマンド
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedCommand {
    pub effect: SimEffect,
    /// 残り時間（秒）
    pub remaining: f64,
    pub cost: EnergyCost,
    pub blocking: bool,
    pub started: bool,
}

impl SimulatedCommand {
    /// 送信コマンドから効果・所要時間・コストを組み立てる
    pub fn from_command(command: &ShipCommand, model: &PhysicsModel) -> Self {
        let (effect, remaining, cost) = match *command {
            ShipCommand::Rotate { degrees } => (
                SimEffect::Rotate { left_degrees: degrees as f64 },
                (degrees as f64).abs() / model.turn_rate_deg_s,
                EnergyCost { once: 0.0, per_second: model.rotate_cost_per_s },
            ),
            ShipCommand::Thrust { direction, duration, power, .. } => (
                SimEffect::Thrust { direction, power },
                duration,
                EnergyCost { once: 0.0, per_second: model.thrust_cost_per_s * power },
            ),
            ShipCommand::Brake { percent } => (
                SimEffect::Brake { percent, target_speed: None },
                f64::INFINITY,
                EnergyCost { once: 0.0, per_second: model.brake_cost_per_s },
            ),
            ShipCommand::Steer { degrees, .. } => (
                SimEffect::Steer { left_degrees: degrees as f64 },
                (degrees as f64).abs() / model.steer_rate_deg_s,
                EnergyCost { once: 0.0, per_second: model.steer_cost_per_s },
            ),
            ShipCommand::RadarScan { level, .. } => (
                SimEffect::Radar { level },
                level.duration(),
                EnergyCost { once: 0.0, per_second: model.radar_cost_per_s },
            ),
            ShipCommand::FireTorpedo { direction } => (
                SimEffect::Fire { direction },
                model.torpedo_duration_s,
                EnergyCost { once: model.fire_cost, per_second: 0.0 },
            ),
            ShipCommand::Idle { duration } => (SimEffect::Idle, duration, EnergyCost::default()),
            ShipCommand::Repair { amount } => (
                SimEffect::Repair { amount },
                amount as f64 * model.repair_s_per_point,
                EnergyCost { once: amount as f64 * model.repair_cost_per_point, per_second: 0.0 },
            ),
        };

        Self {
            effect,
            remaining,
            cost,
            blocking: command.is_blocking(),
            started: false,
        }
    }

    fn finished(&self) -> bool {
        match self.effect {
            SimEffect::Rotate { left_degrees } | SimEffect::Steer { left_degrees } => left_degrees.abs() < EPSILON,
            _ => self.remaining <= EPSILON,
        }
    }
}

/// 1ティック分の物理効果を適用
fn apply_effect(command: &mut SimulatedCommand, state: &mut SimState, model: &PhysicsModel, dt: f64) {
    match &mut command.effect {
        SimEffect::Rotate { left_degrees } => {
            let step = left_degrees.signum() * left_degrees.abs().min(model.turn_rate_deg_s * dt);
            state.heading = state.heading + Angle::new(step);
            *left_degrees -= step;
        }
        SimEffect::Thrust { direction, power } => {
            let accel = direction.vec().rotate(state.heading) * (model.thrust_accel * *power);
            state.velocity = state.velocity + accel * dt;
        }
        SimEffect::Brake { percent, target_speed } => {
            let speed = state.velocity.length();
            let target = *target_speed.get_or_insert(speed * percent.clamp(0.0, 1.0));
            let next = (speed - model.brake_decel * dt).max(target);
            state.velocity = if speed > 0.0 { state.velocity * (next / speed) } else { Vec2::ZERO };
            if next <= target {
                command.remaining = 0.0;
            }
        }
        SimEffect::Steer { left_degrees } => {
            let step = left_degrees.signum() * left_degrees.abs().min(model.steer_rate_deg_s * dt);
            state.velocity = state.velocity.rotate(Angle::new(step));
            *left_degrees -= step;
        }
        SimEffect::Repair { amount } => {
            let duration = *amount as f64 * model.repair_s_per_point;
            if duration > 0.0 {
                state.health = (state.health + *amount as f64 * dt / duration).min(100.0);
            }
        }
        SimEffect::Radar { .. } | SimEffect::Fire { .. } | SimEffect::Idle => {}
    }
}

/// 1ティック進める（決定的）
///
/// # 引数
///
/// * `state` - 予測中の運動状態
/// * `commands` - 飛行中のコマンド列（完了・エネルギー切れのものは除去される）
/// * `model` - 運動・エネルギーモデル
/// * `dt` - ティック周期（秒）
pub fn tick(state: &mut SimState, commands: &mut VecDeque<SimulatedCommand>, model: &PhysicsModel, dt: f64) {
    commands.retain_mut(|command| {
        if !command.started {
            if state.energy < command.cost.once {
                debug!(
                    energy = state.energy,
                    required = command.cost.once,
                    "SIM_COMMAND_DROPPED: 開始時のエネルギーが不足しています"
                );
                return false;
            }
            state.energy -= command.cost.once;
            command.started = true;
            return true;
        }

        let ongoing = command.cost.per_second * dt;
        if state.energy < ongoing {
            debug!(
                energy = state.energy,
                required = ongoing,
                "SIM_COMMAND_DROPPED: 継続中のエネルギーが尽きました"
            );
            return false;
        }
        state.energy -= ongoing;
        apply_effect(command, state, model, dt);
        command.remaining -= dt;

        !command.finished()
    });

    let moved = state.position + state.velocity * dt;
    state.position = Vec2::new(
        math_utils::wrap(moved.x, model.world_width),
        math_utils::wrap(moved.y, model.world_height),
    );
    state.energy = (state.energy + model.energy_regen_per_s * dt).min(model.energy_cap);
}

/// 飛行中コマンドのキュー
///
/// 容量を超えたら最も古いコマンドから捨てます。
#[derive(Debug, Clone)]
pub struct CommandQueue {
    commands: VecDeque<SimulatedCommand>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, command: SimulatedCommand) {
        while self.commands.len() >= self.capacity {
            if let Some(evicted) = self.commands.pop_front() {
                trace!(effect = ?evicted.effect, "SIM_QUEUE_EVICT: 最古のコマンドを破棄しました");
            }
        }
        self.commands.push_back(command);
    }

    /// ブロッキングコマンドをすべて除去
    pub fn unblock(&mut self) -> usize {
        let before = self.commands.len();
        self.commands.retain(|command| !command.blocking);
        before - self.commands.len()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimulatedCommand> {
        self.commands.iter()
    }

    fn inner_mut(&mut self) -> &mut VecDeque<SimulatedCommand> {
        &mut self.commands
    }
}

/// 予測シミュレーター本体
#[derive(Debug, Clone)]
pub struct Simulator {
    pub state: SimState,
    pub queue: CommandQueue,
    pub model: PhysicsModel,
    pub dt: f64,
    pub step_count: u64,
}

impl Simulator {
    pub fn new(model: PhysicsModel, dt: f64, queue_capacity: usize) -> Self {
        Self {
            state: SimState::default(),
            queue: CommandQueue::new(queue_capacity),
            model,
            dt,
            step_count: 0,
        }
    }

    /// 1ティック進める
    pub fn step(&mut self) {
        let dt = self.dt;
        tick(&mut self.state, self.queue.inner_mut(), &self.model, dt);
        self.step_count += 1;
    }

    /// 送信したコマンドを飛行中リストへ加える
    pub fn submit(&mut self, command: &ShipCommand) {
        self.queue.push(SimulatedCommand::from_command(command, &self.model));
    }

    /// 権威あるスナップショットに再同期
    ///
    /// ブロッキングコマンドはサーバー側で完了済みのため破棄します。
    pub fn resync(&mut self, status: &ShipStatus) {
        self.state = SimState::from(status);
        let dropped = self.queue.unblock();
        trace!(dropped, pending = self.queue.len(), "SIM_RESYNC: 予測状態を再同期しました");
    }
}

/// シミュレータースレッドの制御ハンドル
#[derive(Debug)]
pub struct SimulatorThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatorThread {
    /// 固定周期ループを専用スレッドで開始
    ///
    /// ループはtokioのインターバルで駆動し、周期超過時は追いつくまで
    /// 待たずに次のティックを実行します（バックログは溜めない）。
    pub fn spawn(simulator: Arc<Mutex<Simulator>>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let dt = simulator.lock().map(|sim| sim.dt).unwrap_or(0.05);
        let period = match Duration::try_from_secs_f64(dt) {
            Ok(period) if !period.is_zero() => period,
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid simulator tick period: {}", dt),
                ));
            }
        };

        let handle = thread::Builder::new().name("simulator".to_string()).spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "SIM_RUNTIME_FAILED: シミュレーターのランタイムを構築できません");
                    return;
                }
            };
            runtime.block_on(run_loop(simulator, flag, period));
        })?;

        info!(period_s = dt, "SIM_STARTED: 予測シミュレーターを開始しました");
        Ok(Self { running, handle: Some(handle) })
    }

    /// ループを停止してスレッドの終了を待つ
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatorThread {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(simulator: Arc<Mutex<Simulator>>, running: Arc<AtomicBool>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while running.load(Ordering::SeqCst) {
        interval.tick().await;
        let started = Instant::now();
        {
            let Ok(mut sim) = simulator.lock() else {
                warn!("SIM_LOCK_POISONED: シミュレーターのロックが壊れています");
                return;
            };
            sim.step();
        }
        let elapsed = started.elapsed();
        if elapsed > period {
            warn!(
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = period.as_secs_f64() * 1000.0,
                "SIM_TICK_OVERRUN: ティック処理が周期を超過しました"
            );
        }
    }
    info!("SIM_STOPPED: 予測シミュレーターを停止しました");
}
