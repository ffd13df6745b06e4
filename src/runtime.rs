//! # Runtime モジュール
//!
//! 戦略コードを「コマンドを出して次のスナップショットを待つ」逐次プログラムとして動かす
//! 制御ランタイムです。
//!
//! サーバーは1ティックごとにスナップショットを届け、未処理のコマンドを1つだけ受け付けます。
//! ランタイムは2つの [`Rendezvous`] でイベントスレッドとロジックスレッドを橋渡しし、
//! 戦略コードからは [`Control::yield_command`] の内側でだけブロックするように見せます。
//!
//! ## スレッド構成
//!
//! - **イベントスレッド**: トランスポートが [`EventHandle::next_command`] を呼ぶスレッド
//! - **ロジックスレッド**: [`ShipComputer`] を実行するスレッド（`ship-logic`）
//! - **シミュレータースレッド**: 固定周期で予測を進めるスレッド（`simulator`）
//!
//! イベントスレッドとシミュレータースレッドは同じロックでシミュレーターを共有し、
//! ティックがコマンド列の更新途中を観測することはありません。
//!
//! ## 状態遷移
//!
//! `AwaitingFirstSnapshot` → `Running` → `Idling`
//!
//! 戦略コードが戻った後は、プロトコルを維持するためにアイドルを送り続けます。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::avoidance::{AvoidanceEngine, AvoidanceReport};
use crate::config::ClientConfig;
use crate::intercept::{InterceptEngine, InterceptSolution};
use crate::models::command::{ScanLevel, ShipCommand};
use crate::models::common::{Angle, Direction, Vec2, math_utils};
use crate::models::expiring::Clock;
use crate::models::snapshot::{Environment, ShipState};
use crate::models::unit::PerceivedUnit;
use crate::models::unit_set::UnitSet;
use crate::radar::{RadarMemory, ScanPlan};
use crate::rendezvous::Rendezvous;
use crate::simulator::{SimState, Simulator, SimulatorThread};

/// 成分推進を出す最小の成分の大きさ
const THRUST_COMPONENT_MIN: f64 = 0.1;

/// 戦略コード
///
/// `run` は通常ループし続けて戻りません。戻った場合、ランタイムはアイドル状態へ移ります。
pub trait ShipComputer: Send + 'static {
    fn run(&mut self, control: &mut Control);
}

impl<F> ShipComputer for F
where
    F: FnMut(&mut Control) + Send + 'static,
{
    fn run(&mut self, control: &mut Control) {
        self(control)
    }
}

/// 人間向けの状態表示の出力先
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);
}

/// 状態表示をログへ流す既定の出力先
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn status(&self, text: &str) {
        info!(status = text, "AGENT_STATUS: 状態表示を更新しました");
    }
}

/// 描画フック
///
/// 受け取るフレームは読み取り専用で、制御フローには影響しません。
pub trait Overlay {
    fn paint(&mut self, frame: &Frame);
}

impl<F> Overlay for F
where
    F: FnMut(&Frame),
{
    fn paint(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// ダッシュボード用のフレーム
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// これまでに受け取ったスナップショット数
    pub tick: u64,
    pub status: Option<String>,
    pub ship: Option<ShipState>,
    /// シミュレーターの予測状態（描画時に取得）
    pub predicted: Option<SimState>,
    pub avoidance: Option<AvoidanceReport>,
    pub intercept: Option<InterceptSolution>,
    pub destroyed: Option<String>,
}

/// 制御ランタイムの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeState {
    #[default]
    AwaitingFirstSnapshot,
    Running,
    Idling,
}

/// イベントスレッド側に返るエラー
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// セッションは撃破通知で終了済み
    Destroyed(String),
    /// ロジックスレッドがパニックで停止した
    LogicFailed,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Destroyed(cause) => write!(f, "自機は撃破済みです: {}", cause),
            RuntimeError::LogicFailed => write!(f, "戦略スレッドが異常終了しました"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// スレッド間で共有する状態
#[derive(Debug)]
struct Shared {
    snapshots: Rendezvous<Environment>,
    commands: Rendezvous<ShipCommand>,
    state: AtomicCell<RuntimeState>,
    failed: AtomicBool,
    destroyed: OnceLock<String>,
    telemetry: Mutex<Frame>,
}

impl Shared {
    fn new() -> Self {
        Self {
            snapshots: Rendezvous::new(),
            commands: Rendezvous::new(),
            state: AtomicCell::new(RuntimeState::AwaitingFirstSnapshot),
            failed: AtomicBool::new(false),
            destroyed: OnceLock::new(),
            telemetry: Mutex::new(Frame::default()),
        }
    }

    fn record(&self, update: impl FnOnce(&mut Frame)) {
        match self.telemetry.lock() {
            Ok(mut frame) => update(&mut frame),
            Err(_) => warn!("TELEMETRY_LOCK_POISONED: フレームのロックが壊れています"),
        }
    }
}

/// 期限（セッション時刻）
#[derive(Debug, Clone, Copy, PartialEq)]
struct Deadline {
    at: f64,
}

impl Deadline {
    fn after(now: f64, timeout: f64) -> Self {
        Self { at: now + timeout }
    }

    fn passed(&self, now: f64) -> bool {
        now >= self.at
    }
}

/// 戦略コードに渡す制御インターフェース
///
/// 自機状態は `yield` の境界でだけ更新され、次の `yield` まで変化しません。
pub struct Control {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn StatusSink>,
    env: Environment,
    ship: ShipState,
    radar: RadarMemory,
    avoidance: AvoidanceEngine,
    intercept: InterceptEngine,
    escape_thrust_s: f64,
    brake_decel: f64,
    idle_s: f64,
}

impl Control {
    fn new(shared: Arc<Shared>, config: &ClientConfig, clock: Arc<dyn Clock>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            shared,
            clock,
            sink,
            env: Environment::default(),
            ship: ShipState::default(),
            radar: RadarMemory::new(config.perception.ttl),
            avoidance: AvoidanceEngine::new(config.avoidance.ship_radius),
            intercept: InterceptEngine::new(config.intercept.torpedo_speed, config.intercept.lead_multiplier),
            escape_thrust_s: config.avoidance.escape_thrust_s,
            brake_decel: config.simulator.physics.brake_decel,
            idle_s: config.runtime.idle_s,
        }
    }

    /// コマンドを送り、次のスナップショットまでブロックする
    ///
    /// ロジックスレッドからコマンドが出ていく唯一の経路です。
    pub fn yield_command(&mut self, command: ShipCommand) -> ShipState {
        trace!(command = %command, "RUNTIME_YIELD: コマンドを送信しました");
        self.shared.commands.resolve(command);
        let env = self.shared.snapshots.wait();
        self.absorb(env);
        self.ship
    }

    fn absorb(&mut self, env: Environment) {
        self.ship = ShipState::from(&env.ship);
        self.env = env;
        let ship = self.ship;
        self.shared.record(|frame| {
            frame.tick += 1;
            frame.ship = Some(ship);
        });
    }

    /// 直近のスナップショット時点の自機状態
    pub fn ship(&self) -> &ShipState {
        &self.ship
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn radar(&self) -> &RadarMemory {
        &self.radar
    }

    /// 状態表示を更新
    pub fn status(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.sink.status(&text);
        self.shared.record(|frame| frame.status = Some(text));
    }

    // ---- 運動 ----

    /// 機首を相対角度だけ回転（0度なら何もしない）
    pub fn rotate(&mut self, offset: Angle) {
        let degrees = offset.deg().round() as i32;
        if degrees == 0 {
            return;
        }
        self.yield_command(ShipCommand::Rotate { degrees });
    }

    /// 機首を絶対角度へ向ける
    pub fn rotate_to(&mut self, angle: Angle) {
        self.rotate(angle - self.ship.angle);
    }

    /// 機首を指定地点へ向ける
    pub fn face(&mut self, point: Vec2) {
        self.rotate_to(self.ship.position.angle_to(point));
    }

    /// 機体座標系で推進
    ///
    /// 正規化した方向を前後成分と左右成分に分け、大きさが閾値以上の成分ごとに
    /// 推進コマンドを出します。呼び出し側のブロッキング指定は最後の成分だけに付きます。
    ///
    /// # 引数
    ///
    /// * `direction` - 機体座標系の方向（x: 前方、y: 右方）
    /// * `duration` - 噴射時間（秒）
    /// * `power` - 出力（0.0〜1.0）
    /// * `blocking` - 完了までサーバーの応答を待つか
    pub fn thrust(&mut self, direction: Vec2, duration: f64, power: f64, blocking: bool) {
        let unit = direction.normalize();
        if !unit.is_finite() {
            debug!("THRUST_SKIPPED: 推進方向がゼロベクトルです");
            return;
        }

        let mut parts = Vec::with_capacity(2);
        if unit.x.abs() >= THRUST_COMPONENT_MIN {
            parts.push((Direction::Forward.unsign(unit.x), unit.x.abs()));
        }
        if unit.y.abs() >= THRUST_COMPONENT_MIN {
            parts.push((Direction::Right.unsign(unit.y), unit.y.abs()));
        }

        let last = parts.len().saturating_sub(1);
        for (index, (direction, share)) in parts.into_iter().enumerate() {
            self.yield_command(ShipCommand::Thrust {
                direction,
                duration,
                power: power * share,
                blocking: blocking && index == last,
            });
        }
    }

    /// ワールド座標系の方向へ推進
    pub fn thrust_global(&mut self, direction: Vec2, duration: f64, power: f64, blocking: bool) {
        let local = direction.rotate(-self.ship.angle);
        self.thrust(local, duration, power, blocking);
    }

    /// 機首を変えずに速度ベクトルを相対角度だけ回転
    pub fn steer(&mut self, offset: Angle, blocking: bool) {
        let degrees = offset.deg().round() as i32;
        if degrees == 0 {
            return;
        }
        self.yield_command(ShipCommand::Steer { degrees, blocking });
    }

    /// 速度ベクトルを絶対角度へ向ける
    pub fn steer_to(&mut self, angle: Angle, blocking: bool) {
        self.steer(angle - self.ship.velocity.angle(), blocking);
    }

    /// 速度ベクトルを指定地点へ向ける
    pub fn steer_to_face(&mut self, point: Vec2, blocking: bool) {
        self.steer_to(self.ship.position.angle_to(point), blocking);
    }

    /// 現在速度の `percent` 倍まで減速
    pub fn brake(&mut self, percent: f64) {
        self.yield_command(ShipCommand::Brake { percent });
    }

    pub fn stop(&mut self) {
        self.brake(0.0);
    }

    /// 魚雷を発射（前方・後方のみ）
    pub fn fire(&mut self, direction: Direction) {
        match direction {
            Direction::Forward | Direction::Back => {
                self.yield_command(ShipCommand::FireTorpedo { direction });
            }
            Direction::Left | Direction::Right => {
                panic!("torpedoes can only be fired forward or back, got {:?}", direction)
            }
        }
    }

    pub fn idle(&mut self, seconds: f64) {
        self.yield_command(ShipCommand::Idle { duration: seconds });
    }

    pub fn repair(&mut self, amount: u32) {
        self.yield_command(ShipCommand::Repair { amount });
    }

    /// 指定地点へ加速し、停止距離に入るか期限が切れたらブレーキをかける
    ///
    /// `face_target` が有効なら毎回機首を目標へ向け直して前方へ推進し、
    /// 無効なら機首を変えずに目標方向へワールド座標系で推進します。
    /// どちらの終わり方でも最後に停止指令を出します。
    ///
    /// # 戻り値
    ///
    /// 停止距離に入った場合は `true`、期限切れは `false`
    pub fn glide(&mut self, target: Vec2, max_speed: f64, face_target: bool, thrust_s: f64, timeout: f64) -> bool {
        let deadline = Deadline::after(self.now(), timeout);
        let mut arrived = false;

        while !deadline.passed(self.now()) {
            if face_target {
                self.face(target);
            }

            let distance = self.ship.position.dist(target);
            let stopping = math_utils::deceleration_distance(self.ship.speed, self.brake_decel);
            if distance <= stopping {
                debug!(distance, stopping, "GLIDE_ARRIVED: 停止距離に入りました");
                arrived = true;
                break;
            }

            if self.ship.speed >= max_speed {
                self.idle(thrust_s);
            } else if face_target {
                self.thrust(Direction::Forward.vec(), thrust_s, 1.0, true);
            } else {
                self.thrust_global(target - self.ship.position, thrust_s, 1.0, true);
            }
        }

        if !arrived {
            debug!(distance = self.ship.position.dist(target), "GLIDE_TIMEOUT: 到着前に期限が切れました");
        }
        self.stop();
        arrived
    }

    // ---- 待機 ----

    /// 条件が満たされるまで `interval` 秒ずつアイドルする
    ///
    /// # 戻り値
    ///
    /// 条件が満たされたら `true`、期限切れなら `false`
    pub fn until<F>(&mut self, mut condition: F, interval: f64, timeout: f64) -> bool
    where
        F: FnMut(&Control) -> bool,
    {
        let deadline = Deadline::after(self.now(), timeout);
        loop {
            if condition(self) {
                return true;
            }
            if deadline.passed(self.now()) {
                return false;
            }
            self.idle(interval);
        }
    }

    /// 観測値が変化するまで待つ
    pub fn until_change<T, F>(&mut self, value: F, interval: f64, timeout: f64) -> bool
    where
        T: PartialEq,
        F: Fn(&Control) -> T,
    {
        let initial = value(self);
        self.until(|control| value(control) != initial, interval, timeout)
    }

    /// エネルギーが `amount` 以上になるまで待つ
    pub fn until_sufficient_energy(&mut self, amount: f64, interval: f64, timeout: f64) -> bool {
        self.until(|control| control.ship.energy >= amount, interval, timeout)
    }

    // ---- レーダー ----

    /// スキャンして結果を知覚メモリへ統合
    ///
    /// 結果が無い場合は `None`（新しい情報なし）を返します。
    pub fn scan(&mut self, level: ScanLevel, target: Option<u32>) -> Option<UnitSet> {
        self.yield_command(ShipCommand::RadarScan { level, target });
        let now = self.now();
        self.radar.push_results(self.env.radar.as_ref(), level, now)
    }

    /// L1: 周辺物体の数
    pub fn radar_count(&mut self) -> Option<usize> {
        self.scan(ScanLevel::Count, None)?;
        self.radar.last_count()
    }

    /// L2: IDと位置
    pub fn scan_blind(&mut self) -> Option<UnitSet> {
        self.scan(ScanLevel::Blind, None)
    }

    /// L3: 指定IDの全情報
    pub fn scan_target(&mut self, id: u32) -> Option<PerceivedUnit> {
        self.scan(ScanLevel::Target, Some(id))?.get(id).cloned()
    }

    /// L4: ID・種類・位置
    pub fn scan_extended(&mut self) -> Option<UnitSet> {
        self.scan(ScanLevel::Extended, None)
    }

    /// L5: 全情報
    pub fn scan_full(&mut self) -> Option<UnitSet> {
        self.scan(ScanLevel::Full, None)
    }

    /// 集合の全要素を安い方法で再スキャン
    ///
    /// # 戻り値
    ///
    /// 再スキャンで情報が得られた要素の集合
    pub fn scan_all(&mut self, set: &UnitSet) -> Option<UnitSet> {
        match RadarMemory::plan_scan_all(set) {
            ScanPlan::Nothing => Some(UnitSet::new()),
            ScanPlan::Individual(ids) => {
                let refreshed = ids.into_iter().filter_map(|id| self.scan_target(id)).collect();
                Some(refreshed)
            }
            ScanPlan::Group => self.scan_full().map(|seen| seen.intersect(set)),
        }
    }

    /// 指定IDをL3で再スキャンし、情報が得られたら `true`
    pub fn refresh(&mut self, id: u32) -> bool {
        self.scan_target(id).is_some()
    }

    // ---- 回避・照準 ----

    fn hazard(&self, id: u32) -> Option<(Vec2, f64)> {
        let now = self.now();
        let unit = self.radar.get(id)?;
        Some((*unit.position.get(now)?, unit.avoidance_radius(now)?))
    }

    fn track(&self, id: u32) -> Option<(Vec2, Vec2)> {
        let now = self.now();
        let unit = self.radar.get(id)?;
        Some((*unit.position.get(now)?, *unit.velocity.get(now)?))
    }

    /// 指定物体の回避を評価
    ///
    /// 位置・半径が古ければL3で再スキャンし、それでも得られなければ `None` を返します。
    pub fn avoid(&mut self, unit_id: u32) -> Option<AvoidanceReport> {
        let mut hazard = self.hazard(unit_id);
        if hazard.is_none() {
            debug!(unit_id, "AVOID_RESCAN: 回避対象の情報が古いため再スキャンします");
            if !self.refresh(unit_id) {
                return None;
            }
            hazard = self.hazard(unit_id);
        }
        let (center, radius) = hazard?;

        let report = self.avoidance.assess(&self.ship, unit_id, center, radius);
        self.shared.record(|frame| frame.avoidance = report);
        report
    }

    /// 回避レポートを実行
    ///
    /// 通常は接線方位へ1回操舵します。脱出時は危険半径の外へ出るまで
    /// 中心から離れる方向へのブロッキング推進を繰り返します。
    pub fn execute_avoidance(&mut self, report: &AvoidanceReport) {
        if !report.escape {
            self.steer_to(report.steer, true);
            return;
        }

        info!(target_id = report.target_id, "AVOID_ESCAPE_BURN: 危険半径から脱出します");
        while self.ship.position.dist(report.center) <= report.combined_radius {
            let away = self.ship.position - report.center;
            let away = if away.length2() > 0.0 { away } else { Vec2::polar(self.ship.angle, 1.0) };
            self.thrust_global(away, self.escape_thrust_s, 1.0, true);
        }
    }

    /// 指定物体への照準点を計算
    pub fn intercept_unit(&mut self, unit_id: u32) -> Option<InterceptSolution> {
        let mut track = self.track(unit_id);
        if track.is_none() {
            if !self.refresh(unit_id) {
                return None;
            }
            track = self.track(unit_id);
        }
        let (position, velocity) = track?;

        let solution = self.intercept.solve(self.ship.position, self.ship.angle, self.ship.velocity, position, velocity);
        self.shared.record(|frame| frame.intercept = Some(solution));
        Some(solution)
    }

    /// 照準点へ機首を向けて前方へ発射
    ///
    /// # 戻り値
    ///
    /// 発射した場合は `true`、照準点が得られない・不正な場合は `false`
    pub fn engage(&mut self, unit_id: u32) -> bool {
        let Some(solution) = self.intercept_unit(unit_id) else {
            return false;
        };
        if !solution.is_valid() {
            debug!(unit_id, discriminant = solution.discriminant, "INTERCEPT_INVALID: 照準点が不正です");
            return false;
        }
        self.face(solution.aim);
        self.fire(Direction::Forward);
        true
    }
}

/// ロジックスレッドの異常終了をイベントスレッドへ伝える
struct PanicGuard {
    shared: Arc<Shared>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("RUNTIME_PANIC: 戦略スレッドがパニックしました");
            self.shared.failed.store(true, Ordering::SeqCst);
            // 待機中のイベントスレッドを起こす
            self.shared.commands.resolve(ShipCommand::Idle { duration: 0.0 });
        }
    }
}

fn run_logic<A: ShipComputer>(mut agent: A, mut control: Control) {
    let _guard = PanicGuard {
        shared: Arc::clone(&control.shared),
    };

    info!("RUNTIME_WAITING: 最初のスナップショットを待っています");
    let env = control.shared.snapshots.wait();
    control.absorb(env);
    control.shared.state.store(RuntimeState::Running);
    info!("RUNTIME_RUNNING: 戦略コードを開始しました");

    agent.run(&mut control);

    control.shared.state.store(RuntimeState::Idling);
    info!(idle_s = control.idle_s, "RUNTIME_IDLING: 戦略コードが終了したためアイドルを続けます");
    let idle = ShipCommand::Idle { duration: control.idle_s };
    loop {
        control.yield_command(idle.clone());
    }
}

/// 制御ランタイムの起動口
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlRuntime;

impl ControlRuntime {
    /// ロジックスレッドとシミュレータースレッドを開始
    ///
    /// # 引数
    ///
    /// * `agent` - 戦略コード
    /// * `config` - クライアント設定
    /// * `clock` - セッション時刻の供給源
    /// * `sink` - 状態表示の出力先
    pub fn spawn<A: ShipComputer>(
        agent: A,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn StatusSink>,
    ) -> std::io::Result<EventHandle> {
        let shared = Arc::new(Shared::new());
        let simulator = Arc::new(Mutex::new(Simulator::new(
            config.simulator.physics,
            config.simulator.tick_s,
            config.simulator.queue_capacity,
        )));
        let simulator_thread = SimulatorThread::spawn(Arc::clone(&simulator))?;

        let control = Control::new(Arc::clone(&shared), config, clock, sink);
        let logic = thread::Builder::new()
            .name("ship-logic".to_string())
            .spawn(move || run_logic(agent, control))?;

        info!(
            tick_s = config.simulator.tick_s,
            queue_capacity = config.simulator.queue_capacity,
            "RUNTIME_SPAWNED: 制御ランタイムを開始しました"
        );

        Ok(EventHandle {
            shared,
            simulator,
            simulator_thread: Mutex::new(simulator_thread),
            logic,
        })
    }
}

/// イベントスレッド側のハンドル
#[derive(Debug)]
pub struct EventHandle {
    shared: Arc<Shared>,
    simulator: Arc<Mutex<Simulator>>,
    simulator_thread: Mutex<SimulatorThread>,
    logic: JoinHandle<()>,
}

impl EventHandle {
    /// スナップショットを渡し、戦略コードの次のコマンドを受け取る
    ///
    /// サーバーの1ティックごとに1回呼びます。シミュレーターを再同期してから
    /// スナップショットを届け、返ってきたコマンドをシミュレーターへも投入します。
    pub fn next_command(&self, env: Environment) -> Result<ShipCommand, RuntimeError> {
        if let Some(cause) = self.shared.destroyed.get() {
            return Err(RuntimeError::Destroyed(cause.clone()));
        }
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(RuntimeError::LogicFailed);
        }

        match self.simulator.lock() {
            Ok(mut sim) => sim.resync(&env.ship),
            Err(_) => warn!("SIM_LOCK_POISONED: シミュレーターのロックが壊れています"),
        }

        self.shared.snapshots.resolve(env);
        let command = self.shared.commands.wait();

        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(RuntimeError::LogicFailed);
        }

        if let Ok(mut sim) = self.simulator.lock() {
            sim.submit(&command);
        }
        trace!(command = %command, "RUNTIME_COMMAND: コマンドを受け取りました");
        Ok(command)
    }

    /// 撃破通知（最初の1回だけ有効）
    pub fn destroyed(&self, cause: &str) {
        if self.shared.destroyed.set(cause.to_string()).is_err() {
            debug!(cause, "SHIP_DESTROYED_REPEAT: 撃破通知は処理済みです");
            return;
        }

        error!(cause, "SHIP_DESTROYED: 自機が撃破されました");
        self.shared.record(|frame| frame.destroyed = Some(cause.to_string()));
        if let Ok(mut thread) = self.simulator_thread.lock() {
            thread.stop();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.get().is_some()
    }

    pub fn state(&self) -> RuntimeState {
        self.shared.state.load()
    }

    /// 戦略スレッドが終了しているか（パニック時のみ終了する）
    pub fn logic_finished(&self) -> bool {
        self.logic.is_finished()
    }

    /// シミュレーターの予測状態
    pub fn predicted(&self) -> Option<SimState> {
        self.simulator.lock().ok().map(|sim| sim.state)
    }

    /// 現在のフレーム
    pub fn frame(&self) -> Frame {
        let mut frame = self.shared.telemetry.lock().map(|frame| frame.clone()).unwrap_or_default();
        frame.predicted = self.predicted();
        frame
    }

    /// 現在のフレームを描画フックへ渡す
    pub fn paint(&self, overlay: &mut dyn Overlay) {
        overlay.paint(&self.frame());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::expiring::ManualClock;
    use crate::models::snapshot::{ObjectStatus, RadarResults, ShipStatus};
    use crate::models::unit::UnitKind;
    use approx::assert_abs_diff_eq;
    use crossbeam::channel;

    fn env_with(position: Vec2, speed: f64, movement_direction: f64, energy: f64) -> Environment {
        Environment {
            ship: ShipStatus {
                position,
                orientation: 0.0,
                speed,
                movement_direction,
                health: 100.0,
                shield: 0.0,
                energy,
            },
            ..Default::default()
        }
    }

    fn resting() -> Environment {
        env_with(Vec2::new(100.0, 100.0), 0.0, 0.0, 100.0)
    }

    fn spawn<A: ShipComputer>(agent: A, clock: &ManualClock) -> EventHandle {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        ControlRuntime::spawn(agent, &ClientConfig::default(), clock, Arc::new(TracingStatus)).expect("runtime spawns")
    }

    #[test]
    fn test_commands_follow_agent_sequence() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(
            |c: &mut Control| {
                c.rotate(Angle::new(30.4));
                c.rotate(Angle::ZERO);
                c.thrust(Vec2::new(1.0, 1.0), 0.5, 1.0, true);
                c.fire(Direction::Back);
            },
            &clock,
        );
        assert_eq!(handle.state(), RuntimeState::AwaitingFirstSnapshot);

        assert_eq!(handle.next_command(resting()), Ok(ShipCommand::Rotate { degrees: 30 }));
        assert_eq!(handle.state(), RuntimeState::Running);

        let Ok(ShipCommand::Thrust { direction, power, blocking, .. }) = handle.next_command(resting()) else {
            panic!("forward component expected");
        };
        assert_eq!(direction, Direction::Forward);
        assert_abs_diff_eq!(power, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert!(!blocking);

        let Ok(ShipCommand::Thrust { direction, blocking, .. }) = handle.next_command(resting()) else {
            panic!("lateral component expected");
        };
        assert_eq!(direction, Direction::Right);
        assert!(blocking);

        assert_eq!(
            handle.next_command(resting()),
            Ok(ShipCommand::FireTorpedo { direction: Direction::Back })
        );
        assert_eq!(handle.next_command(resting()), Ok(ShipCommand::Idle { duration: 0.1 }));
        assert_eq!(handle.state(), RuntimeState::Idling);
        assert_eq!(handle.frame().tick, 5);
    }

    #[test]
    fn test_small_thrust_component_is_skipped() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(|c: &mut Control| c.thrust(Vec2::new(-1.0, 0.05), 1.0, 0.5, false), &clock);
        let Ok(ShipCommand::Thrust { direction, power, .. }) = handle.next_command(resting()) else {
            panic!("thrust expected");
        };
        assert_eq!(direction, Direction::Back);
        assert!(power > 0.49);
        assert!(matches!(handle.next_command(resting()), Ok(ShipCommand::Idle { .. })));
    }

    #[test]
    fn test_until_times_out_against_clock() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let met = c.until(|_| false, 0.1, 0.35);
                let _ = tx.send(met);
            },
            &clock,
        );
        for _ in 0..10 {
            clock.advance(0.1);
            assert!(handle.next_command(resting()).is_ok());
        }
        assert_eq!(rx.try_recv().ok(), Some(false));
        assert_eq!(handle.state(), RuntimeState::Idling);
    }

    #[test]
    fn test_until_sufficient_energy_waits_for_snapshots() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                if c.until_sufficient_energy(50.0, 0.1, f64::INFINITY) {
                    let _ = tx.send(c.ship().energy);
                }
            },
            &clock,
        );
        for step in 1..=8 {
            let env = env_with(Vec2::ZERO, 0.0, 0.0, 10.0 * step as f64);
            assert!(handle.next_command(env).is_ok());
        }
        assert_eq!(rx.try_recv().ok(), Some(50.0));
    }

    #[test]
    fn test_scan_then_avoid_issues_tangent_steer() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let seen = c.scan_full().map(|set| set.ids());
                let _ = tx.send(seen.is_some_and(|ids| ids == vec![7]));
                if let Some(report) = c.avoid(7) {
                    c.execute_avoidance(&report);
                }
            },
            &clock,
        );

        let moving = || env_with(Vec2::new(100.0, 100.0), 5.0, 10.0, 100.0);
        assert_eq!(
            handle.next_command(moving()),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Full, target: None })
        );

        let mut scanned = moving();
        scanned.radar = Some(RadarResults {
            count: 1,
            objects: vec![ObjectStatus {
                id: 7,
                kind: Some(UnitKind::Asteroid),
                position: Some(Vec2::new(200.0, 100.0)),
                velocity: Some(Vec2::ZERO),
                hit_radius: Some(10.0),
                influence: Some(30.0),
                ..Default::default()
            }],
        });
        // 危険半径 30 + 28 = 58、距離100 → 偏向 asin(0.58) ≈ 35.45度
        assert_eq!(handle.next_command(scanned), Ok(ShipCommand::Steer { degrees: 25, blocking: true }));
        assert_eq!(rx.try_recv().ok(), Some(true));

        let frame = handle.frame();
        let report = frame.avoidance.expect("avoidance recorded");
        assert!(!report.escape);
        assert_abs_diff_eq!(report.deviation.deg(), 0.58f64.asin().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_avoid_rescans_stale_unit_and_gives_up_on_silence() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let _ = tx.send(c.avoid(3).is_none());
            },
            &clock,
        );
        assert_eq!(
            handle.next_command(resting()),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Target, target: Some(3) })
        );
        assert!(matches!(handle.next_command(resting()), Ok(ShipCommand::Idle { .. })));
        assert_eq!(rx.try_recv().ok(), Some(true));
    }

    #[test]
    fn test_status_reaches_sink_and_frame() {
        struct Recorder(Mutex<Vec<String>>);
        impl StatusSink for Recorder {
            fn status(&self, text: &str) {
                if let Ok(mut lines) = self.0.lock() {
                    lines.push(text.to_string());
                }
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0.0));
        let handle = ControlRuntime::spawn(
            |c: &mut Control| c.status("patrolling"),
            &ClientConfig::default(),
            clock,
            Arc::clone(&recorder) as Arc<dyn StatusSink>,
        )
        .expect("runtime spawns");

        assert!(handle.next_command(resting()).is_ok());
        let lines = recorder.0.lock().map(|l| l.clone()).unwrap_or_default();
        assert_eq!(lines, vec!["patrolling".to_string()]);

        let mut painted = None;
        handle.paint(&mut |frame: &Frame| painted = frame.status.clone());
        assert_eq!(painted.as_deref(), Some("patrolling"));
    }

    #[test]
    fn test_destroyed_is_terminal_and_first_call_wins() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(|c: &mut Control| c.idle(1.0), &clock);
        assert!(handle.next_command(resting()).is_ok());

        handle.destroyed("collision");
        handle.destroyed("torpedo");
        assert!(handle.is_destroyed());
        assert_eq!(handle.frame().destroyed.as_deref(), Some("collision"));
        assert_eq!(
            handle.next_command(resting()),
            Err(RuntimeError::Destroyed("collision".to_string()))
        );
    }

    #[test]
    fn test_logic_panic_surfaces_on_event_thread() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(|c: &mut Control| c.fire(Direction::Left), &clock);
        assert_eq!(handle.next_command(resting()), Err(RuntimeError::LogicFailed));
        assert_eq!(handle.next_command(resting()), Err(RuntimeError::LogicFailed));

        let mut waited = 0;
        while !handle.logic_finished() && waited < 200 {
            thread::sleep(std::time::Duration::from_millis(5));
            waited += 1;
        }
        assert!(handle.logic_finished());
    }

    #[test]
    fn test_idling_logic_thread_stays_alive() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(|_: &mut Control| {}, &clock);
        assert_eq!(handle.next_command(resting()), Ok(ShipCommand::Idle { duration: 0.1 }));
        assert_eq!(handle.state(), RuntimeState::Idling);
        assert!(!handle.logic_finished());
    }

    fn env_facing(position: Vec2, orientation: f64, speed: f64, movement_direction: f64) -> Environment {
        let mut env = env_with(position, speed, movement_direction, 100.0);
        env.ship.orientation = orientation;
        env
    }

    fn asteroid(id: u32, x: f64) -> ObjectStatus {
        ObjectStatus {
            id,
            kind: Some(UnitKind::Asteroid),
            position: Some(Vec2::new(x, 300.0)),
            velocity: Some(Vec2::ZERO),
            hit_radius: Some(5.0),
            ..Default::default()
        }
    }

    fn with_radar(mut env: Environment, objects: Vec<ObjectStatus>) -> Environment {
        env.radar = Some(RadarResults {
            count: objects.len(),
            objects,
        });
        env
    }

    #[test]
    fn test_glide_thrusts_toward_target_then_brakes_on_arrival() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let _ = tx.send(c.glide(Vec2::new(400.0, 100.0), 5.0, false, 0.5, 10.0));
            },
            &clock,
        );

        assert_eq!(
            handle.next_command(resting()),
            Ok(ShipCommand::Thrust {
                direction: Direction::Forward,
                duration: 0.5,
                power: 1.0,
                blocking: true,
            })
        );
        // 速度10の停止距離は約7.6、残り2で到着
        let near = env_with(Vec2::new(398.0, 100.0), 10.0, 0.0, 100.0);
        assert_eq!(handle.next_command(near), Ok(ShipCommand::Brake { percent: 0.0 }));
        assert!(matches!(handle.next_command(resting()), Ok(ShipCommand::Idle { .. })));
        assert_eq!(rx.try_recv().ok(), Some(true));
    }

    #[test]
    fn test_glide_brakes_when_deadline_passes() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let _ = tx.send(c.glide(Vec2::new(900.0, 100.0), 5.0, false, 0.5, 0.0));
            },
            &clock,
        );

        let cruising = env_with(Vec2::new(100.0, 100.0), 20.0, 0.0, 100.0);
        assert_eq!(handle.next_command(cruising), Ok(ShipCommand::Brake { percent: 0.0 }));
        assert!(matches!(handle.next_command(resting()), Ok(ShipCommand::Idle { .. })));
        assert_eq!(rx.try_recv().ok(), Some(false));
    }

    #[test]
    fn test_glide_facing_target_turns_then_thrusts_forward() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(
            |c: &mut Control| {
                c.glide(Vec2::new(100.0, 400.0), 5.0, true, 0.5, 10.0);
            },
            &clock,
        );

        let origin = Vec2::new(100.0, 100.0);
        assert_eq!(handle.next_command(env_facing(origin, 0.0, 0.0, 0.0)), Ok(ShipCommand::Rotate { degrees: 90 }));
        assert_eq!(
            handle.next_command(env_facing(origin, 90.0, 0.0, 0.0)),
            Ok(ShipCommand::Thrust {
                direction: Direction::Forward,
                duration: 0.5,
                power: 1.0,
                blocking: true,
            })
        );
        // 機首がずれていれば周回ごとに向き直す
        assert_eq!(
            handle.next_command(env_facing(Vec2::new(100.0, 200.0), 45.0, 2.0, 90.0)),
            Ok(ShipCommand::Rotate { degrees: 45 })
        );
    }

    #[test]
    fn test_until_change_returns_when_energy_changes() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let changed = c.until_change(|c: &Control| c.ship().energy, 0.1, 10.0);
                let _ = tx.send(changed);
            },
            &clock,
        );

        let at = |energy: f64| env_with(Vec2::ZERO, 0.0, 0.0, energy);
        assert_eq!(handle.next_command(at(50.0)), Ok(ShipCommand::Idle { duration: 0.1 }));
        assert_eq!(handle.next_command(at(50.0)), Ok(ShipCommand::Idle { duration: 0.1 }));
        assert!(rx.try_recv().is_err());
        assert!(handle.next_command(at(54.0)).is_ok());
        assert_eq!(rx.try_recv().ok(), Some(true));
    }

    #[test]
    fn test_scan_all_uses_individual_then_group_scans() {
        let clock = ManualClock::new(0.0);
        let (tx, rx) = channel::unbounded();
        let handle = spawn(
            move |c: &mut Control| {
                let seen = c.scan_full().unwrap_or_default();
                let pair = seen.filter(|unit| unit.id <= 2);
                let _ = tx.send(c.scan_all(&pair).map(|set| set.ids()));
                let _ = tx.send(c.scan_all(&seen).map(|set| set.ids()));
            },
            &clock,
        );

        let all: Vec<ObjectStatus> = (1..=5).map(|id| asteroid(id, id as f64 * 10.0)).collect();
        assert_eq!(
            handle.next_command(resting()),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Full, target: None })
        );
        assert_eq!(
            handle.next_command(with_radar(resting(), all.clone())),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Target, target: Some(1) })
        );
        assert_eq!(
            handle.next_command(with_radar(resting(), vec![all[0].clone()])),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Target, target: Some(2) })
        );
        assert_eq!(
            handle.next_command(with_radar(resting(), vec![all[1].clone()])),
            Ok(ShipCommand::RadarScan { level: ScanLevel::Full, target: None })
        );
        assert_eq!(rx.try_recv().ok(), Some(Some(vec![1, 2])));

        // 一括スキャンの結果は元の集合との積になる
        let partial = with_radar(resting(), all[..4].to_vec());
        assert!(matches!(handle.next_command(partial), Ok(ShipCommand::Idle { .. })));
        assert_eq!(rx.try_recv().ok(), Some(Some(vec![1, 2, 3, 4])));
    }

    #[test]
    fn test_steer_to_face_turns_velocity_toward_point() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(
            |c: &mut Control| {
                c.steer_to_face(Vec2::new(100.0, 200.0), true);
                c.steer_to_face(Vec2::new(200.0, 100.0), false);
            },
            &clock,
        );

        let moving = || env_with(Vec2::new(100.0, 100.0), 5.0, 0.0, 100.0);
        assert_eq!(handle.next_command(moving()), Ok(ShipCommand::Steer { degrees: 90, blocking: true }));
        // 既に目標へ進んでいれば操舵しない
        assert!(matches!(handle.next_command(moving()), Ok(ShipCommand::Idle { .. })));
    }

    #[test]
    fn test_thrust_global_rotates_into_ship_frame() {
        let clock = ManualClock::new(0.0);
        let handle = spawn(
            |c: &mut Control| {
                c.thrust_global(Vec2::new(0.0, 1.0), 0.5, 1.0, false);
                c.thrust_global(Vec2::new(-1.0, 0.0), 0.5, 1.0, true);
            },
            &clock,
        );

        // 機首が90度を向いているとき、ワールドの+yは前方、-xは右方
        let facing_up = || env_facing(Vec2::new(100.0, 100.0), 90.0, 0.0, 0.0);
        let Ok(ShipCommand::Thrust { direction, power, .. }) = handle.next_command(facing_up()) else {
            panic!("forward thrust expected");
        };
        assert_eq!(direction, Direction::Forward);
        assert_abs_diff_eq!(power, 1.0, epsilon = 1e-9);

        let Ok(ShipCommand::Thrust { direction, power, blocking, .. }) = handle.next_command(facing_up()) else {
            panic!("lateral thrust expected");
        };
        assert_eq!(direction, Direction::Right);
        assert_abs_diff_eq!(power, 1.0, epsilon = 1e-9);
        assert!(blocking);
    }
}
