use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use shipmind::config::ClientConfig;
use shipmind::logging::{LogConfig, LogOutput, init_logging, parse_log_level};
use shipmind::loopback::{LoopbackServer, SessionSummary};
use shipmind::models::{Angle, Direction, ManualClock, UnitKind};
use shipmind::runtime::{Control, ControlRuntime, ShipComputer, TracingStatus};

/// 巡航に入る最低速度
const CRUISE_SPEED: f64 = 15.0;
/// 発射を許す照準誤差（度）
const FIRING_TOLERANCE_DEG: f64 = 4.0;
/// 攻撃に必要なエネルギー
const ATTACK_ENERGY: f64 = 50.0;

fn main() {
    let matches = Command::new("shipmind")
        .version("0.1.0")
        .about("宇宙船エージェント制御ランタイム")
        .long_about(
            "ターン制ゲームサーバー向けの宇宙船制御クライアント\n\
             組み込みの哨戒戦略をループバックサーバー上で実行します。",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("設定ファイル(.yaml)のパスを指定")
                .long_help(
                    "クライアント設定ファイル(.yaml)のパスを指定します。\n\
                     指定しない場合は既定の設定で実行します。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("設定の概要のみ表示して終了"),
        )
        .arg(
            Arg::new("ticks")
                .short('t')
                .long("ticks")
                .value_name("N")
                .value_parser(clap::value_parser!(u64))
                .default_value("600")
                .help("実行するサーバーティック数"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: DEBUG, -vv: TRACE)"),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    if matches.get_flag("info") {
        config.print_summary();
        return Ok(());
    }

    let output = matches
        .get_one::<String>("log-output")
        .map(|s| s.parse::<LogOutput>())
        .transpose()?
        .unwrap_or(LogOutput::Console);
    let level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or(tracing::Level::INFO);
    let log_config = LogConfig {
        level,
        output,
        ..Default::default()
    }
    .with_verbosity(matches.get_count("verbose"));
    let _log_guard = init_logging(log_config)?;

    let ticks = matches.get_one::<u64>("ticks").copied().unwrap_or(600);

    println!("宇宙船エージェント制御ランタイム - shipmind v0.1.0");
    println!("設定: {} / ティック数: {}", config.meta.name, ticks);
    println!();

    let clock = ManualClock::new(0.0);
    let mut server = LoopbackServer::new(&config).with_clock(clock.clone());
    let handle = ControlRuntime::spawn(Sentinel::default(), &config, Arc::new(clock), Arc::new(TracingStatus))?;

    let summary = server.run_session(&handle, ticks)?;
    print_summary(&summary);

    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!("=== セッション結果 ===");
    println!("処理ティック数: {}", summary.ticks);
    println!("発射魚雷数: {}", summary.torpedoes_fired);
    match &summary.destroyed {
        Some(cause) => println!("結果: 撃破 ({})", cause),
        None => println!("結果: 生存"),
    }
    let ship = &summary.final_ship;
    println!(
        "最終状態: 位置 {} / 速度 {:.1} / 体力 {:.1} / エネルギー {:.1}",
        ship.position, ship.speed, ship.health, ship.energy
    );
    println!();
    println!("=== コマンド内訳 ===");
    for (name, count) in &summary.commands {
        println!("  {}: {}", name, count);
    }
}

/// 組み込みの哨戒戦略
///
/// 巡航速度を保ちながら周辺をスキャンし、危険物体を回避、余裕があれば修理し、
/// 小惑星や敵艦を照準して発射します。
#[derive(Debug, Default)]
struct Sentinel {
    target: Option<u32>,
}

impl Sentinel {
    fn is_hazard(kind: UnitKind) -> bool {
        kind.is_celestial() || matches!(kind, UnitKind::Torpedo | UnitKind::Ship | UnitKind::Asteroid)
    }

    fn is_prey(kind: UnitKind) -> bool {
        matches!(kind, UnitKind::Asteroid | UnitKind::Ship)
    }
}

impl ShipComputer for Sentinel {
    fn run(&mut self, c: &mut Control) {
        loop {
            if c.ship().speed < CRUISE_SPEED {
                c.status("ATTAIN");
                c.thrust(Direction::Forward.vec(), 0.5, 1.0, true);
                continue;
            }

            c.status("SCAN");
            let Some(seen) = c.scan_extended() else {
                continue;
            };

            let hazards = seen.filter(|unit| Self::is_hazard(unit.kind));
            if let Some(report) = hazards.ids().into_iter().find_map(|id| c.avoid(id)) {
                c.status(if report.escape { "ESCAPE" } else { "AVOID" });
                c.execute_avoidance(&report);
                continue;
            }

            let ship = *c.ship();
            if ship.health < 100.0 && ship.energy > 75.0 {
                let amount = (100.0 - ship.health).min(((ship.energy - 30.0) / 2.0).max(0.0)) as u32;
                if amount > 0 {
                    c.status("REPAIR");
                    c.repair(amount);
                }
            }

            if c.ship().energy < ATTACK_ENERGY {
                c.status("RECHARGE");
                c.until_sufficient_energy(ATTACK_ENERGY, 0.25, 5.0);
                continue;
            }

            let tracked = self.target.filter(|id| c.refresh(*id));
            let Some(target) = tracked.or_else(|| seen.filter(|unit| Self::is_prey(unit.kind)).ids().first().copied())
            else {
                self.target = None;
                continue;
            };
            if self.target != Some(target) {
                c.status("TARGET");
                self.target = Some(target);
            }

            let Some(solution) = c.intercept_unit(target) else {
                self.target = None;
                continue;
            };
            if !solution.is_valid() {
                continue;
            }

            let bearing = c.ship().position.angle_to(solution.aim);
            if bearing.within(c.ship().angle, Angle::new(FIRING_TOLERANCE_DEG)) {
                c.status("FIRING");
                c.fire(Direction::Forward);
            } else {
                c.status("LOCKING");
                c.face(solution.aim);
            }
        }
    }
}
