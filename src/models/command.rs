use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::common::Direction;

/// レーダーのスキャンレベル
///
/// レベルが上がるほど所要時間（コスト）と情報量が増えます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScanLevel {
    /// L1: 周辺物体の数のみ
    Count,
    /// L2: IDと位置
    Blind,
    /// L3: 指定IDの全情報
    Target,
    /// L4: 周辺物体のID・種類・位置
    Extended,
    /// L5: 周辺物体の全情報
    Full,
}

impl ScanLevel {
    /// スキャン所要時間（秒）
    pub fn duration(&self) -> f64 {
        match self {
            ScanLevel::Count => 0.03,
            ScanLevel::Blind => 0.1,
            ScanLevel::Target => 0.1,
            ScanLevel::Extended => 0.15,
            ScanLevel::Full => 0.4,
        }
    }

    /// サーバープロトコル上のレベル番号
    pub fn number(&self) -> u8 {
        match self {
            ScanLevel::Count => 1,
            ScanLevel::Blind => 2,
            ScanLevel::Target => 3,
            ScanLevel::Extended => 4,
            ScanLevel::Full => 5,
        }
    }

    pub fn from_number(level: u8) -> Option<Self> {
        match level {
            1 => Some(ScanLevel::Count),
            2 => Some(ScanLevel::Blind),
            3 => Some(ScanLevel::Target),
            4 => Some(ScanLevel::Extended),
            5 => Some(ScanLevel::Full),
            _ => None,
        }
    }
}

/// サーバーへ送信するコマンド
///
/// 各バリアントが自身のパラメータを型付きで保持します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShipCommand {
    /// その場で機首を回転（度）
    Rotate { degrees: i32 },
    /// 機体座標系の方向へ推進
    Thrust {
        direction: Direction,
        duration: f64,
        power: f64,
        blocking: bool,
    },
    /// 現在速度の `percent` 倍まで減速（0.0で停止）
    Brake { percent: f64 },
    /// 機首を変えずに速度ベクトルを回転（度）
    Steer { degrees: i32, blocking: bool },
    RadarScan { level: ScanLevel, target: Option<u32> },
    FireTorpedo { direction: Direction },
    Idle { duration: f64 },
    Repair { amount: u32 },
}

impl ShipCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ShipCommand::Rotate { .. } => "Rotate",
            ShipCommand::Thrust { .. } => "Thrust",
            ShipCommand::Brake { .. } => "Brake",
            ShipCommand::Steer { .. } => "Steer",
            ShipCommand::RadarScan { .. } => "RadarScan",
            ShipCommand::FireTorpedo { .. } => "FireTorpedo",
            ShipCommand::Idle { .. } => "Idle",
            ShipCommand::Repair { .. } => "Repair",
        }
    }

    /// サーバーが完了まで次の環境を返さないコマンドかどうか
    pub fn is_blocking(&self) -> bool {
        match self {
            ShipCommand::Thrust { blocking, .. } | ShipCommand::Steer { blocking, .. } => *blocking,
            _ => true,
        }
    }
}

impl fmt::Display for ShipCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipCommand::Rotate { degrees } => write!(f, "Rotate({})", degrees),
            ShipCommand::Thrust { direction, duration, power, blocking } => {
                write!(f, "Thrust({:?}, {:.2}s, {:.2}, blocking={})", direction, duration, power, blocking)
            }
            ShipCommand::Brake { percent } => write!(f, "Brake({:.2})", percent),
            ShipCommand::Steer { degrees, blocking } => write!(f, "Steer({}, blocking={})", degrees, blocking),
            ShipCommand::RadarScan { level, target } => match target {
                Some(id) => write!(f, "RadarScan(L{}, #{})", level.number(), id),
                None => write!(f, "RadarScan(L{})", level.number()),
            },
            ShipCommand::FireTorpedo { direction } => write!(f, "FireTorpedo({:?})", direction),
            ShipCommand::Idle { duration } => write!(f, "Idle({:.2}s)", duration),
            ShipCommand::Repair { amount } => write!(f, "Repair({})", amount),
        }
    }
}
