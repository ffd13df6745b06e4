// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 期限付きの値と時計
pub mod expiring;

// サーバーとやり取りするスナップショットとコマンド
pub mod snapshot;
pub mod command;

// 知覚した物体の記録と集合
pub mod unit;
pub mod unit_set;

// 便利な re-export
pub use common::*;
pub use expiring::{Clock, Expiring, ManualClock, SystemClock};
pub use snapshot::{Environment, GameInfo, ObjectStatus, RadarResults, ShipState, ShipStatus};
pub use command::{ScanLevel, ShipCommand};
pub use unit::{PerceivedUnit, TtlPolicy, UnitKind};
pub use unit_set::UnitSet;
