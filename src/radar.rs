//! # Radar モジュール
//!
//! 知覚メモリ（レーダーシステム）を提供します。
//!
//! レーダー結果をIDごとの [`PerceivedUnit`] に統合し、属性ごとのTTLで鮮度を管理します。
//! スキャンそのもの（コマンド送信とスナップショット待ち）は制御ランタイムが担当し、
//! このモジュールは結果の統合とスキャン計画だけを扱います。
//!
//! ## 統合規則
//!
//! 1. 初めて見たIDは既定ポリシーで記録を作成
//! 2. スキャンレベルが実際に含む属性だけを更新
//! 3. 統合後、天体（[`UnitKind::is_celestial`]）は永続ポリシーへ切り替え

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::models::command::ScanLevel;
use crate::models::snapshot::RadarResults;
use crate::models::unit::{PerceivedUnit, TtlPolicy, UnitKind};
use crate::models::unit_set::UnitSet;

/// `scan_all` の実行計画
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPlan {
    /// 何もしない（空集合）
    Nothing,
    /// 各IDをL3で個別にスキャン
    Individual(Vec<u32>),
    /// L5で周辺を一括スキャン
    Group,
}

/// 知覚メモリ
#[derive(Debug, Clone)]
pub struct RadarMemory {
    units: HashMap<u32, PerceivedUnit>,
    policy: TtlPolicy,
    last_count: Option<usize>,
}

impl RadarMemory {
    /// 新しい知覚メモリを作成
    ///
    /// # 引数
    ///
    /// * `policy` - 新規記録に適用する既定のTTLポリシー
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            units: HashMap::new(),
            policy,
            last_count: None,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// 直近のL1スキャンが返した物体数
    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// スキャン結果を統合
    ///
    /// # 引数
    ///
    /// * `results` - レーダー結果（通信圏外などで無い場合は `None`）
    /// * `level` - 結果を得たスキャンレベル
    /// * `now` - 現在時刻（秒）
    ///
    /// # 戻り値
    ///
    /// 今回の結果に含まれていた記録の集合。結果が無ければ `None`
    /// （「物体が存在しない」ではなく「新しい情報が無い」を意味する）
    pub fn push_results(&mut self, results: Option<&RadarResults>, level: ScanLevel, now: f64) -> Option<UnitSet> {
        let Some(results) = results else {
            debug!(level = level.number(), "RADAR_SILENT: スキャン結果がありません");
            return None;
        };

        if level == ScanLevel::Count {
            self.last_count = Some(results.count);
            return Some(UnitSet::new());
        }

        let mut touched = UnitSet::new();
        for status in &results.objects {
            let policy = self.policy;
            let unit = self.units.entry(status.id).or_insert_with(|| {
                trace!(unit_id = status.id, level = level.number(), "RADAR_NEW_UNIT: 新しい物体を記録しました");
                PerceivedUnit::new(status.id, policy)
            });
            unit.apply(status, level, now);

            if unit.kind.is_celestial() && !unit.policy().is_persistent() {
                debug!(unit_id = unit.id, kind = ?unit.kind, "RADAR_PERSIST: 天体を永続ポリシーへ切り替えました");
                unit.set_policy(TtlPolicy::persistent());
            }
            touched.insert(unit.clone());
        }

        trace!(level = level.number(), objects = touched.len(), "RADAR_MERGED: スキャン結果を統合しました");
        Some(touched)
    }

    pub fn get(&self, id: u32) -> Option<&PerceivedUnit> {
        self.units.get(&id)
    }

    /// 既知の全記録
    pub fn known(&self) -> UnitSet {
        self.units.values().cloned().collect()
    }

    /// 位置が新鮮な記録のみ
    pub fn fresh(&self, now: f64) -> UnitSet {
        self.units
            .values()
            .filter(|unit| !unit.position.stale(now))
            .cloned()
            .collect()
    }

    /// 指定した種類の既知記録
    pub fn of_kind(&self, kind: UnitKind) -> UnitSet {
        self.units.values().filter(|unit| unit.kind == kind).cloned().collect()
    }

    /// 集合全体を再スキャンする計画を立てる
    ///
    /// L3の個別スキャンを要素数だけ繰り返す総コストと、L5の一括スキャン1回のコストを比べ、
    /// 安い方を選びます（同コストなら一括スキャン）。
    pub fn plan_scan_all(set: &UnitSet) -> ScanPlan {
        if set.is_empty() {
            return ScanPlan::Nothing;
        }
        let individual = set.len() as f64 * ScanLevel::Target.duration();
        if individual < ScanLevel::Full.duration() {
            ScanPlan::Individual(set.ids())
        } else {
            ScanPlan::Group
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::Vec2;
    use crate::models::snapshot::ObjectStatus;

    fn detailed(id: u32, kind: UnitKind, x: f64) -> ObjectStatus {
        ObjectStatus {
            id,
            kind: Some(kind),
            name: None,
            position: Some(Vec2::new(x, 0.0)),
            velocity: Some(Vec2::new(1.0, 1.0)),
            orientation: Some(0.0),
            health: Some(100.0),
            shields: Some(0.0),
            energy: Some(50.0),
            point_value: Some(1.0),
            stored: Some(2),
            hit_radius: Some(10.0),
            influence: Some(40.0),
            strength: Some(3.0),
        }
    }

    fn results(objects: Vec<ObjectStatus>) -> RadarResults {
        RadarResults { count: objects.len(), objects }
    }

    #[test]
    fn test_absent_results_mean_no_new_information() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        memory
            .push_results(Some(&results(vec![detailed(1, UnitKind::Ship, 0.0)])), ScanLevel::Full, 0.0);
        assert!(memory.push_results(None, ScanLevel::Full, 0.1).is_none());
        assert!(memory.get(1).is_some());
    }

    #[test]
    fn test_merge_idempotence_refreshes_timestamps() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        let scan = results(vec![detailed(9, UnitKind::Asteroid, 5.0)]);
        memory.push_results(Some(&scan), ScanLevel::Full, 0.0);
        let first = memory.get(9).cloned();
        memory.push_results(Some(&scan), ScanLevel::Full, 0.4);
        let second = memory.get(9).cloned();

        let (Some(first), Some(second)) = (first, second) else {
            panic!("unit 9 must be recorded");
        };
        assert_eq!(first.position.last(), second.position.last());
        assert_eq!(first.health.last(), second.health.last());
        assert_eq!(second.position.updated_at(), 0.4);
        assert!(first.position.stale(0.9));
        assert!(!second.position.stale(0.9));
    }

    #[test]
    fn test_lower_level_does_not_clear_higher_level_fields() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        memory.push_results(Some(&results(vec![detailed(2, UnitKind::Ship, 1.0)])), ScanLevel::Full, 0.0);
        let blind = ObjectStatus {
            id: 2,
            position: Some(Vec2::new(3.0, 0.0)),
            ..Default::default()
        };
        memory.push_results(Some(&results(vec![blind])), ScanLevel::Blind, 0.1);

        let unit = memory.get(2).cloned().unwrap_or_else(|| PerceivedUnit::new(0, TtlPolicy::default()));
        assert_eq!(unit.position.get(0.1), Some(&Vec2::new(3.0, 0.0)));
        assert_eq!(unit.velocity.get(0.1), Some(&Vec2::new(1.0, 1.0)));
        assert_eq!(unit.influence.get(0.1), Some(&40.0));
        assert_eq!(unit.kind, UnitKind::Ship);
    }

    #[test]
    fn test_celestials_switch_to_persistent_policy() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        let scan = results(vec![detailed(1, UnitKind::Planet, 0.0), detailed(2, UnitKind::Torpedo, 9.0)]);
        memory.push_results(Some(&scan), ScanLevel::Extended, 0.0);

        assert!(memory.get(1).is_some_and(|u| u.policy().is_persistent()));
        assert!(memory.get(2).is_some_and(|u| !u.policy().is_persistent()));
        assert_eq!(memory.fresh(60.0).ids(), vec![1]);
        assert_eq!(memory.of_kind(UnitKind::Torpedo).ids(), vec![2]);
    }

    #[test]
    fn test_count_scan_records_count_only() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        let scan = RadarResults { count: 4, objects: Vec::new() };
        let touched = memory.push_results(Some(&scan), ScanLevel::Count, 0.0);
        assert_eq!(touched.map(|s| s.len()), Some(0));
        assert_eq!(memory.last_count(), Some(4));
        assert!(memory.known().is_empty());
    }

    #[test]
    fn test_scan_all_plan_picks_cheaper_option() {
        let mut memory = RadarMemory::new(TtlPolicy::default());
        let objects = (1..=6).map(|id| detailed(id, UnitKind::Asteroid, id as f64)).collect();
        memory.push_results(Some(&results(objects)), ScanLevel::Full, 0.0);
        let all = memory.known();

        assert_eq!(RadarMemory::plan_scan_all(&UnitSet::new()), ScanPlan::Nothing);
        assert_eq!(RadarMemory::plan_scan_all(&all.filter(|u| u.id <= 3)), ScanPlan::Individual(vec![1, 2, 3]));
        assert_eq!(RadarMemory::plan_scan_all(&all), ScanPlan::Group);
    }
}
