use std::collections::BTreeMap;

use crate::models::unit::{PerceivedUnit, UnitKind};

/// IDをキーとした知覚記録の集合
///
/// 「いま注目すべき物体はどれか」を表す共通の語彙です。
/// 記録はコピーとして保持されるため、集合演算が知覚メモリ本体を変更することはありません。
/// 和・積で同じIDが衝突した場合は左辺の記録を残します。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitSet {
    units: BTreeMap<u32, PerceivedUnit>,
}

impl UnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 天体（変化の遅い物体）を選ぶ述語
    pub fn celestials() -> impl Fn(&PerceivedUnit) -> bool {
        |unit: &PerceivedUnit| unit.kind.is_celestial()
    }

    /// 指定した種類を選ぶ述語
    pub fn of_kind(kinds: &[UnitKind]) -> impl Fn(&PerceivedUnit) -> bool + '_ {
        move |unit: &PerceivedUnit| kinds.contains(&unit.kind)
    }

    pub fn insert(&mut self, unit: PerceivedUnit) {
        self.units.insert(unit.id, unit);
    }

    pub fn get(&self, id: u32) -> Option<&PerceivedUnit> {
        self.units.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.units.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.units.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PerceivedUnit> {
        self.units.values()
    }

    /// ID順の記録一覧
    pub fn list(&self) -> Vec<PerceivedUnit> {
        self.units.values().cloned().collect()
    }

    pub fn filter<F>(&self, predicate: F) -> UnitSet
    where
        F: Fn(&PerceivedUnit) -> bool,
    {
        self.units
            .values()
            .filter(|unit| predicate(unit))
            .cloned()
            .collect()
    }

    pub fn filter_in_place<F>(&mut self, predicate: F)
    where
        F: Fn(&PerceivedUnit) -> bool,
    {
        self.units.retain(|_, unit| predicate(unit));
    }

    pub fn union(&self, other: &UnitSet) -> UnitSet {
        let mut result = self.clone();
        result.union_in_place(other);
        result
    }

    pub fn union_in_place(&mut self, other: &UnitSet) {
        for (id, unit) in &other.units {
            self.units.entry(*id).or_insert_with(|| unit.clone());
        }
    }

    pub fn intersect(&self, other: &UnitSet) -> UnitSet {
        let mut result = self.clone();
        result.intersect_in_place(other);
        result
    }

    pub fn intersect_in_place(&mut self, other: &UnitSet) {
        self.units.retain(|id, _| other.units.contains_key(id));
    }

    pub fn difference(&self, other: &UnitSet) -> UnitSet {
        let mut result = self.clone();
        result.difference_in_place(other);
        result
    }

    pub fn difference_in_place(&mut self, other: &UnitSet) {
        self.units.retain(|id, _| !other.units.contains_key(id));
    }

    pub fn symmetric_difference(&self, other: &UnitSet) -> UnitSet {
        let mut result = self.clone();
        result.symmetric_difference_in_place(other);
        result
    }

    pub fn symmetric_difference_in_place(&mut self, other: &UnitSet) {
        for (id, unit) in &other.units {
            if self.units.remove(id).is_none() {
                self.units.insert(*id, unit.clone());
            }
        }
    }

    /// 全要素の畳み込み
    pub fn reduce<A, F>(&self, init: A, f: F) -> A
    where
        F: Fn(&PerceivedUnit, A) -> A,
    {
        self.units.values().fold(init, |acc, unit| f(unit, acc))
    }
}

impl FromIterator<PerceivedUnit> for UnitSet {
    fn from_iter<I: IntoIterator<Item = PerceivedUnit>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().map(|unit| (unit.id, unit)).collect(),
        }
    }
}

impl IntoIterator for UnitSet {
    type Item = PerceivedUnit;
    type IntoIter = std::collections::btree_map::IntoValues<u32, PerceivedUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.into_values()
    }
}
