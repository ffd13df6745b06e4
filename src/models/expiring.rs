//! # Expiring モジュール
//!
//! 知覚データの鮮度管理を提供します。
//!
//! 各観測値は「値・最終更新時刻・TTL」の組として保持され、
//! TTLを過ぎた値は既定で「存在しない」ものとして扱われます。
//! 時刻はセッション開始からの経過秒数（f64）で表し、
//! [`Clock`] を差し替えることでテストから時間を完全に制御できます。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// セッション時刻の供給源
pub trait Clock: Send + Sync {
    /// セッション開始からの経過秒数
    fn now(&self) -> f64;
}

/// 実時間に基づく時計
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// 手動で進める時計（テスト・オフライン実行用）
///
/// 内部ではf64のビット列を原子的に保持します。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { seconds: Arc::new(AtomicU64::new(start.to_bits())) }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::SeqCst))
    }
}

/// 期限付きの値
///
/// `now > updated_at + ttl` のとき古い（stale）とみなします。
/// 一度も設定されていない値は常に古い扱いです。
#[derive(Debug, Clone, PartialEq)]
pub struct Expiring<T> {
    value: Option<T>,
    updated_at: f64,
    ttl: f64,
}

impl<T> Expiring<T> {
    /// 空の値を作成
    ///
    /// # 引数
    ///
    /// * `ttl` - 鮮度の有効期間（秒）。`f64::INFINITY` で永続
    pub fn new(ttl: f64) -> Self {
        Self {
            value: None,
            updated_at: f64::NEG_INFINITY,
            ttl,
        }
    }

    /// 値を置き換え、更新時刻をリフレッシュ
    pub fn set(&mut self, value: T, now: f64) {
        self.value = Some(value);
        self.updated_at = now;
    }

    pub fn ttl(&self) -> f64 {
        self.ttl
    }

    /// TTLを変更（更新時刻と値はそのまま）
    pub fn set_ttl(&mut self, ttl: f64) {
        self.ttl = ttl;
    }

    pub fn updated_at(&self) -> f64 {
        self.updated_at
    }

    /// 自身のTTLで古いかどうか
    pub fn stale(&self, now: f64) -> bool {
        self.value.is_none() || now > self.updated_at + self.ttl
    }

    /// 自身のTTLで新鮮な場合のみ値を返す
    pub fn get(&self, now: f64) -> Option<&T> {
        self.as_of(self.ttl, now)
    }

    /// 指定したTTLで新鮮な場合のみ値を返す
    ///
    /// 自身のTTLより長い `ttl` を渡すことで、呼び出し側が明示的に
    /// 鮮度要件を緩められます。
    pub fn as_of(&self, ttl: f64, now: f64) -> Option<&T> {
        match &self.value {
            Some(value) if now <= self.updated_at + ttl => Some(value),
            _ => None,
        }
    }

    /// 鮮度を問わず最後に観測した値
    pub fn last(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

impl<T: Clone> Expiring<T> {
    /// 新鮮なら値、そうでなければ既定値
    pub fn or(&self, default: T, now: f64) -> T {
        self.get(now).cloned().unwrap_or(default)
    }
}
