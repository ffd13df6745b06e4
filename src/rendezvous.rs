//! # Rendezvous モジュール
//!
//! イベントスレッドとロジックスレッドの間で値を1つだけ受け渡す単一スロットのチャネルです。
//!
//! - `resolve` は値を格納して待機者を1人起こします。待機者がいなくても
//!   ブロックせず、値は次の `wait` のためにバッファされます。
//! - 未消費の値がある状態で再度 `resolve` すると上書きされます（後勝ち）。
//! - タイムアウトやキャンセルはこの層では提供しません。
//!
//! 1チャネルにつき生産者・消費者は1組だけで、両者は厳密に交互に動作します。

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use tracing::trace;

/// 容量1の受け渡しチャネル
#[derive(Debug)]
pub struct Rendezvous<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self { tx, rx }
    }

    /// 値を格納し、待機者を起こす
    ///
    /// 未消費の値が残っていれば破棄して置き換えます。
    pub fn resolve(&self, value: T) {
        let mut pending = value;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(value)) => {
                    if self.rx.try_recv().is_ok() {
                        trace!("RENDEZVOUS_OVERWRITE: 未消費の値を上書きしました");
                    }
                    pending = value;
                }
                // 送受信の両端を自身が保持しているため切断は起こらない
                Err(TrySendError::Disconnected(_)) => unreachable!("rendezvous holds both ends"),
            }
        }
    }

    /// 値が届くまでブロックし、取り出して返す
    pub fn wait(&self) -> T {
        match self.rx.recv() {
            Ok(value) => value,
            Err(_) => unreachable!("rendezvous holds both ends"),
        }
    }

    /// ブロックせずに取り出す
    pub fn try_wait(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => unreachable!("rendezvous holds both ends"),
        }
    }

    /// 未消費の値があるか
    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}
