//! # shipmind
//!
//! ターン制のコマンド/レスポンス型ゲームで宇宙船エージェントを動かす制御ランタイムです。
//!
//! - [`runtime`]: 戦略コードを逐次プログラムとして動かすスケジューラー
//! - [`simulator`]: スナップショット間の自機状態を予測する固定周期シミュレーター
//! - [`radar`]: 属性ごとのTTLで鮮度を管理する知覚メモリ
//! - [`avoidance`] / [`intercept`]: 知覚メモリ上の回避・照準計算
//! - [`loopback`]: オフライン実行とテスト用のサーバー代替

pub mod avoidance;
pub mod config;
pub mod intercept;
pub mod logging;
pub mod loopback;
pub mod models;
pub mod radar;
pub mod rendezvous;
pub mod runtime;
pub mod simulator;
