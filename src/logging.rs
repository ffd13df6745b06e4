//! # Logging モジュール
//!
//! 制御クライアントのログ出力を初期化します。
//!
//! イベント・ロジック・シミュレーターの3スレッドが同時にログを出すため、
//! 各行にスレッド名（`ship-logic`, `simulator` など）を付けて出力します。
//! ファイル出力は tracing-appender の非同期ライターを使い、ティック処理を遅らせません。
//!
//! ## 出力先
//!
//! - `Console`: コンソールのみ（compact形式）
//! - `File`: ファイルのみ（JSON形式、日次ローテーション）
//! - `Both`: 両方
//!
//! 環境変数 `RUST_LOG` が設定されていれば、設定ファイルやCLIのレベルより優先されます。

use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ログ出力先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    fn writes_file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効な出力先: {}. 利用可能: console, file, both", s)),
        }
    }
}

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ
    pub log_dir: String,
    /// ログファイル名のプレフィックス
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "shipmind".to_string(),
        }
    }
}

impl LogConfig {
    /// `-v` の数だけレベルを1段ずつ上げる
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        for _ in 0..verbose {
            self.level = if self.level == Level::ERROR {
                Level::WARN
            } else if self.level == Level::WARN {
                Level::INFO
            } else if self.level == Level::INFO {
                Level::DEBUG
            } else {
                Level::TRACE
            };
        }
        self
    }
}

/// 初期化したログ出力を維持するガード
///
/// ドロップすると非同期ライターに残ったログを書き出して停止します。
/// プロセス終了まで保持してください。
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// ログシステムを初期化
///
/// # 引数
///
/// * `config` - ログ設定
///
/// # 戻り値
///
/// 初期化に成功した場合はガード。すでに初期化済みの場合などはエラー
pub fn init_logging(config: LogConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = (config.output != LogOutput::File).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    let (file, guard) = if config.output.writes_file() {
        ensure_log_directory(&config.log_dir)?;
        let appender = rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(false)
            .with_line_number(false)
            .json();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    Registry::default().with(env_filter).with(console).with(file).try_init()?;

    Ok(LogGuard { _file: guard })
}

/// ログレベルを文字列から解析（無効な場合はINFO）
pub fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
            Level::INFO
        }
    }
}

/// ログディレクトリを作成
pub fn ensure_log_directory(log_dir: &str) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_output_from_str() {
        assert_eq!(LogOutput::from_str("console"), Ok(LogOutput::Console));
        assert_eq!(LogOutput::from_str("FILE"), Ok(LogOutput::File));
        assert_eq!(LogOutput::from_str("all"), Ok(LogOutput::Both));
        assert!(LogOutput::from_str("syslog").is_err());
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("loud"), Level::INFO);
    }

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(LogConfig::default().with_verbosity(0).level, Level::INFO);
        assert_eq!(LogConfig::default().with_verbosity(1).level, Level::DEBUG);
        assert_eq!(LogConfig::default().with_verbosity(3).level, Level::TRACE);
        let debug = LogConfig {
            level: Level::DEBUG,
            ..Default::default()
        };
        assert_eq!(debug.with_verbosity(1).level, Level::TRACE);
        let warn = LogConfig {
            level: Level::WARN,
            ..Default::default()
        };
        assert_eq!(warn.with_verbosity(1).level, Level::INFO);
    }

    #[test]
    fn test_file_output_flags() {
        assert!(!LogOutput::Console.writes_file());
        assert!(LogOutput::File.writes_file());
        assert!(LogOutput::Both.writes_file());
    }
}
