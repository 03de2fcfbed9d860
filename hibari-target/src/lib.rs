//! Hibari デバッガプロセス制御
//!
//! このクレートは、MIで駆動するデバッガ（GDB）のサブプロセスを扱います。
//! 起動引数の組み立て、標準入出力のパイプ接続、シグナル送信、終了待ちを行います。

pub mod launch;
pub mod process;

pub use launch::{Args, LaunchConfig, MI_INTERPRETER_FLAG};
pub use process::{DebuggerProcess, ProcessIo};

/// プロセス制御の結果型
pub type Result<T> = anyhow::Result<T>;
