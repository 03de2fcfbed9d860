//! セッションのエラー

/// エラー結果のフィールドを連結するときの区切り
pub const ERROR_FIELD_SEPARATOR: &str = " // ";

/// コマンド実行とセッション操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// デバッガが `^error` で応答した（フィールドを連結したメッセージ）
    #[error("{0}")]
    Command(String),

    /// 別の収集付きコマンドが実行中
    #[error("Another collection command is active")]
    CollectionConflict,

    /// デバッガとの入出力に失敗した
    #[error("I/O error while talking to the debugger: {0}")]
    Io(#[from] std::io::Error),

    /// デバッガプロセスの起動や操作、セッションの初期化に失敗した
    #[error(transparent)]
    Process(#[from] anyhow::Error),

    /// 応答を受け取る前にセッションが破棄された
    #[error("Session was dropped before the request was answered")]
    Abandoned,

    /// プロセスを持たないセッションでプロセス操作を要求した
    #[error("Session is not attached to a debugger process")]
    NotSpawned,
}
