//! デバッガの起動設定

use std::path::PathBuf;

/// MIプロトコルのバージョンを固定するフラグ（常に最後に付加される）
pub const MI_INTERPRETER_FLAG: &str = "--interpreter=mi3";

/// デバッガに渡す追加引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    /// 空白で分割される1つの文字列
    Split(String),
    /// 分割済みの引数列
    List(Vec<String>),
}

impl Args {
    /// 引数列に展開する
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Args::Split(line) => line.split_whitespace().map(str::to_string).collect(),
            Args::List(args) => args.clone(),
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        Args::List(Vec::new())
    }
}

impl From<&str> for Args {
    fn from(line: &str) -> Self {
        Args::Split(line.to_string())
    }
}

impl From<Vec<String>> for Args {
    fn from(args: Vec<String>) -> Self {
        Args::List(args)
    }
}

/// デバッガの起動設定
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// デバッガの実行ファイル
    pub debugger: PathBuf,
    /// デバッグ対象のパス（最初の位置引数）
    pub target: PathBuf,
    /// 追加引数
    pub args: Args,
    /// 作業ディレクトリ
    pub current_dir: Option<PathBuf>,
    /// 追加の環境変数
    pub envs: Vec<(String, String)>,
}

impl LaunchConfig {
    /// デバッグ対象を指定して設定を作成する
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            debugger: PathBuf::from("gdb"),
            target: target.into(),
            args: Args::default(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    /// デバッガの実行ファイルを差し替える
    pub fn debugger(mut self, path: impl Into<PathBuf>) -> Self {
        self.debugger = path.into();
        self
    }

    /// 追加引数を設定する
    pub fn args(mut self, args: impl Into<Args>) -> Self {
        self.args = args.into();
        self
    }

    /// 作業ディレクトリを設定する
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// 環境変数を追加する
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// デバッガに渡す引数列を組み立てる
    ///
    /// 対象パス、追加引数、MIフラグの順に並びます。
    /// 呼び出し元が何を渡してもMIフラグは必ず付加されます。
    pub fn command_line(&self) -> Vec<String> {
        let mut line = vec![self.target.to_string_lossy().into_owned()];
        line.extend(self.args.to_vec());
        line.push(MI_INTERPRETER_FLAG.to_string());
        line
    }
}
