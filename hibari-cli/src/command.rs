//! REPLコマンド

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// MIコマンドをそのまま発行（`-` で始まる行）
    Mi(String),
    /// コンソール出力を収集しながらMIコマンドを発行
    Collect(String),
    /// 次の停止などを待つ
    Wait,
    /// デバッグ対象プログラムへの入力
    Input(String),
    /// 実行中のプログラムを中断
    Interrupt,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl ReplCommand {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.starts_with('-') {
            return Some(ReplCommand::Mi(input.to_string()));
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        match head {
            "collect" | "col" if !rest.is_empty() => Some(ReplCommand::Collect(rest.to_string())),
            "wait" | "w" => Some(ReplCommand::Wait),
            "input" | "in" => Some(ReplCommand::Input(rest.to_string())),
            "interrupt" | "int" => Some(ReplCommand::Interrupt),
            "help" | "h" | "?" => Some(ReplCommand::Help),
            "quit" | "q" | "exit" => Some(ReplCommand::Quit),
            _ => None,
        }
    }
}
