//! レコード解析エラー

use crate::event::Category;

/// MIレコードを解釈できなかった場合のエラー
///
/// セッションはこのエラーを診断として通知し、次の行の処理を続けます。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// サブタイプとなる先頭トークンが存在しない
    #[error("{category} record carries no subtype")]
    MissingSubtype { category: Category },

    /// 閉じた列挙に含まれないサブタイプ
    #[error("unknown {category} subtype '{tag}'")]
    UnknownSubtype { category: Category, tag: String },

    /// 閉じられていないダブルクォート
    #[error("unterminated quoted string starting at byte {offset}")]
    UnterminatedQuote { offset: usize },
}
