//! Hibari GDB/MI レコード解析
//!
//! このクレートは、GDB の machine interface（MI）が出力する1行を
//! 型付きのイベントに変換する機能を提供します。
//! 先頭文字によるレコード分類、フィールドのトークン分割、
//! サブタイプの閉じた列挙型への変換を行います。

pub mod errors;
pub mod event;
pub mod tokenizer;

pub use errors::ParseError;
pub use event::{
    ActivityEvent, ActivityKind, Category, Event, Record, Reply, ReplyKind, ResultClass,
    ResultEvent, StatusClass, StatusEvent, StreamEvent, StreamKind, Subtype,
};
pub use tokenizer::{Line, Tokenizer, FIELD_SEPARATOR};

/// MI解析の結果型
pub type Result<T> = anyhow::Result<T>;
