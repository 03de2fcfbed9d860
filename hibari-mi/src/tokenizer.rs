//! MIレコードのトークナイザ
//!
//! 1行の先頭文字でレコードの分類を決め、残りをフィールドのトークン列に分割します。
//!
//! | 先頭 | 分類 |
//! |---|---|
//! | `^` | Result |
//! | `*` | Status |
//! | `~` `&` `@` | Stream |
//! | `=` | Activity |
//! | `(` | プロンプト |
//! | その他 | 認識できない行 |

use crate::errors::ParseError;
use crate::event::{Category, Event, StreamKind, Subtype};
use crate::Result;
use regex::Regex;

/// フィールドを連結するときの区切り文字
pub const FIELD_SEPARATOR: &str = ",";

/// 分類済みの1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// ペイロードを持つレコード
    Record(Event),
    /// `(gdb)` プロンプト
    Prompt,
    /// 既知の接頭辞を持たない行（デバッグ対象プログラムの出力など）
    Unrecognized(String),
}

/// MIレコードのトークナイザ
pub struct Tokenizer {
    /// クォート文字列、またはクォート・カンマ・空白を含まない連続文字
    token_pattern: Regex,
}

impl Tokenizer {
    /// トークナイザを作成する
    pub fn new() -> Result<Self> {
        let token_pattern = Regex::new(r#""((?:[^"\\]|\\.)*)"|([^",\s]+)"#)?;
        Ok(Self { token_pattern })
    }

    /// 1行を解析してイベントに変換する
    pub fn parse_line(&self, line: &str) -> std::result::Result<Line, ParseError> {
        let mut chars = line.chars();
        let Some(first) = chars.next() else {
            return Ok(Line::Unrecognized(String::new()));
        };
        let payload = chars.as_str();

        let (category, mut tokens) = match first {
            '^' => (Category::Result, Vec::new()),
            '*' => (Category::Status, Vec::new()),
            '=' => (Category::Activity, Vec::new()),
            '~' | '&' | '@' => {
                // ストリームはワイヤ上にサブタイプを持たないので記号から補う
                let kind = StreamKind::from_sigil(first).unwrap_or(StreamKind::Console);
                (Category::Stream, vec![kind.as_str().to_string()])
            }
            '(' => return Ok(Line::Prompt),
            _ => return Ok(Line::Unrecognized(line.to_string())),
        };

        tokens.extend(self.split_fields(payload)?);
        Event::from_tokens(category, tokens).map(Line::Record)
    }

    /// ペイロードをトークン列に分割する
    ///
    /// トークンはクォートで囲まれた文字列（クォートは除去、エスケープはそのまま）か、
    /// クォート・カンマ・空白を含まない最長の連続文字です。
    /// 直後がカンマまたは行末でない候補はトークンになりません
    /// （`key="value"` の `key=` は捨てられ、`value` だけが残ります）。
    pub fn split_fields(&self, payload: &str) -> std::result::Result<Vec<String>, ParseError> {
        check_quotes(payload)?;

        let mut tokens = Vec::new();
        for caps in self.token_pattern.captures_iter(payload) {
            let Some(whole) = caps.get(0) else { continue };
            let rest = payload[whole.end()..].trim_start();
            if !(rest.is_empty() || rest.starts_with(',')) {
                continue;
            }

            let token = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            tokens.push(token.to_string());
        }

        Ok(tokens)
    }
}

/// クォートが閉じているか検査する
fn check_quotes(payload: &str) -> std::result::Result<(), ParseError> {
    let mut open: Option<usize> = None;
    let mut escaped = false;

    for (offset, c) in payload.char_indices() {
        match (open, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(_), '"') => open = None,
            (None, '"') => open = Some(offset),
            _ => {}
        }
    }

    match open {
        // 行頭の記号の分だけずらす
        Some(offset) => Err(ParseError::UnterminatedQuote { offset: offset + 1 }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ResultClass, StatusClass};

    fn record(line: &str) -> Event {
        match Tokenizer::new().unwrap().parse_line(line).unwrap() {
            Line::Record(event) => event,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_result_with_value() {
        match record(r#"^done,value="3""#) {
            Event::Result(e) => {
                assert_eq!(e.kind, ResultClass::Done);
                assert_eq!(e.fields, vec!["3".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_drops_keys() {
        match record(r#"*stopped,reason="breakpoint-hit",thread-id="1""#) {
            Event::Status(e) => {
                assert_eq!(e.kind, StatusClass::Stopped);
                assert_eq!(e.fields, vec!["breakpoint-hit".to_string(), "1".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stream_sigils() {
        let tokenizer = Tokenizer::new().unwrap();
        for (line, kind) in [
            (r#"~"hello\n""#, StreamKind::Console),
            (r#"@"out""#, StreamKind::Target),
            (r#"&"warning: x""#, StreamKind::Internal),
        ] {
            match tokenizer.parse_line(line).unwrap() {
                Line::Record(Event::Stream(e)) => {
                    assert_eq!(e.kind, kind);
                    assert_eq!(e.fields.len(), 1);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_escapes_kept_verbatim() {
        let tokenizer = Tokenizer::new().unwrap();
        let fields = tokenizer.split_fields(r#""say \"hi\"\n""#).unwrap();
        assert_eq!(fields, vec![r#"say \"hi\"\n"#.to_string()]);
    }

    #[test]
    fn test_whitespace_before_comma() {
        let tokenizer = Tokenizer::new().unwrap();
        let fields = tokenizer.split_fields("done ,  \"a b\" , c").unwrap();
        assert_eq!(fields, vec!["done", "a b", "c"]);
    }

    #[test]
    fn test_prompt_and_unrecognized() {
        let tokenizer = Tokenizer::new().unwrap();
        assert_eq!(tokenizer.parse_line("(gdb) ").unwrap(), Line::Prompt);
        assert_eq!(
            tokenizer.parse_line("Hello, world").unwrap(),
            Line::Unrecognized("Hello, world".to_string())
        );
        assert_eq!(tokenizer.parse_line("").unwrap(), Line::Unrecognized(String::new()));
    }

    #[test]
    fn test_unterminated_quote() {
        let tokenizer = Tokenizer::new().unwrap();
        let err = tokenizer.parse_line(r#"^done,value="3"#).unwrap_err();
        assert_eq!(err, ParseError::UnterminatedQuote { offset: 12 });
    }

    #[test]
    fn test_bare_prefix_is_missing_subtype() {
        let tokenizer = Tokenizer::new().unwrap();
        let err = tokenizer.parse_line("*").unwrap_err();
        assert_eq!(err, ParseError::MissingSubtype { category: Category::Status });
    }
}
