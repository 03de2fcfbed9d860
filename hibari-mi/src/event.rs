//! MIイベントモデル
//!
//! 4種類のレコード（Result / Status / Stream / Activity）と、
//! それぞれのサブタイプの閉じた列挙型を定義します。

use crate::errors::ParseError;
use std::fmt;

/// レコードの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// コマンドへの応答（`^`）
    Result,
    /// 実行状態の非同期通知（`*`）
    Status,
    /// テキスト出力（`~` `@` `&`）
    Stream,
    /// 状態モデル変更の非同期通知（`=`）
    Activity,
}

impl Category {
    /// 分類名を取得する
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Result => "result",
            Category::Status => "status",
            Category::Stream => "stream",
            Category::Activity => "activity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// レコードのサブタイプ
///
/// 各分類のサブタイプはワイヤ上のリテラル値と1対1に対応する閉じた集合です。
/// 集合に含まれない値は推測せず、エラーとして扱います。
pub trait Subtype: Copy + fmt::Debug + PartialEq + 'static {
    /// このサブタイプが属する分類
    const CATEGORY: Category;
    /// 全てのサブタイプ
    const ALL: &'static [Self];

    /// ワイヤ上のリテラル値を取得する
    fn as_str(self) -> &'static str;

    /// リテラル値からサブタイプを解決する
    fn from_tag(tag: &str) -> Result<Self, ParseError> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| ParseError::UnknownSubtype {
                category: Self::CATEGORY,
                tag: tag.to_string(),
            })
    }
}

/// 結果レコードの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultClass {
    Done,
    /// 非推奨（`*running` が代わりに届く）
    Running,
    Connected,
    Error,
    Exit,
}

impl Subtype for ResultClass {
    const CATEGORY: Category = Category::Result;
    const ALL: &'static [Self] = &[
        ResultClass::Done,
        ResultClass::Running,
        ResultClass::Connected,
        ResultClass::Error,
        ResultClass::Exit,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ResultClass::Done => "done",
            ResultClass::Running => "running",
            ResultClass::Connected => "connected",
            ResultClass::Error => "error",
            ResultClass::Exit => "exit",
        }
    }
}

/// 実行状態の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Running,
    Stopped,
}

impl Subtype for StatusClass {
    const CATEGORY: Category = Category::Status;
    const ALL: &'static [Self] = &[StatusClass::Running, StatusClass::Stopped];

    fn as_str(self) -> &'static str {
        match self {
            StatusClass::Running => "running",
            StatusClass::Stopped => "stopped",
        }
    }
}

/// ストリーム出力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// CLIコンソール出力（`~`）
    Console,
    /// デバッグ対象プログラムの出力（`@`）
    Target,
    /// GDB内部のログ（`&`）
    Internal,
}

impl StreamKind {
    /// 行頭の記号からストリームの種類を求める
    pub fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '~' => Some(StreamKind::Console),
            '@' => Some(StreamKind::Target),
            '&' => Some(StreamKind::Internal),
            _ => None,
        }
    }
}

impl Subtype for StreamKind {
    const CATEGORY: Category = Category::Stream;
    const ALL: &'static [Self] = &[StreamKind::Console, StreamKind::Target, StreamKind::Internal];

    fn as_str(self) -> &'static str {
        match self {
            StreamKind::Console => "console",
            StreamKind::Target => "target",
            StreamKind::Internal => "internal",
        }
    }
}

/// 非同期通知の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    ThreadGroupAdded,
    ThreadGroupRemoved,
    ThreadGroupStarted,
    ThreadGroupExited,
    ThreadCreated,
    ThreadExited,
    ThreadSelected,
    LibraryLoaded,
    LibraryUnloaded,
    TraceframeChanged,
    TsvCreated,
    TsvDeleted,
    TsvModified,
    BreakpointCreated,
    BreakpointModified,
    BreakpointDeleted,
    RecordStarted,
    RecordStopped,
    CmdParamChanged,
    MemoryChanged,
}

impl Subtype for ActivityKind {
    const CATEGORY: Category = Category::Activity;
    const ALL: &'static [Self] = &[
        ActivityKind::ThreadGroupAdded,
        ActivityKind::ThreadGroupRemoved,
        ActivityKind::ThreadGroupStarted,
        ActivityKind::ThreadGroupExited,
        ActivityKind::ThreadCreated,
        ActivityKind::ThreadExited,
        ActivityKind::ThreadSelected,
        ActivityKind::LibraryLoaded,
        ActivityKind::LibraryUnloaded,
        ActivityKind::TraceframeChanged,
        ActivityKind::TsvCreated,
        ActivityKind::TsvDeleted,
        ActivityKind::TsvModified,
        ActivityKind::BreakpointCreated,
        ActivityKind::BreakpointModified,
        ActivityKind::BreakpointDeleted,
        ActivityKind::RecordStarted,
        ActivityKind::RecordStopped,
        ActivityKind::CmdParamChanged,
        ActivityKind::MemoryChanged,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ActivityKind::ThreadGroupAdded => "thread-group-added",
            ActivityKind::ThreadGroupRemoved => "thread-group-removed",
            ActivityKind::ThreadGroupStarted => "thread-group-started",
            ActivityKind::ThreadGroupExited => "thread-group-exited",
            ActivityKind::ThreadCreated => "thread-created",
            ActivityKind::ThreadExited => "thread-exited",
            ActivityKind::ThreadSelected => "thread-selected",
            ActivityKind::LibraryLoaded => "library-loaded",
            ActivityKind::LibraryUnloaded => "library-unloaded",
            ActivityKind::TraceframeChanged => "traceframe-changed",
            ActivityKind::TsvCreated => "tsv-created",
            ActivityKind::TsvDeleted => "tsv-deleted",
            ActivityKind::TsvModified => "tsv-modified",
            ActivityKind::BreakpointCreated => "breakpoint-created",
            ActivityKind::BreakpointModified => "breakpoint-modified",
            ActivityKind::BreakpointDeleted => "breakpoint-deleted",
            ActivityKind::RecordStarted => "record-started",
            ActivityKind::RecordStopped => "record-stopped",
            ActivityKind::CmdParamChanged => "cmd-param-changed",
            ActivityKind::MemoryChanged => "memory-changed",
        }
    }
}

/// コマンドの完了として呼び出し元に返せるサブタイプ
///
/// Result と Status のイベントだけが、コマンド実行中に観測した
/// 生の出力行を添付できます。
pub trait ReplyKind: Subtype {}

impl ReplyKind for ResultClass {}
impl ReplyKind for StatusClass {}

/// 解析済みの1レコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<K> {
    /// サブタイプ
    pub kind: K,
    /// フィールドのトークン（出現順）
    pub fields: Vec<String>,
    output: Option<Vec<String>>,
    consumed: bool,
}

impl<K: Subtype> Record<K> {
    /// 新しいレコードを作成する
    pub fn new(kind: K, fields: Vec<String>) -> Self {
        Self {
            kind,
            fields,
            output: None,
            consumed: false,
        }
    }

    /// サブタイプのリテラル値を取得する
    pub fn subtype(&self) -> &'static str {
        self.kind.as_str()
    }

    /// イベントを処理済みにする
    ///
    /// 処理済みのイベントはセッションの組み込み処理（応答の対応付けや
    /// 出力の収集）の対象外になります。`any` チャネルには引き続き届きます。
    pub fn consume(&mut self) {
        self.consumed = true;
    }

    /// 処理済みかどうか
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

impl<K: ReplyKind> Record<K> {
    /// コマンド実行中に捕捉した生の出力行
    pub fn output(&self) -> Option<&[String]> {
        self.output.as_deref()
    }

    /// 捕捉した出力行を添付する
    pub fn attach_output(&mut self, lines: Vec<String>) {
        self.output = Some(lines);
    }
}

pub type ResultEvent = Record<ResultClass>;
pub type StatusEvent = Record<StatusClass>;
pub type StreamEvent = Record<StreamKind>;
pub type ActivityEvent = Record<ActivityKind>;

/// 型付きイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Result(ResultEvent),
    Status(StatusEvent),
    Stream(StreamEvent),
    Activity(ActivityEvent),
}

impl Event {
    /// トークン列からイベントを構築する
    ///
    /// 先頭トークンをサブタイプとして解釈し、残りをフィールドとします。
    pub fn from_tokens(category: Category, tokens: Vec<String>) -> Result<Self, ParseError> {
        let mut tokens = tokens.into_iter();
        let tag = tokens
            .next()
            .ok_or(ParseError::MissingSubtype { category })?;
        let fields: Vec<String> = tokens.collect();

        Ok(match category {
            Category::Result => Event::Result(Record::new(ResultClass::from_tag(&tag)?, fields)),
            Category::Status => Event::Status(Record::new(StatusClass::from_tag(&tag)?, fields)),
            Category::Stream => Event::Stream(Record::new(StreamKind::from_tag(&tag)?, fields)),
            Category::Activity => {
                Event::Activity(Record::new(ActivityKind::from_tag(&tag)?, fields))
            }
        })
    }

    /// 分類を取得する
    pub fn category(&self) -> Category {
        match self {
            Event::Result(_) => Category::Result,
            Event::Status(_) => Category::Status,
            Event::Stream(_) => Category::Stream,
            Event::Activity(_) => Category::Activity,
        }
    }

    /// サブタイプのリテラル値を取得する
    pub fn subtype(&self) -> &'static str {
        match self {
            Event::Result(e) => e.subtype(),
            Event::Status(e) => e.subtype(),
            Event::Stream(e) => e.subtype(),
            Event::Activity(e) => e.subtype(),
        }
    }

    /// フィールドを取得する
    pub fn fields(&self) -> &[String] {
        match self {
            Event::Result(e) => &e.fields,
            Event::Status(e) => &e.fields,
            Event::Stream(e) => &e.fields,
            Event::Activity(e) => &e.fields,
        }
    }

    /// 処理済みかどうか
    pub fn is_consumed(&self) -> bool {
        match self {
            Event::Result(e) => e.is_consumed(),
            Event::Status(e) => e.is_consumed(),
            Event::Stream(e) => e.is_consumed(),
            Event::Activity(e) => e.is_consumed(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category(), self.subtype())?;
        for field in self.fields() {
            write!(f, " {:?}", field)?;
        }
        Ok(())
    }
}

/// コマンドの完了イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Result(ResultEvent),
    Status(StatusEvent),
}

impl Reply {
    /// サブタイプのリテラル値を取得する
    pub fn subtype(&self) -> &'static str {
        match self {
            Reply::Result(e) => e.subtype(),
            Reply::Status(e) => e.subtype(),
        }
    }

    /// フィールドを取得する
    pub fn fields(&self) -> &[String] {
        match self {
            Reply::Result(e) => &e.fields,
            Reply::Status(e) => &e.fields,
        }
    }

    /// 添付された出力行を取得する
    pub fn output(&self) -> Option<&[String]> {
        match self {
            Reply::Result(e) => e.output(),
            Reply::Status(e) => e.output(),
        }
    }

    /// 出力行を添付する（完了時に1回だけ）
    pub fn attach_output(&mut self, lines: Vec<String>) {
        match self {
            Reply::Result(e) => e.attach_output(lines),
            Reply::Status(e) => e.attach_output(lines),
        }
    }

    /// 汎用イベントに戻す
    pub fn into_event(self) -> Event {
        match self {
            Reply::Result(e) => Event::Result(e),
            Reply::Status(e) => Event::Status(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subtype_lookup() {
        assert_eq!(ResultClass::from_tag("done").unwrap(), ResultClass::Done);
        assert_eq!(StatusClass::from_tag("stopped").unwrap(), StatusClass::Stopped);
        assert_eq!(
            ActivityKind::from_tag("breakpoint-modified").unwrap(),
            ActivityKind::BreakpointModified
        );
        assert_eq!(ActivityKind::ALL.len(), 20);
    }

    #[test]
    fn test_unknown_subtype_is_error() {
        let err = Event::from_tokens(Category::Activity, tokens(&["thread-teleported", "1"]))
            .unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownSubtype {
                category: Category::Activity,
                tag: "thread-teleported".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_subtype() {
        let err = Event::from_tokens(Category::Result, Vec::new()).unwrap_err();
        assert_eq!(err, ParseError::MissingSubtype { category: Category::Result });
    }

    #[test]
    fn test_from_tokens() {
        let event = Event::from_tokens(Category::Status, tokens(&["stopped", "breakpoint-hit"]))
            .unwrap();
        assert_eq!(event.category(), Category::Status);
        assert_eq!(event.subtype(), "stopped");
        assert_eq!(event.fields(), &["breakpoint-hit".to_string()]);
        assert!(!event.is_consumed());
    }

    #[test]
    fn test_consume_and_output() {
        let mut record = ResultEvent::new(ResultClass::Done, tokens(&["3"]));
        assert!(record.output().is_none());
        record.consume();
        assert!(record.is_consumed());

        let mut reply = Reply::Result(record);
        reply.attach_output(tokens(&["hello from target"]));
        assert_eq!(reply.output(), Some(&["hello from target".to_string()][..]));
        assert!(matches!(reply.into_event(), Event::Result(_)));
    }
}
