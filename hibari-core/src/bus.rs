//! イベントバス
//!
//! 分類ごとのチャネル（`result` `status` `stream` `activity`）と、全イベントが届く
//! `any` チャネル、制御用の `ready` と認識できない行のチャネルを持ちます。
//!
//! 1行あたりの配信順序は次の通りです。
//!
//! 1. 分類ごとのチャネル（登録順、処理済みになった時点で以降の購読者は呼ばれない）
//! 2. セッションの組み込み処理（処理済みなら省略）
//! 3. `any` チャネル（処理済みでも必ず呼ばれる）
//!
//! 購読者はセッションの状態をロックした状態で呼ばれます。
//! 購読者の中からセッションのコマンドを発行してはいけません。

use hibari_mi::{
    ActivityEvent, Event, ParseError, Record, ResultEvent, StatusEvent, StreamEvent, Subtype,
};
use std::fmt;

type Handler<T> = Box<dyn FnMut(&mut T) + Send>;
type Observer<T> = Box<dyn FnMut(&T) + Send>;

/// 回復済みのエラーの通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// 解釈できなかった行
    Parse { line: String, error: ParseError },
    /// 待機中のリクエストがない応答
    Unmatched { event: Event },
}

/// イベントバス
#[derive(Default)]
pub struct EventBus {
    result: Vec<Handler<ResultEvent>>,
    status: Vec<Handler<StatusEvent>>,
    stream: Vec<Handler<StreamEvent>>,
    activity: Vec<Handler<ActivityEvent>>,
    any: Vec<Observer<Event>>,
    ready: Vec<Box<dyn FnMut() + Send>>,
    raw: Vec<Box<dyn FnMut(&str) + Send>>,
    diagnostic: Vec<Observer<Diagnostic>>,
}

impl EventBus {
    /// 空のイベントバスを作成する
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_result(&mut self, handler: impl FnMut(&mut ResultEvent) + Send + 'static) -> &mut Self {
        self.result.push(Box::new(handler));
        self
    }

    pub fn on_status(&mut self, handler: impl FnMut(&mut StatusEvent) + Send + 'static) -> &mut Self {
        self.status.push(Box::new(handler));
        self
    }

    pub fn on_stream(&mut self, handler: impl FnMut(&mut StreamEvent) + Send + 'static) -> &mut Self {
        self.stream.push(Box::new(handler));
        self
    }

    pub fn on_activity(
        &mut self,
        handler: impl FnMut(&mut ActivityEvent) + Send + 'static,
    ) -> &mut Self {
        self.activity.push(Box::new(handler));
        self
    }

    /// 全てのイベントを購読する
    pub fn on_any(&mut self, observer: impl FnMut(&Event) + Send + 'static) -> &mut Self {
        self.any.push(Box::new(observer));
        self
    }

    /// 準備完了を購読する（1回だけ通知される）
    pub fn on_ready(&mut self, observer: impl FnMut() + Send + 'static) -> &mut Self {
        self.ready.push(Box::new(observer));
        self
    }

    /// 認識できない生の行を購読する
    pub fn on_raw_line(&mut self, observer: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.raw.push(Box::new(observer));
        self
    }

    /// 回復済みのエラーを購読する
    pub fn on_diagnostic(&mut self, observer: impl FnMut(&Diagnostic) + Send + 'static) -> &mut Self {
        self.diagnostic.push(Box::new(observer));
        self
    }

    /// 分類ごとのチャネルに配信する
    pub fn publish(&mut self, event: &mut Event) {
        match event {
            Event::Result(e) => deliver(&mut self.result, e),
            Event::Status(e) => deliver(&mut self.status, e),
            Event::Stream(e) => deliver(&mut self.stream, e),
            Event::Activity(e) => deliver(&mut self.activity, e),
        }
    }

    /// `any` チャネルに配信する
    pub fn publish_any(&mut self, event: &Event) {
        for observer in &mut self.any {
            observer(event);
        }
    }

    pub fn publish_ready(&mut self) {
        for observer in &mut self.ready {
            observer();
        }
    }

    pub fn publish_raw(&mut self, line: &str) {
        for observer in &mut self.raw {
            observer(line);
        }
    }

    pub fn publish_diagnostic(&mut self, diagnostic: &Diagnostic) {
        for observer in &mut self.diagnostic {
            observer(diagnostic);
        }
    }
}

fn deliver<K: Subtype>(handlers: &mut [Handler<Record<K>>], record: &mut Record<K>) {
    for handler in handlers {
        if record.is_consumed() {
            break;
        }
        handler(record);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("result", &self.result.len())
            .field("status", &self.status.len())
            .field("stream", &self.stream.len())
            .field("activity", &self.activity.len())
            .field("any", &self.any.len())
            .field("ready", &self.ready.len())
            .field("raw", &self.raw.len())
            .field("diagnostic", &self.diagnostic.len())
            .finish()
    }
}
