//! 1行ごとのディスパッチ
//!
//! 受信した行をトークナイザで分類し、イベントバスへの配信、組み込み処理
//! （応答の対応付け、ストリーム出力の収集、プログラム出力の捕捉）、
//! 起動時のハンドシェイクを行います。
//! 行は到着順に1つずつ同期的に処理され、並行して処理されることはありません。
//!
//! 捕捉した出力は完了したイベント自体にも添付されるので、`any` チャネルと
//! [`Dispatcher::subscribe`] の受信側からも見えます。分類ごとのチャネルは
//! 対応付けより前に呼ばれるため、添付前のイベントを受け取ります。

use crate::bus::{Diagnostic, EventBus};
use crate::capture::OutputCapture;
use crate::collector::Collector;
use crate::config::{ReadyCallback, SessionConfig, StreamSelection};
use crate::correlator::{self, Attachments, Correlator, RequestId, Route, Settlement};
use crate::errors::SessionError;
use hibari_mi::{Event, Line, ParseError, Reply, Tokenizer};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};

/// 登録したリクエストの応答を受け取る受信側
pub type SettlementReceiver = oneshot::Receiver<Result<Settlement, SessionError>>;

/// セッションの状態とディスパッチ処理
pub struct Dispatcher {
    tokenizer: Tokenizer,
    bus: EventBus,
    correlator: Correlator,
    collector: Collector,
    capture: OutputCapture,
    ready: bool,
    closed: bool,
    on_ready: Option<ReadyCallback>,
    /// 出力が閉じたら破棄され、準備完了を待つ側は失敗する
    ready_tx: Option<watch::Sender<bool>>,
    fanout: broadcast::Sender<Event>,
    debug: bool,
}

impl Dispatcher {
    /// 設定からディスパッチャを作成する
    pub fn new(config: SessionConfig) -> crate::Result<Self> {
        let (ready_tx, _) = watch::channel(false);
        let (fanout, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            tokenizer: Tokenizer::new()?,
            bus: config.events,
            correlator: Correlator::new(config.correlation),
            collector: Collector::new(),
            capture: OutputCapture::new(),
            ready: false,
            closed: false,
            on_ready: config.on_ready,
            ready_tx: Some(ready_tx),
            fanout,
            debug: config.debug,
        })
    }

    /// 1行を処理する
    pub fn dispatch_line(&mut self, line: &str) {
        if self.debug {
            info!(target: "hibari::wire", "{}", line);
        }

        match self.tokenizer.parse_line(line) {
            Ok(Line::Record(event)) => self.dispatch_event(event),
            Ok(Line::Prompt) => self.on_prompt(),
            Ok(Line::Unrecognized(text)) => {
                self.capture.offer(&text);
                self.bus.publish_raw(&text);
            }
            Err(error) => self.on_parse_error(line, error),
        }
    }

    fn dispatch_event(&mut self, mut event: Event) {
        self.bus.publish(&mut event);
        if !event.is_consumed() {
            self.handle(&mut event);
        }
        self.bus.publish_any(&event);
        // 購読者がいなければ送信に失敗するが問題ない
        let _ = self.fanout.send(event);
    }

    /// 組み込み処理
    fn handle(&mut self, event: &mut Event) {
        match event {
            Event::Result(result) => match correlator::route(result) {
                Route::Ignore => {}
                Route::Settle => {
                    if let Some(lines) = self.settle(Reply::Result(result.clone())) {
                        result.attach_output(lines);
                    }
                }
                Route::Reject(message) => {
                    let attachments = Attachments {
                        collector: &mut self.collector,
                        capture: &mut self.capture,
                    };
                    if self.correlator.fail(message, attachments).is_some() {
                        self.on_unmatched(Event::Result(result.clone()));
                    }
                }
            },
            Event::Status(status) => {
                if let Some(lines) = self.settle(Reply::Status(status.clone())) {
                    status.attach_output(lines);
                }
            }
            Event::Stream(stream) => {
                self.collector.offer(stream);
            }
            Event::Activity(activity) => {
                debug!(activity = activity.subtype(), "Activity notification");
            }
        }
    }

    /// 待機中のリクエストを完了させ、添付した捕捉出力を返す
    fn settle(&mut self, reply: Reply) -> Option<Vec<String>> {
        let attachments = Attachments {
            collector: &mut self.collector,
            capture: &mut self.capture,
        };
        match self.correlator.settle(reply, attachments) {
            Ok(output) => output,
            Err(reply) => {
                self.on_unmatched(reply.into_event());
                None
            }
        }
    }

    fn on_prompt(&mut self) {
        if self.ready {
            return;
        }

        self.ready = true;
        info!("Debugger is ready");
        self.bus.publish_ready();
        if let Some(callback) = self.on_ready.take() {
            callback();
        }
        if let Some(ready_tx) = &self.ready_tx {
            ready_tx.send_replace(true);
        }
    }

    /// デバッガの出力が閉じたときの後始末
    ///
    /// 待機中のリクエストを破棄し、以降の登録を拒否します。
    /// まだ準備完了になっていなければ、準備完了を待つ側も失敗します。
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.ready_tx = None;

        let attachments = Attachments {
            collector: &mut self.collector,
            capture: &mut self.capture,
        };
        let abandoned = self.correlator.abandon_all(attachments);
        info!(abandoned, "Debugger output closed");
    }

    fn on_parse_error(&mut self, line: &str, error: ParseError) {
        warn!(%error, line, "Failed to parse MI record");
        self.bus.publish_diagnostic(&Diagnostic::Parse {
            line: line.to_string(),
            error,
        });
    }

    fn on_unmatched(&mut self, event: Event) {
        warn!(%event, "No pending request for event");
        self.bus.publish_diagnostic(&Diagnostic::Unmatched { event });
    }

    /// 応答を待つリクエストを登録する
    ///
    /// 出力が閉じた後は [`SessionError::Abandoned`] で失敗します。
    pub fn submit(&mut self, capture: bool) -> crate::Result<(RequestId, SettlementReceiver)> {
        if self.closed {
            return Err(SessionError::Abandoned);
        }
        if capture {
            self.capture.acquire();
        }
        Ok(self.correlator.submit(false, capture))
    }

    /// ストリーム出力を収集するリクエストを登録する
    ///
    /// 既に収集中なら何も登録せずに失敗します。
    pub fn submit_collect(
        &mut self,
        streams: StreamSelection,
        capture: bool,
    ) -> crate::Result<(RequestId, SettlementReceiver)> {
        if self.closed {
            return Err(SessionError::Abandoned);
        }
        self.collector.begin(streams)?;
        if capture {
            self.capture.acquire();
        }
        Ok(self.correlator.submit(true, capture))
    }

    /// 登録したリクエストを取り下げる
    pub fn withdraw(&mut self, id: RequestId) -> bool {
        let attachments = Attachments {
            collector: &mut self.collector,
            capture: &mut self.capture,
        };
        self.correlator.withdraw(id, attachments)
    }

    /// イベントバスへの可変参照を取得する
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// 全イベントの受信側を作成する
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.fanout.subscribe()
    }

    /// 準備完了フラグの受信側を作成する
    pub fn ready_receiver(&self) -> watch::Receiver<bool> {
        match &self.ready_tx {
            Some(ready_tx) => ready_tx.subscribe(),
            // 送信側のない受信側は現在の値だけを返す
            None => watch::channel(self.ready).1,
        }
    }

    /// 待機中のリクエスト数
    pub fn pending(&self) -> usize {
        self.correlator.len()
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_active()
    }
}
