//! コマンドと応答の対応付け
//!
//! 発行したコマンドごとに待機中リクエストを登録し、次に届いた対応付け可能な
//! イベント（Result または Status）でそのリクエストを完了させます。
//!
//! 対応付けの順序は [`CorrelationOrder`] で決まります。既定の `Lifo` は
//! 最後に登録したリクエストを次の応答に割り当てるので、待機中のコマンドが
//! 常に1つであることが前提です。

use crate::capture::OutputCapture;
use crate::collector::Collector;
use crate::config::CorrelationOrder;
use crate::errors::{SessionError, ERROR_FIELD_SEPARATOR};
use hibari_mi::{Reply, ResultClass, ResultEvent};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::debug;

/// リクエストID
pub type RequestId = u64;

/// 完了したリクエストの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// 完了イベント
    pub reply: Reply,
    /// 収集したストリーム出力（収集付きでなければ空）
    pub collected: Vec<Vec<String>>,
}

type Responder = oneshot::Sender<Result<Settlement, SessionError>>;

/// 応答を待っているリクエスト
#[derive(Debug)]
struct PendingRequest {
    id: RequestId,
    responder: Responder,
    collect: bool,
    capture: bool,
}

/// 結果レコードの扱い
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// 対応付けずに捨てる
    Ignore,
    /// リクエストを成功で完了させる
    Settle,
    /// リクエストをエラーで完了させる
    Reject(String),
}

/// 結果レコードの扱いを決める
///
/// `exit` と非推奨の `running` は対応付けず、`error` はフィールドを連結したメッセージで
/// リクエストを失敗させます。それ以外は成功として完了させます。
pub fn route(event: &ResultEvent) -> Route {
    match event.kind {
        ResultClass::Exit | ResultClass::Running => Route::Ignore,
        ResultClass::Error => Route::Reject(event.fields.join(ERROR_FIELD_SEPARATOR)),
        ResultClass::Done | ResultClass::Connected => Route::Settle,
    }
}

/// 完了時にリクエストへ引き渡すバッファ
pub struct Attachments<'a> {
    pub collector: &'a mut Collector,
    pub capture: &'a mut OutputCapture,
}

/// 待機中リクエストの管理
#[derive(Debug)]
pub struct Correlator {
    pending: VecDeque<PendingRequest>,
    order: CorrelationOrder,
    next_id: RequestId,
}

impl Correlator {
    pub fn new(order: CorrelationOrder) -> Self {
        Self {
            pending: VecDeque::new(),
            order,
            next_id: 1,
        }
    }

    /// リクエストを登録する
    pub fn submit(
        &mut self,
        collect: bool,
        capture: bool,
    ) -> (RequestId, oneshot::Receiver<Result<Settlement, SessionError>>) {
        let id = self.next_id;
        self.next_id += 1;

        let (responder, receiver) = oneshot::channel();
        self.pending.push_back(PendingRequest {
            id,
            responder,
            collect,
            capture,
        });
        (id, receiver)
    }

    /// 次のリクエストを完了イベントで成功させる
    ///
    /// 成功すると、応答に添付した捕捉出力（捕捉していなければ `None`）を返します。
    /// 待機中のリクエストがなければイベントを `Err` でそのまま返します。
    pub fn settle(
        &mut self,
        mut reply: Reply,
        attachments: Attachments<'_>,
    ) -> Result<Option<Vec<String>>, Reply> {
        let Some(request) = self.take() else {
            return Err(reply);
        };

        let output = if request.capture {
            let lines = attachments.capture.take();
            reply.attach_output(lines.clone());
            Some(lines)
        } else {
            None
        };
        let collected = if request.collect {
            attachments.collector.end()
        } else {
            Vec::new()
        };

        debug!(request = request.id, reply = reply.subtype(), "Settling request");
        if request
            .responder
            .send(Ok(Settlement { reply, collected }))
            .is_err()
        {
            debug!(request = request.id, "Requester went away before settlement");
        }
        Ok(output)
    }

    /// 次のリクエストをエラーで失敗させる
    ///
    /// 待機中のリクエストがなければメッセージをそのまま返します。
    pub fn fail(&mut self, message: String, attachments: Attachments<'_>) -> Option<String> {
        let Some(request) = self.take() else {
            return Some(message);
        };

        if request.capture {
            attachments.capture.take();
        }
        if request.collect {
            attachments.collector.end();
        }

        debug!(request = request.id, %message, "Rejecting request");
        if request
            .responder
            .send(Err(SessionError::Command(message)))
            .is_err()
        {
            debug!(request = request.id, "Requester went away before rejection");
        }
        None
    }

    /// 応答を待たずにリクエストを取り下げる
    pub fn withdraw(&mut self, id: RequestId, attachments: Attachments<'_>) -> bool {
        let Some(index) = self.pending.iter().position(|r| r.id == id) else {
            return false;
        };
        if let Some(request) = self.pending.remove(index) {
            if request.capture {
                attachments.capture.release();
            }
            if request.collect {
                attachments.collector.end();
            }
        }
        true
    }

    /// 全ての待機中リクエストを破棄する
    ///
    /// 応答の送信側が破棄されるので、待っている側は [`SessionError::Abandoned`] になります。
    pub fn abandon_all(&mut self, attachments: Attachments<'_>) -> usize {
        let count = self.pending.len();
        for request in self.pending.drain(..) {
            if request.capture {
                attachments.capture.release();
            }
            if request.collect {
                attachments.collector.end();
            }
        }
        count
    }

    /// 待機中のリクエスト数
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> Option<PendingRequest> {
        match self.order {
            CorrelationOrder::Lifo => self.pending.pop_back(),
            CorrelationOrder::Fifo => self.pending.pop_front(),
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(CorrelationOrder::default())
    }
}
