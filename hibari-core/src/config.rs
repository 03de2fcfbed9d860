//! セッションの設定

use crate::bus::EventBus;
use hibari_mi::StreamKind;
use std::fmt;

/// 準備完了時に1回だけ呼ばれるコールバック
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// 収集対象にするストリームの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelection {
    pub console: bool,
    pub target: bool,
    pub internal: bool,
}

impl StreamSelection {
    /// 何も収集しない
    pub const fn none() -> Self {
        Self {
            console: false,
            target: false,
            internal: false,
        }
    }

    /// コンソール出力だけを収集する
    pub const fn console() -> Self {
        Self {
            console: true,
            ..Self::none()
        }
    }

    /// 全てのストリームを収集する
    pub const fn all() -> Self {
        Self {
            console: true,
            target: true,
            internal: true,
        }
    }

    /// 種類を追加する
    pub fn with(mut self, kind: StreamKind) -> Self {
        match kind {
            StreamKind::Console => self.console = true,
            StreamKind::Target => self.target = true,
            StreamKind::Internal => self.internal = true,
        }
        self
    }

    /// 指定した種類が含まれるか
    pub fn contains(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Console => self.console,
            StreamKind::Target => self.target,
            StreamKind::Internal => self.internal,
        }
    }
}

impl Default for StreamSelection {
    fn default() -> Self {
        Self::console()
    }
}

/// 応答と待機中リクエストの対応付け順序
///
/// MIは発行順に応答するため、同時に複数のコマンドを待機させる場合は
/// `Fifo` が正しい順序です。`Lifo` は最後に登録したリクエストに次の応答を
/// 割り当てるため、待機中のコマンドを常に1つに保つことが前提になります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationOrder {
    #[default]
    Lifo,
    Fifo,
}

/// セッションの設定
pub struct SessionConfig {
    /// 受信した全ての行を `hibari::wire` に出力する
    pub debug: bool,
    /// 最初のプロンプトで呼ばれるコールバック
    pub on_ready: Option<ReadyCallback>,
    /// `Session::collect` が使うストリームの種類
    pub collect_streams: StreamSelection,
    /// 応答の対応付け順序
    pub correlation: CorrelationOrder,
    /// `Session::subscribe` のバッファ長
    pub event_capacity: usize,
    /// 起動前に登録しておく購読者
    pub events: EventBus,
}

impl SessionConfig {
    /// デバッグ出力を切り替える
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// 準備完了コールバックを設定する
    pub fn on_ready(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    /// 既定の収集対象を設定する
    pub fn collect_streams(mut self, streams: StreamSelection) -> Self {
        self.collect_streams = streams;
        self
    }

    /// 対応付け順序を設定する
    pub fn correlation(mut self, order: CorrelationOrder) -> Self {
        self.correlation = order;
        self
    }

    /// 購読者を登録したイベントバスを設定する
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            on_ready: None,
            collect_streams: StreamSelection::default(),
            correlation: CorrelationOrder::default(),
            event_capacity: 256,
            events: EventBus::new(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("debug", &self.debug)
            .field("on_ready", &self.on_ready.is_some())
            .field("collect_streams", &self.collect_streams)
            .field("correlation", &self.correlation)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}
