//! Hibari セッションエンジン
//!
//! このクレートは、GDB/MI の出力行を型付きイベントとして配信し、
//! 発行したコマンドと応答を対応付けるセッションを提供します。
//! イベントバス、応答の対応付け、ストリーム出力の収集、起動時のハンドシェイクを統合します。

pub mod bus;
pub mod capture;
pub mod collector;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod errors;
pub mod session;

pub use bus::{Diagnostic, EventBus};
pub use collector::Collector;
pub use config::{CorrelationOrder, ReadyCallback, SessionConfig, StreamSelection};
pub use correlator::{Correlator, RequestId, Settlement};
pub use dispatch::Dispatcher;
pub use errors::SessionError;
pub use session::Session;

// 他のクレートから使用するために再エクスポート
pub use hibari_mi::{
    ActivityEvent, ActivityKind, Category, Event, Reply, ResultClass, ResultEvent, StatusClass,
    StatusEvent, StreamEvent, StreamKind,
};
pub use hibari_target::{Args, LaunchConfig};

/// セッション操作の結果型
pub type Result<T> = std::result::Result<T, SessionError>;
