//! ストリーム出力の収集
//!
//! 収集付きコマンドが応答を待っている間だけ、指定した種類のストリーム出力の
//! フィールドを到着順に溜めます。

use crate::config::StreamSelection;
use crate::errors::SessionError;
use hibari_mi::StreamEvent;

/// ストリーム出力の収集バッファ
#[derive(Debug, Default)]
pub struct Collector {
    /// 収集中の種類（収集していなければNone）
    active: Option<StreamSelection>,
    buffer: Vec<Vec<String>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 収集を開始する
    ///
    /// 既に収集中なら失敗し、進行中の収集には触れません。
    pub fn begin(&mut self, streams: StreamSelection) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::CollectionConflict);
        }
        self.active = Some(streams);
        self.buffer.clear();
        Ok(())
    }

    /// ストリームイベントを収集対象なら溜める
    pub fn offer(&mut self, event: &StreamEvent) -> bool {
        match self.active {
            Some(streams) if streams.contains(event.kind) => {
                self.buffer.push(event.fields.clone());
                true
            }
            _ => false,
        }
    }

    /// 収集を終了し、溜めた内容を返す
    pub fn end(&mut self) -> Vec<Vec<String>> {
        self.active = None;
        std::mem::take(&mut self.buffer)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
