//! プログラム出力の捕捉
//!
//! 捕捉を要求したリクエストが待機している間、既知の接頭辞を持たない行
//! （主にデバッグ対象プログラム自身の出力）を溜めておきます。
//! 溜めた行は、捕捉を要求したリクエストのうち最初に完了したものの応答に添付されます。

/// 認識できない行の捕捉バッファ
#[derive(Debug, Default)]
pub struct OutputCapture {
    /// 捕捉を要求している待機中リクエストの数
    holders: usize,
    lines: Vec<String>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// 捕捉を要求するリクエストを登録する
    pub fn acquire(&mut self) {
        self.holders += 1;
    }

    /// 溜めた行を取り出してリクエストの登録を解除する
    pub fn take(&mut self) -> Vec<String> {
        self.holders = self.holders.saturating_sub(1);
        std::mem::take(&mut self.lines)
    }

    /// 応答を受け取らずにリクエストの登録を解除する
    pub fn release(&mut self) {
        self.holders = self.holders.saturating_sub(1);
        if self.holders == 0 {
            self.lines.clear();
        }
    }

    /// 捕捉中なら行を溜める
    pub fn offer(&mut self, line: &str) -> bool {
        if self.holders == 0 {
            return false;
        }
        self.lines.push(line.to_string());
        true
    }

    pub fn is_active(&self) -> bool {
        self.holders > 0
    }
}
