//! GDB/MI セッション
//!
//! デバッガの標準出力を読むタスクが1行ずつ [`Dispatcher`] に渡し、
//! コマンド発行側は待機中リクエストを登録してから標準入力に書き込みます。
//! 共有状態（待機中リクエスト、収集バッファ、準備完了フラグ）は1つのロックで直列化されます。
//!
//! 既定の対応付け順序（`Lifo`）では、待機中のコマンドを常に1つに保つ必要があります。
//! 各コマンドの完了を待ってから次のコマンドを発行してください。

use crate::bus::EventBus;
use crate::config::{SessionConfig, StreamSelection};
use crate::correlator::{RequestId, Settlement};
use crate::dispatch::{Dispatcher, SettlementReceiver};
use crate::errors::SessionError;
use crate::Result;
use hibari_mi::{Event, Reply};
use hibari_target::{DebuggerProcess, LaunchConfig};
use std::borrow::Cow;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// デバッガプロセスの制御（`with_io` で作ったセッションにはない）
struct ProcessControl {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

/// GDB/MI セッション
pub struct Session {
    state: Arc<Mutex<Dispatcher>>,
    writer: tokio::sync::Mutex<Writer>,
    reader: JoinHandle<()>,
    ready: watch::Receiver<bool>,
    collect_streams: StreamSelection,
    process: Option<ProcessControl>,
}

impl Session {
    /// デバッガを起動してセッションを開始する
    ///
    /// tokio ランタイムの中から呼び出す必要があります。
    pub fn spawn(launch: &LaunchConfig, config: SessionConfig) -> Result<Self> {
        let (process, io) = DebuggerProcess::spawn(launch)?;
        let pid = process.pid();

        let mut session = Self::with_io(io.stdout, io.stdin, config)?;
        session.process = Some(watch_process(process, pid));
        Ok(session)
    }

    /// 任意の入出力の上にセッションを作る
    ///
    /// `reader` からデバッガの出力を読み、`writer` にコマンドを書き込みます。
    pub fn with_io<R, W>(reader: R, writer: W, config: SessionConfig) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let collect_streams = config.collect_streams;
        let dispatcher = Dispatcher::new(config)?;
        let ready = dispatcher.ready_receiver();
        let state = Arc::new(Mutex::new(dispatcher));

        let reader = tokio::spawn(read_lines(reader, Arc::clone(&state)));

        Ok(Self {
            state,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            reader,
            ready,
            collect_streams,
            process: None,
        })
    }

    /// コマンドを発行し、対応する Result / Status イベントを待つ
    ///
    /// `^error` の応答はフィールドを連結したメッセージの [`SessionError::Command`] になります。
    /// `capture_output` を指定すると、完了までに届いた認識できない行を応答に添付します。
    pub async fn execute(&self, command: &str, capture_output: bool) -> Result<Reply> {
        let (id, rx) = self.lock().submit(capture_output)?;
        self.send(id, command).await?;
        Ok(settled(rx).await?.reply)
    }

    /// コマンドを発行し、完了までに届いたストリーム出力を収集する
    ///
    /// 別の収集が進行中なら、コマンドを書き込まずに
    /// [`SessionError::CollectionConflict`] で失敗します。
    pub async fn execute_collect(
        &self,
        command: &str,
        streams: StreamSelection,
        capture_output: bool,
    ) -> Result<(Reply, Vec<Vec<String>>)> {
        let (id, rx) = self.lock().submit_collect(streams, capture_output)?;
        self.send(id, command).await?;
        let Settlement { reply, collected } = settled(rx).await?;
        Ok((reply, collected))
    }

    /// 設定の既定ストリームを収集しながらコマンドを発行する
    pub async fn collect(&self, command: &str) -> Result<(Reply, Vec<Vec<String>>)> {
        self.execute_collect(command, self.collect_streams, false)
            .await
    }

    /// 何も書き込まずに次の Result / Status イベントを待つ
    ///
    /// 実行中のプログラムが停止するのを待つ場合などに使います。
    pub async fn await_next_event(&self, capture_output: bool) -> Result<Reply> {
        let (_, rx) = self.lock().submit(capture_output)?;
        Ok(settled(rx).await?.reply)
    }

    /// デバッグ対象プログラムへの入力などをそのまま書き込む
    pub async fn write_raw(&self, text: &str) -> Result<()> {
        self.write_line(text).await
    }

    /// イベントバスに購読者を登録する
    ///
    /// 起動直後のイベントも受け取るには [`SessionConfig::events`] を使ってください。
    pub fn events<R>(&self, register: impl FnOnce(&mut EventBus) -> R) -> R {
        register(self.lock().events())
    }

    /// 全てのイベントを非同期に受け取る
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.lock().subscribe()
    }

    /// 最初のプロンプトを受け取るまで待つ
    ///
    /// プロンプトの前にデバッガの出力が閉じた場合は [`SessionError::Abandoned`] になります。
    pub async fn wait_ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| SessionError::Abandoned)?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// 応答を待っているリクエストの数
    pub fn pending_requests(&self) -> usize {
        self.lock().pending()
    }

    /// ストリーム出力の収集が進行中か
    pub fn is_collecting(&self) -> bool {
        self.lock().is_collecting()
    }

    /// デバッガのプロセスID
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    /// デバッガにSIGINTを送って実行中のプログラムを停止させる
    pub fn interrupt(&self) -> Result<()> {
        let control = self.process.as_ref().ok_or(SessionError::NotSpawned)?;
        if control.exit_rx.borrow().is_some() {
            return Err(anyhow::anyhow!("Debugger process has already exited").into());
        }
        let pid = control.pid.ok_or(SessionError::NotSpawned)?;
        hibari_target::process::interrupt(pid)?;
        Ok(())
    }

    /// デバッガを強制終了する
    ///
    /// 待機中のリクエストは失敗させずにそのまま残ります。
    pub async fn terminate(&self) -> Result<()> {
        let control = self.process.as_ref().ok_or(SessionError::NotSpawned)?;
        // 監視タスクが既に終了していれば、プロセスも終了済み
        if control.kill_tx.send(()).await.is_err() {
            debug!("Debugger already exited");
        }
        Ok(())
    }

    /// デバッガの終了を待つ
    pub async fn wait_exit(&self) -> Result<ExitStatus> {
        let control = self.process.as_ref().ok_or(SessionError::NotSpawned)?;
        let mut exit_rx = control.exit_rx.clone();
        let status = exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SessionError::Abandoned)?;
        (*status).ok_or(SessionError::Abandoned)
    }

    fn lock(&self) -> MutexGuard<'_, Dispatcher> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 書き込みに失敗したらリクエストを取り下げる
    async fn send(&self, id: RequestId, command: &str) -> Result<()> {
        if let Err(e) = self.write_line(command).await {
            self.lock().withdraw(id);
            return Err(e);
        }
        Ok(())
    }

    async fn write_line(&self, text: &str) -> Result<()> {
        debug!(command = text.trim_end(), "Writing to debugger");
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn settled(rx: SettlementReceiver) -> Result<Settlement> {
    rx.await.map_err(|_| SessionError::Abandoned)?
}

/// デバッガの出力を1行ずつディスパッチする
///
/// 出力が閉じるか読み込みに失敗したら、待機中のリクエストを破棄して終了します。
async fn read_lines<R>(reader: R, state: Arc<Mutex<Dispatcher>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .dispatch_line(&line);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read debugger output");
                break;
            }
        }
    }

    state.lock().unwrap_or_else(PoisonError::into_inner).close();
}

/// 改行を取り除き、UTF-8として不正なバイトを置換文字にする
///
/// デバッグ対象プログラムの出力は任意のバイト列でありうるため、
/// 不正なバイトで読み込みを止めてはいけません。
fn decode_line(buf: &[u8]) -> Cow<'_, str> {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    if let Cow::Owned(_) = &text {
        debug!("Replaced invalid UTF-8 in debugger output");
    }
    text
}

/// プロセスの終了を監視し、終了要求があれば強制終了する
fn watch_process(mut process: DebuggerProcess, pid: Option<u32>) -> ProcessControl {
    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    let (exit_tx, exit_rx) = watch::channel(None);

    tokio::spawn(async move {
        let exited = tokio::select! {
            status = process.wait() => Some(status),
            _ = kill_rx.recv() => None,
        };

        let status = match exited {
            Some(status) => status,
            None => {
                info!("Terminating debugger");
                match process.kill().await {
                    Ok(()) => process.wait().await,
                    Err(e) => Err(e),
                }
            }
        };

        match status {
            Ok(status) => {
                exit_tx.send_replace(Some(status));
            }
            Err(e) => warn!(error = %e, "Failed to observe debugger exit"),
        }
    });

    ProcessControl {
        pid,
        kill_tx,
        exit_rx,
    }
}
